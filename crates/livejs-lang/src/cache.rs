//! Content-addressed cache of transform outputs.
//!
//! Entries are keyed by the SHA-256 of the source text followed by the
//! canonical JSON of the options that influence the output. The cache keeps
//! a bounded number of entries, expires them after a TTL and persists a
//! snapshot through a [`KeyValueStore`], debounced so that bursts of writes
//! produce a single save.
pub mod clock;
pub mod error;
pub mod store;

use std::{fmt::Write, time::Duration};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::CacheError;
pub use store::{FileStore, KeyValueStore, MemoryStore};

use crate::transform::{OptionsKey, TransformOptions};

pub const SNAPSHOT_VERSION: u32 = 1;
pub const DEFAULT_STORAGE_KEY: &str = "livejs:transpile-cache";
const ENTRY_OVERHEAD_BYTES: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    pub max_size: usize,
    pub ttl: Duration,
    pub save_debounce: Duration,
    pub cleanup_interval: Duration,
    pub storage_key: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 100,
            ttl: Duration::from_secs(24 * 60 * 60),
            save_debounce: Duration::from_secs(1),
            cleanup_interval: Duration::from_secs(60 * 60),
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub hash: String,
    pub output: String,
    pub options: OptionsKey,
    /// Insertion time in milliseconds since the Unix epoch.
    pub timestamp: u64,
    pub hit_count: u64,
}

impl CacheEntry {
    fn memory_bytes(&self) -> usize {
        self.hash.len()
            + self.output.len()
            + self.options.canonical_json().len()
            + ENTRY_OVERHEAD_BYTES
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheCounters {
    pub hits: u64,
    pub misses: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub size: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub memory_bytes: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    entries: Vec<(String, CacheEntry)>,
    stats: CacheCounters,
}

#[derive(Debug, Deserialize)]
struct SnapshotHeader {
    version: u32,
}

/// Hex SHA-256 of `source ‖ canonical-json(options)`.
pub fn cache_key(source: &str, options: &OptionsKey) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update(options.canonical_json().as_bytes());

    hasher
        .finalize()
        .iter()
        .fold(String::with_capacity(64), |mut hex, byte| {
            let _ = write!(hex, "{:02x}", byte);
            hex
        })
}

pub struct TranspileCache {
    config: CacheConfig,
    entries: IndexMap<String, CacheEntry>,
    counters: CacheCounters,
    store: Box<dyn KeyValueStore>,
    clock: Box<dyn Clock>,
    save_deadline: Option<u64>,
    last_cleanup: u64,
}

impl std::fmt::Debug for TranspileCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranspileCache")
            .field("config", &self.config)
            .field("size", &self.entries.len())
            .field("counters", &self.counters)
            .field("save_deadline", &self.save_deadline)
            .finish()
    }
}

impl TranspileCache {
    /// Creates a cache and restores the snapshot held by `store`, if any.
    ///
    /// An unreadable or mismatched snapshot is discarded.
    pub fn new(
        config: CacheConfig,
        store: Box<dyn KeyValueStore>,
        clock: Box<dyn Clock>,
    ) -> Self {
        let now = clock.now_millis();
        let mut cache = Self {
            config,
            entries: IndexMap::new(),
            counters: CacheCounters::default(),
            store,
            clock,
            save_deadline: None,
            last_cleanup: now,
        };

        match cache.load() {
            Ok(Some(count)) => tracing::debug!(count, "restored transpile cache snapshot"),
            Ok(None) => {}
            Err(err) => tracing::warn!(error = %err, "discarding transpile cache snapshot"),
        }
        cache.cleanup();
        cache
    }

    pub fn in_memory(config: CacheConfig) -> Self {
        Self::new(config, Box::new(MemoryStore::new()), Box::new(SystemClock))
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up a cached output, counting a hit or a miss.
    pub fn get(&mut self, source: &str, options: &TransformOptions) -> Option<String> {
        self.maintain();

        let key = cache_key(source, &options.key());
        let now = self.clock.now_millis();
        let ttl = self.ttl_millis();

        match self.entries.get_mut(&key) {
            Some(entry) if !is_expired(entry, now, ttl) => {
                entry.hit_count += 1;
                self.counters.hits += 1;
                tracing::debug!(hash = %key, hit_count = entry.hit_count, "transpile cache hit");
                Some(entry.output.clone())
            }
            Some(_) => {
                self.entries.shift_remove(&key);
                self.counters.misses += 1;
                self.schedule_save(now);
                tracing::debug!(hash = %key, "transpile cache entry expired");
                None
            }
            None => {
                self.counters.misses += 1;
                tracing::debug!(hash = %key, "transpile cache miss");
                None
            }
        }
    }

    /// Stores `output`, evicting the lowest scoring entry when full.
    pub fn set(&mut self, source: &str, output: &str, options: &TransformOptions) {
        self.maintain();
        if self.config.max_size == 0 {
            return;
        }

        let options = options.key();
        let key = cache_key(source, &options);
        let now = self.clock.now_millis();

        if !self.entries.contains_key(&key) && self.entries.len() >= self.config.max_size {
            self.evict_one(now);
        }

        self.entries.insert(
            key.clone(),
            CacheEntry {
                hash: key,
                output: output.to_string(),
                options,
                timestamp: now,
                hit_count: 0,
            },
        );
        self.schedule_save(now);
    }

    /// Whether a live entry exists. Does not touch the counters.
    pub fn has(&self, source: &str, options: &TransformOptions) -> bool {
        let key = cache_key(source, &options.key());
        self.entries
            .get(&key)
            .is_some_and(|entry| !is_expired(entry, self.clock.now_millis(), self.ttl_millis()))
    }

    /// Removes the entry for `source`; returns whether a live entry was removed.
    pub fn invalidate(&mut self, source: &str, options: &TransformOptions) -> bool {
        let key = cache_key(source, &options.key());
        let now = self.clock.now_millis();

        match self.entries.shift_remove(&key) {
            Some(entry) => {
                self.schedule_save(now);
                !is_expired(&entry, now, self.ttl_millis())
            }
            None => false,
        }
    }

    /// Drops every expired entry and returns how many were removed.
    pub fn cleanup(&mut self) -> usize {
        let now = self.clock.now_millis();
        let ttl = self.ttl_millis();
        let before = self.entries.len();

        self.entries.retain(|_, entry| !is_expired(entry, now, ttl));
        self.last_cleanup = now;

        let removed = before - self.entries.len();
        if removed > 0 {
            tracing::debug!(removed, "removed expired transpile cache entries");
            self.schedule_save(now);
        }
        removed
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.counters = CacheCounters::default();
        self.save();
    }

    pub fn stats(&self) -> CacheStats {
        let lookups = self.counters.hits + self.counters.misses;

        CacheStats {
            size: self.entries.len(),
            hits: self.counters.hits,
            misses: self.counters.misses,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                self.counters.hits as f64 / lookups as f64
            },
            memory_bytes: self.entries.values().map(CacheEntry::memory_bytes).sum(),
        }
    }

    pub fn entry(&self, source: &str, options: &TransformOptions) -> Option<&CacheEntry> {
        self.entries.get(&cache_key(source, &options.key()))
    }

    /// Runs due maintenance: a pending save past its deadline and the
    /// periodic expiry sweep.
    pub fn tick(&mut self) {
        self.maintain();
    }

    /// Writes a pending snapshot immediately.
    pub fn flush(&mut self) {
        if self.save_deadline.is_some() {
            self.save();
        }
    }

    /// Ends the cache's life: pending writes are saved and nothing further
    /// is scheduled.
    pub fn dispose(&mut self) {
        self.flush();
        self.save_deadline = None;
    }

    pub fn has_pending_save(&self) -> bool {
        self.save_deadline.is_some()
    }

    fn maintain(&mut self) {
        let now = self.clock.now_millis();

        if self.save_deadline.is_some_and(|deadline| now >= deadline) {
            self.save();
        }
        if now.saturating_sub(self.last_cleanup) >= self.config.cleanup_interval.as_millis() as u64 {
            self.cleanup();
        }
    }

    fn ttl_millis(&self) -> u64 {
        self.config.ttl.as_millis() as u64
    }

    /// Removes the entry with the lowest `hit_count - age / ttl`. Ties go to
    /// the earliest inserted entry.
    fn evict_one(&mut self, now: u64) {
        let ttl = self.ttl_millis().max(1) as f64;
        let victim = self
            .entries
            .iter()
            .map(|(key, entry)| {
                let age = now.saturating_sub(entry.timestamp) as f64;
                (key, entry.hit_count as f64 - age / ttl)
            })
            .min_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(key, _)| key.clone());

        if let Some(key) = victim {
            tracing::debug!(hash = %key, "evicting transpile cache entry");
            self.entries.shift_remove(&key);
        }
    }

    fn schedule_save(&mut self, now: u64) {
        self.save_deadline = Some(now + self.config.save_debounce.as_millis() as u64);
    }

    fn save(&mut self) {
        self.save_deadline = None;

        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            entries: self
                .entries
                .iter()
                .map(|(key, entry)| (key.clone(), entry.clone()))
                .collect(),
            stats: self.counters,
        };

        let result = serde_json::to_string(&snapshot)
            .map_err(CacheError::from)
            .and_then(|json| self.store.set(&self.config.storage_key, &json));

        match result {
            Ok(()) => tracing::debug!(size = self.entries.len(), "saved transpile cache"),
            Err(err) => tracing::warn!(error = %err, "failed to save transpile cache"),
        }
    }

    fn load(&mut self) -> Result<Option<usize>, CacheError> {
        let Some(json) = self.store.get(&self.config.storage_key)? else {
            return Ok(None);
        };

        let header: SnapshotHeader = serde_json::from_str(&json)?;
        if header.version != SNAPSHOT_VERSION {
            return Err(CacheError::VersionMismatch {
                found: header.version,
                expected: SNAPSHOT_VERSION,
            });
        }

        let snapshot: Snapshot = serde_json::from_str(&json)?;
        self.entries = snapshot.entries.into_iter().collect();
        self.counters = snapshot.stats;

        let now = self.clock.now_millis();
        while self.entries.len() > self.config.max_size {
            self.evict_one(now);
        }

        Ok(Some(self.entries.len()))
    }
}

impl Drop for TranspileCache {
    fn drop(&mut self) {
        self.flush();
    }
}

fn is_expired(entry: &CacheEntry, now: u64, ttl: u64) -> bool {
    now.saturating_sub(entry.timestamp) > ttl
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    const START: u64 = 1_700_000_000_000;

    #[derive(Clone, Default)]
    struct CountingStore {
        inner: MemoryStore,
        writes: Arc<AtomicUsize>,
    }

    impl KeyValueStore for CountingStore {
        fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
            self.inner.get(key)
        }

        fn set(&mut self, key: &str, value: &str) -> Result<(), CacheError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.inner.set(key, value)
        }
    }

    struct Harness {
        cache: TranspileCache,
        clock: ManualClock,
        store: CountingStore,
    }

    fn harness_with(config: CacheConfig, store: CountingStore) -> Harness {
        let clock = ManualClock::new(START);
        let cache = TranspileCache::new(config, Box::new(store.clone()), Box::new(clock.clone()));
        Harness {
            cache,
            clock,
            store,
        }
    }

    #[fixture]
    fn harness() -> Harness {
        harness_with(CacheConfig::default(), CountingStore::default())
    }

    fn small(max_size: usize) -> Harness {
        harness_with(
            CacheConfig {
                max_size,
                ttl: Duration::from_secs(100),
                ..Default::default()
            },
            CountingStore::default(),
        )
    }

    fn options() -> TransformOptions {
        TransformOptions::default()
    }

    #[test]
    fn test_cache_key_is_hex_sha256() {
        let key = cache_key("1 + 1", &options().key());
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(key, cache_key("1 + 1", &options().key()));
        assert_ne!(key, cache_key("1 + 2", &options().key()));
    }

    #[rstest]
    fn test_hit_increments_hit_count(mut harness: Harness) {
        let cache = &mut harness.cache;
        assert_eq!(cache.get("x", &options()), None);
        cache.set("x", "out", &options());

        assert_eq!(cache.get("x", &options()), Some("out".to_string()));
        assert_eq!(cache.get("x", &options()), Some("out".to_string()));
        assert_eq!(cache.entry("x", &options()).map(|e| e.hit_count), Some(2));

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.size), (2, 1, 1));
        assert!((stats.hit_rate - 2.0 / 3.0).abs() < f64::EPSILON);
    }

    #[rstest]
    fn test_output_affecting_options_change_the_key(mut harness: Harness) {
        let cache = &mut harness.cache;
        cache.set("x", "out", &options());

        let guarded = TransformOptions {
            loop_protection: true,
            ..options()
        };
        assert_eq!(cache.get("x", &guarded), None);

        let show_undefined = TransformOptions {
            show_undefined: true,
            ..options()
        };
        assert_eq!(cache.get("x", &show_undefined), Some("out".to_string()));
    }

    #[test]
    fn test_evicts_lowest_score() {
        let mut h = small(3);
        h.cache.set("a", "A", &options());
        h.cache.set("b", "B", &options());
        h.cache.set("c", "C", &options());
        h.cache.get("a", &options());
        h.cache.get("a", &options());
        h.cache.get("c", &options());

        h.cache.set("d", "D", &options());

        assert_eq!(h.cache.len(), 3);
        assert!(!h.cache.has("b", &options()));
        assert!(h.cache.has("a", &options()));
        assert!(h.cache.has("c", &options()));
        assert!(h.cache.has("d", &options()));
    }

    #[test]
    fn test_eviction_prefers_older_entries_on_equal_hits() {
        let mut h = small(2);
        h.cache.set("old", "1", &options());
        h.clock.advance(Duration::from_secs(50));
        h.cache.set("new", "2", &options());

        h.cache.set("newest", "3", &options());

        assert!(!h.cache.has("old", &options()));
        assert!(h.cache.has("new", &options()));
    }

    #[test]
    fn test_eviction_ties_go_to_first_inserted() {
        let mut h = small(2);
        h.cache.set("first", "1", &options());
        h.cache.set("second", "2", &options());
        h.cache.set("third", "3", &options());

        assert!(!h.cache.has("first", &options()));
        assert!(h.cache.has("second", &options()));
    }

    #[test]
    fn test_hits_outweigh_age() {
        let mut h = small(2);
        h.cache.set("popular", "1", &options());
        h.cache.get("popular", &options());
        h.clock.advance(Duration::from_secs(90));
        h.cache.set("fresh", "2", &options());

        h.cache.set("another", "3", &options());

        assert!(h.cache.has("popular", &options()));
        assert!(!h.cache.has("fresh", &options()));
    }

    #[test]
    fn test_expired_entry_misses() {
        let mut h = small(10);
        h.cache.set("x", "out", &options());
        h.clock.advance(Duration::from_secs(101));

        assert!(!h.cache.has("x", &options()));
        assert_eq!(h.cache.get("x", &options()), None);
        assert_eq!(h.cache.len(), 0);
        assert_eq!(h.cache.stats().misses, 1);
    }

    #[test]
    fn test_has_and_invalidate_do_not_count() {
        let mut h = small(10);
        h.cache.set("x", "out", &options());

        assert!(h.cache.has("x", &options()));
        assert!(h.cache.invalidate("x", &options()));
        assert!(!h.cache.invalidate("x", &options()));

        let stats = h.cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.size), (0, 0, 0));
    }

    #[rstest]
    fn test_saves_are_debounced(mut harness: Harness) {
        for i in 0..5 {
            harness.cache.set(&format!("s{}", i), "out", &options());
            harness.clock.advance(Duration::from_millis(300));
        }
        assert_eq!(harness.store.writes.load(Ordering::SeqCst), 0);

        harness.clock.advance(Duration::from_millis(700));
        harness.cache.tick();
        assert_eq!(harness.store.writes.load(Ordering::SeqCst), 1);

        harness.cache.tick();
        assert_eq!(harness.store.writes.load(Ordering::SeqCst), 1);
        assert!(!harness.cache.has_pending_save());
    }

    #[rstest]
    fn test_snapshot_roundtrip(mut harness: Harness) {
        harness.cache.set("x", "out-x", &options());
        harness.cache.set("y", "out-y", &options());
        harness.cache.get("x", &options());
        harness.cache.flush();

        let mut restored = harness_with(CacheConfig::default(), harness.store.clone());
        assert_eq!(restored.cache.len(), 2);
        assert_eq!(restored.cache.stats().hits, 1);
        assert_eq!(restored.cache.get("y", &options()), Some("out-y".to_string()));
    }

    #[test]
    fn test_snapshot_format() {
        let store = CountingStore::default();
        let mut h = harness_with(CacheConfig::default(), store.clone());
        h.cache.set("x", "out", &options());
        h.cache.flush();

        let json = store.get(DEFAULT_STORAGE_KEY).unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["version"], 1);
        assert_eq!(value["stats"], serde_json::json!({"hits": 0, "misses": 0}));
        let entry = &value["entries"][0];
        assert_eq!(entry[0], entry[1]["hash"]);
        assert_eq!(entry[1]["output"], "out");
        assert_eq!(entry[1]["hitCount"], 0);
        assert_eq!(entry[1]["options"]["loopProtection"], false);
    }

    #[test]
    fn test_expired_entries_are_dropped_on_load() {
        let store = CountingStore::default();
        {
            let mut h = harness_with(CacheConfig::default(), store.clone());
            h.cache.set("x", "out", &options());
            h.cache.flush();
        }

        let clock = ManualClock::new(START + Duration::from_secs(25 * 60 * 60).as_millis() as u64);
        let cache = TranspileCache::new(
            CacheConfig::default(),
            Box::new(store.clone()),
            Box::new(clock),
        );
        assert!(cache.is_empty());
    }

    #[rstest]
    #[case::version_mismatch(r#"{"version": 2, "entries": [], "stats": {"hits": 5, "misses": 0}}"#)]
    #[case::corrupted("{not json")]
    #[case::wrong_shape(r#"{"version": 1, "entries": 3}"#)]
    fn test_bad_snapshot_is_discarded(#[case] payload: &str) {
        let mut store = CountingStore::default();
        store.set(DEFAULT_STORAGE_KEY, payload).unwrap();

        let h = harness_with(CacheConfig::default(), store);
        assert!(h.cache.is_empty());
        assert_eq!(h.cache.stats().hits, 0);
    }

    #[rstest]
    fn test_clear_persists_immediately(mut harness: Harness) {
        harness.cache.set("x", "out", &options());
        harness.cache.get("x", &options());
        harness.cache.clear();

        assert_eq!(harness.store.writes.load(Ordering::SeqCst), 1);
        let stats = harness.cache.stats();
        assert_eq!((stats.size, stats.hits, stats.misses), (0, 0, 0));
    }

    #[rstest]
    fn test_drop_flushes_pending_save(harness: Harness) {
        let Harness {
            mut cache, store, ..
        } = harness;
        cache.set("x", "out", &options());
        drop(cache);
        assert_eq!(store.writes.load(Ordering::SeqCst), 1);
    }

    #[rstest]
    fn test_memory_bytes(mut harness: Harness) {
        harness.cache.set("x", "abc", &options());
        let options_len = options().key().canonical_json().len();
        assert_eq!(harness.cache.stats().memory_bytes, 64 + 3 + options_len + 64);
    }

    #[test]
    fn test_periodic_cleanup() {
        let mut h = harness_with(
            CacheConfig {
                ttl: Duration::from_secs(10),
                cleanup_interval: Duration::from_secs(60),
                ..Default::default()
            },
            CountingStore::default(),
        );
        h.cache.set("x", "out", &options());
        h.clock.advance(Duration::from_secs(61));
        h.cache.tick();
        assert!(h.cache.is_empty());
    }
}
