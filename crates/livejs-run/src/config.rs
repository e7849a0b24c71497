use std::{path::PathBuf, str::FromStr, time::Duration};

use livejs_lang::{CacheConfig, cache::FileStore};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_LOG_FILTER: &str = "warn";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(format!("invalid log format `{}`", s)),
        }
    }
}

/// Settings read from the environment.
///
/// | Variable                   | Default           |
/// |----------------------------|-------------------|
/// | `LIVEJS_LOG_LEVEL`         | `RUST_LOG`, then `warn` |
/// | `LIVEJS_LOG_FORMAT`        | `text`            |
/// | `LIVEJS_CACHE_DIR`         | user cache dir    |
/// | `LIVEJS_CACHE_MAX_SIZE`    | 100               |
/// | `LIVEJS_CACHE_TTL_SECONDS` | 86400             |
#[derive(Debug, Clone)]
pub struct Config {
    pub log_filter: String,
    pub log_format: LogFormat,
    pub cache_dir: Option<PathBuf>,
    pub cache: CacheConfig,
    /// Problems found while reading the environment, reported once logging
    /// is up.
    pub warnings: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            log_format: LogFormat::default(),
            cache_dir: FileStore::default_dir(),
            cache: CacheConfig::default(),
            warnings: Vec::new(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(filter) = var("LIVEJS_LOG_LEVEL").or_else(|| var("RUST_LOG")) {
            match EnvFilter::try_new(&filter) {
                Ok(_) => config.log_filter = filter,
                Err(err) => config
                    .warnings
                    .push(format!("ignoring log level `{}`: {}", filter, err)),
            }
        }

        if let Some(format) = var("LIVEJS_LOG_FORMAT") {
            match format.parse() {
                Ok(format) => config.log_format = format,
                Err(err) => config.warnings.push(format!("ignoring LIVEJS_LOG_FORMAT: {}", err)),
            }
        }

        if let Some(dir) = var("LIVEJS_CACHE_DIR") {
            config.cache_dir = Some(PathBuf::from(dir));
        }

        if let Some(size) = var("LIVEJS_CACHE_MAX_SIZE") {
            match size.trim().parse::<usize>() {
                Ok(size) if size > 0 => config.cache.max_size = size,
                _ => config
                    .warnings
                    .push(format!("ignoring LIVEJS_CACHE_MAX_SIZE `{}`: expected a positive integer", size)),
            }
        }

        if let Some(ttl) = var("LIVEJS_CACHE_TTL_SECONDS") {
            match ttl.trim().parse::<u64>() {
                Ok(seconds) if seconds > 0 => config.cache.ttl = Duration::from_secs(seconds),
                _ => config
                    .warnings
                    .push(format!("ignoring LIVEJS_CACHE_TTL_SECONDS `{}`: expected a positive integer", ttl)),
            }
        }

        config
    }

    pub fn report_warnings(&self) {
        for warning in &self.warnings {
            tracing::warn!("{}", warning);
        }
    }
}

/// Installs the global subscriber. Logs go to stderr so results on stdout
/// stay clean.
pub fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let formatter = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true);

    let installed = match config.log_format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(formatter)
            .with(filter)
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(formatter.json())
            .with(filter)
            .try_init(),
    };

    if let Err(err) = installed {
        eprintln!("Warning: logging is unavailable: {}", err);
    }
}
