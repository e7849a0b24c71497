use std::{
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::JoinHandle,
};

use crossbeam_channel::Receiver;

use crate::{
    ast,
    bridge::{self, ExecutionResult, RunOptions, RunOutcome, RunState},
    cache::{CacheConfig, CacheStats, FileStore, ManualClock, MemoryStore, SystemClock, TranspileCache},
    error::Error,
    eval::Interpreter,
    transform::{Instrumentation, Pipeline, TransformOptions},
};

/// Deep recursion in user code needs more than the default thread stack.
pub const WORKER_STACK_SIZE: usize = 16 * 1024 * 1024;

/// A cooperative cancellation flag, read by the program through the
/// cancellation predicate. Clones share the flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// A run executing on a worker thread.
#[derive(Debug)]
pub struct RunHandle {
    results: Receiver<ExecutionResult>,
    token: CancellationToken,
    worker: JoinHandle<RunOutcome>,
}

impl RunHandle {
    /// Results in the order the program produced them. The channel closes
    /// when the run ends.
    pub fn results(&self) -> &Receiver<ExecutionResult> {
        &self.results
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Waits for the run to end. Results not yet received stay readable
    /// from [`RunHandle::results`] until the handle is dropped.
    pub fn join(self) -> (RunOutcome, Vec<ExecutionResult>) {
        let outcome = self.worker.join().unwrap_or_else(|_| {
            tracing::error!("run worker panicked");
            RunOutcome::Failed
        });
        (outcome, self.results.try_iter().collect())
    }
}

/// Transforms and runs scripts. Owns the transpile cache and the
/// cancellation token shared with running programs.
#[derive(Debug)]
pub struct Engine {
    cache: TranspileCache,
    host: Interpreter,
    token: CancellationToken,
    state: RunState,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(TranspileCache::in_memory(CacheConfig::default()))
    }
}

impl Engine {
    pub fn new(cache: TranspileCache) -> Self {
        Self {
            cache,
            host: Interpreter::default(),
            token: CancellationToken::new(),
            state: RunState::Idle,
        }
    }

    /// An engine whose cache persists under `dir`.
    pub fn persistent(config: CacheConfig, dir: impl Into<PathBuf>) -> Self {
        Self::new(TranspileCache::new(
            config,
            Box::new(FileStore::new(dir)),
            Box::new(SystemClock),
        ))
    }

    /// An engine with a private in-memory cache and a stopped clock.
    pub fn isolated() -> Self {
        Self::new(TranspileCache::new(
            CacheConfig::default(),
            Box::new(MemoryStore::new()),
            Box::new(ManualClock::new(0)),
        ))
    }

    pub fn with_instrumentation(mut self, instrumentation: Instrumentation) -> Self {
        self.host.instrumentation = instrumentation;
        self
    }

    pub fn instrumentation(&self) -> &Instrumentation {
        &self.host.instrumentation
    }

    pub fn cache(&self) -> &TranspileCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut TranspileCache {
        &mut self.cache
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Instruments `source`, reusing a cached result when one exists.
    #[allow(clippy::result_large_err)]
    pub fn transform(&mut self, source: &str, options: &TransformOptions) -> Result<String, Error> {
        if let Some(output) = self.cache.get(source, options) {
            return Ok(output);
        }

        let mut program = ast::parse(source).map_err(|cause| Error::from_error(source, cause))?;
        Pipeline::with_instrumentation(options.clone(), self.host.instrumentation.clone())
            .run(&mut program);
        let output = ast::print(&program);

        self.cache.set(source, &output, options);
        Ok(output)
    }

    /// Runs already instrumented source, calling `on_result` for every
    /// result as it is produced.
    pub fn run(
        &mut self,
        instrumented: &str,
        options: RunOptions,
        mut on_result: impl FnMut(ExecutionResult),
    ) -> RunOutcome {
        self.advance(RunState::Idle);
        self.execute(instrumented, options, &mut on_result)
    }

    /// Transforms and runs `source`. A source that does not parse yields a
    /// single error result.
    pub fn evaluate(
        &mut self,
        source: &str,
        transform_options: &TransformOptions,
        run_options: RunOptions,
        mut on_result: impl FnMut(ExecutionResult),
    ) -> RunOutcome {
        self.advance(RunState::Idle);
        self.advance(RunState::Transforming);

        match self.transform(source, transform_options) {
            Ok(instrumented) => self.execute(&instrumented, run_options, &mut on_result),
            Err(err) => {
                tracing::debug!(error = %err, "transform failed");
                on_result(ExecutionResult::error(err.message()));
                self.advance(RunState::Failed);
                RunOutcome::Failed
            }
        }
    }

    /// Collects the results of [`Engine::evaluate`].
    pub fn evaluate_to_vec(
        &mut self,
        source: &str,
        transform_options: &TransformOptions,
        run_options: RunOptions,
    ) -> (RunOutcome, Vec<ExecutionResult>) {
        let mut results = Vec::new();
        let outcome = self.evaluate(source, transform_options, run_options, |result| {
            results.push(result)
        });
        (outcome, results)
    }

    /// Runs already instrumented source on a worker thread. The engine's
    /// token cancels it.
    pub fn spawn(&self, instrumented: impl Into<String>, options: RunOptions) -> std::io::Result<RunHandle> {
        let (sender, results) = crossbeam_channel::unbounded();
        let source = instrumented.into();
        let mut host = self.host.clone();
        let token = self.token.clone();
        token.reset();

        let worker_token = token.clone();
        let worker = std::thread::Builder::new()
            .name("livejs-run".to_string())
            .stack_size(WORKER_STACK_SIZE)
            .spawn(move || {
                bridge::execute(
                    &mut host,
                    &source,
                    options,
                    &|| worker_token.is_cancelled(),
                    &mut |result| {
                        // The receiver may be gone if the caller stopped listening.
                        let _ = sender.send(result);
                    },
                )
            })?;

        Ok(RunHandle {
            results,
            token,
            worker,
        })
    }

    /// Asks the running program to stop at its next cancellation check.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Cancels any running program and saves the cache.
    pub fn dispose(&mut self) {
        self.token.cancel();
        self.cache.dispose();
    }

    pub const fn version() -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    fn execute(
        &mut self,
        instrumented: &str,
        options: RunOptions,
        on_result: &mut dyn FnMut(ExecutionResult),
    ) -> RunOutcome {
        self.advance(RunState::Executing);
        self.token.reset();
        self.cache.tick();

        let (sender, receiver) = crossbeam_channel::unbounded();
        let host = self.host.clone();
        let token = self.token.clone();

        let outcome = std::thread::scope(|scope| {
            let worker = std::thread::Builder::new()
                .name("livejs-run".to_string())
                .stack_size(WORKER_STACK_SIZE)
                .spawn_scoped(scope, move || {
                    let mut host = host;
                    bridge::execute(
                        &mut host,
                        instrumented,
                        options,
                        &|| token.is_cancelled(),
                        &mut |result| {
                            let _ = sender.send(result);
                        },
                    )
                });

            let worker = match worker {
                Ok(worker) => worker,
                Err(err) => {
                    on_result(ExecutionResult::error(format!("failed to start worker: {}", err)));
                    return RunOutcome::Failed;
                }
            };

            // Ends once the worker drops its sender.
            for result in receiver.iter() {
                on_result(result);
            }

            worker.join().unwrap_or_else(|_| {
                tracing::error!("run worker panicked");
                on_result(ExecutionResult::error("internal error: the run worker panicked"));
                RunOutcome::Failed
            })
        });

        self.advance(outcome.into());
        outcome
    }

    fn advance(&mut self, next: RunState) {
        if next == RunState::Idle && !self.state.is_finished() {
            self.state = RunState::Idle;
            return;
        }

        match self.state.transition(next) {
            Ok(state) => self.state = state,
            Err(err) => {
                tracing::error!(error = %err, "invalid run state transition");
                self.state = next;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::ResultKind;
    use rstest::rstest;

    fn contents(results: &[ExecutionResult]) -> Vec<String> {
        results
            .iter()
            .map(|result| result.element.plain_text())
            .collect()
    }

    #[test]
    fn test_engine_default() {
        let engine = Engine::default();
        assert_eq!(engine.state(), RunState::Idle);
        assert_eq!(engine.instrumentation(), &Instrumentation::default());
    }

    #[test]
    fn test_transform_is_cached() {
        let mut engine = Engine::isolated();
        let options = TransformOptions::default();

        let first = engine.transform("5 + 3", &options).unwrap();
        let second = engine.transform("5 + 3", &options).unwrap();

        assert_eq!(first, second);
        assert_eq!(first, "__livejs_debug(1, 5 + 3);\n");
        assert_eq!(engine.cache().entry("5 + 3", &options).unwrap().hit_count, 1);
        let stats = engine.cache_stats();
        assert_eq!((stats.size, stats.hits, stats.misses), (1, 1, 1));
    }

    #[test]
    fn test_transform_failure_is_not_cached() {
        let mut engine = Engine::isolated();
        assert!(engine.transform("let = ;", &TransformOptions::default()).is_err());
        assert_eq!(engine.cache_stats().size, 0);
    }

    #[rstest]
    #[case::expression("5 + 3", vec!["8"])]
    #[case::inside_function("function f() { 5 + 3 }\nf()", vec![])]
    #[case::undefined("undefined", vec![])]
    #[case::console("console.log(\"a\", \"b\")", vec!["[\n  \"a\",\n  \"b\"\n]"])]
    #[case::promise("Promise.resolve(42)", vec!["42"])]
    fn test_evaluate(#[case] source: &str, #[case] expected: Vec<&str>) {
        let mut engine = Engine::isolated();
        let (outcome, results) =
            engine.evaluate_to_vec(source, &TransformOptions::default(), RunOptions::default());

        assert_eq!(outcome, RunOutcome::Completed);
        assert_eq!(contents(&results), expected);
        assert_eq!(engine.state(), RunState::Completed);
    }

    #[test]
    fn test_evaluate_reports_line_numbers() {
        let mut engine = Engine::isolated();
        let (_, results) = engine.evaluate_to_vec(
            "const x = 2\n\nx * 21",
            &TransformOptions::default(),
            RunOptions::default(),
        );

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].line_number, Some(3));
        assert_eq!(results[0].kind, ResultKind::Execution);
    }

    #[test]
    fn test_evaluate_parse_failure() {
        let mut engine = Engine::isolated();
        let (outcome, results) =
            engine.evaluate_to_vec("let = ;", &TransformOptions::default(), RunOptions::default());

        assert_eq!(outcome, RunOutcome::Failed);
        assert_eq!(results.len(), 1);
        assert!(results[0].is_error());
        assert!(results[0].element.plain_text().starts_with("SyntaxError"));
        assert_eq!(engine.state(), RunState::Failed);
    }

    #[test]
    fn test_evaluate_runaway_loop() {
        let mut engine = Engine::isolated();
        let options = TransformOptions {
            loop_protection: true,
            ..Default::default()
        };
        let (outcome, results) =
            engine.evaluate_to_vec("while (true) {}", &options, RunOptions::default());

        assert_eq!(outcome, RunOutcome::Failed);
        assert_eq!(contents(&results), vec!["Loop limit exceeded"]);
    }

    #[test]
    fn test_error_stops_further_results() {
        let mut engine = Engine::isolated();
        let (outcome, results) = engine.evaluate_to_vec(
            "1\nnull.x\n2",
            &TransformOptions::default(),
            RunOptions::default(),
        );

        assert_eq!(outcome, RunOutcome::Failed);
        assert_eq!(
            contents(&results),
            vec!["1", "TypeError: Cannot read properties of null (reading 'x')"]
        );
    }

    #[test]
    fn test_run_is_cancelled_by_token() {
        let mut engine = Engine::isolated();
        let options = TransformOptions {
            loop_protection: true,
            ..Default::default()
        };
        let instrumented = engine
            .transform("let i = 0\nwhile (true) { i++ }", &options)
            .unwrap();

        let handle = engine.spawn(instrumented, RunOptions::default()).unwrap();
        handle.cancel();
        let (outcome, results) = handle.join();

        // The loop limit may trip before the worker sees the flag.
        match outcome {
            RunOutcome::Cancelled => assert_eq!(contents(&results), vec!["Execution cancelled"]),
            RunOutcome::Failed => assert_eq!(contents(&results), vec!["Loop limit exceeded"]),
            RunOutcome::Completed => panic!("runaway loop completed"),
        }
    }

    #[test]
    fn test_spawn_streams_results() {
        let mut engine = Engine::isolated();
        let instrumented = engine
            .transform("1\n2\n3", &TransformOptions::default())
            .unwrap();

        let handle = engine.spawn(instrumented, RunOptions::default()).unwrap();
        let received = handle.results().iter().collect::<Vec<_>>();
        let (outcome, rest) = handle.join();

        assert_eq!(outcome, RunOutcome::Completed);
        assert!(rest.is_empty());
        assert_eq!(contents(&received), vec!["1", "2", "3"]);
    }

    #[test]
    fn test_dispose_saves_pending_snapshot() {
        let mut engine = Engine::isolated();
        engine
            .transform("1", &TransformOptions::default())
            .unwrap();
        assert!(engine.cache().has_pending_save());

        engine.dispose();

        assert!(!engine.cache().has_pending_save());
        assert!(engine.token().is_cancelled());
    }
}
