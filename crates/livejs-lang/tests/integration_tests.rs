use std::time::Duration;

use livejs_lang::{
    CacheConfig, Color, Engine, ExecutionResult, LogLevel, RunOptions, RunOutcome,
    TransformOptions, TranspileCache,
    cache::{DEFAULT_STORAGE_KEY, FileStore, KeyValueStore, ManualClock, MemoryStore},
};
use rstest::{fixture, rstest};

#[fixture]
fn engine() -> Engine {
    Engine::isolated()
}

fn evaluate(
    engine: &mut Engine,
    source: &str,
    options: TransformOptions,
) -> (RunOutcome, Vec<ExecutionResult>) {
    engine.evaluate_to_vec(source, &options, RunOptions::default())
}

fn lines(results: &[ExecutionResult]) -> Vec<(Option<u32>, String)> {
    results
        .iter()
        .map(|result| (result.line_number, result.element.plain_text()))
        .collect()
}

#[rstest]
#[case::arithmetic("5 + 3", vec![(Some(1), "8")])]
#[case::inside_function("function add() {\n  5 + 3\n}\nadd()", vec![])]
#[case::string("\"a\" + \"b\"", vec![(Some(1), "\"ab\"")])]
#[case::directive("\"use strict\"\n1", vec![(Some(2), "1")])]
#[case::string_after_prologue("1\n\"hello\"", vec![(Some(1), "1"), (Some(2), "\"hello\"")])]
#[case::console_args("console.log(\"a\", \"b\")", vec![(Some(1), "[\n  \"a\",\n  \"b\"\n]")])]
#[case::undefined("undefined", vec![])]
#[case::assignment("let x\nx = 5", vec![])]
#[case::timer("setTimeout(() => console.log(\"later\"), 10)\n\"now\"", vec![(Some(2), "\"now\""), (Some(1), "\"later\"")])]
#[case::top_level_this("this === globalThis", vec![(Some(1), "true")])]
#[case::method_this("const o = { v: 1, get() { return this.v } }\no.get()", vec![(Some(2), "1")])]
#[case::awaited_promise("Promise.resolve(42)", vec![(Some(1), "42")])]
#[case::async_function("async function f() { return 7 }\nf()", vec![(Some(2), "7")])]
#[case::rejected_promise("const p = Promise.reject(new Error(\"nope\"))\np", vec![(Some(2), "Promise rejected: nope")])]
#[case::function_value("function square(n) { return n * n }\nsquare", vec![(Some(2), "[Function: square]")])]
#[case::error_value("new RangeError(\"out\")", vec![(Some(1), "RangeError: out")])]
#[case::object("({ a: 1, b: [true, null] })", vec![(Some(1), "{\n  \"a\": 1,\n  \"b\": [\n    true,\n    null\n  ]\n}")])]
#[case::self_reference("const o = { name: \"o\" }\no.self = o\no", vec![(Some(3), "{\n  \"name\": \"o\",\n  \"self\": {\n    \"$ref\": \"$\"\n  }\n}")])]
#[case::bigint("2n ** 70n", vec![(Some(1), "1180591620717411303424n")])]
#[case::symbol("Symbol(\"tag\")", vec![(Some(1), "Symbol(\"tag\")")])]
fn test_evaluate(
    mut engine: Engine,
    #[case] source: &str,
    #[case] expected: Vec<(Option<u32>, &str)>,
) {
    let (outcome, results) = evaluate(&mut engine, source, TransformOptions::default());

    assert_eq!(outcome, RunOutcome::Completed);
    assert_eq!(
        lines(&results),
        expected
            .into_iter()
            .map(|(line, text)| (line, text.to_string()))
            .collect::<Vec<_>>()
    );
}

#[rstest]
fn test_show_undefined(mut engine: Engine) {
    let (_, results) = engine.evaluate_to_vec(
        "undefined",
        &TransformOptions::default(),
        RunOptions {
            show_undefined: true,
        },
    );

    assert_eq!(lines(&results), vec![(Some(1), "undefined".to_string())]);
    assert_eq!(results[0].element.color, Some(Color::Gray));
}

#[rstest]
#[case::marked("const x = 4\nx //?", vec![(Some(2), "4")])]
#[case::unmarked("const x = 4\nx", vec![])]
#[case::declaration("let total = 2 * 21 //? total", vec![(Some(1), "42")])]
#[case::plain_comment("const x = 4\nx // note", vec![])]
#[case::braceless_if("const x = 5\nif (x) x //?", vec![(Some(2), "5")])]
#[case::braceless_loop("for (const v of [1, 2]) v * 10 //?", vec![(Some(1), "10"), (Some(1), "20")])]
fn test_magic_comments(
    mut engine: Engine,
    #[case] source: &str,
    #[case] expected: Vec<(Option<u32>, &str)>,
) {
    let options = TransformOptions {
        magic_comments: true,
        show_top_level_results: false,
        ..Default::default()
    };
    let (_, results) = evaluate(&mut engine, source, options);

    assert_eq!(
        lines(&results),
        expected
            .into_iter()
            .map(|(line, text)| (line, text.to_string()))
            .collect::<Vec<_>>()
    );
}

#[rstest]
fn test_verbose_logging_captures_declarations(mut engine: Engine) {
    let options = TransformOptions {
        internal_log_level: LogLevel::Debug,
        ..Default::default()
    };
    let (_, results) = evaluate(&mut engine, "let a = 1, { b } = { b: 2 }\na = 3", options);

    assert_eq!(
        lines(&results),
        vec![(Some(1), "1".to_string()), (Some(2), "3".to_string())]
    );
}

#[rstest]
fn test_chain_with_console_captures_root(mut engine: Engine) {
    let (outcome, results) = evaluate(
        &mut engine,
        "Promise.resolve(5).then((v) => console.log(v * 2))",
        TransformOptions::default(),
    );

    assert_eq!(outcome, RunOutcome::Completed);
    let mut texts = lines(&results);
    texts.sort();
    assert_eq!(
        texts,
        vec![(Some(1), "10".to_string()), (Some(1), "5".to_string())]
    );
}

#[rstest]
#[case::while_true("while (true) {}", "Loop limit exceeded")]
#[case::for_ever("for (;;) {}", "Loop limit exceeded")]
#[case::nested("for (let i = 0; i < 3; i++) { while (i < 10) {} }", "Loop limit exceeded")]
fn test_runaway_loops(mut engine: Engine, #[case] source: &str, #[case] expected: &str) {
    let options = TransformOptions {
        loop_protection: true,
        ..Default::default()
    };
    let (outcome, results) = evaluate(&mut engine, source, options);

    assert_eq!(outcome, RunOutcome::Failed);
    assert_eq!(results.len(), 1);
    assert!(results[0].is_error());
    assert_eq!(results[0].element.plain_text(), expected);
    assert_eq!(results[0].line_number, None);
}

#[rstest]
#[case::at_limit(10_000, RunOutcome::Completed)]
#[case::over_limit(10_001, RunOutcome::Failed)]
fn test_loop_limit_boundary(mut engine: Engine, #[case] iterations: u32, #[case] expected: RunOutcome) {
    let options = TransformOptions {
        loop_protection: true,
        show_top_level_results: false,
        ..Default::default()
    };
    let source = format!("let n = 0\nwhile (n < {}) n++", iterations);
    let (outcome, _) = evaluate(&mut engine, &source, options);

    assert_eq!(outcome, expected);
}

#[rstest]
fn test_at_most_one_error_result(mut engine: Engine) {
    let (outcome, results) = evaluate(
        &mut engine,
        "1\nsetTimeout(() => { throw new TypeError(\"late\") }, 5)\nsetTimeout(() => console.log(\"never\"), 10)\n2",
        TransformOptions::default(),
    );

    assert_eq!(outcome, RunOutcome::Failed);
    assert_eq!(
        lines(&results),
        vec![
            (Some(1), "1".to_string()),
            (Some(4), "2".to_string()),
            (None, "TypeError: late".to_string()),
        ]
    );
    assert_eq!(results.iter().filter(|result| result.is_error()).count(), 1);
}

#[rstest]
fn test_deeply_nested_value_is_dropped(mut engine: Engine) {
    let (outcome, results) = evaluate(
        &mut engine,
        "let a = []\nfor (let i = 0; i < 5000; i++) a = [a]\na\n\"after\"",
        TransformOptions::default(),
    );

    assert_eq!(outcome, RunOutcome::Completed);
    assert_eq!(lines(&results), vec![(Some(4), "\"after\"".to_string())]);
}

#[rstest]
fn test_parse_failure_has_no_partial_output(mut engine: Engine) {
    let (outcome, results) = evaluate(&mut engine, "1\n2 +", TransformOptions::default());

    assert_eq!(outcome, RunOutcome::Failed);
    assert_eq!(results.len(), 1);
    assert!(results[0].element.plain_text().starts_with("SyntaxError"));
}

#[rstest]
fn test_transform_is_deterministic_and_cached(mut engine: Engine) {
    let source = "let i = 0\nwhile (i < 3) { i++ }\ni";
    let options = TransformOptions::default();

    let first = engine.transform(source, &options).unwrap();
    let second = engine.transform(source, &options).unwrap();
    assert_eq!(first, second);
    assert_eq!(first, livejs_lang::transform(source, &options).unwrap());
    assert_eq!(engine.cache().entry(source, &options).unwrap().hit_count, 1);

    let guarded = TransformOptions {
        loop_protection: true,
        ..Default::default()
    };
    assert!(!engine.cache().has(source, &guarded));
    let third = engine.transform(source, &guarded).unwrap();
    assert_ne!(first, third);

    let stats = engine.cache_stats();
    assert_eq!((stats.size, stats.hits, stats.misses), (2, 1, 2));
}

#[rstest]
fn test_show_undefined_shares_cache_entry(mut engine: Engine) {
    let options = TransformOptions::default();
    let shown = TransformOptions {
        show_undefined: true,
        ..Default::default()
    };

    engine.transform("1", &options).unwrap();
    engine.transform("1", &shown).unwrap();

    assert_eq!(engine.cache_stats().hits, 1);
}

#[test]
fn test_eviction_removes_lowest_score() {
    let clock = ManualClock::new(0);
    let cache = TranspileCache::new(
        CacheConfig {
            max_size: 3,
            ..Default::default()
        },
        Box::new(MemoryStore::new()),
        Box::new(clock.clone()),
    );
    let mut engine = Engine::new(cache);
    let options = TransformOptions::default();

    engine.transform("1", &options).unwrap();
    clock.advance(Duration::from_secs(60));
    engine.transform("2", &options).unwrap();
    engine.transform("3", &options).unwrap();
    // "1" and "3" are used again, "2" is not.
    engine.transform("1", &options).unwrap();
    engine.transform("3", &options).unwrap();

    engine.transform("4", &options).unwrap();

    assert_eq!(engine.cache_stats().size, 3);
    assert!(engine.cache().has("1", &options));
    assert!(!engine.cache().has("2", &options));
    assert!(engine.cache().has("3", &options));
    assert!(engine.cache().has("4", &options));
}

#[test]
fn test_cache_persists_between_engines() {
    let dir = tempfile::tempdir().unwrap();
    let options = TransformOptions::default();

    let mut engine = Engine::persistent(CacheConfig::default(), dir.path());
    let output = engine.transform("console.log(1)", &options).unwrap();
    engine.dispose();
    drop(engine);

    let mut engine = Engine::persistent(CacheConfig::default(), dir.path());
    assert_eq!(engine.cache_stats().size, 1);
    assert_eq!(engine.transform("console.log(1)", &options).unwrap(), output);
    assert_eq!(engine.cache_stats().hits, 1);
}

#[test]
fn test_corrupt_snapshot_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = FileStore::new(dir.path());
    store.set(DEFAULT_STORAGE_KEY, "{not json").unwrap();

    let engine = Engine::persistent(CacheConfig::default(), dir.path());
    assert_eq!(engine.cache_stats().size, 0);
}
