//! Property-based tests for the transform pipeline.
use std::collections::HashSet;

use livejs_lang::{Engine, TransformOptions, ast, transform};
use proptest::prelude::*;

mod strategies {
    use super::*;

    /// Names for new bindings.
    pub fn binding() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("x".to_string()),
            "[a-z][a-z0-9]{0,6}".prop_filter("Avoid reserved keywords", |s| {
                !matches!(
                    s.as_str(),
                    "do" | "if" | "in" | "of" | "for" | "let" | "new" | "try" | "var" | "else"
                        | "null" | "this" | "true" | "void" | "async" | "await" | "break"
                        | "catch" | "class" | "const" | "false" | "super" | "throw" | "while"
                        | "delete" | "return" | "typeof" | "extends" | "finally" | "continue"
                        | "function" | "instanceof"
                )
            }),
        ]
    }

    /// Referenced names, including ones that look like generated counters.
    pub fn ident() -> impl Strategy<Value = String> {
        prop_oneof![
            4 => binding(),
            1 => Just("_loopCounter".to_string()),
            1 => Just("_loopCounter2".to_string()),
        ]
    }

    pub fn expr() -> impl Strategy<Value = String> {
        prop_oneof![
            (0u32..1000).prop_map(|n| n.to_string()),
            ident(),
            (ident(), 0u32..100).prop_map(|(name, n)| format!("{} + {}", name, n)),
            ident().prop_map(|name| format!("console.log({})", name)),
        ]
    }

    /// Statements with arbitrarily nested and sibling loops.
    pub fn stmt() -> impl Strategy<Value = String> {
        let leaf = prop_oneof![
            expr().prop_map(|expr| format!("{};", expr)),
            (binding(), expr()).prop_map(|(name, expr)| format!("let {} = {};", name, expr)),
        ];

        leaf.prop_recursive(4, 24, 4, |inner| {
            let body = prop::collection::vec(inner, 0..4).prop_map(|stmts| stmts.join("\n"));
            prop_oneof![
                (expr(), body.clone()).prop_map(|(cond, body)| format!("while ({}) {{\n{}\n}}", cond, body)),
                (binding(), body.clone()).prop_map(|(name, body)| {
                    format!("for (let {0} = 0; {0} < 3; {0}++) {{\n{1}\n}}", name, body)
                }),
                (binding(), ident(), body.clone()).prop_map(|(name, list, body)| {
                    format!("for (const {} of {}) {{\n{}\n}}", name, list, body)
                }),
                (expr(), body.clone()).prop_map(|(cond, body)| format!("do {{\n{}\n}} while ({});", body, cond)),
                body.clone().prop_map(|body| format!("function f() {{\n{}\n}}", body)),
                body.prop_map(|body| format!("{{\n{}\n}}", body)),
            ]
        })
    }

    pub fn program() -> impl Strategy<Value = String> {
        prop::collection::vec(stmt(), 1..5).prop_map(|stmts| stmts.join("\n"))
    }

    pub fn options() -> impl Strategy<Value = TransformOptions> {
        (any::<bool>(), any::<bool>(), any::<bool>()).prop_map(
            |(loop_protection, magic_comments, show_top_level_results)| TransformOptions {
                loop_protection,
                magic_comments,
                show_top_level_results,
                ..Default::default()
            },
        )
    }
}

fn guarded() -> TransformOptions {
    TransformOptions {
        loop_protection: true,
        ..Default::default()
    }
}

/// Names of counters declared by the loop guard.
fn counter_declarations(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.trim_start().strip_prefix("let _loopCounter"))
        .filter_map(|rest| rest.split_once(" = 0;"))
        .map(|(suffix, _)| format!("_loopCounter{}", suffix))
        .collect()
}

fn identifiers(source: &str) -> HashSet<&str> {
    source
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|word| !word.is_empty())
        .collect()
}

fn loop_count(source: &str) -> usize {
    source.matches("while (").count() - source.matches("} while (").count()
        + source.matches("for (").count()
        + source.matches("do {").count()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn test_loop_counters_are_unique(source in strategies::program()) {
        let output = transform(&source, &guarded()).unwrap();
        let counters = counter_declarations(&output);
        let unique = counters.iter().collect::<HashSet<_>>();

        prop_assert_eq!(counters.len(), loop_count(&source));
        prop_assert_eq!(unique.len(), counters.len());
        let existing = identifiers(&source);
        for counter in &counters {
            prop_assert!(!existing.contains(counter.as_str()), "{} collides with a user name", counter);
        }
    }

    #[test]
    fn test_transform_is_deterministic(source in strategies::program(), options in strategies::options()) {
        let first = transform(&source, &options).unwrap();
        let second = transform(&source, &options).unwrap();
        prop_assert_eq!(&first, &second);

        let mut engine = Engine::isolated();
        let fresh = engine.transform(&source, &options).unwrap();
        let cached = engine.transform(&source, &options).unwrap();
        prop_assert_eq!(&fresh, &first);
        prop_assert_eq!(&cached, &first);
    }

    #[test]
    fn test_output_parses(source in strategies::program(), options in strategies::options()) {
        let output = transform(&source, &options).unwrap();
        prop_assert!(ast::parse(&output).is_ok(), "unparsable output:\n{}", output);
    }
}
