use std::iter::Peekable;

use super::{
    LogLevel, Pass, PassContext,
    capture::{self, chain_root, is_sink_call, sink_call},
};
use crate::ast::{
    Ident, Program,
    node::{Comment, Expr, ExprKind, Stmt, StmtKind},
};

const TIMER_FUNCTIONS: [&str; 2] = ["setTimeout", "setInterval"];

/// Captures the value of top-level expression statements.
#[derive(Debug, Default)]
pub struct StrayExpression;

impl Pass for StrayExpression {
    fn name(&self) -> &'static str {
        "StrayExpression"
    }

    fn run(&mut self, program: &mut Program, ctx: &mut PassContext) {
        let body = std::mem::take(&mut program.body);
        let mut stmts = body.into_iter().peekable();
        let mut captured = 0;
        let mut in_prologue = true;

        while let Some(stmt) = stmts.next() {
            in_prologue &= is_directive(&stmt);

            match stmt {
                stmt if in_prologue => program.body.push(stmt),
                Stmt {
                    kind: StmtKind::Expr(expr),
                    leading_comments,
                    trailing_comments,
                    ..
                } if is_capturable(&expr, ctx) => {
                    let line = expr.line();
                    let mut replacement = capture::capture(expr, line, ctx, true);
                    attach_comments(&mut replacement, leading_comments, trailing_comments);
                    program.body.extend(replacement);
                    captured += 1;
                }
                stmt if ctx.verbose() && matches!(stmt.kind, StmtKind::Var(_)) => {
                    let (line, range) = (stmt.line(), stmt.range);
                    let names = declared_names(&stmt, ctx);
                    program.body.push(stmt);

                    for name in names {
                        if next_captures(&mut stmts, &name, &ctx.instrumentation.sink) {
                            continue;
                        }
                        program.body.push(Stmt::expr(sink_call(
                            &ctx.instrumentation.sink,
                            line,
                            vec![Expr::ident(&name, range)],
                            range,
                        )));
                        captured += 1;
                    }
                }
                stmt => program.body.push(stmt),
            }
        }

        if ctx.log_enabled(LogLevel::Info) {
            tracing::info!(count = captured, "captured top-level expressions");
        }
    }
}

/// A string literal statement such as `"use strict"`. Only the run of these
/// at the start of the program forms the directive prologue.
fn is_directive(stmt: &Stmt) -> bool {
    matches!(&stmt.kind, StmtKind::Expr(expr) if expr.is_string_literal())
}

/// Whether a top-level expression statement should report its value.
pub fn is_capturable(expr: &Expr, ctx: &PassContext) -> bool {
    let sink = ctx.instrumentation.sink.as_str();

    match &expr.kind {
        ExprKind::Assign { .. } => ctx.verbose(),
        ExprKind::Call { callee, .. } => {
            !(is_sink_call(expr, sink)
                || callee.is_member_of("console")
                || TIMER_FUNCTIONS.iter().any(|name| expr.is_call_to(name))
                || chain_root(expr)
                    .as_ident()
                    .is_some_and(|root| ctx.names.is_generated(root)))
        }
        _ => !is_sink_call(expr, sink),
    }
}

/// Simple (non-destructured) names declared by a variable statement.
fn declared_names(stmt: &Stmt, ctx: &PassContext) -> Vec<Ident> {
    match &stmt.kind {
        StmtKind::Var(decl) => decl
            .declarators
            .iter()
            .filter_map(|declarator| declarator.target.as_ident())
            .filter(|name| !ctx.names.is_generated(name))
            .cloned()
            .collect(),
        _ => Vec::new(),
    }
}

/// Whether the upcoming statement already reports `name`, e.g. after a
/// marker comment on the declaration.
fn next_captures<I: Iterator<Item = Stmt>>(stmts: &mut Peekable<I>, name: &Ident, sink: &str) -> bool {
    match stmts.peek().map(|stmt| &stmt.kind) {
        Some(StmtKind::Expr(expr)) if expr.is_call_to(sink) => match &expr.kind {
            ExprKind::Call { args, .. } => args
                .last()
                .and_then(|arg| arg.as_ident())
                .is_some_and(|arg| arg == name),
            _ => false,
        },
        _ => false,
    }
}

/// Moves the comments of a replaced statement onto its replacement.
pub(crate) fn attach_comments(stmts: &mut [Stmt], leading: Vec<Comment>, trailing: Vec<Comment>) {
    if let Some(first) = stmts.first_mut() {
        first.leading_comments = leading;
    }
    if let Some(last) = stmts.last_mut() {
        last.trailing_comments = trailing;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ast,
        transform::{ConsoleBridge, Instrumentation, NameGenerator, TransformOptions},
    };
    use rstest::rstest;

    fn run_with(code: &str, options: TransformOptions) -> String {
        let mut program = ast::parse(code).unwrap();
        let names = NameGenerator::from_program(&mut program);
        let mut ctx = PassContext::new(options, Instrumentation::default(), names);
        ConsoleBridge.run(&mut program, &mut ctx);
        StrayExpression.run(&mut program, &mut ctx);
        ast::print(&program)
    }

    fn run(code: &str) -> String {
        run_with(code, TransformOptions::default())
    }

    #[rstest]
    #[case::binary("5 + 3", "__livejs_debug(1, 5 + 3);\n")]
    #[case::identifier("\nx", "__livejs_debug(2, x);\n")]
    #[case::this_rewritten("globalThis", "__livejs_debug(1, globalThis);\n")]
    #[case::call("f()", "__livejs_debug(1, f());\n")]
    #[case::await_expr("await p", "__livejs_debug(1, await p);\n")]
    #[case::fetch("fetch(u)", "__livejs_debug(1, await fetch(u));\n")]
    #[case::promise_call("Promise.resolve(1)", "__livejs_debug(1, await Promise.resolve(1));\n")]
    #[case::use_strict("\"use strict\"", "\"use strict\";\n")]
    #[case::prologue("\"use strict\"\n'use asm'\n1", "\"use strict\";\n\"use asm\";\n__livejs_debug(3, 1);\n")]
    #[case::string_after_prologue("1\n\"hello\"", "__livejs_debug(1, 1);\n__livejs_debug(2, \"hello\");\n")]
    #[case::string_after_declaration("let x\n\"hello\"", "let x;\n__livejs_debug(2, \"hello\");\n")]
    #[case::console("console.log(1)", "__livejs_debug(1, 1);\n")]
    #[case::timeout("setTimeout(f, 10)", "setTimeout(f, 10);\n")]
    #[case::interval("setInterval(f, 10)", "setInterval(f, 10);\n")]
    #[case::assignment("x = 1", "x = 1;\n")]
    #[case::compound_assignment("x += 1", "x += 1;\n")]
    #[case::declaration("let x = 1", "let x = 1;\n")]
    #[case::in_function("function f() { 5 + 3 }", "function f() {\n  5 + 3;\n}\n")]
    #[case::in_block("{ 5 + 3 }", "{\n  5 + 3;\n}\n")]
    #[case::already_wrapped("__livejs_debug(1, x)", "__livejs_debug(1, x);\n")]
    fn test_capture(#[case] code: &str, #[case] expected: &str) {
        assert_eq!(run(code), expected);
    }

    #[test]
    fn test_chain_ending_in_console_captures_root() {
        assert_eq!(
            run("fetch(u).then((r) => r.json()).then((d) => console.log(d))"),
            concat!(
                "const _promiseRoot = fetch(u);\n",
                "_promiseRoot.then((r) => r.json()).then((d) => __livejs_debug(1, d));\n",
                "__livejs_debug(1, await _promiseRoot);\n",
            )
        );
    }

    #[test]
    fn test_comments_are_kept() {
        assert_eq!(run("// sum\n1 + 1 // two"), "// sum\n__livejs_debug(2, 1 + 1); // two\n");
    }

    #[test]
    fn test_verbose_captures_assignments_and_declarations() {
        let options = TransformOptions {
            internal_log_level: LogLevel::Debug,
            ..Default::default()
        };
        assert_eq!(
            run_with("x = 1\nlet a = 1, { b } = o, c", options),
            concat!(
                "__livejs_debug(1, x = 1);\n",
                "let a = 1, { b } = o, c;\n",
                "__livejs_debug(2, a);\n",
                "__livejs_debug(2, c);\n",
            )
        );
    }

    #[test]
    fn test_verbose_does_not_repeat_existing_capture() {
        let options = TransformOptions {
            internal_log_level: LogLevel::Info,
            ..Default::default()
        };
        assert_eq!(
            run_with("let a = 1\n__livejs_debug(1, a)", options),
            "let a = 1;\n__livejs_debug(1, a);\n"
        );
    }
}
