use super::{LogLevel, Pass, PassContext, into_block, names::LOOP_COUNTER};
use crate::{
    ast::{
        Block, Ident, Program,
        node::{
            BinaryOp, Declarator, Expr, ExprKind, LogicalOp, Pattern, Stmt, StmtKind, UpdateOp,
            VarDecl, VarKind,
        },
        visit::{self, VisitMut},
    },
    range::Range,
};

pub const MAX_ITERATIONS: u32 = 10_000;
pub const CANCEL_CHECK_INTERVAL: u32 = 100;
pub const LOOP_LIMIT_MESSAGE: &str = "Loop limit exceeded";
pub const CANCELLED_MESSAGE: &str = "Execution cancelled";

/// Bounds every loop with an iteration ceiling and a cancellation checkpoint.
///
/// ```text
/// let _loopCounter = 0;
/// while (cond) {
///   if (++_loopCounter > 10000) throw new Error("Loop limit exceeded");
///   if (_loopCounter % 100 === 0 && __livejs_cancelled()) throw new Error("Execution cancelled");
///   ...
/// }
/// ```
#[derive(Debug, Default)]
pub struct LoopGuard;

impl Pass for LoopGuard {
    fn name(&self) -> &'static str {
        "LoopGuard"
    }

    fn run(&mut self, program: &mut Program, ctx: &mut PassContext) {
        let mut guard = Guard { ctx, guarded: 0 };
        guard.visit_program(program);

        if guard.ctx.log_enabled(LogLevel::Info) {
            tracing::info!(count = guard.guarded, "guarded loops");
        }
    }
}

struct Guard<'a> {
    ctx: &'a mut PassContext,
    guarded: usize,
}

impl Guard<'_> {
    /// Instruments the loop at `stmt` (looking through labels) and returns the
    /// counter declaration to insert before it.
    fn guard(&mut self, stmt: &mut Stmt) -> Option<Stmt> {
        let range = stmt.range;
        let block = match &mut loop_body(stmt)?.kind {
            StmtKind::Block(block) => block,
            _ => return None,
        };
        if self.is_guarded(block) {
            return None;
        }

        let counter = self.ctx.names.fresh(LOOP_COUNTER);
        let checks = [
            limit_check(&counter, range),
            cancel_check(&counter, &self.ctx.instrumentation.cancel, range),
        ];
        block.splice(0..0, checks);
        self.guarded += 1;

        if self.ctx.log_enabled(LogLevel::Debug) {
            tracing::debug!(line = range.start.line, %counter, "guarded loop");
        }

        Some(Stmt::new(
            StmtKind::Var(VarDecl {
                kind: VarKind::Let,
                declarators: vec![Declarator {
                    target: Pattern::Ident(counter),
                    init: Some(Expr::number(0.0, range)),
                }],
            }),
            range,
        ))
    }

    /// The body already starts with `if (++<generated> > ...)`.
    fn is_guarded(&self, block: &Block) -> bool {
        let Some(StmtKind::If { test, .. }) = block.first().map(|stmt| &stmt.kind) else {
            return false;
        };

        match &test.kind {
            ExprKind::Binary {
                op: BinaryOp::Gt,
                left,
                ..
            } => match &left.kind {
                ExprKind::Update {
                    op: UpdateOp::Increment,
                    prefix: true,
                    arg,
                } => arg
                    .as_ident()
                    .is_some_and(|name| self.ctx.names.is_generated(name)),
                _ => false,
            },
            _ => false,
        }
    }
}

impl VisitMut for Guard<'_> {
    fn visit_block(&mut self, block: &mut Block) {
        let stmts = std::mem::take(block);
        block.reserve(stmts.len());

        for mut stmt in stmts {
            self.visit_stmt(&mut stmt);
            if let Some(declaration) = self.guard(&mut stmt) {
                block.push(declaration);
            }
            block.push(stmt);
        }
    }

    fn visit_stmt(&mut self, stmt: &mut Stmt) {
        match &mut stmt.kind {
            StmtKind::For { body, .. }
            | StmtKind::ForIn { body, .. }
            | StmtKind::ForOf { body, .. }
            | StmtKind::While { body, .. }
            | StmtKind::DoWhile { body, .. } => into_block(body),
            StmtKind::If {
                consequent,
                alternate,
                ..
            } => {
                // A loop in a branch needs a block to hold its counter.
                if is_loop(consequent) {
                    into_block(consequent);
                }
                if let Some(alternate) = alternate
                    && is_loop(alternate)
                {
                    into_block(alternate);
                }
            }
            _ => {}
        }

        visit::walk_stmt(self, stmt);
    }
}

/// The body of the loop at `stmt`, looking through labels.
fn loop_body(stmt: &mut Stmt) -> Option<&mut Box<Stmt>> {
    match &mut stmt.kind {
        StmtKind::Labeled { body, .. } => loop_body(body),
        StmtKind::For { body, .. }
        | StmtKind::ForIn { body, .. }
        | StmtKind::ForOf { body, .. }
        | StmtKind::While { body, .. }
        | StmtKind::DoWhile { body, .. } => Some(body),
        _ => None,
    }
}

fn is_loop(stmt: &Stmt) -> bool {
    match &stmt.kind {
        StmtKind::Labeled { body, .. } => is_loop(body),
        _ => stmt.is_loop(),
    }
}

fn throw_error(message: &str, range: Range) -> Stmt {
    Stmt::new(
        StmtKind::Throw(Expr::new(
            ExprKind::New {
                callee: Box::new(Expr::ident("Error", range)),
                args: vec![Expr::string(message, range)],
            },
            range,
        )),
        range,
    )
}

/// `if (++counter > 10000) throw new Error("Loop limit exceeded");`
fn limit_check(counter: &Ident, range: Range) -> Stmt {
    let increment = Expr::new(
        ExprKind::Update {
            op: UpdateOp::Increment,
            prefix: true,
            arg: Box::new(Expr::ident(counter, range)),
        },
        range,
    );

    Stmt::new(
        StmtKind::If {
            test: Expr::binary(
                BinaryOp::Gt,
                increment,
                Expr::number(f64::from(MAX_ITERATIONS), range),
                range,
            ),
            consequent: Box::new(throw_error(LOOP_LIMIT_MESSAGE, range)),
            alternate: None,
        },
        range,
    )
}

/// `if (counter % 100 === 0 && cancelled()) throw new Error("Execution cancelled");`
fn cancel_check(counter: &Ident, cancel: &str, range: Range) -> Stmt {
    let checkpoint = Expr::binary(
        BinaryOp::StrictEq,
        Expr::binary(
            BinaryOp::Mod,
            Expr::ident(counter, range),
            Expr::number(f64::from(CANCEL_CHECK_INTERVAL), range),
            range,
        ),
        Expr::number(0.0, range),
        range,
    );

    Stmt::new(
        StmtKind::If {
            test: Expr::logical(
                LogicalOp::And,
                checkpoint,
                Expr::call(Expr::ident(cancel, range), Vec::new(), range),
                range,
            ),
            consequent: Box::new(throw_error(CANCELLED_MESSAGE, range)),
            alternate: None,
        },
        range,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ast,
        transform::{Instrumentation, NameGenerator, TransformOptions},
    };
    use rstest::rstest;

    const LIMIT: &str = "if (++{c} > 10000)\n{i}  throw new Error(\"Loop limit exceeded\");\n";
    const CANCEL: &str =
        "if ({c} % 100 === 0 && __livejs_cancelled())\n{i}  throw new Error(\"Execution cancelled\");\n";

    fn checks(counter: &str, indent: &str) -> String {
        format!(
            "{indent}{}{indent}{}",
            LIMIT.replace("{c}", counter).replace("{i}", indent),
            CANCEL.replace("{c}", counter).replace("{i}", indent),
        )
    }

    fn run(code: &str) -> String {
        let mut program = ast::parse(code).unwrap();
        let names = NameGenerator::from_program(&mut program);
        let mut ctx = PassContext::new(
            TransformOptions::default(),
            Instrumentation::default(),
            names,
        );
        LoopGuard.run(&mut program, &mut ctx);
        ast::print(&program)
    }

    #[test]
    fn test_while() {
        assert_eq!(
            run("while (true) {}"),
            format!(
                "let _loopCounter = 0;\nwhile (true) {{\n{}}}\n",
                checks("_loopCounter", "  ")
            )
        );
    }

    #[test]
    fn test_single_statement_body_becomes_block() {
        assert_eq!(
            run("for (const x of xs) f(x)"),
            format!(
                "let _loopCounter = 0;\nfor (const x of xs) {{\n{}  f(x);\n}}\n",
                checks("_loopCounter", "  ")
            )
        );
    }

    #[test]
    fn test_do_while() {
        assert_eq!(
            run("do { i++ } while (i < 5)"),
            format!(
                "let _loopCounter = 0;\ndo {{\n{}  i++;\n}} while (i < 5);\n",
                checks("_loopCounter", "  ")
            )
        );
    }

    #[test]
    fn test_nested_and_sibling_loops_get_distinct_counters() {
        let output = run("for (;;) { while (a) {} }\nfor (k in o) {}");
        assert_eq!(
            output,
            format!(
                concat!(
                    "let _loopCounter2 = 0;\n",
                    "for (;;) {{\n{}",
                    "  let _loopCounter = 0;\n",
                    "  while (a) {{\n{}  }}\n",
                    "}}\n",
                    "let _loopCounter3 = 0;\n",
                    "for (k in o) {{\n{}}}\n",
                ),
                checks("_loopCounter2", "  "),
                checks("_loopCounter", "    "),
                checks("_loopCounter3", "  "),
            )
        );
    }

    #[test]
    fn test_labeled_loop_counter_precedes_label() {
        let output = run("outer: for (;;) { break outer }");
        assert!(output.starts_with("let _loopCounter = 0;\nouter: for (;;) {\n"));
    }

    #[test]
    fn test_loop_in_branch_gets_block() {
        let output = run("if (a) while (b) {}");
        assert!(output.starts_with("if (a) {\n  let _loopCounter = 0;\n  while (b) {\n"));
    }

    #[test]
    fn test_existing_name_is_avoided() {
        let output = run("let _loopCounter = 5\nwhile (x) {}");
        assert!(output.contains("let _loopCounter2 = 0;\nwhile (x) {\n"));
    }

    #[test]
    fn test_already_guarded_loop_is_skipped() {
        let mut program = ast::parse("while (x) {}").unwrap();
        let names = NameGenerator::from_program(&mut program);
        let mut ctx = PassContext::new(
            TransformOptions::default(),
            Instrumentation::default(),
            names,
        );
        LoopGuard.run(&mut program, &mut ctx);
        let once = ast::print(&program);
        LoopGuard.run(&mut program, &mut ctx);
        assert_eq!(ast::print(&program), once);
    }

    #[rstest]
    #[case::function("function f() { for (;;) {} }")]
    #[case::arrow("const f = () => { while (1) {} }")]
    #[case::method("class A { m() { do {} while (0) } }")]
    fn test_loops_inside_functions(#[case] code: &str) {
        let output = run(code);
        assert!(output.contains("let _loopCounter = 0;"));
        assert!(output.contains("throw new Error(\"Loop limit exceeded\");"));
    }
}
