//! Wrapping of captured expressions into debug sink calls.
//!
//! Three shapes are produced:
//!
//! - plain values: `sink(line, expr)`
//! - promise-producing expressions: `sink(line, await expr)`
//! - `.then/.catch/.finally` chains whose handlers log through the console:
//!   the root promise is hoisted so that the settled root value is captured
//!   instead of the (usually `undefined`) value of the chain.
//!
//! ```text
//! const _promiseRoot = fetch(url);
//! _promiseRoot.then((r) => __livejs_debug(1, r.status));
//! __livejs_debug(1, await _promiseRoot);
//! ```
use smol_str::SmolStr;

use super::{LogLevel, PassContext, names::PROMISE_ROOT};
use crate::{
    ast::{
        node::{Declarator, Expr, ExprKind, Pattern, Stmt, StmtKind, VarDecl, VarKind},
        visit::{self, VisitMut},
    },
    range::Range,
};

const CHAIN_METHODS: [&str; 3] = ["then", "catch", "finally"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureKind {
    Plain,
    Awaited,
    RootPromise,
}

/// `sink(...)` or `await sink(...)`.
pub fn is_sink_call(expr: &Expr, sink: &str) -> bool {
    match &expr.kind {
        ExprKind::Await(inner) => inner.is_call_to(sink),
        _ => expr.is_call_to(sink),
    }
}

pub fn sink_call(sink: &str, line: u32, args: Vec<Expr>, range: Range) -> Expr {
    let mut call_args = Vec::with_capacity(args.len() + 1);
    call_args.push(Expr::number(f64::from(line), range));
    call_args.extend(args);
    Expr::call(Expr::ident(sink, range), call_args, range)
}

/// `expr.then(...)`, `expr.catch(...)` or `expr.finally(...)`.
pub fn is_chain_call(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Call { callee, .. } => callee
            .member_name()
            .is_some_and(|name| CHAIN_METHODS.contains(&name)),
        _ => false,
    }
}

/// The expression the outermost chain call is ultimately applied to.
pub fn chain_root(expr: &Expr) -> &Expr {
    let mut current = expr;
    while is_chain_call(current) {
        match &current.kind {
            ExprKind::Call { callee, .. } => match &callee.kind {
                ExprKind::Member { object, .. } => current = object,
                _ => break,
            },
            _ => break,
        }
    }
    current
}

/// Whether evaluating `expr` yields a promise whose settled value is the
/// interesting result.
pub fn is_promise_producing(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Call { callee, .. } => {
            is_chain_call(expr) || expr.is_call_to("fetch") || callee.is_member_of("Promise")
        }
        _ => false,
    }
}

pub fn classify(expr: &mut Expr, sink: &str) -> CaptureKind {
    if !is_promise_producing(expr) {
        return CaptureKind::Plain;
    }

    if is_chain_call(expr) && chain_mentions_console(expr, sink) {
        CaptureKind::RootPromise
    } else {
        CaptureKind::Awaited
    }
}

/// Replaces `expr` with the statements capturing its value on `line`.
///
/// `allow_await` is false inside non-async functions, where promise-producing
/// expressions degrade to a plain capture.
pub fn capture(expr: Expr, line: u32, ctx: &mut PassContext, allow_await: bool) -> Vec<Stmt> {
    let sink = ctx.instrumentation.sink.clone();
    let range = expr.range;
    let mut expr = expr;

    let kind = match classify(&mut expr, &sink) {
        CaptureKind::Plain => CaptureKind::Plain,
        _ if !allow_await => CaptureKind::Plain,
        kind => kind,
    };

    if ctx.log_enabled(LogLevel::Debug) {
        tracing::debug!(line, ?kind, "capturing expression");
    }

    match kind {
        CaptureKind::Plain => vec![Stmt::expr(sink_call(&sink, line, vec![expr], range))],
        CaptureKind::Awaited => vec![Stmt::expr(sink_call(
            &sink,
            line,
            vec![Expr::await_(expr)],
            range,
        ))],
        CaptureKind::RootPromise => {
            let name = ctx.names.fresh(PROMISE_ROOT);
            let root = replace_chain_root(&mut expr, &name);
            let declaration = Stmt::new(
                StmtKind::Var(VarDecl {
                    kind: VarKind::Const,
                    declarators: vec![Declarator {
                        target: Pattern::Ident(name.clone()),
                        init: Some(root),
                    }],
                }),
                range,
            );

            vec![
                declaration,
                Stmt::expr(expr),
                Stmt::expr(sink_call(
                    &sink,
                    line,
                    vec![Expr::await_(Expr::ident(&name, range))],
                    range,
                )),
            ]
        }
    }
}

/// Swaps the root of a promise chain for the identifier `name` and returns
/// the original root.
fn replace_chain_root(expr: &mut Expr, name: &SmolStr) -> Expr {
    if let ExprKind::Call { callee, .. } = &mut expr.kind
        && let ExprKind::Member { object, .. } = &mut callee.kind
    {
        if is_chain_call(object) {
            return replace_chain_root(object, name);
        }
        let range = object.range;
        return std::mem::replace(object.as_mut(), Expr::ident(name, range));
    }

    let range = expr.range;
    std::mem::replace(expr, Expr::ident(name, range))
}

/// Whether any handler argument along the chain references `console.*` or
/// an already bridged sink call.
fn chain_mentions_console(expr: &mut Expr, sink: &str) -> bool {
    let mut finder = ConsoleFinder {
        sink,
        found: false,
    };
    let mut current = expr;

    loop {
        if !is_chain_call(current) {
            return finder.found;
        }
        match &mut current.kind {
            ExprKind::Call { callee, args, .. } => {
                for arg in args.iter_mut() {
                    finder.visit_expr(arg);
                }
                match &mut callee.kind {
                    ExprKind::Member { object, .. } => current = object,
                    _ => return finder.found,
                }
            }
            _ => return finder.found,
        }
    }
}

struct ConsoleFinder<'a> {
    sink: &'a str,
    found: bool,
}

impl VisitMut for ConsoleFinder<'_> {
    fn visit_expr(&mut self, expr: &mut Expr) {
        if self.found {
            return;
        }
        if expr.is_member_of("console") || expr.is_call_to(self.sink) {
            self.found = true;
            return;
        }
        visit::walk_expr(self, expr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ast::{self, Program},
        transform::{Instrumentation, NameGenerator, TransformOptions},
    };
    use rstest::rstest;

    fn parse_expr(code: &str) -> Expr {
        let program = ast::parse(code).unwrap();
        match program.body.into_iter().next().map(|stmt| stmt.kind) {
            Some(StmtKind::Expr(expr)) => expr,
            _ => panic!("expected an expression statement"),
        }
    }

    fn context() -> PassContext {
        PassContext::new(
            TransformOptions::default(),
            Instrumentation::default(),
            NameGenerator::default(),
        )
    }

    fn print(body: Vec<Stmt>) -> String {
        ast::print(&Program {
            body,
            trailing_comments: Vec::new(),
        })
    }

    #[rstest]
    #[case::plain("a + 1", CaptureKind::Plain)]
    #[case::await_expr("await p", CaptureKind::Plain)]
    #[case::fetch("fetch(url)", CaptureKind::Awaited)]
    #[case::promise_all("Promise.all([a, b])", CaptureKind::Awaited)]
    #[case::then("fetch(url).then((r) => r.json())", CaptureKind::Awaited)]
    #[case::then_console("p.then(console.log)", CaptureKind::RootPromise)]
    #[case::bridged("p.then((v) => __livejs_debug(1, v))", CaptureKind::RootPromise)]
    #[case::deep_chain_console(
        "fetch(u).then((r) => r.json()).catch((e) => console.error(e)).finally(done)",
        CaptureKind::RootPromise
    )]
    #[case::console_in_root_only("log(console).then(f)", CaptureKind::Awaited)]
    #[case::method_named_then("then(x)", CaptureKind::Plain)]
    fn test_classify(#[case] code: &str, #[case] expected: CaptureKind) {
        let mut expr = parse_expr(code);
        assert_eq!(classify(&mut expr, "__livejs_debug"), expected);
    }

    #[rstest]
    #[case::plain("x * 2", true, "__livejs_debug(3, x * 2);\n")]
    #[case::awaited("fetch(url)", true, "__livejs_debug(3, await fetch(url));\n")]
    #[case::no_await_allowed("fetch(url)", false, "__livejs_debug(3, fetch(url));\n")]
    #[case::root_promise(
        "fetch(url).then((r) => r.json()).then(console.log)",
        true,
        "const _promiseRoot = fetch(url);\n_promiseRoot.then((r) => r.json()).then(console.log);\n__livejs_debug(3, await _promiseRoot);\n"
    )]
    fn test_capture(#[case] code: &str, #[case] allow_await: bool, #[case] expected: &str) {
        let mut ctx = context();
        let stmts = capture(parse_expr(code), 3, &mut ctx, allow_await);
        assert_eq!(print(stmts), expected);
    }

    #[test]
    fn test_root_is_hoisted_once_per_capture() {
        let mut ctx = context();
        let first = capture(parse_expr("a.then(console.log)"), 1, &mut ctx, true);
        let second = capture(parse_expr("b.then(console.log)"), 2, &mut ctx, true);
        assert!(print(first).starts_with("const _promiseRoot = a;"));
        assert!(print(second).starts_with("const _promiseRoot2 = b;"));
    }

    #[rstest]
    #[case::sink("__livejs_debug(1, x)", true)]
    #[case::awaited_sink("await __livejs_debug(1, x)", true)]
    #[case::other("debug(1, x)", false)]
    fn test_is_sink_call(#[case] code: &str, #[case] expected: bool) {
        assert_eq!(is_sink_call(&parse_expr(code), "__livejs_debug"), expected);
    }

    #[test]
    fn test_chain_root() {
        let expr = parse_expr("a.b().then(f).catch(g)");
        assert_eq!(ast::Printer::new().print_expr(chain_root(&expr)), "a.b()");
    }
}
