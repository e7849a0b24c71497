use super::{LogLevel, Pass, PassContext};
use crate::ast::{
    Program,
    node::{Expr, ExprKind},
    visit::{self, VisitMut},
};

/// Redirects `console.<method>(...)` calls to the debug sink.
#[derive(Debug, Default)]
pub struct ConsoleBridge;

impl Pass for ConsoleBridge {
    fn name(&self) -> &'static str {
        "ConsoleBridge"
    }

    fn run(&mut self, program: &mut Program, ctx: &mut PassContext) {
        let mut bridge = Bridge { ctx, bridged: 0 };
        bridge.visit_program(program);

        if bridge.ctx.log_enabled(LogLevel::Info) {
            tracing::info!(count = bridge.bridged, "bridged console calls");
        }
    }
}

struct Bridge<'a> {
    ctx: &'a mut PassContext,
    bridged: usize,
}

impl VisitMut for Bridge<'_> {
    fn visit_expr(&mut self, expr: &mut Expr) {
        visit::walk_expr(self, expr);

        let line = expr.line();
        if let ExprKind::Call { callee, args, .. } = &mut expr.kind
            && callee.is_member_of("console")
        {
            let range = callee.range;
            **callee = Expr::ident(&self.ctx.instrumentation.sink, range);
            args.insert(0, Expr::number(f64::from(line), range));
            self.bridged += 1;
        }
    }
}
