use super::{LogLevel, Pass, PassContext};
use crate::ast::{
    Program,
    node::{Class, ClassMember, Expr, ExprKind, Function, PropKey},
    visit::{self, VisitMut},
};

const GLOBAL_THIS: &str = "globalThis";

/// Replaces module-level `this` with `globalThis`.
///
/// Ordinary functions and class bodies bind their own `this`; arrow functions
/// inherit it, so they do not count as a boundary.
#[derive(Debug, Default)]
pub struct TopLevelThis;

impl Pass for TopLevelThis {
    fn name(&self) -> &'static str {
        "TopLevelThis"
    }

    fn run(&mut self, program: &mut Program, ctx: &mut PassContext) {
        let mut rewriter = Rewriter::default();
        rewriter.visit_program(program);

        if ctx.log_enabled(LogLevel::Info) && rewriter.rewritten > 0 {
            tracing::info!(count = rewriter.rewritten, "rewrote top-level this");
        }
    }
}

#[derive(Default)]
struct Rewriter {
    function_depth: usize,
    rewritten: usize,
}

impl VisitMut for Rewriter {
    fn visit_expr(&mut self, expr: &mut Expr) {
        if matches!(expr.kind, ExprKind::This) {
            if self.function_depth == 0 {
                *expr = Expr::ident(GLOBAL_THIS, expr.range);
                self.rewritten += 1;
            }
            return;
        }
        visit::walk_expr(self, expr);
    }

    fn visit_function(&mut self, function: &mut Function) {
        self.function_depth += 1;
        visit::walk_function(self, function);
        self.function_depth -= 1;
    }

    fn visit_class(&mut self, class: &mut Class) {
        // `extends` and computed keys are evaluated in the enclosing scope.
        if let Some(super_class) = &mut class.super_class {
            self.visit_expr(super_class);
        }

        for member in class.members.iter_mut() {
            let (ClassMember::Method { key, .. } | ClassMember::Field { key, .. }) = member;
            if let PropKey::Computed(key) = key {
                self.visit_expr(key);
            }

            self.function_depth += 1;
            match member {
                ClassMember::Method { function, .. } => self.visit_function(function),
                ClassMember::Field {
                    value: Some(value), ..
                } => self.visit_expr(value),
                ClassMember::Field { value: None, .. } => {}
            }
            self.function_depth -= 1;
        }
    }
}
