use rustc_hash::{FxHashMap, FxHashSet};
use smol_str::SmolStr;

use crate::ast::{
    Ident, Program,
    node::{Class, Expr, ExprKind, Function, Pattern, Prop, Stmt, StmtKind},
    visit::{self, VisitMut},
};

pub const LOOP_COUNTER: &str = "_loopCounter";
pub const PROMISE_ROOT: &str = "_promiseRoot";

/// Hands out identifiers that collide with nothing in the program.
///
/// Every identifier mentioned anywhere in the program is reserved up front and
/// every generated name is reserved as soon as it is handed out, so a name is
/// unique in every scope of the program, not only in the scope it is
/// declared in.
#[derive(Debug, Default)]
pub struct NameGenerator {
    reserved: FxHashSet<Ident>,
    generated: FxHashSet<Ident>,
    counters: FxHashMap<SmolStr, usize>,
}

impl NameGenerator {
    pub fn from_program(program: &mut Program) -> Self {
        let mut collector = Collector::default();
        collector.visit_program(program);

        Self {
            reserved: collector.names,
            ..Default::default()
        }
    }

    /// Returns `base`, `base2`, `base3`, ... skipping reserved names.
    pub fn fresh(&mut self, base: &str) -> Ident {
        let counter = self.counters.entry(SmolStr::new(base)).or_insert(0);

        loop {
            *counter += 1;
            let name = if *counter == 1 {
                SmolStr::new(base)
            } else {
                SmolStr::new(format!("{}{}", base, counter))
            };

            if self.reserved.insert(name.clone()) {
                self.generated.insert(name.clone());
                return name;
            }
        }
    }

    pub fn is_generated(&self, name: &str) -> bool {
        self.generated.contains(name)
    }
}

#[derive(Default)]
struct Collector {
    names: FxHashSet<Ident>,
}

impl VisitMut for Collector {
    fn visit_stmt(&mut self, stmt: &mut Stmt) {
        match &stmt.kind {
            StmtKind::Labeled { label, .. } => {
                self.names.insert(label.clone());
            }
            StmtKind::Break(Some(label)) | StmtKind::Continue(Some(label)) => {
                self.names.insert(label.clone());
            }
            _ => {}
        }
        visit::walk_stmt(self, stmt);
    }

    fn visit_expr(&mut self, expr: &mut Expr) {
        match &expr.kind {
            ExprKind::Ident(name) => {
                self.names.insert(name.clone());
            }
            ExprKind::Object(props) => {
                for prop in props {
                    if let Prop::Shorthand(name) = prop {
                        self.names.insert(name.clone());
                    }
                }
            }
            _ => {}
        }
        visit::walk_expr(self, expr);
    }

    fn visit_pattern(&mut self, pattern: &mut Pattern) {
        if let Pattern::Ident(name) = pattern {
            self.names.insert(name.clone());
        }
        visit::walk_pattern(self, pattern);
    }

    fn visit_function(&mut self, function: &mut Function) {
        if let Some(name) = &function.name {
            self.names.insert(name.clone());
        }
        visit::walk_function(self, function);
    }

    fn visit_class(&mut self, class: &mut Class) {
        if let Some(name) = &class.name {
            self.names.insert(name.clone());
        }
        visit::walk_class(self, class);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::parse;
    use rstest::rstest;

    #[rstest]
    #[case::empty("", vec!["_loopCounter", "_loopCounter2", "_loopCounter3"])]
    #[case::taken_by_variable("let _loopCounter = 1", vec!["_loopCounter2", "_loopCounter3", "_loopCounter4"])]
    #[case::taken_in_function("function f(_loopCounter2) {}", vec!["_loopCounter", "_loopCounter3", "_loopCounter4"])]
    #[case::taken_by_label("_loopCounter: for (;;) break _loopCounter", vec!["_loopCounter2", "_loopCounter3", "_loopCounter4"])]
    fn test_fresh_skips_reserved(#[case] code: &str, #[case] expected: Vec<&str>) {
        let mut program = parse(code).unwrap();
        let mut names = NameGenerator::from_program(&mut program);
        let generated = (0..3)
            .map(|_| names.fresh(LOOP_COUNTER).to_string())
            .collect::<Vec<_>>();
        assert_eq!(generated, expected);
    }

    #[test]
    fn test_bases_are_independent() {
        let mut names = NameGenerator::default();
        assert_eq!(names.fresh(LOOP_COUNTER), "_loopCounter");
        assert_eq!(names.fresh(PROMISE_ROOT), "_promiseRoot");
        assert_eq!(names.fresh(PROMISE_ROOT), "_promiseRoot2");
        assert!(names.is_generated("_promiseRoot2"));
        assert!(!names.is_generated("x"));
    }
}
