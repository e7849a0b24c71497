//! Mutable tree traversal.
//!
//! Every `visit_*` method defaults to the matching `walk_*` function, which
//! recurses into the node's children. Implementors override the hooks they
//! care about and call `walk_*` to keep descending. Traversal state (scope
//! depth, enclosing function kind, ...) lives in the visitor itself.

use super::node::{
    Arrow, ArrowBody, Block, Class, ClassMember, Expr, ExprKind, ForHead, ForInit, Function,
    MemberProp, Pattern, Program, Prop, PropKey, Stmt, StmtKind,
};

pub trait VisitMut {
    fn visit_program(&mut self, program: &mut Program) {
        walk_program(self, program);
    }

    fn visit_block(&mut self, block: &mut Block) {
        walk_block(self, block);
    }

    fn visit_stmt(&mut self, stmt: &mut Stmt) {
        walk_stmt(self, stmt);
    }

    fn visit_expr(&mut self, expr: &mut Expr) {
        walk_expr(self, expr);
    }

    fn visit_pattern(&mut self, pattern: &mut Pattern) {
        walk_pattern(self, pattern);
    }

    fn visit_function(&mut self, function: &mut Function) {
        walk_function(self, function);
    }

    fn visit_arrow(&mut self, arrow: &mut Arrow) {
        walk_arrow(self, arrow);
    }

    fn visit_class(&mut self, class: &mut Class) {
        walk_class(self, class);
    }
}

pub fn walk_program<V: VisitMut + ?Sized>(visitor: &mut V, program: &mut Program) {
    visitor.visit_block(&mut program.body);
}

pub fn walk_block<V: VisitMut + ?Sized>(visitor: &mut V, block: &mut Block) {
    for stmt in block.iter_mut() {
        visitor.visit_stmt(stmt);
    }
}

pub fn walk_stmt<V: VisitMut + ?Sized>(visitor: &mut V, stmt: &mut Stmt) {
    match &mut stmt.kind {
        StmtKind::Expr(expr) | StmtKind::Throw(expr) => visitor.visit_expr(expr),
        StmtKind::Var(decl) => {
            for declarator in decl.declarators.iter_mut() {
                visitor.visit_pattern(&mut declarator.target);
                if let Some(init) = &mut declarator.init {
                    visitor.visit_expr(init);
                }
            }
        }
        StmtKind::Function(function) => visitor.visit_function(function),
        StmtKind::Class(class) => visitor.visit_class(class),
        StmtKind::Block(block) => visitor.visit_block(block),
        StmtKind::If {
            test,
            consequent,
            alternate,
        } => {
            visitor.visit_expr(test);
            visitor.visit_stmt(consequent);
            if let Some(alternate) = alternate {
                visitor.visit_stmt(alternate);
            }
        }
        StmtKind::For {
            init,
            test,
            update,
            body,
        } => {
            match init {
                Some(ForInit::Var(decl)) => {
                    for declarator in decl.declarators.iter_mut() {
                        visitor.visit_pattern(&mut declarator.target);
                        if let Some(init) = &mut declarator.init {
                            visitor.visit_expr(init);
                        }
                    }
                }
                Some(ForInit::Expr(expr)) => visitor.visit_expr(expr),
                None => {}
            }
            if let Some(test) = test {
                visitor.visit_expr(test);
            }
            if let Some(update) = update {
                visitor.visit_expr(update);
            }
            visitor.visit_stmt(body);
        }
        StmtKind::ForIn { left, right, body } | StmtKind::ForOf { left, right, body } => {
            match left {
                ForHead::Var(_, pattern) | ForHead::Pattern(pattern) => {
                    visitor.visit_pattern(pattern)
                }
            }
            visitor.visit_expr(right);
            visitor.visit_stmt(body);
        }
        StmtKind::While { test, body } => {
            visitor.visit_expr(test);
            visitor.visit_stmt(body);
        }
        StmtKind::DoWhile { body, test } => {
            visitor.visit_stmt(body);
            visitor.visit_expr(test);
        }
        StmtKind::Return(arg) => {
            if let Some(arg) = arg {
                visitor.visit_expr(arg);
            }
        }
        StmtKind::Try {
            block,
            handler,
            finalizer,
        } => {
            visitor.visit_block(block);
            if let Some(handler) = handler {
                if let Some(param) = &mut handler.param {
                    visitor.visit_pattern(param);
                }
                visitor.visit_block(&mut handler.body);
            }
            if let Some(finalizer) = finalizer {
                visitor.visit_block(finalizer);
            }
        }
        StmtKind::Labeled { body, .. } => visitor.visit_stmt(body),
        StmtKind::Break(_) | StmtKind::Continue(_) | StmtKind::Empty => {}
    }
}

fn walk_prop_key<V: VisitMut + ?Sized>(visitor: &mut V, key: &mut PropKey) {
    if let PropKey::Computed(expr) = key {
        visitor.visit_expr(expr);
    }
}

pub fn walk_expr<V: VisitMut + ?Sized>(visitor: &mut V, expr: &mut Expr) {
    match &mut expr.kind {
        ExprKind::Literal(_) | ExprKind::Ident(_) | ExprKind::This | ExprKind::Super => {}
        ExprKind::Template { exprs, .. } | ExprKind::Sequence(exprs) => {
            for expr in exprs.iter_mut() {
                visitor.visit_expr(expr);
            }
        }
        ExprKind::Array(elements) => {
            for element in elements.iter_mut().flatten() {
                visitor.visit_expr(element);
            }
        }
        ExprKind::Object(props) => {
            for prop in props.iter_mut() {
                match prop {
                    Prop::KeyValue { key, value } => {
                        walk_prop_key(visitor, key);
                        visitor.visit_expr(value);
                    }
                    Prop::Shorthand(_) => {}
                    Prop::Method { key, function } => {
                        walk_prop_key(visitor, key);
                        visitor.visit_function(function);
                    }
                    Prop::Spread(expr) => visitor.visit_expr(expr),
                }
            }
        }
        ExprKind::Function(function) => visitor.visit_function(function),
        ExprKind::Arrow(arrow) => visitor.visit_arrow(arrow),
        ExprKind::Class(class) => visitor.visit_class(class),
        ExprKind::Call { callee, args, .. } | ExprKind::New { callee, args } => {
            visitor.visit_expr(callee);
            for arg in args.iter_mut() {
                visitor.visit_expr(arg);
            }
        }
        ExprKind::Member {
            object, property, ..
        } => {
            visitor.visit_expr(object);
            if let MemberProp::Computed(property) = property {
                visitor.visit_expr(property);
            }
        }
        ExprKind::Unary { arg, .. }
        | ExprKind::Update { arg, .. }
        | ExprKind::Await(arg)
        | ExprKind::Spread(arg) => visitor.visit_expr(arg),
        ExprKind::Binary { left, right, .. } | ExprKind::Logical { left, right, .. } => {
            visitor.visit_expr(left);
            visitor.visit_expr(right);
        }
        ExprKind::Conditional {
            test,
            consequent,
            alternate,
        } => {
            visitor.visit_expr(test);
            visitor.visit_expr(consequent);
            visitor.visit_expr(alternate);
        }
        ExprKind::Assign { target, value, .. } => {
            visitor.visit_pattern(target);
            visitor.visit_expr(value);
        }
    }
}

pub fn walk_pattern<V: VisitMut + ?Sized>(visitor: &mut V, pattern: &mut Pattern) {
    match pattern {
        Pattern::Ident(_) => {}
        Pattern::Object { props, rest } => {
            for prop in props.iter_mut() {
                walk_prop_key(visitor, &mut prop.key);
                visitor.visit_pattern(&mut prop.value);
            }
            if let Some(rest) = rest {
                visitor.visit_pattern(rest);
            }
        }
        Pattern::Array { elements, rest } => {
            for element in elements.iter_mut().flatten() {
                visitor.visit_pattern(element);
            }
            if let Some(rest) = rest {
                visitor.visit_pattern(rest);
            }
        }
        Pattern::Default { target, value } => {
            visitor.visit_pattern(target);
            visitor.visit_expr(value);
        }
        Pattern::Expr(expr) => visitor.visit_expr(expr),
    }
}

pub fn walk_function<V: VisitMut + ?Sized>(visitor: &mut V, function: &mut Function) {
    for param in function.params.iter_mut() {
        visitor.visit_pattern(&mut param.pattern);
    }
    visitor.visit_block(&mut function.body);
}

pub fn walk_arrow<V: VisitMut + ?Sized>(visitor: &mut V, arrow: &mut Arrow) {
    for param in arrow.params.iter_mut() {
        visitor.visit_pattern(&mut param.pattern);
    }
    match &mut arrow.body {
        ArrowBody::Expr(expr) => visitor.visit_expr(expr),
        ArrowBody::Block(block) => visitor.visit_block(block),
    }
}

pub fn walk_class<V: VisitMut + ?Sized>(visitor: &mut V, class: &mut Class) {
    if let Some(super_class) = &mut class.super_class {
        visitor.visit_expr(super_class);
    }
    for member in class.members.iter_mut() {
        match member {
            ClassMember::Method { key, function, .. } => {
                walk_prop_key(visitor, key);
                visitor.visit_function(function);
            }
            ClassMember::Field { key, value, .. } => {
                walk_prop_key(visitor, key);
                if let Some(value) = value {
                    visitor.visit_expr(value);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::parse;

    #[derive(Default)]
    struct Renamer {
        visited: usize,
    }

    impl VisitMut for Renamer {
        fn visit_expr(&mut self, expr: &mut Expr) {
            if let ExprKind::Ident(name) = &mut expr.kind {
                self.visited += 1;
                *name = format!("{}_", name).into();
            }
            walk_expr(self, expr);
        }
    }

    #[test]
    fn test_visits_nested_expressions() {
        let mut program =
            parse("f(a, () => b, class { m() { return c } }, { d, [e]: g })").unwrap();
        let mut renamer = Renamer::default();
        renamer.visit_program(&mut program);

        // `d` is a shorthand property, not an identifier expression.
        assert_eq!(renamer.visited, 6);
        assert_eq!(
            crate::ast::print(&program),
            "f_(a_, () => b_, class {\n  m() {\n    return c_;\n  }\n}, { d, [e_]: g_ });\n"
        );
    }
}
