use super::{
    LogLevel, Pass, PassContext,
    capture::{self, is_sink_call, sink_call},
    into_block,
    stray_expression::attach_comments,
};
use crate::ast::{
    Block, Program,
    node::{Arrow, Expr, Function, Stmt, StmtKind},
    visit::{self, VisitMut},
};

/// Captures expressions and declarations marked with a `//?` comment.
///
/// Applies at any depth and regardless of `showTopLevelResults`. Promise
/// values are only awaited where `await` is legal: at the top level and in
/// async functions.
#[derive(Debug, Default)]
pub struct MagicComment;

impl Pass for MagicComment {
    fn name(&self) -> &'static str {
        "MagicComment"
    }

    fn run(&mut self, program: &mut Program, ctx: &mut PassContext) {
        let mut marker = Marker {
            ctx,
            async_scopes: Vec::new(),
            captured: 0,
        };
        marker.visit_program(program);

        if marker.ctx.log_enabled(LogLevel::Info) {
            tracing::info!(count = marker.captured, "captured marked statements");
        }
    }
}

struct Marker<'a> {
    ctx: &'a mut PassContext,
    async_scopes: Vec<bool>,
    captured: usize,
}

impl Marker<'_> {
    fn allow_await(&self) -> bool {
        self.async_scopes.last().copied().unwrap_or(true)
    }

    /// Rewrites a marked statement into its capturing form.
    fn expand(&mut self, stmt: Stmt) -> Vec<Stmt> {
        if !is_marked(&stmt) {
            return vec![stmt];
        }
        let sink = self.ctx.instrumentation.sink.clone();

        match stmt {
            Stmt {
                kind: StmtKind::Expr(expr),
                leading_comments,
                mut trailing_comments,
                ..
            } if !is_sink_call(&expr, &sink) => {
                trailing_comments.retain(|comment| !comment.is_magic());
                let line = expr.line();
                let allow_await = self.allow_await();

                let mut stmts = capture::capture(expr, line, self.ctx, allow_await);
                attach_comments(&mut stmts, leading_comments, trailing_comments);
                self.captured += 1;
                stmts
            }
            mut stmt => {
                let wrapped = matches!(stmt.kind, StmtKind::Expr(_));
                let declared = match &stmt.kind {
                    StmtKind::Var(decl) if decl.declarators.len() == 1 => {
                        decl.declarators[0].target.as_ident().cloned()
                    }
                    _ => None,
                };

                match declared {
                    _ if wrapped => {
                        remove_markers(&mut stmt);
                        vec![stmt]
                    }
                    Some(name) => {
                        remove_markers(&mut stmt);
                        let (line, range) = (stmt.line(), stmt.range);
                        let follow_up = Stmt::expr(sink_call(
                            &sink,
                            line,
                            vec![Expr::ident(&name, range)],
                            range,
                        ));
                        self.captured += 1;
                        vec![stmt, follow_up]
                    }
                    None => vec![stmt],
                }
            }
        }
    }
}

impl VisitMut for Marker<'_> {
    fn visit_block(&mut self, block: &mut Block) {
        let stmts = std::mem::take(block);
        block.reserve(stmts.len());

        for mut stmt in stmts {
            self.visit_stmt(&mut stmt);
            block.extend(self.expand(stmt));
        }
    }

    fn visit_stmt(&mut self, stmt: &mut Stmt) {
        match &mut stmt.kind {
            StmtKind::If {
                consequent,
                alternate,
                ..
            } => {
                if is_marked(consequent) {
                    into_block(consequent);
                }
                if let Some(alternate) = alternate
                    && is_marked(alternate)
                {
                    into_block(alternate);
                }
            }
            StmtKind::For { body, .. }
            | StmtKind::ForIn { body, .. }
            | StmtKind::ForOf { body, .. }
            | StmtKind::While { body, .. }
            | StmtKind::DoWhile { body, .. }
            | StmtKind::Labeled { body, .. }
                if is_marked(body) =>
            {
                into_block(body)
            }
            _ => {}
        }

        visit::walk_stmt(self, stmt);
    }

    fn visit_function(&mut self, function: &mut Function) {
        self.async_scopes.push(function.is_async);
        visit::walk_function(self, function);
        self.async_scopes.pop();
    }

    fn visit_arrow(&mut self, arrow: &mut Arrow) {
        self.async_scopes.push(arrow.is_async);
        visit::walk_arrow(self, arrow);
        self.async_scopes.pop();
    }
}

/// An expression or declaration statement carrying a `?` marker comment.
fn is_marked(stmt: &Stmt) -> bool {
    matches!(stmt.kind, StmtKind::Expr(_) | StmtKind::Var(_))
        && stmt.trailing_comments.iter().any(|comment| comment.is_magic())
}

fn remove_markers(stmt: &mut Stmt) {
    stmt.trailing_comments.retain(|comment| !comment.is_magic());
}
