use itertools::Itertools;

use super::node::{
    Arrow, ArrowBody, BinaryOp, Class, ClassMember, Comment, Declarator, Expr,
    ExprKind, ForHead, ForInit, Function, Literal, LogicalOp, MemberProp, MethodKind, Param,
    Pattern, Program, Prop, PropKey, Stmt, StmtKind, UnaryOp, VarDecl,
};

const INDENT: &str = "  ";

mod precedence {
    pub const SEQUENCE: u8 = 1;
    pub const ASSIGN: u8 = 2;
    pub const CONDITIONAL: u8 = 3;
    pub const UNARY: u8 = 16;
    pub const POSTFIX: u8 = 17;
    pub const CALL: u8 = 18;
    pub const PRIMARY: u8 = 20;
}

/// Renders a [`Program`] as source text.
///
/// Output is a pure function of the tree: two-space indentation, one
/// statement per line, explicit semicolons and the minimal parentheses
/// required by operator precedence.
#[derive(Debug, Default)]
pub struct Printer {
    out: String,
    indent: usize,
}

impl Printer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn print(mut self, program: &Program) -> String {
        for stmt in &program.body {
            self.stmt(stmt);
        }
        for comment in &program.trailing_comments {
            self.comment_line(comment);
        }
        self.out
    }

    /// Renders a single expression.
    pub fn print_expr(mut self, expr: &Expr) -> String {
        self.expr(expr, precedence::SEQUENCE);
        self.out
    }

    fn write(&mut self, text: &str) {
        self.out.push_str(text);
    }

    fn write_indent(&mut self) {
        for _ in 0..self.indent {
            self.out.push_str(INDENT);
        }
    }

    fn comment_line(&mut self, comment: &Comment) {
        self.write_indent();
        self.write(&comment.to_string());
        self.write("\n");
    }

    fn trailing_comments(&mut self, comments: &[Comment]) {
        for comment in comments {
            self.write(" ");
            self.write(&comment.to_string());
        }
    }

    fn stmt(&mut self, stmt: &Stmt) {
        for comment in &stmt.leading_comments {
            self.comment_line(comment);
        }
        self.write_indent();
        self.stmt_content(stmt);
        self.trailing_comments(&stmt.trailing_comments);
        self.write("\n");
    }

    fn block(&mut self, body: &[Stmt]) {
        if body.is_empty() {
            self.write("{}");
            return;
        }

        self.write("{\n");
        self.indent += 1;
        for stmt in body {
            self.stmt(stmt);
        }
        self.indent -= 1;
        self.write_indent();
        self.write("}");
    }

    /// Body of `if`/loops: blocks stay on the header line, anything else is
    /// indented on its own line.
    fn body(&mut self, body: &Stmt) {
        match &body.kind {
            StmtKind::Block(block) => {
                self.write(" ");
                self.block(block);
                self.trailing_comments(&body.trailing_comments);
            }
            _ => {
                self.write("\n");
                self.indent += 1;
                for comment in &body.leading_comments {
                    self.comment_line(comment);
                }
                self.write_indent();
                self.stmt_content(body);
                self.trailing_comments(&body.trailing_comments);
                self.indent -= 1;
            }
        }
    }

    fn stmt_content(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                if starts_ambiguously(expr) {
                    self.write("(");
                    self.expr(expr, precedence::SEQUENCE);
                    self.write(")");
                } else {
                    self.expr(expr, precedence::SEQUENCE);
                }
                self.write(";");
            }
            StmtKind::Var(decl) => {
                self.var_decl(decl);
                self.write(";");
            }
            StmtKind::Function(function) => self.function(function),
            StmtKind::Class(class) => self.class(class),
            StmtKind::Block(block) => self.block(block),
            StmtKind::If {
                test,
                consequent,
                alternate,
            } => {
                self.write("if (");
                self.expr(test, precedence::SEQUENCE);
                self.write(")");
                self.body(consequent);

                if let Some(alternate) = alternate {
                    if matches!(consequent.kind, StmtKind::Block(_)) {
                        self.write(" ");
                    } else {
                        self.write("\n");
                        self.write_indent();
                    }
                    self.write("else");
                    if matches!(alternate.kind, StmtKind::If { .. }) {
                        self.write(" ");
                        self.stmt_content(alternate);
                    } else {
                        self.body(alternate);
                    }
                }
            }
            StmtKind::For {
                init,
                test,
                update,
                body,
            } => {
                self.write("for (");
                match init {
                    Some(ForInit::Var(decl)) => self.var_decl(decl),
                    Some(ForInit::Expr(expr)) => self.expr(expr, precedence::SEQUENCE),
                    None => {}
                }
                self.write(";");
                if let Some(test) = test {
                    self.write(" ");
                    self.expr(test, precedence::SEQUENCE);
                }
                self.write(";");
                if let Some(update) = update {
                    self.write(" ");
                    self.expr(update, precedence::SEQUENCE);
                }
                self.write(")");
                self.body(body);
            }
            StmtKind::ForIn { left, right, body } => {
                self.write("for (");
                self.for_head(left);
                self.write(" in ");
                self.expr(right, precedence::SEQUENCE);
                self.write(")");
                self.body(body);
            }
            StmtKind::ForOf { left, right, body } => {
                self.write("for (");
                self.for_head(left);
                self.write(" of ");
                self.expr(right, precedence::ASSIGN);
                self.write(")");
                self.body(body);
            }
            StmtKind::While { test, body } => {
                self.write("while (");
                self.expr(test, precedence::SEQUENCE);
                self.write(")");
                self.body(body);
            }
            StmtKind::DoWhile { body, test } => {
                self.write("do");
                self.body(body);
                if matches!(body.kind, StmtKind::Block(_)) {
                    self.write(" ");
                } else {
                    self.write("\n");
                    self.write_indent();
                }
                self.write("while (");
                self.expr(test, precedence::SEQUENCE);
                self.write(");");
            }
            StmtKind::Return(arg) => {
                self.write("return");
                if let Some(arg) = arg {
                    self.write(" ");
                    self.expr(arg, precedence::SEQUENCE);
                }
                self.write(";");
            }
            StmtKind::Break(label) => {
                self.write("break");
                if let Some(label) = label {
                    self.write(" ");
                    self.write(label);
                }
                self.write(";");
            }
            StmtKind::Continue(label) => {
                self.write("continue");
                if let Some(label) = label {
                    self.write(" ");
                    self.write(label);
                }
                self.write(";");
            }
            StmtKind::Throw(arg) => {
                self.write("throw ");
                self.expr(arg, precedence::SEQUENCE);
                self.write(";");
            }
            StmtKind::Try {
                block,
                handler,
                finalizer,
            } => {
                self.write("try ");
                self.block(block);
                if let Some(handler) = handler {
                    self.write(" catch ");
                    if let Some(param) = &handler.param {
                        self.write("(");
                        self.pattern(param);
                        self.write(") ");
                    }
                    self.block(&handler.body);
                }
                if let Some(finalizer) = finalizer {
                    self.write(" finally ");
                    self.block(finalizer);
                }
            }
            StmtKind::Labeled { label, body } => {
                self.write(label);
                self.write(":");
                if matches!(body.kind, StmtKind::Block(_)) {
                    self.body(body);
                } else {
                    self.write(" ");
                    self.stmt_content(body);
                }
            }
            StmtKind::Empty => self.write(";"),
        }
    }

    fn var_decl(&mut self, decl: &VarDecl) {
        self.write(decl.kind.as_str());
        self.write(" ");
        for (i, Declarator { target, init }) in decl.declarators.iter().enumerate() {
            if i > 0 {
                self.write(", ");
            }
            self.pattern(target);
            if let Some(init) = init {
                self.write(" = ");
                self.expr(init, precedence::ASSIGN);
            }
        }
    }

    fn for_head(&mut self, head: &ForHead) {
        match head {
            ForHead::Var(kind, pattern) => {
                self.write(kind.as_str());
                self.write(" ");
                self.pattern(pattern);
            }
            ForHead::Pattern(pattern) => self.pattern(pattern),
        }
    }

    fn params(&mut self, params: &[Param]) {
        self.write("(");
        for (i, param) in params.iter().enumerate() {
            if i > 0 {
                self.write(", ");
            }
            if param.rest {
                self.write("...");
            }
            self.pattern(&param.pattern);
        }
        self.write(")");
    }

    fn function(&mut self, function: &Function) {
        if function.is_async {
            self.write("async ");
        }
        self.write("function");
        if let Some(name) = &function.name {
            self.write(" ");
            self.write(name);
        }
        self.params(&function.params);
        self.write(" ");
        self.block(&function.body);
    }

    fn arrow(&mut self, arrow: &Arrow) {
        if arrow.is_async {
            self.write("async ");
        }
        self.params(&arrow.params);
        self.write(" => ");
        match &arrow.body {
            ArrowBody::Block(block) => self.block(block),
            ArrowBody::Expr(expr) if starts_with_brace(expr) => {
                self.write("(");
                self.expr(expr, precedence::ASSIGN);
                self.write(")");
            }
            ArrowBody::Expr(expr) => self.expr(expr, precedence::ASSIGN),
        }
    }

    fn class(&mut self, class: &Class) {
        self.write("class");
        if let Some(name) = &class.name {
            self.write(" ");
            self.write(name);
        }
        if let Some(super_class) = &class.super_class {
            self.write(" extends ");
            self.expr(super_class, precedence::CALL);
        }

        if class.members.is_empty() {
            self.write(" {}");
            return;
        }

        self.write(" {\n");
        self.indent += 1;
        for member in &class.members {
            self.write_indent();
            match member {
                ClassMember::Method {
                    key,
                    kind,
                    function,
                    is_static,
                } => {
                    if *is_static {
                        self.write("static ");
                    }
                    if function.is_async {
                        self.write("async ");
                    }
                    match kind {
                        MethodKind::Constructor => self.write("constructor"),
                        MethodKind::Method => self.prop_key(key),
                    }
                    self.params(&function.params);
                    self.write(" ");
                    self.block(&function.body);
                }
                ClassMember::Field {
                    key,
                    value,
                    is_static,
                } => {
                    if *is_static {
                        self.write("static ");
                    }
                    self.prop_key(key);
                    if let Some(value) = value {
                        self.write(" = ");
                        self.expr(value, precedence::ASSIGN);
                    }
                    self.write(";");
                }
            }
            self.write("\n");
        }
        self.indent -= 1;
        self.write_indent();
        self.write("}");
    }

    fn prop_key(&mut self, key: &PropKey) {
        match key {
            PropKey::Ident(name) => self.write(name),
            PropKey::String(s) => self.write(&quote(s)),
            PropKey::Number(n) => self.write(&n.to_string()),
            PropKey::Computed(expr) => {
                self.write("[");
                self.expr(expr, precedence::ASSIGN);
                self.write("]");
            }
        }
    }

    fn pattern(&mut self, pattern: &Pattern) {
        match pattern {
            Pattern::Ident(name) => self.write(name),
            Pattern::Object { props, rest } => {
                if props.is_empty() && rest.is_none() {
                    self.write("{}");
                    return;
                }

                self.write("{ ");
                for (i, prop) in props.iter().enumerate() {
                    if i > 0 {
                        self.write(", ");
                    }
                    match (&prop.key, &prop.value) {
                        (PropKey::Ident(key), Pattern::Ident(name)) if key == name => {
                            self.write(name)
                        }
                        (PropKey::Ident(key), Pattern::Default { target, value })
                            if target.as_ident() == Some(key) =>
                        {
                            self.write(key);
                            self.write(" = ");
                            self.expr(value, precedence::ASSIGN);
                        }
                        (key, value) => {
                            self.prop_key(key);
                            self.write(": ");
                            self.pattern(value);
                        }
                    }
                }
                if let Some(rest) = rest {
                    if !props.is_empty() {
                        self.write(", ");
                    }
                    self.write("...");
                    self.pattern(rest);
                }
                self.write(" }");
            }
            Pattern::Array { elements, rest } => {
                self.write("[");
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        self.write(", ");
                    }
                    if let Some(element) = element {
                        self.pattern(element);
                    }
                }
                if let Some(rest) = rest {
                    if !elements.is_empty() {
                        self.write(", ");
                    }
                    self.write("...");
                    self.pattern(rest);
                } else if matches!(elements.last(), Some(None)) {
                    self.write(",");
                }
                self.write("]");
            }
            Pattern::Default { target, value } => {
                self.pattern(target);
                self.write(" = ");
                self.expr(value, precedence::ASSIGN);
            }
            Pattern::Expr(expr) => self.expr(expr, precedence::CALL),
        }
    }

    fn args(&mut self, args: &[Expr]) {
        self.write("(");
        for (i, arg) in args.iter().enumerate() {
            if i > 0 {
                self.write(", ");
            }
            self.expr(arg, precedence::ASSIGN);
        }
        self.write(")");
    }

    fn logical_operand(&mut self, op: LogicalOp, operand: &Expr, min: u8) {
        // `??` cannot be mixed with `&&`/`||` without parentheses.
        let mixes = match &operand.kind {
            ExprKind::Logical { op: inner, .. } => {
                (op == LogicalOp::Nullish) != (*inner == LogicalOp::Nullish)
            }
            _ => false,
        };

        if mixes {
            self.write("(");
            self.expr(operand, precedence::SEQUENCE);
            self.write(")");
        } else {
            self.expr(operand, min);
        }
    }

    fn expr(&mut self, expr: &Expr, min: u8) {
        let needs_parens = expr_precedence(expr) < min;
        if needs_parens {
            self.write("(");
        }

        match &expr.kind {
            ExprKind::Literal(literal) => match literal {
                Literal::Number(n) => self.write(&n.to_string()),
                Literal::String(s) => self.write(&quote(s)),
                Literal::BigInt(digits) => {
                    self.write(digits);
                    self.write("n");
                }
                Literal::Bool(b) => self.write(if *b { "true" } else { "false" }),
                Literal::Null => self.write("null"),
            },
            ExprKind::Template { quasis, exprs } => {
                self.write("`");
                for (i, quasi) in quasis.iter().enumerate() {
                    self.write(&escape_template(quasi));
                    if let Some(expr) = exprs.get(i) {
                        self.write("${");
                        self.expr(expr, precedence::SEQUENCE);
                        self.write("}");
                    }
                }
                self.write("`");
            }
            ExprKind::Ident(name) => self.write(name),
            ExprKind::This => self.write("this"),
            ExprKind::Super => self.write("super"),
            ExprKind::Array(elements) => {
                self.write("[");
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        self.write(", ");
                    }
                    if let Some(element) = element {
                        self.expr(element, precedence::ASSIGN);
                    }
                }
                if matches!(elements.last(), Some(None)) {
                    self.write(",");
                }
                self.write("]");
            }
            ExprKind::Object(props) => {
                if props.is_empty() {
                    self.write("{}");
                } else {
                    self.write("{ ");
                    for (i, prop) in props.iter().enumerate() {
                        if i > 0 {
                            self.write(", ");
                        }
                        self.prop(prop);
                    }
                    self.write(" }");
                }
            }
            ExprKind::Function(function) => self.function(function),
            ExprKind::Arrow(arrow) => self.arrow(arrow),
            ExprKind::Class(class) => self.class(class),
            ExprKind::Call {
                callee,
                args,
                optional,
            } => {
                self.expr(callee, precedence::CALL);
                if *optional {
                    self.write("?.");
                }
                self.args(args);
            }
            ExprKind::New { callee, args } => {
                self.write("new ");
                if has_call_in_chain(callee) {
                    self.write("(");
                    self.expr(callee, precedence::SEQUENCE);
                    self.write(")");
                } else {
                    self.expr(callee, precedence::CALL);
                }
                self.args(args);
            }
            ExprKind::Member {
                object,
                property,
                optional,
            } => {
                let integer_literal = matches!(
                    &object.kind,
                    ExprKind::Literal(Literal::Number(n)) if !n.to_string().contains(['.', 'e', 'N', 'I'])
                );
                if integer_literal {
                    self.write("(");
                    self.expr(object, precedence::SEQUENCE);
                    self.write(")");
                } else {
                    self.expr(object, precedence::CALL);
                }

                match property {
                    MemberProp::Ident(name) => {
                        self.write(if *optional { "?." } else { "." });
                        self.write(name);
                    }
                    MemberProp::Computed(property) => {
                        if *optional {
                            self.write("?.");
                        }
                        self.write("[");
                        self.expr(property, precedence::SEQUENCE);
                        self.write("]");
                    }
                }
            }
            ExprKind::Unary { op, arg } => {
                self.write(op.as_str());
                let separate = match op {
                    UnaryOp::Typeof | UnaryOp::Void | UnaryOp::Delete => true,
                    UnaryOp::Neg | UnaryOp::Plus => {
                        let sign = op.as_str();
                        match &arg.kind {
                            ExprKind::Unary { op: inner, .. } => inner.as_str() == sign,
                            ExprKind::Update {
                                op: inner,
                                prefix: true,
                                ..
                            } => inner.as_str().starts_with(sign),
                            _ => false,
                        }
                    }
                    UnaryOp::Not | UnaryOp::BitNot => false,
                };
                if separate {
                    self.write(" ");
                }
                self.expr(arg, precedence::UNARY);
            }
            ExprKind::Update { op, prefix, arg } => {
                if *prefix {
                    self.write(op.as_str());
                    self.expr(arg, precedence::POSTFIX);
                } else {
                    self.expr(arg, precedence::CALL);
                    self.write(op.as_str());
                }
            }
            ExprKind::Binary { op, left, right } => {
                let p = op.precedence();
                let (left_min, right_min) = if *op == BinaryOp::Exp {
                    (precedence::POSTFIX, p)
                } else {
                    (p, p + 1)
                };
                self.expr(left, left_min);
                self.write(" ");
                self.write(op.as_str());
                self.write(" ");
                self.expr(right, right_min);
            }
            ExprKind::Logical { op, left, right } => {
                let p = op.precedence();
                self.logical_operand(*op, left, p);
                self.write(" ");
                self.write(op.as_str());
                self.write(" ");
                self.logical_operand(*op, right, p + 1);
            }
            ExprKind::Conditional {
                test,
                consequent,
                alternate,
            } => {
                self.expr(test, precedence::CONDITIONAL + 1);
                self.write(" ? ");
                self.expr(consequent, precedence::ASSIGN);
                self.write(" : ");
                self.expr(alternate, precedence::ASSIGN);
            }
            ExprKind::Assign { op, target, value } => {
                self.pattern(target);
                self.write(" ");
                self.write(op.as_str());
                self.write(" ");
                self.expr(value, precedence::ASSIGN);
            }
            ExprKind::Sequence(exprs) => {
                for (i, expr) in exprs.iter().enumerate() {
                    if i > 0 {
                        self.write(", ");
                    }
                    self.expr(expr, precedence::ASSIGN);
                }
            }
            ExprKind::Await(arg) => {
                self.write("await ");
                self.expr(arg, precedence::UNARY);
            }
            ExprKind::Spread(arg) => {
                self.write("...");
                self.expr(arg, precedence::ASSIGN);
            }
        }

        if needs_parens {
            self.write(")");
        }
    }

    fn prop(&mut self, prop: &Prop) {
        match prop {
            Prop::KeyValue { key, value } => {
                self.prop_key(key);
                self.write(": ");
                self.expr(value, precedence::ASSIGN);
            }
            Prop::Shorthand(name) => self.write(name),
            Prop::Method { key, function } => {
                if function.is_async {
                    self.write("async ");
                }
                self.prop_key(key);
                self.params(&function.params);
                self.write(" ");
                self.block(&function.body);
            }
            Prop::Spread(expr) => {
                self.write("...");
                self.expr(expr, precedence::ASSIGN);
            }
        }
    }
}

fn expr_precedence(expr: &Expr) -> u8 {
    match &expr.kind {
        ExprKind::Sequence(_) => precedence::SEQUENCE,
        ExprKind::Assign { .. } | ExprKind::Arrow(_) | ExprKind::Spread(_) => precedence::ASSIGN,
        ExprKind::Conditional { .. } => precedence::CONDITIONAL,
        ExprKind::Logical { op, .. } => op.precedence(),
        ExprKind::Binary { op, .. } => op.precedence(),
        ExprKind::Unary { .. } | ExprKind::Await(_) => precedence::UNARY,
        ExprKind::Update { prefix: true, .. } => precedence::UNARY,
        ExprKind::Update { prefix: false, .. } => precedence::POSTFIX,
        ExprKind::Call { .. } | ExprKind::New { .. } | ExprKind::Member { .. } => {
            precedence::CALL
        }
        ExprKind::Literal(_)
        | ExprKind::Template { .. }
        | ExprKind::Ident(_)
        | ExprKind::This
        | ExprKind::Super
        | ExprKind::Array(_)
        | ExprKind::Object(_)
        | ExprKind::Function(_)
        | ExprKind::Class(_) => precedence::PRIMARY,
    }
}

/// The leftmost token of `expr` when printed without parentheses.
fn leftmost(expr: &Expr) -> &Expr {
    match &expr.kind {
        ExprKind::Call { callee: inner, .. }
        | ExprKind::Member { object: inner, .. }
        | ExprKind::Binary { left: inner, .. }
        | ExprKind::Logical { left: inner, .. }
        | ExprKind::Conditional { test: inner, .. }
        | ExprKind::Update {
            arg: inner,
            prefix: false,
            ..
        } => leftmost(inner),
        ExprKind::Sequence(exprs) => exprs.first().map(leftmost).unwrap_or(expr),
        _ => expr,
    }
}

fn starts_with_brace(expr: &Expr) -> bool {
    match &leftmost(expr).kind {
        ExprKind::Object(_) => true,
        ExprKind::Assign { target, .. } => matches!(**target, Pattern::Object { .. }),
        _ => false,
    }
}

/// Expression statements may not begin with `{`, `function` or `class`.
fn starts_ambiguously(expr: &Expr) -> bool {
    starts_with_brace(expr)
        || matches!(
            leftmost(expr).kind,
            ExprKind::Function(_) | ExprKind::Class(_)
        )
}

fn has_call_in_chain(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Call { .. } => true,
        ExprKind::Member { object, .. } => has_call_in_chain(object),
        _ => false,
    }
}

fn quote(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| format!("{:?}", s))
}

fn escape_template(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '`' => "\\`".to_string(),
            '\\' => "\\\\".to_string(),
            '$' => "\\$".to_string(),
            '\r' => "\\r".to_string(),
            c => c.to_string(),
        })
        .join("")
}
