use std::fmt::{self, Display, Formatter};

use smol_str::SmolStr;

use crate::{number::Number, range::Range};

pub type Ident = SmolStr;
pub type Block = Vec<Stmt>;

#[derive(PartialEq, Debug, Clone, Default)]
pub struct Program {
    pub body: Block,
    /// Comments after the last statement.
    pub trailing_comments: Vec<Comment>,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum CommentKind {
    Line,
    Block,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Comment {
    pub kind: CommentKind,
    pub text: String,
    pub range: Range,
}

impl Comment {
    /// A `?` marker comment, e.g. `x //?` or `x /* ? */`.
    pub fn is_magic(&self) -> bool {
        self.text.trim().starts_with('?')
    }
}

impl Display for Comment {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self.kind {
            CommentKind::Line => write!(f, "//{}", self.text),
            CommentKind::Block => write!(f, "/*{}*/", self.text),
        }
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct Stmt {
    pub kind: StmtKind,
    pub range: Range,
    pub leading_comments: Vec<Comment>,
    /// Comments starting on the line the statement ends on.
    pub trailing_comments: Vec<Comment>,
}

impl Stmt {
    pub fn new(kind: StmtKind, range: Range) -> Self {
        Self {
            kind,
            range,
            leading_comments: Vec::new(),
            trailing_comments: Vec::new(),
        }
    }

    pub fn expr(expr: Expr) -> Self {
        let range = expr.range;
        Self::new(StmtKind::Expr(expr), range)
    }

    pub fn block(body: Block, range: Range) -> Self {
        Self::new(StmtKind::Block(body), range)
    }

    pub fn line(&self) -> u32 {
        self.range.start.line
    }

    pub fn is_loop(&self) -> bool {
        matches!(
            self.kind,
            StmtKind::For { .. }
                | StmtKind::ForIn { .. }
                | StmtKind::ForOf { .. }
                | StmtKind::While { .. }
                | StmtKind::DoWhile { .. }
        )
    }
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum VarKind {
    Var,
    Let,
    Const,
}

impl VarKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VarKind::Var => "var",
            VarKind::Let => "let",
            VarKind::Const => "const",
        }
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct VarDecl {
    pub kind: VarKind,
    pub declarators: Vec<Declarator>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Declarator {
    pub target: Pattern,
    pub init: Option<Expr>,
}

#[derive(PartialEq, Debug, Clone)]
pub enum ForInit {
    Var(VarDecl),
    Expr(Expr),
}

#[derive(PartialEq, Debug, Clone)]
pub enum ForHead {
    Var(VarKind, Pattern),
    Pattern(Pattern),
}

#[derive(PartialEq, Debug, Clone)]
pub struct CatchClause {
    pub param: Option<Pattern>,
    pub body: Block,
}

#[derive(PartialEq, Debug, Clone)]
pub enum StmtKind {
    Expr(Expr),
    Var(VarDecl),
    Function(Function),
    Class(Class),
    Block(Block),
    If {
        test: Expr,
        consequent: Box<Stmt>,
        alternate: Option<Box<Stmt>>,
    },
    For {
        init: Option<ForInit>,
        test: Option<Expr>,
        update: Option<Expr>,
        body: Box<Stmt>,
    },
    ForIn {
        left: ForHead,
        right: Expr,
        body: Box<Stmt>,
    },
    ForOf {
        left: ForHead,
        right: Expr,
        body: Box<Stmt>,
    },
    While {
        test: Expr,
        body: Box<Stmt>,
    },
    DoWhile {
        body: Box<Stmt>,
        test: Expr,
    },
    Return(Option<Expr>),
    Break(Option<Ident>),
    Continue(Option<Ident>),
    Throw(Expr),
    Try {
        block: Block,
        handler: Option<CatchClause>,
        finalizer: Option<Block>,
    },
    Labeled {
        label: Ident,
        body: Box<Stmt>,
    },
    Empty,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Param {
    pub pattern: Pattern,
    pub rest: bool,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Function {
    pub name: Option<Ident>,
    pub params: Vec<Param>,
    pub body: Block,
    pub is_async: bool,
}

#[derive(PartialEq, Debug, Clone)]
pub enum ArrowBody {
    Expr(Box<Expr>),
    Block(Block),
}

#[derive(PartialEq, Debug, Clone)]
pub struct Arrow {
    pub params: Vec<Param>,
    pub body: ArrowBody,
    pub is_async: bool,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum MethodKind {
    Constructor,
    Method,
}

#[derive(PartialEq, Debug, Clone)]
pub enum ClassMember {
    Method {
        key: PropKey,
        kind: MethodKind,
        function: Function,
        is_static: bool,
    },
    Field {
        key: PropKey,
        value: Option<Expr>,
        is_static: bool,
    },
}

#[derive(PartialEq, Debug, Clone)]
pub struct Class {
    pub name: Option<Ident>,
    pub super_class: Option<Box<Expr>>,
    pub members: Vec<ClassMember>,
}

#[derive(PartialEq, Debug, Clone)]
pub enum PropKey {
    Ident(Ident),
    String(String),
    Number(Number),
    Computed(Box<Expr>),
}

#[derive(PartialEq, Debug, Clone)]
pub enum Prop {
    KeyValue { key: PropKey, value: Expr },
    Shorthand(Ident),
    Method { key: PropKey, function: Function },
    Spread(Expr),
}

#[derive(PartialEq, Debug, Clone)]
pub struct PatternProp {
    pub key: PropKey,
    pub value: Pattern,
}

#[derive(PartialEq, Debug, Clone)]
pub enum Pattern {
    Ident(Ident),
    Object {
        props: Vec<PatternProp>,
        rest: Option<Box<Pattern>>,
    },
    Array {
        elements: Vec<Option<Pattern>>,
        rest: Option<Box<Pattern>>,
    },
    Default {
        target: Box<Pattern>,
        value: Box<Expr>,
    },
    /// A member expression used as an assignment target.
    Expr(Box<Expr>),
}

impl Pattern {
    /// The bound name of a simple (non-destructuring) pattern.
    pub fn as_ident(&self) -> Option<&Ident> {
        match self {
            Pattern::Ident(name) => Some(name),
            _ => None,
        }
    }

    /// Every identifier bound by the pattern, left to right.
    pub fn bound_names(&self) -> Vec<Ident> {
        let mut names = Vec::new();
        self.collect_names(&mut names);
        names
    }

    fn collect_names(&self, names: &mut Vec<Ident>) {
        match self {
            Pattern::Ident(name) => names.push(name.clone()),
            Pattern::Object { props, rest } => {
                props.iter().for_each(|prop| prop.value.collect_names(names));
                if let Some(rest) = rest {
                    rest.collect_names(names);
                }
            }
            Pattern::Array { elements, rest } => {
                elements
                    .iter()
                    .flatten()
                    .for_each(|element| element.collect_names(names));
                if let Some(rest) = rest {
                    rest.collect_names(names);
                }
            }
            Pattern::Default { target, .. } => target.collect_names(names),
            Pattern::Expr(_) => {}
        }
    }
}

#[derive(PartialEq, Debug, Clone)]
pub enum Literal {
    Number(Number),
    String(String),
    BigInt(SmolStr),
    Bool(bool),
    Null,
}

#[derive(PartialEq, Debug, Clone)]
pub enum MemberProp {
    Ident(Ident),
    Computed(Box<Expr>),
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
    BitNot,
    Typeof,
    Void,
    Delete,
}

impl UnaryOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Plus => "+",
            UnaryOp::Not => "!",
            UnaryOp::BitNot => "~",
            UnaryOp::Typeof => "typeof",
            UnaryOp::Void => "void",
            UnaryOp::Delete => "delete",
        }
    }
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum UpdateOp {
    Increment,
    Decrement,
}

impl UpdateOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateOp::Increment => "++",
            UpdateOp::Decrement => "--",
        }
    }
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Exp,
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Shl,
    Shr,
    UShr,
    BitAnd,
    BitOr,
    BitXor,
    In,
    InstanceOf,
}

impl BinaryOp {
    pub fn from_operator(op: &str) -> Option<BinaryOp> {
        Some(match op {
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Sub,
            "*" => BinaryOp::Mul,
            "/" => BinaryOp::Div,
            "%" => BinaryOp::Mod,
            "**" => BinaryOp::Exp,
            "==" => BinaryOp::Eq,
            "!=" => BinaryOp::NotEq,
            "===" => BinaryOp::StrictEq,
            "!==" => BinaryOp::StrictNotEq,
            "<" => BinaryOp::Lt,
            "<=" => BinaryOp::LtEq,
            ">" => BinaryOp::Gt,
            ">=" => BinaryOp::GtEq,
            "<<" => BinaryOp::Shl,
            ">>" => BinaryOp::Shr,
            ">>>" => BinaryOp::UShr,
            "&" => BinaryOp::BitAnd,
            "|" => BinaryOp::BitOr,
            "^" => BinaryOp::BitXor,
            "in" => BinaryOp::In,
            "instanceof" => BinaryOp::InstanceOf,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Exp => "**",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::StrictEq => "===",
            BinaryOp::StrictNotEq => "!==",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::UShr => ">>>",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::In => "in",
            BinaryOp::InstanceOf => "instanceof",
        }
    }

    pub fn precedence(&self) -> u8 {
        match self {
            BinaryOp::BitOr => 7,
            BinaryOp::BitXor => 8,
            BinaryOp::BitAnd => 9,
            BinaryOp::Eq | BinaryOp::NotEq | BinaryOp::StrictEq | BinaryOp::StrictNotEq => 10,
            BinaryOp::Lt
            | BinaryOp::LtEq
            | BinaryOp::Gt
            | BinaryOp::GtEq
            | BinaryOp::In
            | BinaryOp::InstanceOf => 11,
            BinaryOp::Shl | BinaryOp::Shr | BinaryOp::UShr => 12,
            BinaryOp::Add | BinaryOp::Sub => 13,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => 14,
            BinaryOp::Exp => 15,
        }
    }
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum LogicalOp {
    And,
    Or,
    Nullish,
}

impl LogicalOp {
    pub fn from_operator(op: &str) -> Option<LogicalOp> {
        match op {
            "&&" => Some(LogicalOp::And),
            "||" => Some(LogicalOp::Or),
            "??" => Some(LogicalOp::Nullish),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogicalOp::And => "&&",
            LogicalOp::Or => "||",
            LogicalOp::Nullish => "??",
        }
    }

    pub fn precedence(&self) -> u8 {
        match self {
            LogicalOp::Nullish => 4,
            LogicalOp::Or => 5,
            LogicalOp::And => 6,
        }
    }
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum AssignOp {
    Assign,
    Binary(BinaryOp),
    Logical(LogicalOp),
}

impl AssignOp {
    pub fn from_operator(op: &str) -> Option<AssignOp> {
        if op == "=" {
            return Some(AssignOp::Assign);
        }
        let inner = op.strip_suffix('=')?;
        LogicalOp::from_operator(inner)
            .map(AssignOp::Logical)
            .or_else(|| match BinaryOp::from_operator(inner)? {
                op @ (BinaryOp::Add
                | BinaryOp::Sub
                | BinaryOp::Mul
                | BinaryOp::Div
                | BinaryOp::Mod
                | BinaryOp::Exp
                | BinaryOp::Shl
                | BinaryOp::Shr
                | BinaryOp::UShr
                | BinaryOp::BitAnd
                | BinaryOp::BitOr
                | BinaryOp::BitXor) => Some(AssignOp::Binary(op)),
                _ => None,
            })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AssignOp::Assign => "=",
            AssignOp::Binary(BinaryOp::Add) => "+=",
            AssignOp::Binary(BinaryOp::Sub) => "-=",
            AssignOp::Binary(BinaryOp::Mul) => "*=",
            AssignOp::Binary(BinaryOp::Div) => "/=",
            AssignOp::Binary(BinaryOp::Mod) => "%=",
            AssignOp::Binary(BinaryOp::Exp) => "**=",
            AssignOp::Binary(BinaryOp::Shl) => "<<=",
            AssignOp::Binary(BinaryOp::Shr) => ">>=",
            AssignOp::Binary(BinaryOp::UShr) => ">>>=",
            AssignOp::Binary(BinaryOp::BitAnd) => "&=",
            AssignOp::Binary(BinaryOp::BitOr) => "|=",
            AssignOp::Binary(BinaryOp::BitXor) => "^=",
            AssignOp::Binary(_) => "=",
            AssignOp::Logical(LogicalOp::And) => "&&=",
            AssignOp::Logical(LogicalOp::Or) => "||=",
            AssignOp::Logical(LogicalOp::Nullish) => "??=",
        }
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub range: Range,
}

#[derive(PartialEq, Debug, Clone)]
pub enum ExprKind {
    Literal(Literal),
    Template {
        quasis: Vec<String>,
        exprs: Vec<Expr>,
    },
    Ident(Ident),
    This,
    Super,
    /// `None` marks an elision hole.
    Array(Vec<Option<Expr>>),
    Object(Vec<Prop>),
    Function(Box<Function>),
    Arrow(Box<Arrow>),
    Class(Box<Class>),
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        optional: bool,
    },
    New {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Member {
        object: Box<Expr>,
        property: MemberProp,
        optional: bool,
    },
    Unary {
        op: UnaryOp,
        arg: Box<Expr>,
    },
    Update {
        op: UpdateOp,
        prefix: bool,
        arg: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
    },
    Assign {
        op: AssignOp,
        target: Box<Pattern>,
        value: Box<Expr>,
    },
    Sequence(Vec<Expr>),
    Await(Box<Expr>),
    Spread(Box<Expr>),
}

impl Expr {
    pub fn new(kind: ExprKind, range: Range) -> Self {
        Self { kind, range }
    }

    pub fn ident(name: &str, range: Range) -> Self {
        Self::new(ExprKind::Ident(SmolStr::new(name)), range)
    }

    pub fn number(value: f64, range: Range) -> Self {
        Self::new(ExprKind::Literal(Literal::Number(Number::new(value))), range)
    }

    pub fn string(value: &str, range: Range) -> Self {
        Self::new(ExprKind::Literal(Literal::String(value.to_string())), range)
    }

    pub fn call(callee: Expr, args: Vec<Expr>, range: Range) -> Self {
        Self::new(
            ExprKind::Call {
                callee: Box::new(callee),
                args,
                optional: false,
            },
            range,
        )
    }

    pub fn member(object: Expr, name: &str, range: Range) -> Self {
        Self::new(
            ExprKind::Member {
                object: Box::new(object),
                property: MemberProp::Ident(SmolStr::new(name)),
                optional: false,
            },
            range,
        )
    }

    pub fn unary(op: UnaryOp, arg: Expr, range: Range) -> Self {
        Self::new(ExprKind::Unary { op, arg: Box::new(arg) }, range)
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr, range: Range) -> Self {
        Self::new(
            ExprKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            range,
        )
    }

    pub fn logical(op: LogicalOp, left: Expr, right: Expr, range: Range) -> Self {
        Self::new(
            ExprKind::Logical {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            range,
        )
    }

    pub fn await_(arg: Expr) -> Self {
        let range = arg.range;
        Self::new(ExprKind::Await(Box::new(arg)), range)
    }

    pub fn line(&self) -> u32 {
        self.range.start.line
    }

    pub fn as_ident(&self) -> Option<&Ident> {
        match &self.kind {
            ExprKind::Ident(name) => Some(name),
            _ => None,
        }
    }

    /// `callee(...)` where the callee is the plain identifier `name`.
    pub fn is_call_to(&self, name: &str) -> bool {
        match &self.kind {
            ExprKind::Call { callee, .. } => callee.as_ident().is_some_and(|ident| ident == name),
            _ => false,
        }
    }

    /// `object.<any>` where the object is the plain identifier `object`.
    pub fn is_member_of(&self, object: &str) -> bool {
        match &self.kind {
            ExprKind::Member { object: target, .. } => {
                target.as_ident().is_some_and(|ident| ident == object)
            }
            _ => false,
        }
    }

    /// The statically known property name of a member expression.
    pub fn member_name(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Member {
                property: MemberProp::Ident(name),
                ..
            } => Some(name.as_str()),
            ExprKind::Member {
                property: MemberProp::Computed(property),
                ..
            } => match &property.kind {
                ExprKind::Literal(Literal::String(name)) => Some(name.as_str()),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn is_string_literal(&self) -> bool {
        matches!(self.kind, ExprKind::Literal(Literal::String(_)))
    }
}
