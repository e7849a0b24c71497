use std::fmt::{self, Display, Formatter};

use smol_str::SmolStr;

use crate::{number::Number, range::Position, range::Range};

#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    /// Cooked text between substitutions.
    Text(String),
    /// Raw source of a `${…}` substitution and where it starts.
    Substitution(String, Position),
}

#[derive(PartialEq, Debug, Clone)]
pub struct Token {
    pub range: Range,
    pub kind: TokenKind,
    /// A line terminator appeared between the previous token and this one.
    pub newline_before: bool,
}

impl Token {
    pub fn is_eof(&self) -> bool {
        matches!(self.kind, TokenKind::Eof)
    }

    pub fn line(&self) -> u32 {
        self.range.start.line
    }
}

#[derive(PartialEq, Debug, Clone, Copy, Eq, Hash)]
pub enum Keyword {
    Await,
    Break,
    Catch,
    Class,
    Const,
    Continue,
    Delete,
    Do,
    Else,
    Extends,
    Finally,
    For,
    Function,
    If,
    In,
    Instanceof,
    Let,
    New,
    Null,
    Return,
    Super,
    This,
    Throw,
    Try,
    Typeof,
    Var,
    Void,
    While,
}

impl Keyword {
    pub fn from_ident(ident: &str) -> Option<Keyword> {
        Some(match ident {
            "await" => Keyword::Await,
            "break" => Keyword::Break,
            "catch" => Keyword::Catch,
            "class" => Keyword::Class,
            "const" => Keyword::Const,
            "continue" => Keyword::Continue,
            "delete" => Keyword::Delete,
            "do" => Keyword::Do,
            "else" => Keyword::Else,
            "extends" => Keyword::Extends,
            "finally" => Keyword::Finally,
            "for" => Keyword::For,
            "function" => Keyword::Function,
            "if" => Keyword::If,
            "in" => Keyword::In,
            "instanceof" => Keyword::Instanceof,
            "let" => Keyword::Let,
            "new" => Keyword::New,
            "null" => Keyword::Null,
            "return" => Keyword::Return,
            "super" => Keyword::Super,
            "this" => Keyword::This,
            "throw" => Keyword::Throw,
            "try" => Keyword::Try,
            "typeof" => Keyword::Typeof,
            "var" => Keyword::Var,
            "void" => Keyword::Void,
            "while" => Keyword::While,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Keyword::Await => "await",
            Keyword::Break => "break",
            Keyword::Catch => "catch",
            Keyword::Class => "class",
            Keyword::Const => "const",
            Keyword::Continue => "continue",
            Keyword::Delete => "delete",
            Keyword::Do => "do",
            Keyword::Else => "else",
            Keyword::Extends => "extends",
            Keyword::Finally => "finally",
            Keyword::For => "for",
            Keyword::Function => "function",
            Keyword::If => "if",
            Keyword::In => "in",
            Keyword::Instanceof => "instanceof",
            Keyword::Let => "let",
            Keyword::New => "new",
            Keyword::Null => "null",
            Keyword::Return => "return",
            Keyword::Super => "super",
            Keyword::This => "this",
            Keyword::Throw => "throw",
            Keyword::Try => "try",
            Keyword::Typeof => "typeof",
            Keyword::Var => "var",
            Keyword::Void => "void",
            Keyword::While => "while",
        }
    }
}

#[derive(PartialEq, Debug, Clone)]
pub enum TokenKind {
    Arrow,
    BigIntLiteral(SmolStr),
    BoolLiteral(bool),
    Colon,
    Comma,
    Comment(String, bool),
    Dot,
    Ellipsis,
    Eof,
    Ident(SmolStr),
    Keyword(Keyword),
    LBrace,
    LBracket,
    LParen,
    NumberLiteral(Number),
    Operator(&'static str),
    Question,
    QuestionDot,
    RBrace,
    RBracket,
    RParen,
    SemiColon,
    StringLiteral(String),
    Template(Vec<TemplatePart>),
}

impl Display for Token {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{}", self.kind)
    }
}

impl Display for TokenKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match &self {
            TokenKind::Arrow => write!(f, "=>"),
            TokenKind::BigIntLiteral(digits) => write!(f, "{}n", digits),
            TokenKind::BoolLiteral(b) => write!(f, "{}", b),
            TokenKind::Colon => write!(f, ":"),
            TokenKind::Comma => write!(f, ","),
            TokenKind::Comment(text, true) => write!(f, "/*{}*/", text),
            TokenKind::Comment(text, false) => write!(f, "//{}", text),
            TokenKind::Dot => write!(f, "."),
            TokenKind::Ellipsis => write!(f, "..."),
            TokenKind::Eof => write!(f, ""),
            TokenKind::Ident(ident) => write!(f, "{}", ident),
            TokenKind::Keyword(keyword) => write!(f, "{}", keyword.as_str()),
            TokenKind::LBrace => write!(f, "{{"),
            TokenKind::LBracket => write!(f, "["),
            TokenKind::LParen => write!(f, "("),
            TokenKind::NumberLiteral(n) => write!(f, "{}", n),
            TokenKind::Operator(op) => write!(f, "{}", op),
            TokenKind::Question => write!(f, "?"),
            TokenKind::QuestionDot => write!(f, "?."),
            TokenKind::RBrace => write!(f, "}}"),
            TokenKind::RBracket => write!(f, "]"),
            TokenKind::RParen => write!(f, ")"),
            TokenKind::SemiColon => write!(f, ";"),
            TokenKind::StringLiteral(s) => write!(f, "{:?}", s),
            TokenKind::Template(_) => write!(f, "`…`"),
        }
    }
}
