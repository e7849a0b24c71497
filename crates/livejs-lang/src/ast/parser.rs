use smol_str::SmolStr;

use super::error::ParseError;
use super::node::{
    Arrow, ArrowBody, AssignOp, BinaryOp, Block, CatchClause, Class, ClassMember, Comment,
    CommentKind, Declarator, Expr, ExprKind, ForHead, ForInit, Function, Ident, Literal,
    LogicalOp, MemberProp, MethodKind, Param, Pattern, PatternProp, Program, Prop, PropKey, Stmt,
    StmtKind, UnaryOp, UpdateOp, VarDecl, VarKind,
};
use crate::lexer::Lexer;
use crate::lexer::token::{Keyword, TemplatePart, Token, TokenKind};
use crate::range::{Position, Range};

type Result<T> = std::result::Result<T, ParseError>;

#[derive(Debug, Clone, Copy)]
enum Infix {
    Binary(BinaryOp),
    Logical(LogicalOp),
}

impl Infix {
    fn precedence(&self) -> u8 {
        match self {
            Infix::Binary(op) => op.precedence(),
            Infix::Logical(op) => op.precedence(),
        }
    }
}

pub struct Parser {
    tokens: Vec<Token>,
    comments: Vec<Comment>,
    pos: usize,
    comment_pos: usize,
    last_end: Position,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        let (comments, mut tokens): (Vec<_>, Vec<_>) = tokens
            .into_iter()
            .partition(|token| matches!(token.kind, TokenKind::Comment(..)));

        if !tokens.last().is_some_and(Token::is_eof) {
            let range = tokens.last().map(|token| token.range).unwrap_or_default();
            tokens.push(Token {
                range: Range::new(range.end, range.end),
                kind: TokenKind::Eof,
                newline_before: false,
            });
        }

        let comments = comments
            .into_iter()
            .filter_map(|token| match token.kind {
                TokenKind::Comment(text, is_block) => Some(Comment {
                    kind: if is_block {
                        CommentKind::Block
                    } else {
                        CommentKind::Line
                    },
                    text,
                    range: token.range,
                }),
                _ => None,
            })
            .collect();

        Self {
            tokens,
            comments,
            pos: 0,
            comment_pos: 0,
            last_end: Position::default(),
        }
    }

    pub fn parse(&mut self) -> Result<Program> {
        let body = self.parse_statements(&TokenKind::Eof)?;
        let trailing_comments = self.comments.split_off(self.comment_pos);
        self.comment_pos = self.comments.len();

        Ok(Program {
            body,
            trailing_comments,
        })
    }

    #[inline(always)]
    fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    #[inline(always)]
    fn peek_at(&self, offset: usize) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[(self.pos + offset).min(last)]
    }

    fn next(&mut self) -> Token {
        let token = self.peek().clone();
        if !token.is_eof() {
            self.pos += 1;
            self.last_end = token.range.end;
        }
        token
    }

    #[inline(always)]
    fn is(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }

    #[inline(always)]
    fn is_keyword(&self, keyword: Keyword) -> bool {
        self.peek().kind == TokenKind::Keyword(keyword)
    }

    #[inline(always)]
    fn is_op(&self, op: &str) -> bool {
        matches!(self.peek().kind, TokenKind::Operator(o) if o == op)
    }

    fn is_ident_named(&self, name: &str) -> bool {
        matches!(&self.peek().kind, TokenKind::Ident(ident) if ident == name)
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.is(kind) {
            self.next();
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: Keyword) -> bool {
        self.eat(&TokenKind::Keyword(keyword))
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if self.is_op(op) {
            self.next();
            true
        } else {
            false
        }
    }

    fn unexpected(&self) -> ParseError {
        let token = self.peek().clone();
        if token.is_eof() {
            ParseError::UnexpectedEOFDetected(token)
        } else {
            ParseError::UnexpectedToken(token)
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<Token> {
        if self.is(kind) {
            Ok(self.next())
        } else {
            Err(self.unexpected())
        }
    }

    fn expect_keyword(&mut self, keyword: Keyword) -> Result<Token> {
        self.expect(&TokenKind::Keyword(keyword))
    }

    fn start(&self) -> Position {
        self.peek().range.start
    }

    fn range_from(&self, start: Position) -> Range {
        Range::new(start, self.last_end.max(start))
    }

    fn at_statement_end(&self) -> bool {
        let token = self.peek();
        matches!(
            token.kind,
            TokenKind::SemiColon | TokenKind::RBrace | TokenKind::Eof
        ) || token.newline_before
    }

    /// Automatic semicolon insertion: a newline, `}` or EOF ends a statement.
    fn consume_semicolon(&mut self) -> Result<()> {
        if self.eat(&TokenKind::SemiColon) || self.at_statement_end() {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn take_comments_before(&mut self, position: Position) -> Vec<Comment> {
        let start = self.comment_pos;
        while self
            .comments
            .get(self.comment_pos)
            .is_some_and(|comment| comment.range.start < position)
        {
            self.comment_pos += 1;
        }
        self.comments[start..self.comment_pos].to_vec()
    }

    fn take_trailing_comments(&mut self, end: Position) -> Vec<Comment> {
        let next_start = self.peek().range.start;
        let start = self.comment_pos;
        while self.comments.get(self.comment_pos).is_some_and(|comment| {
            comment.range.start.line == end.line
                && comment.range.start >= end
                && (self.peek().is_eof() || comment.range.start < next_start)
        }) {
            self.comment_pos += 1;
        }
        self.comments[start..self.comment_pos].to_vec()
    }

    fn parse_statements(&mut self, until: &TokenKind) -> Result<Block> {
        let mut body = Vec::new();

        while !self.is(until) {
            if self.peek().is_eof() {
                return Err(self.unexpected());
            }

            let leading_comments = self.take_comments_before(self.start());
            let mut stmt = self.parse_statement()?;
            stmt.leading_comments = leading_comments;
            stmt.trailing_comments = self.take_trailing_comments(stmt.range.end);
            body.push(stmt);
        }

        Ok(body)
    }

    /// The body of an `if`, loop or label. A same-line comment after a
    /// braceless body belongs to the body, not to the enclosing statement.
    fn parse_body_statement(&mut self) -> Result<Box<Stmt>> {
        let mut stmt = self.parse_statement()?;
        if !matches!(stmt.kind, StmtKind::Block(_)) {
            stmt.trailing_comments = self.take_trailing_comments(stmt.range.end);
        }
        Ok(Box::new(stmt))
    }

    fn parse_block(&mut self) -> Result<Block> {
        self.expect(&TokenKind::LBrace)?;
        let body = self.parse_statements(&TokenKind::RBrace)?;
        // Dangling comments before `}` have no statement to attach to.
        self.take_comments_before(self.start());
        self.expect(&TokenKind::RBrace)?;
        Ok(body)
    }

    fn parse_statement(&mut self) -> Result<Stmt> {
        let start = self.start();
        let kind = self.peek().kind.clone();

        let kind = match &kind {
            TokenKind::LBrace => StmtKind::Block(self.parse_block()?),
            TokenKind::SemiColon => {
                self.next();
                StmtKind::Empty
            }
            TokenKind::Keyword(Keyword::Var | Keyword::Let | Keyword::Const) => {
                let decl = self.parse_var_decl(false)?;
                self.consume_semicolon()?;
                StmtKind::Var(decl)
            }
            TokenKind::Keyword(Keyword::Function) => {
                StmtKind::Function(self.parse_function(false, true)?)
            }
            TokenKind::Ident(name) if name == "async" && self.async_function_follows() => {
                self.next();
                StmtKind::Function(self.parse_function(true, true)?)
            }
            TokenKind::Keyword(Keyword::Class) => StmtKind::Class(self.parse_class(true)?),
            TokenKind::Keyword(Keyword::If) => self.parse_if()?,
            TokenKind::Keyword(Keyword::For) => self.parse_for()?,
            TokenKind::Keyword(Keyword::While) => {
                self.next();
                let test = self.parse_paren_expression()?;
                let body = self.parse_body_statement()?;
                StmtKind::While { test, body }
            }
            TokenKind::Keyword(Keyword::Do) => {
                self.next();
                let body = self.parse_body_statement()?;
                self.expect_keyword(Keyword::While)?;
                let test = self.parse_paren_expression()?;
                self.eat(&TokenKind::SemiColon);
                StmtKind::DoWhile { body, test }
            }
            TokenKind::Keyword(Keyword::Return) => {
                self.next();
                let arg = if self.at_statement_end() {
                    None
                } else {
                    Some(self.parse_expression(false)?)
                };
                self.consume_semicolon()?;
                StmtKind::Return(arg)
            }
            TokenKind::Keyword(keyword @ (Keyword::Break | Keyword::Continue)) => {
                self.next();
                let label = match &self.peek().kind {
                    TokenKind::Ident(label) if !self.peek().newline_before => {
                        let label = label.clone();
                        self.next();
                        Some(label)
                    }
                    _ => None,
                };
                self.consume_semicolon()?;
                if *keyword == Keyword::Break {
                    StmtKind::Break(label)
                } else {
                    StmtKind::Continue(label)
                }
            }
            TokenKind::Keyword(Keyword::Throw) => {
                self.next();
                if self.peek().newline_before {
                    return Err(self.unexpected());
                }
                let arg = self.parse_expression(false)?;
                self.consume_semicolon()?;
                StmtKind::Throw(arg)
            }
            TokenKind::Keyword(Keyword::Try) => self.parse_try()?,
            TokenKind::Ident(label) if self.peek_at(1).kind == TokenKind::Colon => {
                self.next();
                self.next();
                let body = self.parse_body_statement()?;
                StmtKind::Labeled {
                    label: label.clone(),
                    body,
                }
            }
            _ => {
                let expr = self.parse_expression(false)?;
                self.consume_semicolon()?;
                StmtKind::Expr(expr)
            }
        };

        Ok(Stmt::new(kind, self.range_from(start)))
    }

    fn async_function_follows(&self) -> bool {
        let next = self.peek_at(1);
        next.kind == TokenKind::Keyword(Keyword::Function) && !next.newline_before
    }

    fn parse_paren_expression(&mut self) -> Result<Expr> {
        self.expect(&TokenKind::LParen)?;
        let expr = self.parse_expression(false)?;
        self.expect(&TokenKind::RParen)?;
        Ok(expr)
    }

    fn parse_var_kind(&mut self) -> Result<VarKind> {
        let kind = match self.peek().kind {
            TokenKind::Keyword(Keyword::Var) => VarKind::Var,
            TokenKind::Keyword(Keyword::Let) => VarKind::Let,
            TokenKind::Keyword(Keyword::Const) => VarKind::Const,
            _ => return Err(self.unexpected()),
        };
        self.next();
        Ok(kind)
    }

    fn parse_declarators(&mut self, first: Pattern, no_in: bool) -> Result<Vec<Declarator>> {
        let mut target = first;
        let mut declarators = Vec::new();

        loop {
            let init = if self.eat_op("=") {
                Some(self.parse_assignment(no_in)?)
            } else {
                None
            };
            declarators.push(Declarator { target, init });

            if !self.eat(&TokenKind::Comma) {
                break;
            }
            target = self.parse_binding_target()?;
        }

        Ok(declarators)
    }

    fn parse_var_decl(&mut self, no_in: bool) -> Result<VarDecl> {
        let kind = self.parse_var_kind()?;
        let first = self.parse_binding_target()?;
        let declarators = self.parse_declarators(first, no_in)?;
        Ok(VarDecl { kind, declarators })
    }

    fn parse_if(&mut self) -> Result<StmtKind> {
        self.expect_keyword(Keyword::If)?;
        let test = self.parse_paren_expression()?;
        let consequent = self.parse_body_statement()?;
        let alternate = if self.eat_keyword(Keyword::Else) {
            Some(self.parse_body_statement()?)
        } else {
            None
        };

        Ok(StmtKind::If {
            test,
            consequent,
            alternate,
        })
    }

    fn is_for_in_or_of(&self) -> bool {
        self.is_keyword(Keyword::In) || self.is_ident_named("of")
    }

    fn parse_for(&mut self) -> Result<StmtKind> {
        self.expect_keyword(Keyword::For)?;
        self.expect(&TokenKind::LParen)?;

        let init = match self.peek().kind {
            TokenKind::SemiColon => None,
            TokenKind::Keyword(Keyword::Var | Keyword::Let | Keyword::Const) => {
                let kind = self.parse_var_kind()?;
                let target = self.parse_binding_target()?;
                if self.is_for_in_or_of() {
                    return self.parse_for_in_of(ForHead::Var(kind, target));
                }
                let declarators = self.parse_declarators(target, true)?;
                Some(ForInit::Var(VarDecl { kind, declarators }))
            }
            _ => {
                let expr = self.parse_expression(true)?;
                if self.is_for_in_or_of() {
                    let token = self.peek().clone();
                    let pattern = Self::expr_to_pattern(expr, &token, true)?;
                    return self.parse_for_in_of(ForHead::Pattern(pattern));
                }
                Some(ForInit::Expr(expr))
            }
        };

        self.expect(&TokenKind::SemiColon)?;
        let test = if self.is(&TokenKind::SemiColon) {
            None
        } else {
            Some(self.parse_expression(false)?)
        };
        self.expect(&TokenKind::SemiColon)?;
        let update = if self.is(&TokenKind::RParen) {
            None
        } else {
            Some(self.parse_expression(false)?)
        };
        self.expect(&TokenKind::RParen)?;
        let body = self.parse_body_statement()?;

        Ok(StmtKind::For {
            init,
            test,
            update,
            body,
        })
    }

    fn parse_for_in_of(&mut self, left: ForHead) -> Result<StmtKind> {
        let is_of = self.is_ident_named("of");
        self.next();
        let right = if is_of {
            self.parse_assignment(false)?
        } else {
            self.parse_expression(false)?
        };
        self.expect(&TokenKind::RParen)?;
        let body = self.parse_body_statement()?;

        Ok(if is_of {
            StmtKind::ForOf { left, right, body }
        } else {
            StmtKind::ForIn { left, right, body }
        })
    }

    fn parse_try(&mut self) -> Result<StmtKind> {
        self.expect_keyword(Keyword::Try)?;
        let block = self.parse_block()?;

        let handler = if self.eat_keyword(Keyword::Catch) {
            let param = if self.eat(&TokenKind::LParen) {
                let param = self.parse_binding_target()?;
                self.expect(&TokenKind::RParen)?;
                Some(param)
            } else {
                None
            };
            Some(CatchClause {
                param,
                body: self.parse_block()?,
            })
        } else {
            None
        };

        let finalizer = if self.eat_keyword(Keyword::Finally) {
            Some(self.parse_block()?)
        } else {
            None
        };

        if handler.is_none() && finalizer.is_none() {
            return Err(self.unexpected());
        }

        Ok(StmtKind::Try {
            block,
            handler,
            finalizer,
        })
    }

    fn parse_function(&mut self, is_async: bool, require_name: bool) -> Result<Function> {
        self.expect_keyword(Keyword::Function)?;

        let name = match &self.peek().kind {
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.next();
                Some(name)
            }
            _ if require_name => return Err(self.unexpected()),
            _ => None,
        };

        let params = self.parse_params()?;
        let body = self.parse_block()?;

        Ok(Function {
            name,
            params,
            body,
            is_async,
        })
    }

    fn parse_params(&mut self) -> Result<Vec<Param>> {
        self.expect(&TokenKind::LParen)?;
        let mut params = Vec::new();

        while !self.is(&TokenKind::RParen) {
            if self.eat(&TokenKind::Ellipsis) {
                params.push(Param {
                    pattern: self.parse_binding_target()?,
                    rest: true,
                });
                break;
            }

            params.push(Param {
                pattern: self.parse_binding_element()?,
                rest: false,
            });

            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }

        self.expect(&TokenKind::RParen)?;
        Ok(params)
    }

    fn parse_binding_element(&mut self) -> Result<Pattern> {
        let target = self.parse_binding_target()?;
        if self.eat_op("=") {
            let value = self.parse_assignment(false)?;
            Ok(Pattern::Default {
                target: Box::new(target),
                value: Box::new(value),
            })
        } else {
            Ok(target)
        }
    }

    fn parse_binding_target(&mut self) -> Result<Pattern> {
        match &self.peek().kind {
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.next();
                Ok(Pattern::Ident(name))
            }
            TokenKind::LBrace => {
                self.next();
                let mut props = Vec::new();
                let mut rest = None;

                while !self.is(&TokenKind::RBrace) {
                    if self.eat(&TokenKind::Ellipsis) {
                        rest = Some(Box::new(self.parse_binding_target()?));
                        break;
                    }

                    let key = self.parse_prop_key()?;
                    let value = if self.eat(&TokenKind::Colon) {
                        self.parse_binding_element()?
                    } else {
                        let PropKey::Ident(name) = &key else {
                            return Err(self.unexpected());
                        };
                        let target = Pattern::Ident(name.clone());
                        if self.eat_op("=") {
                            Pattern::Default {
                                target: Box::new(target),
                                value: Box::new(self.parse_assignment(false)?),
                            }
                        } else {
                            target
                        }
                    };
                    props.push(PatternProp { key, value });

                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }

                self.expect(&TokenKind::RBrace)?;
                Ok(Pattern::Object { props, rest })
            }
            TokenKind::LBracket => {
                self.next();
                let mut elements = Vec::new();
                let mut rest = None;

                while !self.is(&TokenKind::RBracket) {
                    if self.eat(&TokenKind::Comma) {
                        elements.push(None);
                        continue;
                    }
                    if self.eat(&TokenKind::Ellipsis) {
                        rest = Some(Box::new(self.parse_binding_target()?));
                        break;
                    }

                    elements.push(Some(self.parse_binding_element()?));

                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }

                self.expect(&TokenKind::RBracket)?;
                Ok(Pattern::Array { elements, rest })
            }
            _ => Err(self.unexpected()),
        }
    }

    fn parse_prop_key(&mut self) -> Result<PropKey> {
        let token = self.next();
        match token.kind {
            TokenKind::Ident(name) => Ok(PropKey::Ident(name)),
            TokenKind::Keyword(keyword) => Ok(PropKey::Ident(SmolStr::new(keyword.as_str()))),
            TokenKind::BoolLiteral(b) => Ok(PropKey::Ident(SmolStr::new(b.to_string()))),
            TokenKind::StringLiteral(s) => Ok(PropKey::String(s)),
            TokenKind::NumberLiteral(n) => Ok(PropKey::Number(n)),
            TokenKind::LBracket => {
                let expr = self.parse_assignment(false)?;
                self.expect(&TokenKind::RBracket)?;
                Ok(PropKey::Computed(Box::new(expr)))
            }
            TokenKind::Eof => Err(ParseError::UnexpectedEOFDetected(token)),
            _ => Err(ParseError::UnexpectedToken(token)),
        }
    }

    fn parse_property_name(&mut self) -> Result<Ident> {
        let token = self.next();
        match token.kind {
            TokenKind::Ident(name) => Ok(name),
            TokenKind::Keyword(keyword) => Ok(SmolStr::new(keyword.as_str())),
            TokenKind::BoolLiteral(b) => Ok(SmolStr::new(b.to_string())),
            TokenKind::Eof => Err(ParseError::UnexpectedEOFDetected(token)),
            _ => Err(ParseError::UnexpectedToken(token)),
        }
    }

    fn parse_class(&mut self, require_name: bool) -> Result<Class> {
        self.expect_keyword(Keyword::Class)?;

        let name = match &self.peek().kind {
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.next();
                Some(name)
            }
            _ if require_name => return Err(self.unexpected()),
            _ => None,
        };

        let super_class = if self.eat_keyword(Keyword::Extends) {
            Some(Box::new(self.parse_lhs()?))
        } else {
            None
        };

        self.expect(&TokenKind::LBrace)?;
        let mut members = Vec::new();

        while !self.is(&TokenKind::RBrace) {
            if self.eat(&TokenKind::SemiColon) {
                continue;
            }

            let is_static = self.is_ident_named("static") && self.modifier_applies();
            if is_static {
                self.next();
            }
            let is_async = self.is_ident_named("async") && self.modifier_applies();
            if is_async {
                self.next();
            }

            let key = self.parse_prop_key()?;

            if self.is(&TokenKind::LParen) {
                let kind = match &key {
                    PropKey::Ident(name) if name == "constructor" && !is_static => {
                        MethodKind::Constructor
                    }
                    _ => MethodKind::Method,
                };
                let params = self.parse_params()?;
                let body = self.parse_block()?;
                members.push(ClassMember::Method {
                    key,
                    kind,
                    function: Function {
                        name: None,
                        params,
                        body,
                        is_async,
                    },
                    is_static,
                });
            } else {
                let value = if self.eat_op("=") {
                    Some(self.parse_assignment(false)?)
                } else {
                    None
                };
                self.consume_semicolon()?;
                members.push(ClassMember::Field {
                    key,
                    value,
                    is_static,
                });
            }
        }

        self.expect(&TokenKind::RBrace)?;

        Ok(Class {
            name,
            super_class,
            members,
        })
    }

    /// `static`/`async` act as modifiers unless they name the member themselves.
    fn modifier_applies(&self) -> bool {
        let next = self.peek_at(1);
        !next.newline_before
            && !matches!(
                next.kind,
                TokenKind::LParen
                    | TokenKind::SemiColon
                    | TokenKind::RBrace
                    | TokenKind::Colon
                    | TokenKind::Comma
                    | TokenKind::Operator("=")
            )
    }

    pub fn parse_expression(&mut self, no_in: bool) -> Result<Expr> {
        let start = self.start();
        let first = self.parse_assignment(no_in)?;

        if !self.is(&TokenKind::Comma) {
            return Ok(first);
        }

        let mut exprs = vec![first];
        while self.eat(&TokenKind::Comma) {
            exprs.push(self.parse_assignment(no_in)?);
        }

        Ok(Expr::new(ExprKind::Sequence(exprs), self.range_from(start)))
    }

    fn parse_assignment(&mut self, no_in: bool) -> Result<Expr> {
        if let Some(arrow) = self.try_parse_arrow()? {
            return Ok(arrow);
        }

        let start = self.start();
        let left = self.parse_conditional(no_in)?;

        let op = match self.peek().kind {
            TokenKind::Operator(op) => AssignOp::from_operator(op),
            _ => None,
        };

        let Some(op) = op else {
            return Ok(left);
        };

        let op_token = self.next();
        let target = Self::expr_to_pattern(left, &op_token, op == AssignOp::Assign)?;
        let value = self.parse_assignment(no_in)?;

        Ok(Expr::new(
            ExprKind::Assign {
                op,
                target: Box::new(target),
                value: Box::new(value),
            },
            self.range_from(start),
        ))
    }

    fn expr_to_pattern(expr: Expr, token: &Token, destructure: bool) -> Result<Pattern> {
        let invalid = || ParseError::InvalidAssignmentTarget(token.clone());

        match expr.kind {
            ExprKind::Ident(name) => Ok(Pattern::Ident(name)),
            ExprKind::Member { .. } => Ok(Pattern::Expr(Box::new(expr))),
            ExprKind::Object(props) if destructure => {
                let mut pattern_props = Vec::with_capacity(props.len());
                let mut rest = None;

                for prop in props {
                    match prop {
                        Prop::KeyValue { key, value } => pattern_props.push(PatternProp {
                            key,
                            value: Self::expr_to_pattern(value, token, true)?,
                        }),
                        Prop::Shorthand(name) => pattern_props.push(PatternProp {
                            key: PropKey::Ident(name.clone()),
                            value: Pattern::Ident(name),
                        }),
                        Prop::Spread(expr) => {
                            rest = Some(Box::new(Self::expr_to_pattern(expr, token, true)?))
                        }
                        Prop::Method { .. } => return Err(invalid()),
                    }
                }

                Ok(Pattern::Object {
                    props: pattern_props,
                    rest,
                })
            }
            ExprKind::Array(elements) if destructure => {
                let mut pattern_elements = Vec::with_capacity(elements.len());
                let mut rest = None;

                for element in elements {
                    match element {
                        Some(Expr {
                            kind: ExprKind::Spread(expr),
                            ..
                        }) => rest = Some(Box::new(Self::expr_to_pattern(*expr, token, true)?)),
                        Some(expr) => {
                            pattern_elements.push(Some(Self::expr_to_pattern(expr, token, true)?))
                        }
                        None => pattern_elements.push(None),
                    }
                }

                Ok(Pattern::Array {
                    elements: pattern_elements,
                    rest,
                })
            }
            ExprKind::Assign {
                op: AssignOp::Assign,
                target,
                value,
            } if destructure => Ok(Pattern::Default { target, value }),
            _ => Err(invalid()),
        }
    }

    fn try_parse_arrow(&mut self) -> Result<Option<Expr>> {
        let start = self.start();
        let is_async = self.is_ident_named("async")
            && !self.peek_at(1).newline_before
            && matches!(
                self.peek_at(1).kind,
                TokenKind::Ident(_) | TokenKind::LParen
            );
        let offset = usize::from(is_async);

        let params = match &self.peek_at(offset).kind {
            TokenKind::Ident(name) if self.peek_at(offset + 1).kind == TokenKind::Arrow => {
                let name = name.clone();
                if is_async {
                    self.next();
                }
                self.next();
                vec![Param {
                    pattern: Pattern::Ident(name),
                    rest: false,
                }]
            }
            TokenKind::LParen if self.arrow_follows_paren(self.pos + offset) => {
                if is_async {
                    self.next();
                }
                self.parse_params()?
            }
            _ => return Ok(None),
        };

        self.expect(&TokenKind::Arrow)?;

        let body = if self.is(&TokenKind::LBrace) {
            ArrowBody::Block(self.parse_block()?)
        } else {
            ArrowBody::Expr(Box::new(self.parse_assignment(false)?))
        };

        Ok(Some(Expr::new(
            ExprKind::Arrow(Box::new(Arrow {
                params,
                body,
                is_async,
            })),
            self.range_from(start),
        )))
    }

    fn arrow_follows_paren(&self, index: usize) -> bool {
        let mut depth = 0usize;

        for (i, token) in self.tokens.iter().enumerate().skip(index) {
            match token.kind {
                TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => depth += 1,
                TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return self
                            .tokens
                            .get(i + 1)
                            .is_some_and(|next| next.kind == TokenKind::Arrow && !next.newline_before);
                    }
                }
                TokenKind::Eof => return false,
                _ => {}
            }
        }

        false
    }

    fn parse_conditional(&mut self, no_in: bool) -> Result<Expr> {
        let start = self.start();
        let test = self.parse_binary(0, no_in)?;

        if !self.eat(&TokenKind::Question) {
            return Ok(test);
        }

        let consequent = self.parse_assignment(false)?;
        self.expect(&TokenKind::Colon)?;
        let alternate = self.parse_assignment(no_in)?;

        Ok(Expr::new(
            ExprKind::Conditional {
                test: Box::new(test),
                consequent: Box::new(consequent),
                alternate: Box::new(alternate),
            },
            self.range_from(start),
        ))
    }

    fn peek_infix(&self, no_in: bool) -> Option<Infix> {
        match self.peek().kind {
            TokenKind::Operator(op) => LogicalOp::from_operator(op)
                .map(Infix::Logical)
                .or_else(|| BinaryOp::from_operator(op).map(Infix::Binary)),
            TokenKind::Keyword(Keyword::In) if !no_in => Some(Infix::Binary(BinaryOp::In)),
            TokenKind::Keyword(Keyword::Instanceof) => Some(Infix::Binary(BinaryOp::InstanceOf)),
            _ => None,
        }
    }

    fn parse_binary(&mut self, min_precedence: u8, no_in: bool) -> Result<Expr> {
        let start = self.start();
        let mut left = self.parse_unary()?;

        while let Some(infix) = self.peek_infix(no_in) {
            let precedence = infix.precedence();
            if precedence < min_precedence {
                break;
            }
            self.next();

            let right = match infix {
                // `**` is right-associative.
                Infix::Binary(BinaryOp::Exp) => self.parse_binary(precedence, no_in)?,
                _ => self.parse_binary(precedence + 1, no_in)?,
            };
            let range = self.range_from(start);

            left = match infix {
                Infix::Binary(op) => Expr::binary(op, left, right, range),
                Infix::Logical(op) => Expr::logical(op, left, right, range),
            };
        }

        Ok(left)
    }

    fn update_target(&self, expr: &Expr) -> Result<()> {
        match expr.kind {
            ExprKind::Ident(_) | ExprKind::Member { .. } => Ok(()),
            _ => Err(ParseError::InvalidAssignmentTarget(self.peek().clone())),
        }
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        let start = self.start();

        let op = match self.peek().kind {
            TokenKind::Operator("-") => Some(UnaryOp::Neg),
            TokenKind::Operator("+") => Some(UnaryOp::Plus),
            TokenKind::Operator("!") => Some(UnaryOp::Not),
            TokenKind::Operator("~") => Some(UnaryOp::BitNot),
            TokenKind::Keyword(Keyword::Typeof) => Some(UnaryOp::Typeof),
            TokenKind::Keyword(Keyword::Void) => Some(UnaryOp::Void),
            TokenKind::Keyword(Keyword::Delete) => Some(UnaryOp::Delete),
            _ => None,
        };

        if let Some(op) = op {
            self.next();
            let arg = self.parse_unary()?;
            return Ok(Expr::unary(op, arg, self.range_from(start)));
        }

        if self.eat_keyword(Keyword::Await) {
            let arg = self.parse_unary()?;
            return Ok(Expr::new(
                ExprKind::Await(Box::new(arg)),
                self.range_from(start),
            ));
        }

        let update = match self.peek().kind {
            TokenKind::Operator("++") => Some(UpdateOp::Increment),
            TokenKind::Operator("--") => Some(UpdateOp::Decrement),
            _ => None,
        };

        if let Some(op) = update {
            self.next();
            let arg = self.parse_unary()?;
            self.update_target(&arg)?;
            return Ok(Expr::new(
                ExprKind::Update {
                    op,
                    prefix: true,
                    arg: Box::new(arg),
                },
                self.range_from(start),
            ));
        }

        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr> {
        let start = self.start();
        let expr = self.parse_lhs()?;

        let op = match self.peek().kind {
            _ if self.peek().newline_before => None,
            TokenKind::Operator("++") => Some(UpdateOp::Increment),
            TokenKind::Operator("--") => Some(UpdateOp::Decrement),
            _ => None,
        };

        match op {
            Some(op) => {
                self.update_target(&expr)?;
                self.next();
                Ok(Expr::new(
                    ExprKind::Update {
                        op,
                        prefix: false,
                        arg: Box::new(expr),
                    },
                    self.range_from(start),
                ))
            }
            None => Ok(expr),
        }
    }

    fn parse_arguments(&mut self) -> Result<Vec<Expr>> {
        self.expect(&TokenKind::LParen)?;
        let mut args = Vec::new();

        while !self.is(&TokenKind::RParen) {
            let start = self.start();
            if self.eat(&TokenKind::Ellipsis) {
                let arg = self.parse_assignment(false)?;
                args.push(Expr::new(
                    ExprKind::Spread(Box::new(arg)),
                    self.range_from(start),
                ));
            } else {
                args.push(self.parse_assignment(false)?);
            }

            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }

        self.expect(&TokenKind::RParen)?;
        Ok(args)
    }

    fn parse_lhs(&mut self) -> Result<Expr> {
        let start = self.start();
        let mut expr = if self.is_keyword(Keyword::New) {
            self.parse_new()?
        } else {
            self.parse_primary()?
        };

        loop {
            expr = match self.peek().kind {
                TokenKind::Dot => {
                    self.next();
                    let name = self.parse_property_name()?;
                    Expr::new(
                        ExprKind::Member {
                            object: Box::new(expr),
                            property: MemberProp::Ident(name),
                            optional: false,
                        },
                        self.range_from(start),
                    )
                }
                TokenKind::QuestionDot => {
                    self.next();
                    match self.peek().kind {
                        TokenKind::LParen => {
                            let args = self.parse_arguments()?;
                            Expr::new(
                                ExprKind::Call {
                                    callee: Box::new(expr),
                                    args,
                                    optional: true,
                                },
                                self.range_from(start),
                            )
                        }
                        TokenKind::LBracket => {
                            self.next();
                            let property = self.parse_expression(false)?;
                            self.expect(&TokenKind::RBracket)?;
                            Expr::new(
                                ExprKind::Member {
                                    object: Box::new(expr),
                                    property: MemberProp::Computed(Box::new(property)),
                                    optional: true,
                                },
                                self.range_from(start),
                            )
                        }
                        _ => {
                            let name = self.parse_property_name()?;
                            Expr::new(
                                ExprKind::Member {
                                    object: Box::new(expr),
                                    property: MemberProp::Ident(name),
                                    optional: true,
                                },
                                self.range_from(start),
                            )
                        }
                    }
                }
                TokenKind::LBracket => {
                    self.next();
                    let property = self.parse_expression(false)?;
                    self.expect(&TokenKind::RBracket)?;
                    Expr::new(
                        ExprKind::Member {
                            object: Box::new(expr),
                            property: MemberProp::Computed(Box::new(property)),
                            optional: false,
                        },
                        self.range_from(start),
                    )
                }
                TokenKind::LParen => {
                    let args = self.parse_arguments()?;
                    Expr::new(
                        ExprKind::Call {
                            callee: Box::new(expr),
                            args,
                            optional: false,
                        },
                        self.range_from(start),
                    )
                }
                _ => break,
            };
        }

        Ok(expr)
    }

    fn parse_new(&mut self) -> Result<Expr> {
        let start = self.start();
        self.expect_keyword(Keyword::New)?;

        let mut callee = if self.is_keyword(Keyword::New) {
            self.parse_new()?
        } else {
            self.parse_primary()?
        };

        loop {
            callee = match self.peek().kind {
                TokenKind::Dot => {
                    self.next();
                    let name = self.parse_property_name()?;
                    Expr::new(
                        ExprKind::Member {
                            object: Box::new(callee),
                            property: MemberProp::Ident(name),
                            optional: false,
                        },
                        self.range_from(start),
                    )
                }
                TokenKind::LBracket => {
                    self.next();
                    let property = self.parse_expression(false)?;
                    self.expect(&TokenKind::RBracket)?;
                    Expr::new(
                        ExprKind::Member {
                            object: Box::new(callee),
                            property: MemberProp::Computed(Box::new(property)),
                            optional: false,
                        },
                        self.range_from(start),
                    )
                }
                _ => break,
            };
        }

        let args = if self.is(&TokenKind::LParen) {
            self.parse_arguments()?
        } else {
            Vec::new()
        };

        Ok(Expr::new(
            ExprKind::New {
                callee: Box::new(callee),
                args,
            },
            self.range_from(start),
        ))
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let token = self.peek().clone();
        let start = token.range.start;

        let kind = match token.kind {
            TokenKind::NumberLiteral(n) => {
                self.next();
                ExprKind::Literal(Literal::Number(n))
            }
            TokenKind::StringLiteral(s) => {
                self.next();
                ExprKind::Literal(Literal::String(s))
            }
            TokenKind::BigIntLiteral(digits) => {
                self.next();
                ExprKind::Literal(Literal::BigInt(digits))
            }
            TokenKind::BoolLiteral(b) => {
                self.next();
                ExprKind::Literal(Literal::Bool(b))
            }
            TokenKind::Keyword(Keyword::Null) => {
                self.next();
                ExprKind::Literal(Literal::Null)
            }
            TokenKind::Keyword(Keyword::This) => {
                self.next();
                ExprKind::This
            }
            TokenKind::Keyword(Keyword::Super) => {
                self.next();
                ExprKind::Super
            }
            TokenKind::Template(ref parts) => {
                self.next();
                self.parse_template(parts.clone(), &token)?
            }
            TokenKind::Ident(name) if name == "async" && self.async_function_follows() => {
                self.next();
                ExprKind::Function(Box::new(self.parse_function(true, false)?))
            }
            TokenKind::Ident(name) => {
                self.next();
                ExprKind::Ident(name)
            }
            TokenKind::Keyword(Keyword::Function) => {
                ExprKind::Function(Box::new(self.parse_function(false, false)?))
            }
            TokenKind::Keyword(Keyword::Class) => {
                ExprKind::Class(Box::new(self.parse_class(false)?))
            }
            TokenKind::LParen => {
                self.next();
                let expr = self.parse_expression(false)?;
                self.expect(&TokenKind::RParen)?;
                return Ok(expr);
            }
            TokenKind::LBracket => self.parse_array()?,
            TokenKind::LBrace => self.parse_object()?,
            TokenKind::Eof => return Err(ParseError::UnexpectedEOFDetected(token)),
            _ => return Err(ParseError::UnexpectedToken(token)),
        };

        Ok(Expr::new(kind, self.range_from(start)))
    }

    fn parse_array(&mut self) -> Result<ExprKind> {
        self.expect(&TokenKind::LBracket)?;
        let mut elements = Vec::new();

        while !self.is(&TokenKind::RBracket) {
            if self.eat(&TokenKind::Comma) {
                elements.push(None);
                continue;
            }

            let start = self.start();
            let element = if self.eat(&TokenKind::Ellipsis) {
                let arg = self.parse_assignment(false)?;
                Expr::new(ExprKind::Spread(Box::new(arg)), self.range_from(start))
            } else {
                self.parse_assignment(false)?
            };
            elements.push(Some(element));

            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }

        self.expect(&TokenKind::RBracket)?;
        Ok(ExprKind::Array(elements))
    }

    fn parse_object(&mut self) -> Result<ExprKind> {
        self.expect(&TokenKind::LBrace)?;
        let mut props = Vec::new();

        while !self.is(&TokenKind::RBrace) {
            if self.eat(&TokenKind::Ellipsis) {
                props.push(Prop::Spread(self.parse_assignment(false)?));
            } else {
                let is_async = self.is_ident_named("async") && self.modifier_applies();
                if is_async {
                    self.next();
                }

                let key = self.parse_prop_key()?;

                if self.is(&TokenKind::LParen) {
                    let params = self.parse_params()?;
                    let body = self.parse_block()?;
                    props.push(Prop::Method {
                        key,
                        function: Function {
                            name: None,
                            params,
                            body,
                            is_async,
                        },
                    });
                } else if self.eat(&TokenKind::Colon) {
                    props.push(Prop::KeyValue {
                        key,
                        value: self.parse_assignment(false)?,
                    });
                } else if let PropKey::Ident(name) = key {
                    if self.is_op("=") {
                        // `{a = 1}` is only meaningful as a destructuring target.
                        let start = self.start();
                        self.next();
                        let value = self.parse_assignment(false)?;
                        let range = self.range_from(start);
                        props.push(Prop::KeyValue {
                            key: PropKey::Ident(name.clone()),
                            value: Expr::new(
                                ExprKind::Assign {
                                    op: AssignOp::Assign,
                                    target: Box::new(Pattern::Ident(name)),
                                    value: Box::new(value),
                                },
                                range,
                            ),
                        });
                    } else {
                        props.push(Prop::Shorthand(name));
                    }
                } else {
                    return Err(self.unexpected());
                }
            }

            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }

        self.expect(&TokenKind::RBrace)?;
        Ok(ExprKind::Object(props))
    }

    fn parse_template(&mut self, parts: Vec<TemplatePart>, token: &Token) -> Result<ExprKind> {
        let mut quasis = Vec::new();
        let mut exprs = Vec::new();

        for part in parts {
            match part {
                TemplatePart::Text(text) => quasis.push(text),
                TemplatePart::Substitution(code, origin) => {
                    let mut tokens = Lexer::new()
                        .tokenize(&code)
                        .map_err(|_| ParseError::UnexpectedToken(token.clone()))?;
                    for token in tokens.iter_mut() {
                        token.range = Range::new(
                            token.range.start.shifted(&origin),
                            token.range.end.shifted(&origin),
                        );
                    }

                    let mut parser = Parser::new(tokens);
                    let expr = parser.parse_expression(false)?;
                    if !parser.peek().is_eof() {
                        return Err(parser.unexpected());
                    }
                    exprs.push(expr);
                }
            }
        }

        Ok(ExprKind::Template { quasis, exprs })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn parse(code: &str) -> Program {
        Parser::new(Lexer::new().tokenize(code).unwrap())
            .parse()
            .unwrap()
    }

    fn first_expr(code: &str) -> Expr {
        match parse(code).body.remove(0).kind {
            StmtKind::Expr(expr) => expr,
            other => panic!("expected an expression statement, got {:?}", other),
        }
    }

    #[rstest]
    #[case::binary("1 + 2 * 3", |expr: &Expr| matches!(
        &expr.kind,
        ExprKind::Binary { op: BinaryOp::Add, right, .. }
            if matches!(right.kind, ExprKind::Binary { op: BinaryOp::Mul, .. })
    ))]
    #[case::exponent_right_assoc("2 ** 3 ** 2", |expr: &Expr| matches!(
        &expr.kind,
        ExprKind::Binary { op: BinaryOp::Exp, right, .. }
            if matches!(right.kind, ExprKind::Binary { op: BinaryOp::Exp, .. })
    ))]
    #[case::logical("a ?? b || c", |expr: &Expr| matches!(
        &expr.kind,
        ExprKind::Logical { op: LogicalOp::Nullish, right, .. }
            if matches!(right.kind, ExprKind::Logical { op: LogicalOp::Or, .. })
    ))]
    #[case::arrow("(a, b) => a + b", |expr: &Expr| matches!(
        &expr.kind,
        ExprKind::Arrow(arrow) if arrow.params.len() == 2 && !arrow.is_async
    ))]
    #[case::async_arrow("async x => await x", |expr: &Expr| matches!(
        &expr.kind,
        ExprKind::Arrow(arrow) if arrow.params.len() == 1 && arrow.is_async
    ))]
    #[case::paren_not_arrow("(a, b)", |expr: &Expr| matches!(&expr.kind, ExprKind::Sequence(exprs) if exprs.len() == 2))]
    #[case::optional_chain("a?.b.c", |expr: &Expr| matches!(
        &expr.kind,
        ExprKind::Member { object, optional: false, .. }
            if matches!(object.kind, ExprKind::Member { optional: true, .. })
    ))]
    #[case::keyword_property("p.then(f).catch(g).finally(h)", |expr: &Expr| expr.member_name().is_none()
        && matches!(&expr.kind, ExprKind::Call { callee, .. } if callee.member_name() == Some("finally")))]
    #[case::new_member("new a.B(1)", |expr: &Expr| matches!(
        &expr.kind,
        ExprKind::New { callee, args } if args.len() == 1 && callee.member_name() == Some("B")
    ))]
    #[case::destructuring_assign("[a, b] = [b, a]", |expr: &Expr| matches!(
        &expr.kind,
        ExprKind::Assign { target, .. } if matches!(**target, Pattern::Array { .. })
    ))]
    #[case::object_literal("({ a, b: 1, [c]: 2, m() {}, ...d })", |expr: &Expr| matches!(
        &expr.kind,
        ExprKind::Object(props) if props.len() == 5
    ))]
    #[case::template("`a${b}c${d}`", |expr: &Expr| matches!(
        &expr.kind,
        ExprKind::Template { quasis, exprs } if quasis.len() == 3 && exprs.len() == 2
    ))]
    #[case::postfix("i++", |expr: &Expr| matches!(&expr.kind, ExprKind::Update { prefix: false, .. }))]
    #[case::await_expr("await fetch(url)", |expr: &Expr| matches!(&expr.kind, ExprKind::Await(_)))]
    fn test_parse_expression(#[case] code: &str, #[case] check: fn(&Expr) -> bool) {
        let expr = first_expr(code);
        assert!(check(&expr), "unexpected tree for {}: {:?}", code, expr);
    }

    #[rstest]
    #[case::var("let x = 1, y", 1)]
    #[case::function("function f(a, b = 2, ...c) { return a }", 1)]
    #[case::async_function("async function f() { await g() }", 1)]
    #[case::class("class A extends B { static x = 1; constructor() { super() } m() {} }", 1)]
    #[case::for_loop("for (let i = 0; i < 10; i++) {}", 1)]
    #[case::for_of("for (const [k, v] of entries) {}", 1)]
    #[case::for_in("for (k in obj) ;", 1)]
    #[case::while_loop("while (true) {}", 1)]
    #[case::do_while("do { x++ } while (x < 3)", 1)]
    #[case::try_catch("try { f() } catch (e) { g(e) } finally { h() }", 1)]
    #[case::labeled("outer: for (;;) { break outer }", 1)]
    #[case::asi("a = 1\nb = 2\nc()", 3)]
    #[case::if_else("if (a) b(); else if (c) d(); else { e() }", 1)]
    fn test_parse_statements(#[case] code: &str, #[case] expected: usize) {
        assert_eq!(parse(code).body.len(), expected);
    }

    #[test]
    fn test_return_asi() {
        let program = parse("function f() {\n  return\n  1\n}");
        let StmtKind::Function(function) = &program.body[0].kind else {
            panic!("expected a function");
        };
        assert_eq!(function.body.len(), 2);
        assert!(matches!(function.body[0].kind, StmtKind::Return(None)));
    }

    #[test]
    fn test_comment_attachment() {
        let program = parse("// header\nx //? note\ny\n// tail");
        assert_eq!(program.body[0].leading_comments.len(), 1);
        assert_eq!(program.body[0].trailing_comments.len(), 1);
        assert!(program.body[0].trailing_comments[0].is_magic());
        assert!(program.body[1].trailing_comments.is_empty());
        assert_eq!(program.trailing_comments.len(), 1);
    }

    #[test]
    fn test_trailing_comment_of_last_statement_on_line() {
        let program = parse("a; b; // c");
        assert!(program.body[0].trailing_comments.is_empty());
        assert_eq!(program.body[1].trailing_comments.len(), 1);
    }

    #[rstest]
    #[case::if_body("if (a) b //?")]
    #[case::else_body("if (a) b\nelse c //?")]
    #[case::for_of_body("for (const v of xs) v //?")]
    #[case::while_body("while (c) x //?")]
    #[case::labeled_body("l: x //?")]
    fn test_trailing_comment_of_braceless_body(#[case] code: &str) {
        let program = parse(code);
        assert!(program.body[0].trailing_comments.is_empty());

        let body = match &program.body[0].kind {
            StmtKind::If {
                alternate: Some(body),
                ..
            } => body,
            StmtKind::If { consequent, .. } => consequent,
            StmtKind::ForOf { body, .. } | StmtKind::While { body, .. } | StmtKind::Labeled { body, .. } => body,
            other => panic!("Unexpected statement {:?}", other),
        };
        assert_eq!(body.trailing_comments.len(), 1);
        assert!(body.trailing_comments[0].is_magic());
    }

    #[test]
    fn test_statement_ranges() {
        let program = parse("let a = 1;\n\n  a + 2");
        assert_eq!(program.body[0].range.start, Position::new(1, 1));
        assert_eq!(program.body[0].range.end, Position::new(1, 11));
        assert_eq!(program.body[1].line(), 3);
    }

    #[test]
    fn test_template_substitution_range() {
        let expr = first_expr("\n`x${ value }`");
        let ExprKind::Template { exprs, .. } = expr.kind else {
            panic!("expected a template");
        };
        assert_eq!(exprs[0].range.start, Position::new(2, 6));
    }

    #[rstest]
    #[case::missing_paren("f(1", true)]
    #[case::unexpected("let = 1", false)]
    #[case::two_expressions("a b", false)]
    fn test_parse_error(#[case] code: &str, #[case] eof: bool) {
        let err = Parser::new(Lexer::new().tokenize(code).unwrap())
            .parse()
            .unwrap_err();
        assert_eq!(matches!(err, ParseError::UnexpectedEOFDetected(_)), eof);
    }

    #[rstest]
    #[case("1 = 2")]
    #[case("a + b = c")]
    #[case("f() += 1")]
    fn test_invalid_assignment_target(#[case] code: &str) {
        let err = Parser::new(Lexer::new().tokenize(code).unwrap())
            .parse()
            .unwrap_err();
        assert!(matches!(err, ParseError::InvalidAssignmentTarget(_)));
    }
}
