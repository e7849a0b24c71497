pub mod error;
pub mod token;

use error::LexerError;
use nom::Parser;
use nom::error::{Error as NomError, ErrorKind};
use nom::{
    IResult,
    branch::alt,
    bytes::complete::{tag, take, take_until, take_while},
    character::complete::{char, digit0, digit1, multispace0, one_of, satisfy},
    combinator::{opt, recognize},
};
use smol_str::SmolStr;
use token::{Keyword, TemplatePart, Token, TokenKind};

use crate::number::Number;
use crate::range::{Position, Range, Span};

/// Longest punctuators first so that `===` wins over `==` and `=`.
const PUNCTUATORS: &[&str] = &[
    ">>>=", "...", "===", "!==", "**=", "<<=", ">>=", ">>>", "&&=", "||=", "??=", "=>", "==",
    "!=", "<=", ">=", "&&", "||", "??", "?.", "++", "--", "+=", "-=", "*=", "/=", "%=", "&=",
    "|=", "^=", "**", "<<", ">>", "+", "-", "*", "/", "%", "<", ">", "=", "!", "~", "&", "|",
    "^", "?", ":", ".", ",", ";", "(", ")", "[", "]", "{", "}",
];

#[derive(Debug, Default)]
pub struct Lexer;

impl Lexer {
    pub fn new() -> Self {
        Self
    }

    pub fn tokenize(&self, input: &str) -> Result<Vec<Token>, LexerError> {
        let mut span = Span::new(input);
        let mut tokens = Vec::with_capacity(input.len() / 3);
        let mut newline_before = false;

        if input.starts_with("#!") {
            let (rest, _) = hashbang(span).map_err(|_| LexerError::UnexpectedEOFDetected)?;
            span = rest;
        }

        loop {
            let (rest, spaces) = multispace0::<Span, NomError<Span>>(span)
                .map_err(|_| LexerError::UnexpectedEOFDetected)?;
            newline_before |= spaces.fragment().contains('\n');

            if rest.fragment().is_empty() {
                tokens.push(Token {
                    range: rest.into(),
                    kind: TokenKind::Eof,
                    newline_before,
                });
                return Ok(tokens);
            }

            match token(rest) {
                Ok((next, token)) => {
                    let is_comment = matches!(token.kind, TokenKind::Comment(..));
                    let spans_lines = token.range.start.line != token.range.end.line;

                    tokens.push(Token {
                        newline_before,
                        ..token
                    });

                    newline_before = is_comment && (newline_before || spans_lines);
                    span = next;
                }
                Err(nom::Err::Failure(e)) | Err(nom::Err::Error(e)) => {
                    let token = Token {
                        range: e.input.into(),
                        kind: TokenKind::Eof,
                        newline_before,
                    };
                    return Err(match e.code {
                        ErrorKind::Char => LexerError::UnterminatedString(token),
                        ErrorKind::TakeUntil => LexerError::UnterminatedTemplate(token),
                        _ => LexerError::UnexpectedToken(token),
                    });
                }
                Err(nom::Err::Incomplete(_)) => return Err(LexerError::UnexpectedEOFDetected),
            }
        }
    }
}

fn range_between(start: Span, end: Span) -> Range {
    Range {
        start: start.into(),
        end: end.into(),
    }
}

/// Position of `byte_index` inside `text`, where `text` starts at `start`.
fn position_at(start: Position, text: &str, byte_index: usize) -> Position {
    let prefix = &text[..byte_index];
    match prefix.rfind('\n') {
        Some(newline) => Position {
            line: start.line + prefix.matches('\n').count() as u32,
            column: prefix[newline + 1..].chars().count() + 1,
        },
        None => Position {
            line: start.line,
            column: start.column + prefix.chars().count(),
        },
    }
}

fn hashbang(input: Span) -> IResult<Span, Span> {
    recognize((tag("#!"), take_while(|c| c != '\n'))).parse(input)
}

fn line_comment(input: Span) -> IResult<Span, Token> {
    let (rest, _) = tag("//").parse(input)?;
    let (rest, text) = take_while(|c| c != '\n' && c != '\r').parse(rest)?;

    Ok((
        rest,
        Token {
            range: range_between(input, rest),
            kind: TokenKind::Comment(text.fragment().to_string(), false),
            newline_before: false,
        },
    ))
}

fn block_comment(input: Span) -> IResult<Span, Token> {
    let (rest, _) = tag("/*").parse(input)?;
    let (rest, text) = take_until("*/")
        .parse(rest)
        .map_err(|_: nom::Err<NomError<Span>>| nom::Err::Failure(NomError::new(input, ErrorKind::Tag)))?;
    let (rest, _) = tag("*/").parse(rest)?;

    Ok((
        rest,
        Token {
            range: range_between(input, rest),
            kind: TokenKind::Comment(text.fragment().to_string(), true),
            newline_before: false,
        },
    ))
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_part(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

fn ident(input: Span) -> IResult<Span, Token> {
    let (rest, span) = recognize((satisfy(is_ident_start), take_while(is_ident_part))).parse(input)?;
    let kind = match *span.fragment() {
        "true" => TokenKind::BoolLiteral(true),
        "false" => TokenKind::BoolLiteral(false),
        word => Keyword::from_ident(word)
            .map(TokenKind::Keyword)
            .unwrap_or_else(|| TokenKind::Ident(SmolStr::new(word))),
    };

    Ok((
        rest,
        Token {
            range: span.into(),
            kind,
            newline_before: false,
        },
    ))
}

fn exponent(input: Span) -> IResult<Span, Span> {
    recognize((one_of("eE"), opt(one_of("+-")), digit1)).parse(input)
}

fn bigint_digits(input: Span) -> IResult<Span, Span> {
    let (rest, digits) =
        recognize((digit1, take_while(|c: char| c == '_' || c.is_ascii_digit()))).parse(input)?;
    let (rest, _) = char('n').parse(rest)?;
    Ok((rest, digits))
}

fn radix_digits(input: Span) -> IResult<Span, Span> {
    recognize((
        char('0'),
        one_of("xXoObB"),
        take_while(|c: char| c.is_ascii_hexdigit() || c == '_'),
    ))
    .parse(input)
}

fn number_literal(input: Span) -> IResult<Span, Token> {
    if let Ok((rest, digits)) = bigint_digits(input) {
        return Ok((
            rest,
            Token {
                range: range_between(input, rest),
                kind: TokenKind::BigIntLiteral(SmolStr::new(digits.fragment().replace('_', ""))),
                newline_before: false,
            },
        ));
    }

    if let Ok((rest, span)) = radix_digits(input) {
        let text = span.fragment().replace('_', "");
        let radix = match &text[1..2] {
            "x" | "X" => 16,
            "o" | "O" => 8,
            _ => 2,
        };
        let value = u64::from_str_radix(&text[2..], radix)
            .map_err(|_| nom::Err::Error(NomError::new(input, ErrorKind::Digit)))?;

        return Ok((
            rest,
            Token {
                range: span.into(),
                kind: TokenKind::NumberLiteral(Number::from(value as f64)),
                newline_before: false,
            },
        ));
    }

    let (rest, span) = alt((
        recognize((digit1, opt((char('.'), digit0)), opt(exponent))),
        recognize((char('.'), digit1, opt(exponent))),
    ))
    .parse(input)?;
    let value = span
        .fragment()
        .parse::<f64>()
        .map_err(|_| nom::Err::Error(NomError::new(input, ErrorKind::Float)))?;

    Ok((
        rest,
        Token {
            range: span.into(),
            kind: TokenKind::NumberLiteral(Number::new(value)),
            newline_before: false,
        },
    ))
}

/// Reads the escape sequence following a backslash, returning the decoded
/// character (if any) and the number of bytes consumed after the backslash.
fn escape_sequence(text: &str) -> Option<(Option<char>, usize)> {
    let mut chars = text.chars();
    let c = chars.next()?;

    let decoded = match c {
        'n' => Some('\n'),
        't' => Some('\t'),
        'r' => Some('\r'),
        'b' => Some('\u{8}'),
        'f' => Some('\u{c}'),
        'v' => Some('\u{b}'),
        '0' => Some('\0'),
        '\n' => None,
        'x' => {
            let hex = text.get(1..3)?;
            let code = u32::from_str_radix(hex, 16).ok()?;
            return Some((char::from_u32(code), 3));
        }
        'u' if text[1..].starts_with('{') => {
            let close = text.find('}')?;
            let code = u32::from_str_radix(&text[2..close], 16).ok()?;
            return Some((char::from_u32(code), close + 1));
        }
        'u' => {
            let hex = text.get(1..5)?;
            let code = u32::from_str_radix(hex, 16).ok()?;
            return Some((char::from_u32(code), 5));
        }
        other => Some(other),
    };

    Some((decoded, c.len_utf8()))
}

fn string_literal(input: Span) -> IResult<Span, Token> {
    let (rest, quote) = one_of("'\"").parse(input)?;
    let text = *rest.fragment();
    let mut value = String::new();
    let mut index = 0;
    let mut end = None;

    while let Some(c) = text[index..].chars().next() {
        match c {
            c if c == quote => {
                end = Some(index + 1);
                break;
            }
            '\\' => {
                let (decoded, consumed) = escape_sequence(&text[index + 1..])
                    .ok_or_else(|| nom::Err::Failure(NomError::new(input, ErrorKind::Char)))?;
                value.extend(decoded);
                index += 1 + consumed;
            }
            '\n' => break,
            c => {
                value.push(c);
                index += c.len_utf8();
            }
        }
    }

    let end = end.ok_or_else(|| nom::Err::Failure(NomError::new(input, ErrorKind::Char)))?;
    let (rest, _) = take(end).parse(rest)?;

    Ok((
        rest,
        Token {
            range: range_between(input, rest),
            kind: TokenKind::StringLiteral(value),
            newline_before: false,
        },
    ))
}

/// Byte length of a `${…}` substitution body, up to (not including) its `}`.
fn substitution_length(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if let Some(q) = quote {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                c if c == q => quote = None,
                _ => {}
            }
            continue;
        }

        match c {
            '\'' | '"' | '`' => quote = Some(c),
            '{' => depth += 1,
            '}' if depth == 0 => return Some(i),
            '}' => depth -= 1,
            _ => {}
        }
    }

    None
}

fn template_literal(input: Span) -> IResult<Span, Token> {
    let (rest, _) = char('`').parse(input)?;
    let start: Position = rest.into();
    let text = *rest.fragment();
    let unterminated = || nom::Err::Failure(NomError::new(input, ErrorKind::TakeUntil));
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut index = 0;

    loop {
        let c = text[index..].chars().next().ok_or_else(unterminated)?;
        match c {
            '`' => {
                parts.push(TemplatePart::Text(std::mem::take(&mut current)));
                index += 1;
                break;
            }
            '\\' => {
                let (decoded, consumed) =
                    escape_sequence(&text[index + 1..]).ok_or_else(unterminated)?;
                current.extend(decoded);
                index += 1 + consumed;
            }
            '$' if text[index..].starts_with("${") => {
                parts.push(TemplatePart::Text(std::mem::take(&mut current)));
                let body_start = index + 2;
                let length = substitution_length(&text[body_start..]).ok_or_else(unterminated)?;
                parts.push(TemplatePart::Substitution(
                    text[body_start..body_start + length].to_string(),
                    position_at(start, text, body_start),
                ));
                index = body_start + length + 1;
            }
            c => {
                current.push(c);
                index += c.len_utf8();
            }
        }
    }

    let (rest, _) = take(index).parse(rest)?;

    Ok((
        rest,
        Token {
            range: range_between(input, rest),
            kind: TokenKind::Template(parts),
            newline_before: false,
        },
    ))
}

fn punctuator(input: Span) -> IResult<Span, Token> {
    for punct in PUNCTUATORS {
        let Ok((rest, span)) = tag::<&str, Span, NomError<Span>>(*punct).parse(input) else {
            continue;
        };

        // `a?.5:b` is a conditional, not optional chaining.
        if *punct == "?." && rest.fragment().starts_with(|c: char| c.is_ascii_digit()) {
            continue;
        }

        let kind = match *punct {
            "(" => TokenKind::LParen,
            ")" => TokenKind::RParen,
            "[" => TokenKind::LBracket,
            "]" => TokenKind::RBracket,
            "{" => TokenKind::LBrace,
            "}" => TokenKind::RBrace,
            ";" => TokenKind::SemiColon,
            "," => TokenKind::Comma,
            ":" => TokenKind::Colon,
            "." => TokenKind::Dot,
            "..." => TokenKind::Ellipsis,
            "?" => TokenKind::Question,
            "?." => TokenKind::QuestionDot,
            "=>" => TokenKind::Arrow,
            op => TokenKind::Operator(op),
        };

        return Ok((
            rest,
            Token {
                range: span.into(),
                kind,
                newline_before: false,
            },
        ));
    }

    Err(nom::Err::Error(NomError::new(input, ErrorKind::Tag)))
}

fn token(input: Span) -> IResult<Span, Token> {
    alt((
        line_comment,
        block_comment,
        template_literal,
        string_literal,
        number_literal,
        ident,
        punctuator,
    ))
    .parse(input)
}
