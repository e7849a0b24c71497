use miette::{Diagnostic, SourceOffset, SourceSpan};

use crate::{
    ast::error::ParseError, cache::error::CacheError, eval::error::EvalError,
    lexer::error::LexerError, range::Range,
};

#[allow(clippy::useless_conversion)]
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum InnerError {
    #[error(transparent)]
    Lexer(#[from] LexerError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Eval(#[from] EvalError),
    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl InnerError {
    fn range(&self) -> Option<Range> {
        match self {
            InnerError::Lexer(err) => err.token().map(|token| token.range),
            InnerError::Parse(ParseError::UnexpectedEOFDetected(_)) => None,
            InnerError::Parse(err) => Some(err.token().range),
            InnerError::Eval(_) | InnerError::Cache(_) => None,
        }
    }

    /// Whether the source ended before the construct being read was complete.
    pub fn is_eof(&self) -> bool {
        matches!(
            self,
            InnerError::Lexer(LexerError::UnexpectedEOFDetected)
                | InnerError::Lexer(LexerError::UnterminatedString(_))
                | InnerError::Lexer(LexerError::UnterminatedTemplate(_))
                | InnerError::Parse(ParseError::UnexpectedEOFDetected(_))
        )
    }
}

/// Represents a high-level error with diagnostic information for the user.
#[derive(PartialEq, Debug, thiserror::Error)]
#[error("{cause}")]
pub struct Error {
    /// The underlying cause of the error.
    pub cause: InnerError,
    /// The source code related to the error.
    pub source_code: String,
    /// The location in the source code for diagnostics.
    pub location: SourceSpan,
}

impl Error {
    pub fn from_error(source_code: impl Into<String>, cause: InnerError) -> Self {
        let source_code = source_code.into();

        let location = match cause.range() {
            Some(range) if !cause.is_eof() => {
                let start = SourceOffset::from_location(
                    &source_code,
                    range.start.line as usize,
                    range.start.column,
                );
                let end = SourceOffset::from_location(
                    &source_code,
                    range.end.line as usize,
                    range.end.column,
                );
                SourceSpan::new(
                    start,
                    std::cmp::max(end.offset().saturating_sub(start.offset()), 1),
                )
            }
            _ if cause.is_eof() => {
                let lines = source_code.lines();
                let line = lines.clone().count().max(1);
                let column = lines.last().map(|line| line.len()).unwrap_or(0) + 1;
                SourceSpan::new(
                    SourceOffset::from_location(&source_code, line, column),
                    1,
                )
            }
            _ => SourceSpan::new(SourceOffset::from_location(&source_code, 1, 1), 1),
        };

        Self {
            cause,
            source_code,
            location,
        }
    }

    /// One-line message used for error results.
    pub fn message(&self) -> String {
        match &self.cause {
            InnerError::Lexer(_) | InnerError::Parse(_) => {
                let (line, column) = self
                    .cause
                    .range()
                    .map(|range| (range.start.line, range.start.column))
                    .unwrap_or_else(|| {
                        let lines = self.source_code.lines();
                        (
                            lines.clone().count().max(1) as u32,
                            lines.last().map(|line| line.len()).unwrap_or(0) + 1,
                        )
                    });
                format!("SyntaxError: {} ({}:{})", self.cause, line, column)
            }
            InnerError::Eval(err) => err.to_string(),
            InnerError::Cache(err) => err.to_string(),
        }
    }
}

impl Diagnostic for Error {
    fn code<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        let c = match &self.cause {
            InnerError::Lexer(LexerError::UnexpectedToken(_)) => "LexerError::UnexpectedToken",
            InnerError::Lexer(LexerError::UnterminatedString(_)) => {
                "LexerError::UnterminatedString"
            }
            InnerError::Lexer(LexerError::UnterminatedTemplate(_)) => {
                "LexerError::UnterminatedTemplate"
            }
            InnerError::Lexer(LexerError::UnexpectedEOFDetected) => {
                "LexerError::UnexpectedEOFDetected"
            }
            InnerError::Parse(ParseError::UnexpectedToken(_)) => "ParseError::UnexpectedToken",
            InnerError::Parse(ParseError::UnexpectedEOFDetected(_)) => {
                "ParseError::UnexpectedEOFDetected"
            }
            InnerError::Parse(ParseError::InvalidAssignmentTarget(_)) => {
                "ParseError::InvalidAssignmentTarget"
            }
            InnerError::Eval(EvalError::Uncaught(_)) => "EvalError::Uncaught",
            InnerError::Eval(EvalError::Syntax(_)) => "EvalError::Syntax",
            InnerError::Cache(CacheError::Io(_)) => "CacheError::Io",
            InnerError::Cache(CacheError::Json(_)) => "CacheError::Json",
            InnerError::Cache(CacheError::VersionMismatch { .. }) => "CacheError::VersionMismatch",
        };

        Some(Box::new(c))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        let msg = match &self.cause {
            InnerError::Lexer(LexerError::UnterminatedString(_))
            | InnerError::Lexer(LexerError::UnterminatedTemplate(_)) => {
                Some("Close the literal with its opening quote.")
            }
            InnerError::Lexer(_) => Some("Check for unexpected or misplaced characters."),
            InnerError::Parse(ParseError::UnexpectedEOFDetected(_)) => Some(
                "Input ended unexpectedly. Check for missing closing brackets or incomplete expressions.",
            ),
            InnerError::Parse(ParseError::InvalidAssignmentTarget(_)) => {
                Some("Only variables, properties and destructuring patterns can be assigned.")
            }
            InnerError::Parse(_) => Some("Check for syntax errors or misplaced tokens."),
            _ => None,
        };

        msg.map(|m| Box::new(m) as Box<dyn std::fmt::Display>)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = miette::LabeledSpan> + '_>> {
        Some(Box::new(std::iter::once(
            miette::LabeledSpan::new_with_span(Some(format!("{}", self.cause)), self.location),
        )))
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        Some(&self.source_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::token::{Token, TokenKind};
    use crate::range::Position;
    use rstest::rstest;

    fn token(line: u32, start: usize, end: usize) -> Token {
        Token {
            range: Range::new(Position::new(line, start), Position::new(line, end)),
            kind: TokenKind::Eof,
            newline_before: false,
        }
    }

    #[rstest]
    #[case::unexpected_token(
        "let x = 1\nlet y = )",
        InnerError::Parse(ParseError::UnexpectedToken(token(2, 9, 10))),
        18,
        1
    )]
    #[case::invalid_target(
        "1 = 2",
        InnerError::Parse(ParseError::InvalidAssignmentTarget(token(1, 3, 4))),
        2,
        1
    )]
    #[case::eof(
        "f(1,\n  2",
        InnerError::Parse(ParseError::UnexpectedEOFDetected(token(2, 4, 4))),
        8,
        1
    )]
    fn test_from_error_location(
        #[case] code: &str,
        #[case] cause: InnerError,
        #[case] offset: usize,
        #[case] len: usize,
    ) {
        let error = Error::from_error(code, cause);
        assert_eq!(error.location, SourceSpan::new(offset.into(), len));
        assert_eq!(error.source_code, code);
    }

    #[test]
    fn test_message_includes_position() {
        let error = Error::from_error(
            "let = 1",
            InnerError::Parse(ParseError::UnexpectedToken(Token {
                range: Range::new(Position::new(1, 5), Position::new(1, 6)),
                kind: TokenKind::Operator("="),
                newline_before: false,
            })),
        );
        assert_eq!(error.message(), "SyntaxError: Unexpected token `=` (1:5)");
    }

    #[test]
    fn test_diagnostic_code() {
        let error = Error::from_error("", InnerError::Lexer(LexerError::UnexpectedEOFDetected));
        assert_eq!(
            error.code().map(|c| c.to_string()),
            Some("LexerError::UnexpectedEOFDetected".to_string())
        );
    }
}
