use nom_locate::LocatedSpan;
use serde::{Deserialize, Serialize};

pub type Span<'a> = LocatedSpan<&'a str>;

#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Clone, Copy, Hash, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub column: usize,
}

impl Default for Position {
    fn default() -> Self {
        Position { line: 1, column: 1 }
    }
}

impl Position {
    pub fn new(line: u32, column: usize) -> Self {
        Position { line, column }
    }

    /// Re-bases a position produced by a nested lexer run onto `origin`.
    pub fn shifted(&self, origin: &Position) -> Position {
        if self.line == 1 {
            Position {
                line: origin.line,
                column: origin.column + self.column - 1,
            }
        } else {
            Position {
                line: origin.line + self.line - 1,
                column: self.column,
            }
        }
    }
}

#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Clone, Copy, Default, Hash, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    pub fn new(start: Position, end: Position) -> Self {
        Range { start, end }
    }

    pub fn contains(&self, position: &Position) -> bool {
        self.start <= *position && *position <= self.end
    }

    pub fn to(&self, other: &Range) -> Range {
        Range {
            start: self.start,
            end: other.end,
        }
    }
}

impl<'a> From<Span<'a>> for Range {
    fn from(span: Span<'a>) -> Self {
        let start = Position::from(span);
        let fragment = span.fragment();
        let newlines = fragment.matches('\n').count() as u32;
        let end = if newlines == 0 {
            Position {
                line: start.line,
                column: start.column + fragment.chars().count(),
            }
        } else {
            let last_line = fragment.rsplit('\n').next().unwrap_or_default();
            Position {
                line: start.line + newlines,
                column: last_line.chars().count() + 1,
            }
        };

        Range { start, end }
    }
}

impl<'a> From<Span<'a>> for Position {
    fn from(span: Span<'a>) -> Self {
        Position {
            line: span.location_line(),
            column: span.get_utf8_column(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Position::new(1, 1), true)]
    #[case(Position::new(2, 4), true)]
    #[case(Position::new(3, 2), true)]
    #[case(Position::new(3, 3), false)]
    #[case(Position::new(0, 9), false)]
    fn test_contains(#[case] position: Position, #[case] expected: bool) {
        let range = Range::new(Position::new(1, 1), Position::new(3, 2));
        assert_eq!(range.contains(&position), expected);
    }

    #[rstest]
    #[case(Position::new(1, 3), Position::new(4, 7), Position::new(4, 9))]
    #[case(Position::new(2, 3), Position::new(4, 7), Position::new(5, 3))]
    fn test_shifted(#[case] position: Position, #[case] origin: Position, #[case] expected: Position) {
        assert_eq!(position.shifted(&origin), expected);
    }

    #[test]
    fn test_from_multiline_span() {
        let span = Span::new("/* a\n  b */");
        let range: Range = span.into();
        assert_eq!(range.start, Position::new(1, 1));
        assert_eq!(range.end, Position::new(2, 7));
    }
}
