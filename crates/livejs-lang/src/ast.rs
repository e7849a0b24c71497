pub mod error;
pub mod node;
pub mod parser;
pub mod printer;
pub mod visit;

pub use node::{Block, Ident, Program};
pub use parser::Parser;
pub use printer::Printer;

use crate::lexer::Lexer;

/// Tokenizes and parses `code` into a [`Program`].
pub fn parse(code: &str) -> Result<Program, crate::error::InnerError> {
    let tokens = Lexer::new().tokenize(code)?;
    Ok(Parser::new(tokens).parse()?)
}

/// Renders `program` back to source text.
pub fn print(program: &Program) -> String {
    Printer::new().print(program)
}
