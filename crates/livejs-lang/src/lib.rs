//! `livejs-lang` instruments JavaScript for live scratchpads and runs it.
//!
//! Source is rewritten so that every top-level expression, console call and
//! `//?` marked value reports to a debug sink, loops are optionally bounded,
//! and the result is cached by content. The bundled interpreter executes the
//! instrumented program and the serializer turns each reported value into a
//! coloured display element.
//!
//! ## Examples
//!
//! ```rs
//! use livejs_lang::{Engine, RunOptions, TransformOptions};
//!
//! let mut engine = Engine::isolated();
//! let (_, results) = engine.evaluate_to_vec("5 + 3", &TransformOptions::default(), RunOptions::default());
//!
//! assert_eq!(results[0].line_number, Some(1));
//! assert_eq!(results[0].element.plain_text(), "8");
//!
//! // Only instrument
//! let output = livejs_lang::transform("console.log(1)", &TransformOptions::default()).unwrap();
//! assert_eq!(output, "__livejs_debug(1, 1);\n");
//! ```
pub mod ast;
pub mod bridge;
pub mod cache;
mod engine;
mod error;
pub mod eval;
mod lexer;
mod number;
mod range;
pub mod serializer;
pub mod transform;

pub use bridge::{ExecutionResult, ResultKind, RunOptions, RunOutcome, RunState};
pub use cache::{CacheConfig, CacheStats, TranspileCache};
pub use engine::{CancellationToken, Engine, RunHandle, WORKER_STACK_SIZE};
pub use error::{Error, InnerError};
pub use eval::{ExecutionHost, Interpreter, error::EvalError};
pub use lexer::Lexer;
pub use lexer::token::{Token, TokenKind};
pub use number::Number;
pub use range::{Position, Range};
pub use serializer::{Color, ColoredElement, Content, flatten, stringify};
pub use transform::{Instrumentation, LogLevel, TransformOptions, transform};

pub type LiveResult<T> = Result<T, Error>;

/// Tokenizes `code`, keeping comments.
#[allow(clippy::result_large_err)]
pub fn tokenize(code: &str) -> LiveResult<Vec<Token>> {
    Lexer::new()
        .tokenize(code)
        .map_err(|err| Error::from_error(code, InnerError::Lexer(err)))
}
