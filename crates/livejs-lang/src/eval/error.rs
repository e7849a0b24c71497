use std::fmt::{self, Display, Formatter};

use smol_str::SmolStr;
use thiserror::Error;

use crate::transform::loop_guard::CANCELLED_MESSAGE;

/// A value thrown out of the top level of a program, reduced to text.
#[derive(Debug, Clone, PartialEq)]
pub struct Thrown {
    /// The error's `name` when the thrown value is an error object.
    pub name: Option<SmolStr>,
    pub message: String,
}

impl Thrown {
    pub fn new(name: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            name: name.map(SmolStr::new),
            message: message.into(),
        }
    }

    /// What a user sees for the error: the bare message for plain `Error`s,
    /// `Name: message` for every other error type.
    pub fn content(&self) -> String {
        match self.name.as_deref() {
            None | Some("Error") => self.message.clone(),
            Some(name) if self.message.is_empty() => name.to_string(),
            Some(name) => format!("{}: {}", name, self.message),
        }
    }

    pub fn is_cancellation(&self) -> bool {
        matches!(self.name.as_deref(), None | Some("Error")) && self.message == CANCELLED_MESSAGE
    }
}

impl Display for Thrown {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.content())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("Uncaught {0}")]
    Uncaught(Thrown),
    #[error("SyntaxError: {0}")]
    Syntax(String),
}

impl EvalError {
    /// Text for the single error result of a failed run.
    pub fn content(&self) -> String {
        match self {
            EvalError::Uncaught(thrown) => thrown.content(),
            EvalError::Syntax(message) => format!("SyntaxError: {}", message),
        }
    }

    pub fn is_cancellation(&self) -> bool {
        matches!(self, EvalError::Uncaught(thrown) if thrown.is_cancellation())
    }
}
