//! An interactive scratchpad for [livejs](https://github.com/livejs/livejs).
//!
//! Each snippet entered is appended to the session script, which is
//! instrumented and re-run as a whole; the values produced by the new
//! snippet are printed next to their line numbers.
//!
//! The REPL supports:
//! - Multi-line input, continued while the snippet is unfinished
//! - History navigation
//! - `:options` to toggle loop protection, magic comments and more
//!
//! ## Example
//!
//! ```rust,no_run
//! use livejs_lang::{Engine, RunOptions, TransformOptions};
//! use livejs_repl::Repl;
//!
//! let repl = Repl::new(Engine::default(), TransformOptions::default(), RunOptions::default());
//! repl.run().unwrap();
//! ```
mod command_context;
pub mod render;
mod repl;

pub use command_context::{Command, CommandContext, CommandOutput};
pub use repl::Repl;
