//! The `livejs` command: run, instrument or explore JavaScript with inline
//! results.
mod cli;
mod config;

pub use cli::Cli;
pub use config::{Config, LogFormat, init_tracing};
