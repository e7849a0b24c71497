use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Name of the injected debug sink binding.
pub const DEBUG_SINK: &str = "__livejs_debug";
/// Name of the injected cancellation predicate binding.
pub const CANCEL_PREDICATE: &str = "__livejs_cancelled";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    #[default]
    None,
    Error,
    Warn,
    Info,
    Debug,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::None => "none",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "off" => Ok(LogLevel::None),
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" | "trace" => Ok(LogLevel::Debug),
            _ => Err(format!("invalid log level `{}`", s)),
        }
    }
}

/// Options controlling a single transform call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransformOptions {
    /// Capture stray top-level expressions.
    pub show_top_level_results: bool,
    /// Guard every loop with an iteration ceiling and a cancellation checkpoint.
    pub loop_protection: bool,
    /// Honour `//?` marker comments.
    pub magic_comments: bool,
    /// Report `undefined` values. Read by the bridge, not by the passes.
    pub show_undefined: bool,
    pub internal_log_level: LogLevel,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            show_top_level_results: true,
            loop_protection: false,
            magic_comments: false,
            show_undefined: false,
            internal_log_level: LogLevel::None,
        }
    }
}

impl TransformOptions {
    /// The subset of options that changes the transform output.
    pub fn key(&self) -> OptionsKey {
        OptionsKey {
            internal_log_level: self.internal_log_level,
            loop_protection: self.loop_protection,
            magic_comments: self.magic_comments,
            show_top_level_results: self.show_top_level_results,
        }
    }
}

/// Fields are declared in alphabetical order so that the serialized form is
/// canonical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionsKey {
    pub internal_log_level: LogLevel,
    pub loop_protection: bool,
    pub magic_comments: bool,
    pub show_top_level_results: bool,
}

impl OptionsKey {
    pub fn canonical_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Binding names injected into instrumented programs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instrumentation {
    pub sink: SmolStr,
    pub cancel: SmolStr,
}

impl Default for Instrumentation {
    fn default() -> Self {
        Self {
            sink: SmolStr::new_static(DEBUG_SINK),
            cancel: SmolStr::new_static(CANCEL_PREDICATE),
        }
    }
}
