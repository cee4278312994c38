//! Error types for smoke

use thiserror::Error;

/// Result type alias using smoke Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the engine itself.
///
/// Failures inside user test and scaffold functions never surface as an
/// `Error`; they are recorded by the [`Reporter`](crate::Reporter) instead.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid test pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Test spec parse error: {0}")]
    SpecParse(String),

    #[error("Invalid include path {index}: {reason}")]
    InvalidInclude { index: usize, reason: String },

    #[error("Prepared tree has no node {0}")]
    UnknownNode(usize),

    #[error("Remote protocol error: {0}")]
    Protocol(String),

    #[error("Remote session error: {0}")]
    Session(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
