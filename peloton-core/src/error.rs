//! Error types for Peloton tooling

use thiserror::Error;

/// Result type alias for Peloton operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for Peloton operations
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Git error
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Templating configuration or template file error
    #[error("Templating error: {0}")]
    Templating(String),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}
