//! Error types for GitHub operations

use thiserror::Error;

/// Result type for GitHub operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during GitHub operations
#[derive(Error, Debug)]
pub enum Error {
    /// GitHub REST API error
    #[error("GitHub API error: {0}")]
    Api(#[from] octocrab::Error),

    /// Authentication error
    #[error("GitHub authentication error: {0}")]
    Auth(String),

    /// Transport-level failure talking to the GraphQL endpoint
    #[error("GraphQL request failed: {0}")]
    Http(String),

    /// Errors reported in a GraphQL response
    #[error("GraphQL errors: {0}")]
    GraphQL(String),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// A response lacked something it should always contain
    #[error("Missing field in GraphQL response: {0}")]
    MissingField(String),

    /// Error from the core library (config, git, templating)
    #[error(transparent)]
    Core(#[from] peloton_core::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Parse(err.to_string())
    }
}
