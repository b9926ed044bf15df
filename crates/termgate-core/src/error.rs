//! Error types for the termgate core library.

use thiserror::Error;

/// Result type alias using the core [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types shared across the workspace.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error (missing or malformed setting)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Input validation failure, carries a human-readable field message
    #[error("{0}")]
    Validation(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
