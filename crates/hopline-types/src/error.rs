//! Shared error types for Hopline.

use thiserror::Error;

/// Top-level error type for Hopline.
#[derive(Error, Debug)]
pub enum HoplineError {
    /// A configuration error occurred (bad file, duplicate action, unknown action).
    #[error("Configuration error: {0}")]
    Config(String),

    /// A peer listed in the configuration could not be found.
    #[error("Unknown node: {0}")]
    UnknownNode(String),

    /// A network error occurred.
    #[error("Network error: {0}")]
    Network(String),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Alias for Result with HoplineError.
pub type HoplineResult<T> = Result<T, HoplineError>;
