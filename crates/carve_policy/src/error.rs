//! Error types for policy module.

use thiserror::Error;

/// Result type alias for policy operations.
pub type PolicyResult<T> = Result<T, PolicyError>;

/// Errors that can occur during policy operations.
///
/// Malformed report *content* is never an error; it contributes zero
/// findings. These variants cover misconfiguration and unreadable inputs.
#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("Invalid error ID pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("Invalid report source: {0}")]
    InvalidSource(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
