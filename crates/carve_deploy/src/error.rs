//! Error types for the deploy module.

use thiserror::Error;

/// Result type alias for deploy operations.
pub type DeployResult<T> = Result<T, DeployError>;

/// Errors that can occur outside a validation pass.
///
/// Failures *inside* a pass (missing descriptor, broken build, unhealthy
/// service) are reported as `ValidationError`s on the result instead.
#[derive(Error, Debug)]
pub enum DeployError {
    #[error("Runner error: {0}")]
    Runner(#[from] carve_runner::RunnerError),

    #[error("Invalid compose descriptor {path}: {message}")]
    InvalidDescriptor { path: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
