//! Error types for the core module.

use thiserror::Error;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur during core operations.
///
/// Validation failures and unusable planner output are not errors; they
/// move the job through its state machine instead.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid job state: {0}")]
    InvalidState(String),

    #[error("Code generation failed: {0}")]
    Generation(String),

    #[error("Validator '{validator}' failed: {message}")]
    Validator { validator: String, message: String },

    #[error("Deploy error: {0}")]
    Deploy(#[from] carve_deploy::DeployError),

    #[error("Agent error: {0}")]
    Agent(#[from] carve_agents::AgentError),

    #[error("Policy error: {0}")]
    Policy(#[from] carve_policy::PolicyError),

    #[error("Runner error: {0}")]
    Runner(#[from] carve_runner::RunnerError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
