//! # carve_deploy
//!
//! Builds, starts and health-checks a generated system through its compose
//! descriptor, turning every failure into a structured `ValidationError`.
//!
//! This crate provides:
//! - **Validation phases**: the state of one build validation
//! - **Compose descriptor reading**: declared services, published ports, probes
//! - **Build log analysis**: per-service markers and failure classification
//! - **Health polling**: fixed-interval `ps` polling with a deadline
//! - **Build validator**: validation and deployment paths plus cleanup
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use carve_deploy::{BuildRequest, BuildValidator};
//! use carve_runner::{CliComposeRuntime, CliRuntimeOptions, ComposeProject};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runtime = Arc::new(CliComposeRuntime::new(CliRuntimeOptions::default())?);
//!     let validator = BuildValidator::new(runtime);
//!
//!     let project = ComposeProject::for_job("job-1", "./out/docker-compose.yml");
//!     let result = validator.validate_build(&BuildRequest::new(project)).await;
//!
//!     println!("{} ({} errors)", result.phase(), result.errors.len());
//!     Ok(())
//! }
//! ```

pub mod build_log;
pub mod compose;
pub mod deployment;
pub mod error;
pub mod health;
pub mod phase;
pub mod validator;

pub use build_log::{
    classify_failure, dominant_failed_service, has_unattributed_failure, parse_build_markers,
    BuildMarkers, FailureKind,
};
pub use compose::{ComposeDescriptor, ComposeService};
pub use deployment::{
    ContainerDeployment, DeployedService, ServiceKind, ServiceStatus, DEFAULT_HEALTH_PATH,
};
pub use error::{DeployError, DeployResult};
pub use health::{HealthFailure, HealthOutcome, HealthPoller};
pub use phase::ValidationPhase;
pub use validator::{
    BuildRequest, BuildValidationResult, BuildValidator, ValidatorSettings, ValidatorTimeouts,
    BUILD_REPORT_NAME,
};
