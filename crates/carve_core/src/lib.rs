//! # carve_core
//!
//! Retry orchestration for carve.
//!
//! A migration job generates code, validates it, counts the remaining errors
//! and, when errors remain, asks the planning agent for adjusted guidance
//! before generating again. The loop ends on zero errors, on exhausted
//! attempts, or when the planner advises against another try.
//!
//! # Architecture
//!
//! - **Config**: attempt ceiling, timeouts, planner and validation settings
//! - **Jobs**: job state machine, outcome and release gate decision
//! - **History**: append-only attempt records with errors fixed per attempt
//! - **Store**: in-memory or one-file-per-job storage behind `JobStore`
//! - **Events**: typed job events published to attached sinks
//! - **Generators / Validators**: the seams the loop drives
//! - **Orchestrator**: the loop itself
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use carve_core::{CarveConfig, InMemoryJobStore, RetryOrchestrator, ReportFileValidator};
//!
//! let orchestrator = RetryOrchestrator::new(config, generator, planner, Arc::new(InMemoryJobStore::new()))?
//!     .with_validator(Arc::new(ReportFileValidator::new("unit", "reports/unit.md")));
//!
//! let job = orchestrator.run("banking", plan).await?;
//! println!("{} after {} attempts", job.state, job.attempt);
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod generator;
pub mod history;
pub mod job;
pub mod orchestrator;
pub mod store;
pub mod validator;

pub use config::{
    CarveConfig, PlannerConfig, RetryConfig, TimeoutConfig, ValidationConfig, CONFIG_FILE_NAMES,
};
pub use context::{AttemptContext, GenerationGuidance};
pub use error::{CoreError, CoreResult};
pub use events::{BroadcastSink, EventBus, EventSink, MigrationEvent, TracingSink};
pub use generator::{CodeGenerator, CommandGenerator, ENV_GUIDANCE_FILE, ENV_PLAN_FILE};
pub use history::{RetryAttempt, RetryHistory};
pub use job::{JobOutcome, JobState, MigrationJob};
pub use orchestrator::{decide_retry, RetryDecision, RetryOrchestrator};
pub use store::{FileJobStore, InMemoryJobStore, JobStore};
pub use validator::{
    infrastructure_failure_report, BuildValidatorSource, ReportFileValidator, Validator,
};
