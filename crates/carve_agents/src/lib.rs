//! # carve_agents
//!
//! Talks to the external planning agent.
//!
//! This crate provides:
//! - **Completion interface**: `CompletionAgent` with an OpenAI/Anthropic `LlmAdapter`
//! - **JSON extraction**: tolerant parsing of fenced or prose-wrapped JSON
//! - **Analysis model**: `ErrorAnalysisResult` and its retry strategy
//! - **Retry planner**: one AI-assisted improvement cycle per call
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use carve_agents::{LlmAdapter, PlanningInput, RetryPlanner};
//!
//! let adapter = LlmAdapter::from_env(None, None)?;
//! let planner = RetryPlanner::new(Arc::new(adapter));
//!
//! match planner.plan_retry(&input).await {
//!     Some(analysis) if analysis.should_retry() => println!("{}", analysis.adjusted_planner_prompt),
//!     _ => println!("manual intervention required"),
//! }
//! ```

pub mod analysis;
pub mod completion;
pub mod error;
pub mod json;
pub mod llm;
pub mod planner;

pub use analysis::{
    synthesize_prompt, Analysis, ErrorAnalysisResult, FixDetail, ImprovementStrategy,
    PrioritizedFix, PromptAdjustment, RetryStrategy, SuccessRate, REQUIRED_FIELDS,
};
pub use completion::{
    CompletionAgent, CompletionRequest, CompletionResponse, DEFAULT_AGENT_TIMEOUT,
    DEFAULT_TEMPERATURE,
};
pub use error::{AgentError, AgentResult};
pub use json::extract_json;
pub use llm::{LlmAdapter, LlmProvider};
pub use planner::{NamedReport, PlannerOptions, PlanningInput, RetryPlanner, DEFAULT_MAX_REPORT_CHARS};
