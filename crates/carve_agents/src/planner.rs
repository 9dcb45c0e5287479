//! AI-assisted retry planning.
//!
//! One call per retry decision point: the migration plan and the validator
//! reports go out, an `ErrorAnalysisResult` comes back. Network failures,
//! timeouts and unusable responses all degrade to `None`.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::analysis::ErrorAnalysisResult;
use crate::completion::{CompletionAgent, CompletionRequest, DEFAULT_AGENT_TIMEOUT, DEFAULT_TEMPERATURE};

/// Reports longer than this are cut before being embedded in the prompt.
pub const DEFAULT_MAX_REPORT_CHARS: usize = 20_000;

const SYSTEM_PROMPT: &str = "You are a migration retry planner. Analyze validation failures of \
generated microservices and answer with a single JSON object containing analysis, \
improvementStrategy, improvedMigrationPlan, retryConfidence, adjustedPlannerPrompt and \
retryStrategy.";

/// Planner tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannerOptions {
    pub model: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
    pub max_report_chars: usize,
}

impl Default for PlannerOptions {
    fn default() -> Self {
        Self {
            model: None,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: 8192,
            timeout: DEFAULT_AGENT_TIMEOUT,
            max_report_chars: DEFAULT_MAX_REPORT_CHARS,
        }
    }
}

/// A validator report as the planner sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedReport {
    pub name: String,
    pub content: String,
}

impl NamedReport {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}

/// Everything one planning call needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanningInput {
    pub migration_plan: Value,
    pub reports: Vec<NamedReport>,
    pub attempt: u32,
    pub max_attempts: u32,
}

/// Asks the planning agent for an improved plan.
pub struct RetryPlanner {
    agent: Arc<dyn CompletionAgent>,
    options: PlannerOptions,
}

impl RetryPlanner {
    pub fn new(agent: Arc<dyn CompletionAgent>) -> Self {
        Self {
            agent,
            options: PlannerOptions::default(),
        }
    }

    pub fn with_options(mut self, options: PlannerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &PlannerOptions {
        &self.options
    }

    /// Run one planning cycle. `None` means "cannot determine".
    pub async fn plan_retry(&self, input: &PlanningInput) -> Option<ErrorAnalysisResult> {
        let prompt = match self.build_prompt(input) {
            Ok(prompt) => prompt,
            Err(e) => {
                warn!("Could not serialize migration plan: {}", e);
                return None;
            }
        };

        let mut request = CompletionRequest::new(prompt)
            .with_system(SYSTEM_PROMPT)
            .with_temperature(self.options.temperature)
            .with_max_tokens(self.options.max_tokens)
            .with_timeout(self.options.timeout);
        if let Some(model) = &self.options.model {
            request = request.with_model(model.clone());
        }

        info!(
            "Requesting retry plan from {} (attempt {}/{})",
            self.agent.name(),
            input.attempt,
            input.max_attempts
        );

        let response = match tokio::time::timeout(self.options.timeout, self.agent.complete(request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                warn!("Planning agent call failed: {}", e);
                return None;
            }
            Err(_) => {
                warn!(
                    "Planning agent call timed out after {}s",
                    self.options.timeout.as_secs()
                );
                return None;
            }
        };

        let result = ErrorAnalysisResult::parse(&response.content);
        match &result {
            Some(analysis) => info!(
                "Retry plan received: shouldRetry={}, confidence={:.2}",
                analysis.retry_strategy.should_retry, analysis.retry_strategy.confidence
            ),
            None => warn!("Planning agent response was not usable"),
        }
        result
    }

    /// Assemble the user prompt.
    pub fn build_prompt(&self, input: &PlanningInput) -> serde_json::Result<String> {
        let plan = serde_json::to_string_pretty(&input.migration_plan)?;

        let mut prompt = format!(
            "Migration attempt {}/{} failed validation.\n\n## Current migration plan\n\n```json\n{}\n```\n",
            input.attempt, input.max_attempts, plan
        );

        for report in &input.reports {
            prompt.push_str(&format!(
                "\n## {} report\n\n{}\n",
                report.name,
                truncate_report(&report.content, self.options.max_report_chars)
            ));
        }

        prompt.push_str(
            "\nReturn only the JSON object. Set retryStrategy.shouldRetry to false if another \
             attempt cannot fix these errors.\n",
        );
        Ok(prompt)
    }
}

/// Keep the first `max_chars` characters, noting how much was dropped.
fn truncate_report(content: &str, max_chars: usize) -> String {
    let total = content.chars().count();
    if total <= max_chars {
        return content.to_string();
    }
    let kept: String = content.chars().take(max_chars).collect();
    format!("{}\n[... truncated {} characters]", kept, total - max_chars)
}
