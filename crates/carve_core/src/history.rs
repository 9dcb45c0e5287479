//! Append-only record of the attempts of one job.

use std::collections::BTreeMap;

use carve_agents::ErrorAnalysisResult;
use carve_policy::{calculate_errors_fixed, ErrorCount};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One generate/validate cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryAttempt {
    pub attempt_number: u32,
    /// Errors counted by this attempt's validation pass
    pub errors_at_start: usize,
    pub errors_by_validator: BTreeMap<String, usize>,
    /// Planner output, when the planner was consulted and answered usefully
    pub analysis: Option<ErrorAnalysisResult>,
    /// Improvement over the previous attempt, never negative
    pub errors_fixed: usize,
    pub recorded_at: DateTime<Utc>,
}

impl RetryAttempt {
    pub fn confidence(&self) -> Option<f64> {
        self.analysis.as_ref().map(|a| a.retry_strategy.confidence)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetryHistory {
    attempts: Vec<RetryAttempt>,
}

impl RetryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an attempt. `errors_fixed` is derived from the previous entry.
    pub fn record(
        &mut self,
        attempt_number: u32,
        count: &ErrorCount,
        analysis: Option<ErrorAnalysisResult>,
    ) -> &RetryAttempt {
        let errors_fixed = self
            .attempts
            .last()
            .map(|prev| calculate_errors_fixed(prev.errors_at_start, count.total_errors))
            .unwrap_or(0);

        self.attempts.push(RetryAttempt {
            attempt_number,
            errors_at_start: count.total_errors,
            errors_by_validator: count.errors_by_validator.clone(),
            analysis,
            errors_fixed,
            recorded_at: Utc::now(),
        });
        &self.attempts[self.attempts.len() - 1]
    }

    pub fn attempts(&self) -> &[RetryAttempt] {
        &self.attempts
    }

    pub fn last(&self) -> Option<&RetryAttempt> {
        self.attempts.last()
    }

    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }

    pub fn total_errors_fixed(&self) -> usize {
        self.attempts.iter().map(|a| a.errors_fixed).sum()
    }

    /// Planner confidence per attempt that consulted the planner.
    pub fn confidence_trend(&self) -> Vec<f64> {
        self.attempts.iter().filter_map(RetryAttempt::confidence).collect()
    }

    /// Whether the latest retry fixed nothing while errors remain.
    pub fn is_stalled(&self) -> bool {
        self.attempts.len() >= 2
            && self.attempts[self.attempts.len() - 1].errors_fixed == 0
            && self.attempts[self.attempts.len() - 1].errors_at_start > 0
    }
}
