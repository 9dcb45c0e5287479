//! Migration job state.

use std::fmt;

use carve_policy::{ErrorCount, GateDecision, ReleaseGate, ValidationError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::history::RetryHistory;

/// Where a job is in the generate/validate/retry loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Created, not yet driven
    #[default]
    Pending,
    Generating,
    Validating,
    /// Errors found, planner consulted
    Analyzing,
    /// Retry or give up
    Deciding,
    /// Zero errors
    Succeeded,
    /// Errors remain, manual intervention required
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Generating => "generating",
            Self::Validating => "validating",
            Self::Analyzing => "analyzing",
            Self::Deciding => "deciding",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final result of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOutcome {
    pub success: bool,
    pub reason: String,
    pub manual_intervention_required: bool,
    /// Errors left by the last validation pass
    pub remaining_errors: Vec<ValidationError>,
}

/// One migration job and everything recorded about it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationJob {
    pub id: String,
    pub name: String,
    pub state: JobState,
    /// Current attempt, 0 before the first pass
    pub attempt: u32,
    pub max_attempts: u32,
    pub history: RetryHistory,
    pub last_count: Option<ErrorCount>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub outcome: Option<JobOutcome>,
}

impl MigrationJob {
    pub fn new(name: impl Into<String>, max_attempts: u32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            state: JobState::Pending,
            attempt: 0,
            max_attempts,
            history: RetryHistory::new(),
            last_count: None,
            created_at: now,
            updated_at: now,
            outcome: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Move to `state`, returning the previous one.
    pub fn transition(&mut self, state: JobState) -> JobState {
        let previous = self.state;
        self.state = state;
        self.updated_at = Utc::now();
        previous
    }

    pub fn has_attempts_left(&self) -> bool {
        self.attempt < self.max_attempts
    }

    pub fn succeed(&mut self) {
        self.transition(JobState::Succeeded);
        self.outcome = Some(JobOutcome {
            success: true,
            reason: format!("Zero errors after attempt {}", self.attempt),
            manual_intervention_required: false,
            remaining_errors: Vec::new(),
        });
    }

    pub fn fail(&mut self, reason: impl Into<String>, remaining_errors: Vec<ValidationError>) {
        self.transition(JobState::Failed);
        self.outcome = Some(JobOutcome {
            success: false,
            reason: reason.into(),
            manual_intervention_required: true,
            remaining_errors,
        });
    }

    /// Whether the job's output may be served.
    ///
    /// A job that never completed a validation pass stays blocked.
    pub fn release_decision(&self) -> GateDecision {
        let succeeded = self.state == JobState::Succeeded;
        match &self.last_count {
            Some(count) => ReleaseGate::decide(count, succeeded),
            None if succeeded => GateDecision::Open,
            None => GateDecision::Blocked { remaining: 0 },
        }
    }

    pub fn remaining_errors(&self) -> usize {
        self.last_count.as_ref().map_or(0, |c| c.total_errors)
    }
}
