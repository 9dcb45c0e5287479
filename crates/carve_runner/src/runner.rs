//! Compose runtime trait and types.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ComposeProject;
use crate::error::RunnerResult;
use crate::ps::ServiceState;

/// Result of a compose command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandOutput {
    /// Exit code from the command
    pub exit_code: i64,
    /// Captured stdout
    pub stdout: String,
    /// Captured stderr
    pub stderr: String,
    /// Execution start time
    pub started_at: DateTime<Utc>,
    /// Duration in milliseconds
    pub duration_ms: u64,
}

impl CommandOutput {
    /// Build an output from captured streams.
    pub fn new(exit_code: i64, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
            started_at: Utc::now(),
            duration_ms: 0,
        }
    }

    /// Check if the command was successful (exit code 0).
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Get combined output (stdout + stderr).
    ///
    /// Compose writes build progress to stderr, so callers parsing build
    /// logs should always use the combined stream.
    pub fn combined_output(&self) -> String {
        if self.stdout.is_empty() {
            self.stderr.clone()
        } else if self.stderr.is_empty() {
            self.stdout.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// Container compose runtime.
///
/// Every operation is bounded by the supplied timeout. Exceeding it yields
/// [`RunnerError::Timeout`](crate::RunnerError::Timeout), never a hang.
#[async_trait]
pub trait ComposeRuntime: Send + Sync {
    /// Check whether the container runtime daemon is reachable.
    async fn is_available(&self) -> RunnerResult<bool>;

    /// Build all images of the project.
    async fn build(
        &self,
        project: &ComposeProject,
        no_cache: bool,
        timeout: Duration,
    ) -> RunnerResult<CommandOutput>;

    /// Start all services of the project.
    async fn up(
        &self,
        project: &ComposeProject,
        detached: bool,
        timeout: Duration,
    ) -> RunnerResult<CommandOutput>;

    /// List the runtime state of every service in the project.
    async fn ps(&self, project: &ComposeProject, timeout: Duration)
        -> RunnerResult<Vec<ServiceState>>;

    /// Fetch the last `tail` log lines of one service.
    async fn logs(
        &self,
        project: &ComposeProject,
        service: &str,
        tail: usize,
        timeout: Duration,
    ) -> RunnerResult<String>;

    /// Stop and remove the project's containers (and volumes if requested).
    async fn down(
        &self,
        project: &ComposeProject,
        remove_volumes: bool,
        timeout: Duration,
    ) -> RunnerResult<CommandOutput>;
}
