//! Mock compose runtime for testing.
//!
//! Provides a scripted implementation of the ComposeRuntime trait for use
//! in tests without requiring actual Docker/Podman.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::config::ComposeProject;
use crate::error::{RunnerError, RunnerResult};
use crate::ps::ServiceState;
use crate::runner::{CommandOutput, ComposeRuntime};

/// Predefined response for a compose command.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Command ran and exited with the given code and output
    Exit {
        exit_code: i64,
        stdout: String,
        stderr: String,
    },
    /// Command exceeded its deadline
    Timeout,
    /// Command could not be run at all
    Error(String),
}

impl MockResponse {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self::Exit {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failure(exit_code: i64, stderr: impl Into<String>) -> Self {
        Self::Exit {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    fn into_output(self, operation: &str, timeout: Duration) -> RunnerResult<CommandOutput> {
        match self {
            Self::Exit {
                exit_code,
                stdout,
                stderr,
            } => Ok(CommandOutput::new(exit_code, stdout, stderr)),
            Self::Timeout => Err(RunnerError::timeout(operation, timeout.as_secs())),
            Self::Error(msg) => Err(RunnerError::CommandFailed(msg)),
        }
    }
}

/// Captured call information for verification.
#[derive(Debug, Clone)]
pub struct CapturedCall {
    pub method: String,
    pub project: Option<String>,
    pub detail: Option<String>,
}

/// Mock compose runtime for testing.
///
/// `ps` snapshots are returned in order; once exhausted the last snapshot
/// repeats, which models a deployment that has settled.
#[derive(Clone)]
pub struct MockComposeRuntime {
    available: Arc<RwLock<bool>>,
    build_response: Arc<RwLock<MockResponse>>,
    up_response: Arc<RwLock<MockResponse>>,
    down_response: Arc<RwLock<MockResponse>>,
    ps_snapshots: Arc<RwLock<Vec<Vec<ServiceState>>>>,
    ps_index: Arc<AtomicUsize>,
    logs: Arc<RwLock<HashMap<String, String>>>,
    captured_calls: Arc<RwLock<Vec<CapturedCall>>>,
}

impl Default for MockComposeRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl MockComposeRuntime {
    /// Create a mock where every command succeeds and nothing is running.
    pub fn new() -> Self {
        Self {
            available: Arc::new(RwLock::new(true)),
            build_response: Arc::new(RwLock::new(MockResponse::success(""))),
            up_response: Arc::new(RwLock::new(MockResponse::success(""))),
            down_response: Arc::new(RwLock::new(MockResponse::success(""))),
            ps_snapshots: Arc::new(RwLock::new(Vec::new())),
            ps_index: Arc::new(AtomicUsize::new(0)),
            logs: Arc::new(RwLock::new(HashMap::new())),
            captured_calls: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Set whether the daemon is reachable.
    pub fn set_available(self, available: bool) -> Self {
        *self.available.write() = available;
        self
    }

    pub fn with_build(self, response: MockResponse) -> Self {
        *self.build_response.write() = response;
        self
    }

    pub fn with_up(self, response: MockResponse) -> Self {
        *self.up_response.write() = response;
        self
    }

    pub fn with_down(self, response: MockResponse) -> Self {
        *self.down_response.write() = response;
        self
    }

    /// Append a `ps` snapshot.
    pub fn add_ps_snapshot(self, states: Vec<ServiceState>) -> Self {
        self.ps_snapshots.write().push(states);
        self
    }

    /// Set the log text returned for a service.
    pub fn with_logs(self, service: impl Into<String>, logs: impl Into<String>) -> Self {
        self.logs.write().insert(service.into(), logs.into());
        self
    }

    /// Get all captured calls.
    pub fn get_calls(&self) -> Vec<CapturedCall> {
        self.captured_calls.read().clone()
    }

    /// Check if a specific method was called.
    pub fn was_called(&self, method: &str) -> bool {
        self.captured_calls.read().iter().any(|c| c.method == method)
    }

    /// Get the number of calls to a specific method.
    pub fn call_count(&self, method: &str) -> usize {
        self.captured_calls
            .read()
            .iter()
            .filter(|c| c.method == method)
            .count()
    }

    /// Clear all captured calls.
    pub fn clear_calls(&self) {
        self.captured_calls.write().clear();
    }

    fn record_call(&self, method: &str, project: Option<&ComposeProject>, detail: Option<String>) {
        self.captured_calls.write().push(CapturedCall {
            method: method.to_string(),
            project: project.map(|p| p.name.clone()),
            detail,
        });
    }

    fn next_snapshot(&self) -> Vec<ServiceState> {
        let snapshots = self.ps_snapshots.read();
        if snapshots.is_empty() {
            return Vec::new();
        }
        let index = self.ps_index.fetch_add(1, Ordering::SeqCst);
        snapshots[index.min(snapshots.len() - 1)].clone()
    }
}

#[async_trait]
impl ComposeRuntime for MockComposeRuntime {
    async fn is_available(&self) -> RunnerResult<bool> {
        self.record_call("is_available", None, None);
        Ok(*self.available.read())
    }

    async fn build(
        &self,
        project: &ComposeProject,
        no_cache: bool,
        timeout: Duration,
    ) -> RunnerResult<CommandOutput> {
        self.record_call("build", Some(project), Some(format!("no_cache={}", no_cache)));
        self.build_response.read().clone().into_output("build", timeout)
    }

    async fn up(
        &self,
        project: &ComposeProject,
        detached: bool,
        timeout: Duration,
    ) -> RunnerResult<CommandOutput> {
        self.record_call("up", Some(project), Some(format!("detached={}", detached)));
        self.up_response.read().clone().into_output("up", timeout)
    }

    async fn ps(
        &self,
        project: &ComposeProject,
        _timeout: Duration,
    ) -> RunnerResult<Vec<ServiceState>> {
        self.record_call("ps", Some(project), None);
        Ok(self.next_snapshot())
    }

    async fn logs(
        &self,
        project: &ComposeProject,
        service: &str,
        tail: usize,
        _timeout: Duration,
    ) -> RunnerResult<String> {
        self.record_call("logs", Some(project), Some(format!("{} tail={}", service, tail)));
        Ok(self.logs.read().get(service).cloned().unwrap_or_default())
    }

    async fn down(
        &self,
        project: &ComposeProject,
        remove_volumes: bool,
        timeout: Duration,
    ) -> RunnerResult<CommandOutput> {
        self.record_call(
            "down",
            Some(project),
            Some(format!("remove_volumes={}", remove_volumes)),
        );
        self.down_response.read().clone().into_output("down", timeout)
    }
}
