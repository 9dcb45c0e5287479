//! CLI-based compose runtime supporting Docker and Podman.
//!
//! Wraps `docker compose` / `podman compose` with automatic runtime
//! detection, per-call timeouts and an optional dry-run mode.

use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::ComposeProject;
use crate::docker::DockerDaemon;
use crate::error::{RunnerError, RunnerResult};
use crate::ps::{parse_ps_output, ServiceState};
use crate::runner::{CommandOutput, ComposeRuntime};

/// Container runtime type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerRuntime {
    Docker,
    Podman,
}

impl ContainerRuntime {
    /// Get the CLI command name.
    pub fn command(&self) -> &'static str {
        match self {
            Self::Docker => "docker",
            Self::Podman => "podman",
        }
    }
}

impl std::fmt::Display for ContainerRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.command())
    }
}

/// Deadline for the `info` reachability check.
pub const INFO_TIMEOUT: Duration = Duration::from_secs(10);

/// CLI-based compose runtime options.
#[derive(Debug, Clone, Default)]
pub struct CliRuntimeOptions {
    /// Preferred runtime (if not set, auto-detect)
    pub preferred_runtime: Option<ContainerRuntime>,
    /// Dry-run mode (log commands without executing)
    pub dry_run: bool,
}

impl CliRuntimeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    pub fn prefer_docker(mut self) -> Self {
        self.preferred_runtime = Some(ContainerRuntime::Docker);
        self
    }

    pub fn prefer_podman(mut self) -> Self {
        self.preferred_runtime = Some(ContainerRuntime::Podman);
        self
    }
}

/// CLI-based compose runtime.
pub struct CliComposeRuntime {
    runtime: ContainerRuntime,
    options: CliRuntimeOptions,
    daemon: Option<DockerDaemon>,
}

impl CliComposeRuntime {
    /// Create a new runtime with automatic detection.
    pub fn new(options: CliRuntimeOptions) -> RunnerResult<Self> {
        let runtime = Self::detect_runtime(&options)?;
        info!("Using container runtime: {}", runtime);
        Ok(Self::with_runtime(runtime, options))
    }

    /// Create a runtime for a specific container engine.
    pub fn with_runtime(runtime: ContainerRuntime, options: CliRuntimeOptions) -> Self {
        let daemon = match runtime {
            ContainerRuntime::Docker => match DockerDaemon::connect() {
                Ok(daemon) => Some(daemon),
                Err(e) => {
                    debug!("Docker API client unavailable, falling back to CLI probe: {}", e);
                    None
                }
            },
            ContainerRuntime::Podman => None,
        };

        Self {
            runtime,
            options,
            daemon,
        }
    }

    /// Detect available container runtime.
    pub fn detect_runtime(options: &CliRuntimeOptions) -> RunnerResult<ContainerRuntime> {
        if let Some(preferred) = options.preferred_runtime {
            if Self::is_runtime_installed(preferred) {
                return Ok(preferred);
            }
            warn!(
                "Preferred runtime {} not available, trying alternatives",
                preferred
            );
        }

        if Self::is_runtime_installed(ContainerRuntime::Docker) {
            return Ok(ContainerRuntime::Docker);
        }

        if Self::is_runtime_installed(ContainerRuntime::Podman) {
            return Ok(ContainerRuntime::Podman);
        }

        Err(RunnerError::RuntimeNotAvailable(
            "Neither Docker nor Podman is installed".to_string(),
        ))
    }

    fn is_runtime_installed(runtime: ContainerRuntime) -> bool {
        std::process::Command::new(runtime.command())
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Get the current runtime.
    pub fn runtime(&self) -> ContainerRuntime {
        self.runtime
    }

    /// Check if dry-run mode is enabled.
    pub fn is_dry_run(&self) -> bool {
        self.options.dry_run
    }

    /// Build the `compose` argument list shared by every subcommand.
    fn compose_args(&self, project: &ComposeProject, subcommand: &[&str]) -> Vec<String> {
        let mut args = vec![
            "compose".to_string(),
            "-p".to_string(),
            project.name.clone(),
            "-f".to_string(),
            project.compose_file.to_string_lossy().to_string(),
        ];
        args.extend(subcommand.iter().map(|s| s.to_string()));
        args
    }

    /// Format command for logging.
    fn format_command(&self, args: &[String]) -> String {
        let mut cmd = self.runtime.command().to_string();
        for arg in args {
            if arg.contains(' ') || arg.contains('=') {
                cmd.push_str(&format!(" '{}'", arg));
            } else {
                cmd.push_str(&format!(" {}", arg));
            }
        }
        cmd
    }

    /// Run a compose command, killing it if the timeout elapses.
    async fn execute(
        &self,
        operation: &str,
        project: &ComposeProject,
        args: Vec<String>,
        timeout: Duration,
    ) -> RunnerResult<CommandOutput> {
        let cmd_str = self.format_command(&args);
        debug!("Executing: {}", cmd_str);

        if self.options.dry_run {
            info!("[DRY-RUN] Would execute: {}", cmd_str);
            return Ok(CommandOutput::new(0, format!("[DRY-RUN] {}", cmd_str), ""));
        }

        let started_at = Utc::now();
        let start = Instant::now();

        let child = Command::new(self.runtime.command())
            .args(&args)
            .current_dir(project.effective_working_dir())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                RunnerError::CommandFailed(format!("Failed to spawn {}: {}", self.runtime, e))
            })?;

        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                warn!("{} for project {} timed out", operation, project.name);
                return Err(RunnerError::timeout(operation, timeout.as_secs()));
            }
        };

        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1) as i64,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            started_at,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

/// Run `program` quietly and report whether it exited zero in time.
/// A command still running at the deadline is killed.
async fn command_succeeds(program: &str, args: &[&str], timeout: Duration) -> RunnerResult<bool> {
    let mut child = Command::new(program)
        .args(args)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()?;

    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(status) => Ok(status?.success()),
        Err(_) => {
            warn!("{} {} did not answer within {}s", program, args.join(" "), timeout.as_secs());
            Ok(false)
        }
    }
}

#[async_trait]
impl ComposeRuntime for CliComposeRuntime {
    async fn is_available(&self) -> RunnerResult<bool> {
        if self.options.dry_run {
            return Ok(true);
        }

        if let Some(daemon) = &self.daemon {
            return Ok(matches!(
                tokio::time::timeout(INFO_TIMEOUT, daemon.ping()).await,
                Ok(Ok(_))
            ));
        }

        command_succeeds(self.runtime.command(), &["info"], INFO_TIMEOUT).await
    }

    async fn build(
        &self,
        project: &ComposeProject,
        no_cache: bool,
        timeout: Duration,
    ) -> RunnerResult<CommandOutput> {
        info!("Building images for project {}", project.name);
        let mut sub = vec!["build"];
        if no_cache {
            sub.push("--no-cache");
        }
        let args = self.compose_args(project, &sub);
        self.execute("build", project, args, timeout).await
    }

    async fn up(
        &self,
        project: &ComposeProject,
        detached: bool,
        timeout: Duration,
    ) -> RunnerResult<CommandOutput> {
        info!("Starting services for project {}", project.name);
        let mut sub = vec!["up"];
        if detached {
            sub.push("-d");
        }
        let args = self.compose_args(project, &sub);
        self.execute("up", project, args, timeout).await
    }

    async fn ps(
        &self,
        project: &ComposeProject,
        timeout: Duration,
    ) -> RunnerResult<Vec<ServiceState>> {
        let args = self.compose_args(project, &["ps", "--all", "--format", "json"]);
        let output = self.execute("ps", project, args, timeout).await?;
        if !output.success() {
            return Err(RunnerError::CommandFailed(output.stderr));
        }
        if self.options.dry_run {
            return Ok(Vec::new());
        }
        parse_ps_output(&output.stdout)
    }

    async fn logs(
        &self,
        project: &ComposeProject,
        service: &str,
        tail: usize,
        timeout: Duration,
    ) -> RunnerResult<String> {
        let tail = tail.to_string();
        let args = self.compose_args(project, &["logs", "--no-color", "--tail", &tail, service]);
        let output = self.execute("logs", project, args, timeout).await?;
        Ok(output.combined_output())
    }

    async fn down(
        &self,
        project: &ComposeProject,
        remove_volumes: bool,
        timeout: Duration,
    ) -> RunnerResult<CommandOutput> {
        info!("Tearing down project {}", project.name);
        let mut sub = vec!["down", "--remove-orphans"];
        if remove_volumes {
            sub.push("-v");
        }
        let args = self.compose_args(project, &sub);
        self.execute("down", project, args, timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner() -> CliComposeRuntime {
        CliComposeRuntime {
            runtime: ContainerRuntime::Podman,
            options: CliRuntimeOptions::new().dry_run(),
            daemon: None,
        }
    }

    #[test]
    fn test_compose_args_are_namespaced() {
        let runner = runner();
        let project = ComposeProject::for_job("job-1", "/out/docker-compose.yml");
        let args = runner.compose_args(&project, &["build", "--no-cache"]);

        assert_eq!(
            args,
            vec![
                "compose",
                "-p",
                "carve-job-1",
                "-f",
                "/out/docker-compose.yml",
                "build",
                "--no-cache"
            ]
        );
    }

    #[test]
    fn test_format_command_quotes_spaces() {
        let runner = runner();
        let formatted = runner.format_command(&["logs".to_string(), "my service".to_string()]);
        assert_eq!(formatted, "podman logs 'my service'");
    }

    #[tokio::test]
    async fn test_hung_info_command_is_unavailable() {
        let start = Instant::now();
        let answered = command_succeeds("sleep", &["30"], Duration::from_millis(200))
            .await
            .unwrap();

        assert!(!answered);
        assert!(start.elapsed() < Duration::from_secs(10));
        assert!(command_succeeds("true", &[], Duration::from_secs(5)).await.unwrap());
    }

    #[tokio::test]
    async fn test_dry_run_returns_synthetic_success() {
        let runner = runner();
        let project = ComposeProject::new("p", "/nonexistent/docker-compose.yml");

        assert!(runner.is_available().await.unwrap());
        let output = runner
            .build(&project, true, Duration::from_secs(1))
            .await
            .unwrap();
        assert!(output.success());
        assert!(output.stdout.contains("--no-cache"));
        assert!(runner.ps(&project, Duration::from_secs(1)).await.unwrap().is_empty());
    }
}
