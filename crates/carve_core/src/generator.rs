//! Code generation seam.
//!
//! Generation itself is done by external agents. The orchestrator only needs
//! to hand them the attempt context and the guidance from the last analysis.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::context::{AttemptContext, GenerationGuidance};
use crate::error::{CoreError, CoreResult};

pub const ENV_GUIDANCE_FILE: &str = "CARVE_GUIDANCE_FILE";
pub const ENV_PLAN_FILE: &str = "CARVE_PLAN_FILE";
pub const ENV_ATTEMPT: &str = "CARVE_ATTEMPT";
pub const ENV_JOB_ID: &str = "CARVE_JOB_ID";

/// Produces the generated system for one attempt.
#[async_trait]
pub trait CodeGenerator: Send + Sync {
    fn name(&self) -> &str;

    /// An `Err` is fatal to the job.
    async fn generate(&self, ctx: &AttemptContext, guidance: &GenerationGuidance) -> CoreResult<()>;
}

/// Runs a shell command per attempt.
///
/// The guidance and the current plan are written as JSON next to each other
/// and their paths passed through `CARVE_GUIDANCE_FILE` and `CARVE_PLAN_FILE`.
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    command: String,
    work_dir: PathBuf,
    timeout: Duration,
}

impl CommandGenerator {
    pub fn new(command: impl Into<String>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            work_dir: work_dir.into(),
            timeout: Duration::from_secs(1800),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn attempt_dir(&self, ctx: &AttemptContext) -> PathBuf {
        self.work_dir
            .join(".carve")
            .join("attempts")
            .join(&ctx.job_id)
            .join(ctx.attempt.to_string())
    }

    fn shell(&self) -> Command {
        if cfg!(windows) {
            let mut cmd = Command::new("cmd");
            cmd.arg("/C").arg(&self.command);
            cmd
        } else {
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(&self.command);
            cmd
        }
    }
}

#[async_trait]
impl CodeGenerator for CommandGenerator {
    fn name(&self) -> &str {
        "command"
    }

    async fn generate(&self, ctx: &AttemptContext, guidance: &GenerationGuidance) -> CoreResult<()> {
        let dir = self.attempt_dir(ctx);
        tokio::fs::create_dir_all(&dir).await?;

        let guidance_file = dir.join("guidance.json");
        let plan_file = dir.join("plan.json");
        tokio::fs::write(&guidance_file, serde_json::to_string_pretty(guidance)?).await?;
        tokio::fs::write(&plan_file, serde_json::to_string_pretty(&ctx.migration_plan)?).await?;

        info!(
            "Running generator for job {} attempt {}/{}: {}",
            ctx.job_id, ctx.attempt, ctx.max_attempts, self.command
        );

        let child = self
            .shell()
            .current_dir(&self.work_dir)
            .env(ENV_GUIDANCE_FILE, &guidance_file)
            .env(ENV_PLAN_FILE, &plan_file)
            .env(ENV_ATTEMPT, ctx.attempt.to_string())
            .env(ENV_JOB_ID, &ctx.job_id)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CoreError::Generation(format!("Failed to spawn '{}': {}", self.command, e)))?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                warn!("Generator timed out after {}s", self.timeout.as_secs());
                return Err(CoreError::Generation(format!(
                    "'{}' timed out after {}s",
                    self.command,
                    self.timeout.as_secs()
                )));
            }
        };

        debug!("Generator stdout: {}", String::from_utf8_lossy(&output.stdout));
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CoreError::Generation(format!(
                "'{}' exited with {}: {}",
                self.command,
                output.status.code().unwrap_or(-1),
                stderr.trim()
            )));
        }
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn ctx() -> AttemptContext {
        AttemptContext {
            job_id: "job-1".into(),
            attempt: 2,
            max_attempts: 3,
            migration_plan: json!({"services": ["accounts"]}),
        }
    }

    #[tokio::test]
    async fn test_command_receives_guidance_file() {
        let temp_dir = TempDir::new().unwrap();
        let generator = CommandGenerator::new(
            "cp \"$CARVE_GUIDANCE_FILE\" seen.json && test \"$CARVE_ATTEMPT\" = 2",
            temp_dir.path(),
        );
        let guidance = GenerationGuidance {
            derived_from_attempt: 1,
            specific_fixes: vec!["add starter".into()],
            ..Default::default()
        };

        generator.generate(&ctx(), &guidance).await.unwrap();

        let seen = std::fs::read_to_string(temp_dir.path().join("seen.json")).unwrap();
        let parsed: GenerationGuidance = serde_json::from_str(&seen).unwrap();
        assert_eq!(parsed, guidance);
    }

    #[tokio::test]
    async fn test_failing_command_is_generation_error() {
        let temp_dir = TempDir::new().unwrap();
        let generator = CommandGenerator::new("echo boom >&2; exit 3", temp_dir.path());

        let err = generator
            .generate(&ctx(), &GenerationGuidance::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Generation(ref m) if m.contains("boom")));
    }

    #[tokio::test]
    async fn test_timeout() {
        let temp_dir = TempDir::new().unwrap();
        let generator =
            CommandGenerator::new("sleep 5", temp_dir.path()).with_timeout(Duration::from_millis(100));

        let err = generator
            .generate(&ctx(), &GenerationGuidance::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
