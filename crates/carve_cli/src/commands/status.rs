//! Status command - Show a stored job and whether its output may be released.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use carve_core::{CoreError, FileJobStore, JobStore, MigrationJob};
use carve_policy::GateDecision;

use super::migrate::JOBS_DIR;
use super::{CliFailure, OutputFormat};

#[derive(Args)]
pub struct StatusArgs {
    /// Job ID; lists all jobs when omitted
    job_id: Option<String>,

    /// Directory the job was run in
    #[arg(short, long, default_value = ".")]
    work_dir: PathBuf,

    /// Exit with code 3 while the release gate is blocked
    #[arg(long)]
    require_open: bool,

    /// Output format (markdown is treated as text)
    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormat,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusView<'a> {
    job: &'a MigrationJob,
    release: GateDecision,
}

pub async fn execute(args: StatusArgs) -> Result<()> {
    let store = FileJobStore::new(args.work_dir.join(JOBS_DIR));

    let Some(job_id) = &args.job_id else {
        return list_jobs(&store, args.format).await;
    };

    let job = store
        .get(job_id)
        .await?
        .ok_or_else(|| CoreError::JobNotFound(job_id.clone()))?;
    let release = job.release_decision();

    if args.format == OutputFormat::Json {
        let view = StatusView { job: &job, release };
        let json = serde_json::to_string_pretty(&view).context("Failed to serialize status")?;
        println!("{}", json);
    } else {
        println!("Job:      {} ({})", job.name, job.id);
        println!("State:    {}", job.state);
        println!("Attempts: {}/{}", job.attempt, job.max_attempts);
        println!("Updated:  {}", job.updated_at.to_rfc3339());
        if let Some(outcome) = &job.outcome {
            println!("Outcome:  {}", outcome.reason);
            for error in &outcome.remaining_errors {
                println!("  [{}] {} {}: {}", error.severity, error.id, error.service, error.description);
            }
        }
        println!("Release:  {}", release);
    }

    if args.require_open && !release.is_open() {
        return Err(CliFailure::ValidationFailed(release.to_string()).into());
    }
    Ok(())
}

async fn list_jobs(store: &FileJobStore, format: OutputFormat) -> Result<()> {
    let jobs = store.list().await?;

    if format == OutputFormat::Json {
        let json = serde_json::to_string_pretty(&jobs).context("Failed to serialize jobs")?;
        println!("{}", json);
        return Ok(());
    }

    if jobs.is_empty() {
        println!("No jobs under {}", store.dir().display());
    }
    for job in &jobs {
        println!(
            "{}  {:<10} {}/{}  {}",
            job.id,
            job.state.as_str(),
            job.attempt,
            job.max_attempts,
            job.name
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use carve_core::JobState;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_require_open_blocks_failed_job() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileJobStore::new(temp_dir.path().join(JOBS_DIR));
        let mut job = MigrationJob::new("banking", 3);
        job.transition(JobState::Validating);
        job.fail("3 errors remain", Vec::new());
        store.put(&job).await.unwrap();

        let args = StatusArgs {
            job_id: Some(job.id.clone()),
            work_dir: temp_dir.path().to_path_buf(),
            require_open: true,
            format: OutputFormat::Text,
        };
        let err = execute(args).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CliFailure>(),
            Some(CliFailure::ValidationFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let temp_dir = TempDir::new().unwrap();
        let args = StatusArgs {
            job_id: Some("missing".into()),
            work_dir: temp_dir.path().to_path_buf(),
            require_open: false,
            format: OutputFormat::Json,
        };
        let err = execute(args).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<CoreError>(), Some(CoreError::JobNotFound(_))));
    }
}
