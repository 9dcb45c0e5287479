//! Cleanup command - Tear down the containers of a project or job.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use carve_deploy::BuildValidator;
use carve_runner::ComposeProject;

use super::{compose_runtime, load_config, CliFailure, RuntimeChoice};

#[derive(Args)]
pub struct CleanupArgs {
    /// Compose descriptor
    #[arg(short, long, default_value = "docker-compose.yml")]
    compose: PathBuf,

    /// Compose project name
    #[arg(short, long, conflicts_with = "job")]
    project: Option<String>,

    /// Job ID whose project should be torn down
    #[arg(long)]
    job: Option<String>,

    /// Container runtime (auto-detected when omitted)
    #[arg(long, value_enum)]
    runtime: Option<RuntimeChoice>,

    /// Config file
    #[arg(long)]
    config: Option<PathBuf>,
}

pub async fn execute(args: CleanupArgs) -> Result<()> {
    let project = match (&args.project, &args.job) {
        (Some(name), _) => ComposeProject::new(name, &args.compose),
        (None, Some(job_id)) => ComposeProject::for_job(job_id, &args.compose),
        (None, None) => {
            return Err(CliFailure::Usage("pass --project or --job".to_string()).into());
        }
    };

    let current_dir = std::env::current_dir()?;
    let config = load_config(args.config.as_deref(), &current_dir)?;
    let runtime = compose_runtime(args.runtime, false)?;
    let validator = BuildValidator::new(runtime).with_settings(config.validator_settings());

    info!("Tearing down compose project {}", project.name);
    validator
        .cleanup(&project)
        .await
        .with_context(|| format!("Failed to tear down {}", project.name))?;

    println!("✅ Project {} torn down", project.name);
    Ok(())
}
