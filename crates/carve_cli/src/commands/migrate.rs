//! Migrate command - Run the full generate/validate/retry loop.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use carve_agents::LlmProvider;
use carve_core::{
    BuildValidatorSource, CommandGenerator, FileJobStore, JobState, MigrationJob, ReportFileValidator,
    RetryOrchestrator, TracingSink,
};
use carve_deploy::BuildValidator;

use super::plan::build_planner;
use super::{compose_runtime, load_config, load_plan, parse_named_path, CliFailure, RuntimeChoice};

/// Job records live here, relative to the work directory.
pub const JOBS_DIR: &str = ".carve/jobs";

#[derive(Args)]
pub struct MigrateArgs {
    /// Migration plan (JSON)
    #[arg(long)]
    plan: PathBuf,

    /// Shell command that generates code for one attempt
    #[arg(long)]
    generate_cmd: String,

    /// Compose descriptor of the generated system; enables build validation
    #[arg(short, long)]
    pub(crate) compose: Option<PathBuf>,

    /// Report written by an external validator, as NAME=PATH (repeatable)
    #[arg(long = "report", value_parser = parse_named_path)]
    pub(crate) reports: Vec<(String, PathBuf)>,

    /// Job name (defaults to the plan's file stem)
    #[arg(long)]
    name: Option<String>,

    /// Directory the generator runs in and job records are kept under
    #[arg(short, long, default_value = ".")]
    work_dir: PathBuf,

    /// Container runtime (auto-detected when omitted)
    #[arg(long, value_enum)]
    runtime: Option<RuntimeChoice>,

    /// LLM provider (openai, anthropic)
    #[arg(long, env = "CARVE_LLM_PROVIDER")]
    provider: Option<LlmProvider>,

    /// Model override
    #[arg(long)]
    model: Option<String>,

    /// Config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the final job as JSON
    #[arg(long)]
    json: bool,
}

pub async fn execute(args: MigrateArgs) -> Result<()> {
    if args.compose.is_none() && args.reports.is_empty() {
        return Err(CliFailure::Usage(
            "no validators configured; pass --compose and/or --report".to_string(),
        )
        .into());
    }

    let work_dir = if args.work_dir.is_absolute() {
        args.work_dir.clone()
    } else {
        std::env::current_dir()?.join(&args.work_dir)
    };
    let config = load_config(args.config.as_deref(), &work_dir)?;
    let plan = load_plan(&args.plan)?;
    let planner = build_planner(&config, args.provider, args.model.clone())?;

    let generator = Arc::new(CommandGenerator::new(&args.generate_cmd, &work_dir));
    let store = Arc::new(FileJobStore::new(work_dir.join(JOBS_DIR)));

    let mut orchestrator = RetryOrchestrator::new(config.clone(), generator, planner, store)
        .context("Failed to set up the migration loop")?
        .with_sink(Arc::new(TracingSink));

    if let Some(compose) = &args.compose {
        let runtime = compose_runtime(args.runtime, false)?;
        let validator = BuildValidator::new(runtime).with_settings(config.validator_settings());
        orchestrator = orchestrator.with_validator(Arc::new(BuildValidatorSource::new(
            Arc::new(validator),
            resolve(&work_dir, compose),
        )));
    }
    for (name, path) in &args.reports {
        orchestrator = orchestrator.with_validator(Arc::new(ReportFileValidator::new(
            name,
            resolve(&work_dir, path),
        )));
    }

    let name = args.name.clone().unwrap_or_else(|| {
        args.plan
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("migration")
            .to_string()
    });

    info!("Starting migration '{}' in {}", name, work_dir.display());
    let job = orchestrator.run(&name, plan).await.context("Migration loop aborted")?;

    if args.json {
        let json = serde_json::to_string_pretty(&job).context("Failed to serialize job")?;
        println!("{}", json);
    } else {
        print_summary(&job);
    }

    match job.state {
        JobState::Succeeded => Ok(()),
        _ => {
            let reason = job
                .outcome
                .as_ref()
                .map(|o| o.reason.clone())
                .unwrap_or_else(|| format!("job ended in state {}", job.state));
            Err(CliFailure::ValidationFailed(reason).into())
        }
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn print_summary(job: &MigrationJob) {
    println!("Job:      {} ({})", job.name, job.id);
    println!("State:    {}", job.state);
    println!("Attempts: {}/{}", job.attempt, job.max_attempts);
    println!();

    for attempt in job.history.attempts() {
        let confidence = attempt
            .confidence()
            .map(|c| format!(", confidence {:.2}", c))
            .unwrap_or_default();
        println!(
            "  #{}: {} errors, {} fixed{}",
            attempt.attempt_number, attempt.errors_at_start, attempt.errors_fixed, confidence
        );
    }

    println!();
    println!("Release:  {}", job.release_decision());
    if let Some(outcome) = &job.outcome {
        if outcome.success {
            println!("✅ {}", outcome.reason);
        } else {
            println!("❌ {}", outcome.reason);
        }
    }
}
