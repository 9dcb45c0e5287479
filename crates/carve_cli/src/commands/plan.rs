//! Plan command - Ask the planning agent how to fix a failed attempt.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use carve_agents::{AgentError, LlmAdapter, LlmProvider, NamedReport, PlanningInput, RetryPlanner};
use carve_core::CarveConfig;

use super::{load_config, load_plan, parse_named_path};

#[derive(Args)]
pub struct PlanArgs {
    /// Migration plan (JSON)
    #[arg(long)]
    plan: PathBuf,

    /// Validator report as NAME=PATH (repeatable)
    #[arg(long = "report", value_parser = parse_named_path, required = true)]
    reports: Vec<(String, PathBuf)>,

    /// Attempt that produced the reports
    #[arg(long, default_value_t = 1)]
    attempt: u32,

    /// Attempt ceiling (defaults to retry.max_attempts)
    #[arg(long)]
    max_attempts: Option<u32>,

    /// LLM provider (openai, anthropic)
    #[arg(long, env = "CARVE_LLM_PROVIDER")]
    provider: Option<LlmProvider>,

    /// Model override
    #[arg(long)]
    model: Option<String>,

    /// Config file
    #[arg(long)]
    config: Option<PathBuf>,
}

pub async fn execute(args: PlanArgs) -> Result<()> {
    let current_dir = std::env::current_dir()?;
    let config = load_config(args.config.as_deref(), &current_dir)?;
    let planner = build_planner(&config, args.provider, args.model.clone())?;

    let reports = args
        .reports
        .iter()
        .map(|(name, path)| {
            std::fs::read_to_string(path)
                .map(|content| NamedReport::new(name, content))
                .with_context(|| format!("Failed to read report {}", path.display()))
        })
        .collect::<Result<Vec<_>>>()?;

    let input = PlanningInput {
        migration_plan: load_plan(&args.plan)?,
        reports,
        attempt: args.attempt,
        max_attempts: args.max_attempts.unwrap_or(config.retry.max_attempts),
    };

    info!(
        "Planning retry for attempt {}/{}",
        input.attempt, input.max_attempts
    );
    let analysis = planner.plan_retry(&input).await.ok_or_else(|| {
        AgentError::InvalidResponse("planner produced no usable analysis".to_string())
    })?;

    let json = serde_json::to_string_pretty(&analysis).context("Failed to serialize analysis")?;
    println!("{}", json);
    Ok(())
}

/// Planner backed by the configured LLM provider.
///
/// Provider and model given on the command line win over the config file.
pub fn build_planner(
    config: &CarveConfig,
    provider: Option<LlmProvider>,
    model: Option<String>,
) -> Result<RetryPlanner> {
    let provider = provider.or(config.planner.provider);
    let model = model.or_else(|| config.planner.model.clone());

    let adapter = LlmAdapter::from_env(provider, model).context("Failed to create planning agent")?;
    info!("Planning agent: {} ({})", adapter.provider(), adapter.model());

    let mut options = config.planner_options();
    options.model = Some(adapter.model().to_string());
    Ok(RetryPlanner::new(Arc::new(adapter)).with_options(options))
}
