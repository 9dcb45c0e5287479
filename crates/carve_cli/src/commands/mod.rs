//! CLI command definitions.
//!
//! Each subcommand maps to one stage of the migration loop, or to the
//! whole loop (`migrate`).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use thiserror::Error;

use carve_core::CarveConfig;
use carve_runner::{CliComposeRuntime, CliRuntimeOptions, ComposeRuntime, ContainerRuntime};

pub mod cleanup;
pub mod count;
pub mod extract;
pub mod migrate;
pub mod plan;
pub mod status;
pub mod validate_build;

/// carve - bounded generate/validate/retry loop for code migrations
#[derive(Parser)]
#[command(name = "carve")]
#[command(version, about = "carve - bounded generate/validate/retry loop for code migrations")]
#[command(long_about = r#"
carve drives agent-generated code through validation until zero errors
remain, asking a planning agent for adjusted guidance between attempts.

COMMANDS:
  extract        → Extract structured errors from validator reports
  count          → Count errors across reports (exit 3 when non-zero)
  validate-build → Build and health-check a compose project
  plan           → Ask the planning agent for a retry strategy
  migrate        → Run the full generate/validate/retry loop
  cleanup        → Tear down a compose project
  status         → Show a job and its release gate decision

EXIT CODES:
  0 - Success
  1 - General error
  2 - Invalid arguments or configuration
  3 - Validation failure / release gate blocked
  4 - Agent error
  5 - Container runtime error
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Extract structured errors from validator reports
    Extract(extract::ExtractArgs),

    /// Count errors across validator reports
    Count(count::CountArgs),

    /// Build and health-check a compose project
    #[command(name = "validate-build")]
    ValidateBuild(validate_build::ValidateBuildArgs),

    /// Ask the planning agent for a retry strategy
    Plan(plan::PlanArgs),

    /// Run the full migration loop
    Migrate(migrate::MigrateArgs),

    /// Tear down a compose project
    Cleanup(cleanup::CleanupArgs),

    /// Show a job and its release gate decision
    Status(status::StatusArgs),
}

/// Failures that map to a dedicated exit code.
#[derive(Debug, Error)]
pub enum CliFailure {
    #[error("{0}")]
    Usage(String),

    #[error("validation failed: {0}")]
    ValidationFailed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Markdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RuntimeChoice {
    Docker,
    Podman,
}

/// Parse `name=path` report arguments.
pub fn parse_named_path(raw: &str) -> Result<(String, PathBuf), String> {
    match raw.split_once('=') {
        Some((name, path)) if !name.trim().is_empty() && !path.trim().is_empty() => {
            Ok((name.trim().to_string(), PathBuf::from(path.trim())))
        }
        _ => Err(format!("expected NAME=PATH, got '{}'", raw)),
    }
}

/// Resolve configuration from an explicit file or the working directory.
pub fn load_config(explicit: Option<&Path>, dir: &Path) -> Result<CarveConfig> {
    CarveConfig::resolve(explicit, dir).context("Failed to load configuration")
}

pub fn load_plan(path: &Path) -> Result<serde_json::Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read migration plan {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Migration plan {} is not valid JSON", path.display()))
}

/// Create the compose runtime for the host.
pub fn compose_runtime(choice: Option<RuntimeChoice>, dry_run: bool) -> Result<Arc<dyn ComposeRuntime>> {
    let mut options = CliRuntimeOptions::new();
    options.preferred_runtime = choice.map(|c| match c {
        RuntimeChoice::Docker => ContainerRuntime::Docker,
        RuntimeChoice::Podman => ContainerRuntime::Podman,
    });
    if dry_run {
        options = options.dry_run();
    }
    let runtime = CliComposeRuntime::new(options).context("No container runtime found")?;
    Ok(Arc::new(runtime))
}

/// Project name for a compose file when none is given: its directory name.
pub fn default_project_name(compose_file: &Path) -> String {
    compose_file
        .canonicalize()
        .ok()
        .as_deref()
        .and_then(Path::parent)
        .and_then(Path::file_name)
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| "carve".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_named_path() {
        let (name, path) = parse_named_path("unit=reports/unit.md").unwrap();
        assert_eq!(name, "unit");
        assert_eq!(path, PathBuf::from("reports/unit.md"));

        assert!(parse_named_path("unit").is_err());
        assert!(parse_named_path("=x.md").is_err());
    }

    #[test]
    fn test_default_project_name_uses_directory() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let dir = temp_dir.path().join("banking-app");
        std::fs::create_dir(&dir).unwrap();
        let compose = dir.join("docker-compose.yml");
        std::fs::write(&compose, "services: {}").unwrap();

        assert_eq!(default_project_name(&compose), "banking-app");
        assert_eq!(default_project_name(Path::new("/nonexistent/x.yml")), "carve");
    }

    #[test]
    fn test_parse_migrate_arguments() {
        let cli = Cli::try_parse_from([
            "carve",
            "migrate",
            "--plan",
            "plan.json",
            "--generate-cmd",
            "./generate.sh",
            "--report",
            "unit=reports/unit.md",
            "--report",
            "e2e=reports/e2e.md",
        ])
        .unwrap();

        match cli.command {
            Commands::Migrate(args) => {
                assert_eq!(args.reports.len(), 2);
                assert_eq!(args.reports[1].0, "e2e");
                assert!(args.compose.is_none());
            }
            _ => panic!("expected migrate"),
        }
    }
}
