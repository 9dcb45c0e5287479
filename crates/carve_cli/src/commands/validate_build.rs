//! Validate-build command - Build and health-check a compose project.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use carve_deploy::{BuildRequest, BuildValidationResult, BuildValidator, BUILD_REPORT_NAME};
use carve_policy::{render_markdown, ErrorExtractor};
use carve_runner::ComposeProject;

use super::{compose_runtime, default_project_name, load_config, CliFailure, OutputFormat, RuntimeChoice};

#[derive(Args)]
pub struct ValidateBuildArgs {
    /// Compose descriptor
    #[arg(short, long, default_value = "docker-compose.yml")]
    compose: PathBuf,

    /// Compose project name (defaults to the descriptor's directory name)
    #[arg(short, long)]
    project: Option<String>,

    /// Leave services running and print their URLs
    #[arg(long)]
    deploy: bool,

    /// Reuse the image build cache
    #[arg(long)]
    use_cache: bool,

    /// Container runtime (auto-detected when omitted)
    #[arg(long, value_enum)]
    runtime: Option<RuntimeChoice>,

    /// Log compose commands without running them
    #[arg(long)]
    dry_run: bool,

    /// Config file (defaults to carve.yaml / carve.toml in the current directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormat,
}

pub async fn execute(args: ValidateBuildArgs) -> Result<()> {
    let current_dir = std::env::current_dir()?;
    let config = load_config(args.config.as_deref(), &current_dir)?;

    let project_name = args
        .project
        .clone()
        .unwrap_or_else(|| default_project_name(&args.compose));
    let project = ComposeProject::new(project_name, &args.compose);

    let runtime = compose_runtime(args.runtime, args.dry_run)?;
    let validator = BuildValidator::new(runtime).with_settings(config.validator_settings());

    let mut request = BuildRequest::new(project);
    if args.use_cache {
        request = request.with_cache();
    }

    info!(
        "{} compose project {}",
        if args.deploy { "Deploying" } else { "Validating" },
        request.project.name
    );
    let result = if args.deploy {
        validator.deploy(&request).await
    } else {
        validator.validate_build(&request).await
    };

    match args.format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&result).context("Failed to serialize result")?;
            println!("{}", json);
        }
        OutputFormat::Markdown => {
            let report =
                ErrorExtractor::new().extract_report(BUILD_REPORT_NAME, &result.to_report_content());
            println!("{}", render_markdown(&report));
        }
        OutputFormat::Text => print_result(&result),
    }

    if result.success {
        Ok(())
    } else {
        Err(CliFailure::ValidationFailed(format!(
            "build validation ended in {} with {} errors",
            result.phase(),
            result.errors.len()
        ))
        .into())
    }
}

fn print_result(result: &BuildValidationResult) {
    println!("Project: {}", result.deployment.project);
    println!("Phase:   {}", result.phase());
    println!();

    for service in result.deployment.services.values() {
        let port = service
            .port
            .map(|p| format!(":{}", p))
            .unwrap_or_default();
        println!("  {:<30} {:?}{}", service.name, service.status, port);
        if let Some(error) = &service.error {
            println!("      {}", error);
        }
    }

    if !result.errors.is_empty() {
        println!();
        for error in &result.errors {
            println!("  [{}] {} {}: {}", error.severity, error.id, error.service, error.description);
            if !error.recommendation.is_empty() {
                println!("      fix: {}", error.recommendation);
            }
        }
    }

    if !result.service_urls.is_empty() {
        println!();
        println!("Service URLs:");
        for (name, url) in &result.service_urls {
            println!("  {:<30} {}", name, url);
        }
    }

    println!();
    if result.success {
        println!("✅ Build validation PASSED");
    } else {
        println!("❌ Build validation FAILED");
    }
    if result.torn_down {
        println!("   (services torn down)");
    }
}
