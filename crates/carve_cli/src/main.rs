//! carve CLI - Main entry point.
//!
//! Exit codes:
//! - 0: Success
//! - 1: General error
//! - 2: Invalid arguments or configuration
//! - 3: Validation failure / release gate blocked
//! - 4: Agent error
//! - 5: Container runtime error

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;

use carve_agents::AgentError;
use carve_core::CoreError;
use carve_deploy::DeployError;
use carve_runner::RunnerError;
use commands::{Cli, CliFailure, Commands};

/// CI-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL_ERROR: u8 = 1;
    pub const INVALID_ARGS: u8 = 2;
    pub const VALIDATION_FAILURE: u8 = 3;
    pub const AGENT_ERROR: u8 = 4;
    pub const RUNTIME_ERROR: u8 = 5;
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.json_logs);

    let result = match cli.command {
        Commands::Extract(args) => commands::extract::execute(args).await,
        Commands::Count(args) => commands::count::execute(args).await,
        Commands::ValidateBuild(args) => commands::validate_build::execute(args).await,
        Commands::Plan(args) => commands::plan::execute(args).await,
        Commands::Migrate(args) => commands::migrate::execute(args).await,
        Commands::Cleanup(args) => commands::cleanup::execute(args).await,
        Commands::Status(args) => commands::status::execute(args).await,
    };

    match result {
        Ok(()) => ExitCode::from(ExitCodes::SUCCESS),
        Err(e) => {
            let exit_code = categorize_error(&e);
            eprintln!("❌ Error: {:#}", e);
            ExitCode::from(exit_code)
        }
    }
}

/// Logs go to stderr so JSON output on stdout stays parseable.
fn init_logging(verbose: bool, json: bool) {
    let default_directives = if verbose { "carve=debug,info" } else { "carve=info,warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));

    let registry = tracing_subscriber::registry().with(filter);
    let result = if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
    };

    if result.is_err() {
        // Logging already initialized, continue
    }
}

/// Categorize error to determine exit code
fn categorize_error(e: &anyhow::Error) -> u8 {
    for cause in e.chain() {
        if let Some(failure) = cause.downcast_ref::<CliFailure>() {
            return match failure {
                CliFailure::Usage(_) => ExitCodes::INVALID_ARGS,
                CliFailure::ValidationFailed(_) => ExitCodes::VALIDATION_FAILURE,
            };
        }
        if cause.downcast_ref::<AgentError>().is_some() {
            return ExitCodes::AGENT_ERROR;
        }
        if cause.downcast_ref::<RunnerError>().is_some() {
            return ExitCodes::RUNTIME_ERROR;
        }
        if let Some(deploy) = cause.downcast_ref::<DeployError>() {
            return match deploy {
                DeployError::InvalidDescriptor { .. } => ExitCodes::INVALID_ARGS,
                _ => ExitCodes::RUNTIME_ERROR,
            };
        }
        if let Some(core) = cause.downcast_ref::<CoreError>() {
            return match core {
                CoreError::JobNotFound(_) | CoreError::InvalidConfig(_) => ExitCodes::INVALID_ARGS,
                CoreError::Agent(_) => ExitCodes::AGENT_ERROR,
                CoreError::Runner(_) | CoreError::Deploy(_) => ExitCodes::RUNTIME_ERROR,
                _ => ExitCodes::GENERAL_ERROR,
            };
        }
    }
    ExitCodes::GENERAL_ERROR
}
