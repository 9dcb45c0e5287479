//! Count command - Apply the zero-error gate to a set of reports.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use tracing::{debug, info};
use walkdir::WalkDir;

use carve_policy::{ErrorCounter, RawReport, ReleaseGate, DEFAULT_ERROR_ID_PATTERN};

use super::{CliFailure, OutputFormat};

const REPORT_EXTENSIONS: &[&str] = &["md", "json", "txt", "log"];

#[derive(Args)]
pub struct CountArgs {
    /// Report files
    files: Vec<PathBuf>,

    /// Directory to scan for reports (.md, .json, .txt, .log)
    #[arg(short, long)]
    dir: Option<PathBuf>,

    /// Error ID regex
    #[arg(long, default_value = DEFAULT_ERROR_ID_PATTERN)]
    pattern: String,

    /// Output format (markdown is treated as text)
    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormat,
}

pub async fn execute(args: CountArgs) -> Result<()> {
    let mut paths = args.files.clone();
    if let Some(dir) = &args.dir {
        paths.extend(report_files(dir));
    }
    if paths.is_empty() {
        return Err(CliFailure::Usage("no reports given; pass files or --dir".to_string()).into());
    }

    let reports = paths
        .iter()
        .map(|path| {
            RawReport::from_file(path).with_context(|| format!("Failed to read report {}", path.display()))
        })
        .collect::<Result<Vec<_>>>()?;

    let counter = ErrorCounter::with_pattern(&args.pattern)
        .map_err(|e| CliFailure::Usage(format!("invalid --pattern: {}", e)))?;
    let count = counter.count_total_errors(&reports);
    let gate = ReleaseGate::evaluate(&count);
    info!("Counted {} errors in {} reports", count.total_errors, reports.len());

    if args.format == OutputFormat::Json {
        let json = serde_json::to_string_pretty(&count).context("Failed to serialize count")?;
        println!("{}", json);
    } else {
        for detail in &gate.details {
            let status = if detail.passed { "✅" } else { "❌" };
            match &detail.message {
                Some(message) => println!("  {} {}: {}", status, detail.check, message),
                None => println!("  {} {}", status, detail.check),
            }
        }
        println!();
        println!("Total errors: {} ({} critical)", count.total_errors, count.critical_count());
        for rec in &gate.recommendations {
            println!("  → {}", rec);
        }
    }

    if count.has_zero_errors() {
        Ok(())
    } else {
        Err(CliFailure::ValidationFailed(format!("{} errors remain", count.total_errors)).into())
    }
}

/// Report files under `dir`, sorted for stable output.
fn report_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| REPORT_EXTENSIONS.contains(&e))
        })
        .collect();
    files.sort();
    debug!("Found {} report files under {}", files.len(), dir.display());
    files
}
