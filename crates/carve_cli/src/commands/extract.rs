//! Extract command - Turn validator reports into structured errors.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use carve_policy::{render_markdown, summary_by_severity, ErrorExtractor, RawReport, ValidationReport};

use super::OutputFormat;

#[derive(Args)]
pub struct ExtractArgs {
    /// Report files (markdown or JSON)
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormat,
}

pub async fn execute(args: ExtractArgs) -> Result<()> {
    let reports = args
        .files
        .iter()
        .map(|path| {
            RawReport::from_file(path).with_context(|| format!("Failed to read report {}", path.display()))
        })
        .collect::<Result<Vec<_>>>()?;

    let extracted = ErrorExtractor::new().extract_all(&reports);
    info!(
        "Extracted {} errors from {} reports",
        extracted.iter().map(|r| r.errors.len()).sum::<usize>(),
        extracted.len()
    );

    match args.format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&extracted).context("Failed to serialize reports")?;
            println!("{}", json);
        }
        OutputFormat::Markdown => {
            for report in &extracted {
                println!("{}", render_markdown(report));
            }
        }
        OutputFormat::Text => {
            for report in &extracted {
                print_report(report);
            }
        }
    }
    Ok(())
}

fn print_report(report: &ValidationReport) {
    let status = if report.passed() { "✅" } else { "❌" };
    println!("{} {}: {} errors", status, report.source_name, report.errors.len());

    for error in &report.errors {
        println!(
            "  [{}] {} {} {}",
            error.severity, error.id, error.service, error.description
        );
        if !error.location.is_empty() {
            println!("      at {}", error.location);
        }
        if !error.recommendation.is_empty() {
            println!("      fix: {}", error.recommendation);
        }
    }

    let summary = summary_by_severity(&report.errors);
    if !summary.is_empty() {
        let parts: Vec<String> = summary
            .iter()
            .map(|(severity, n)| format!("{} {}", n, severity))
            .collect();
        println!("  ({})", parts.join(", "));
    }
    println!();
}
