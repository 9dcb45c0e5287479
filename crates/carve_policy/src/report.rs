//! Markdown rendering of validation reports.

use std::fmt::Write;

use crate::model::ValidationReport;

/// Render a report as a markdown error table.
///
/// The output uses the table shape `ErrorExtractor` accepts, so a rendered
/// report can be fed back in as validator output.
pub fn render_markdown(report: &ValidationReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# {} Validation", report.source_name);
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "**Status:** {}",
        if report.passed() { "PASS" } else { "FAIL" }
    );
    let _ = writeln!(out);
    let _ = writeln!(out, "## Error Report");
    let _ = writeln!(out);

    if report.errors.is_empty() {
        let _ = writeln!(out, "No errors found.");
    } else {
        let _ = writeln!(
            out,
            "| Error ID | Severity | Category | Location | Description | Impact | Recommendation |"
        );
        let _ = writeln!(
            out,
            "|----------|----------|----------|----------|-------------|--------|----------------|"
        );
        for e in &report.errors {
            let _ = writeln!(
                out,
                "| {} | {} | {} | {} | {} | {} | {} |",
                cell(&e.id),
                e.severity,
                cell(&e.category),
                cell(&e.location),
                cell(&e.description),
                cell(&e.impact),
                cell(&e.recommendation),
            );
        }
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "Total Errors: {}", report.errors.len());
    out
}

fn cell(text: &str) -> String {
    text.replace('|', "/").replace(['\n', '\r'], " ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::ErrorExtractor;
    use crate::model::{Severity, ValidationError};

    #[test]
    fn test_rendered_report_is_extractable() {
        let report = ValidationReport::new(
            "build",
            "",
            vec![
                ValidationError::new("BV-BUILD-001", Severity::Critical, "Build")
                    .location("accounts/Dockerfile")
                    .description("Maven build failed")
                    .recommendation("Add the missing dependency"),
                ValidationError::new("BV-HEALTH-001", Severity::High, "Runtime")
                    .description("Health check timeout"),
            ],
        );

        let markdown = render_markdown(&report);
        assert!(markdown.contains("**Status:** FAIL"));
        assert!(markdown.contains("Total Errors: 2"));

        let extracted = ErrorExtractor::new().extract_report("build", &markdown);
        let ids: Vec<_> = extracted.errors.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["BV-BUILD-001", "BV-HEALTH-001"]);
        assert_eq!(extracted.errors[0].severity, Severity::Critical);
    }

    #[test]
    fn test_clean_report() {
        let markdown = render_markdown(&ValidationReport::new("unit", "", Vec::new()));
        assert!(markdown.contains("No errors found."));
        assert!(ErrorExtractor::new()
            .extract_report("unit", &markdown)
            .errors
            .is_empty());
    }
}
