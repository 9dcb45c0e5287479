//! Error extraction from heterogeneous validator output.
//!
//! Validators emit either structured JSON (`{"errors": [...]}` or
//! `{"errorReport": [...]}`) or free-form markdown. Extraction tries the
//! structured shape first and falls back to pattern matching:
//!
//! 1. markdown table rows `| ID | SEVERITY | Category | Location | Description | ...`
//! 2. lines carrying a severity keyword inside an "Error Report" section
//! 3. a `Total Errors: N` summary, only when nothing else was found
//!
//! Extraction never fails. Unparseable content contributes zero errors.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::model::{
    RawReport, Severity, ValidationError, ValidationReport, INFRASTRUCTURE_SERVICE,
};

/// Upper bound on placeholder records synthesized from a summary line.
pub const MAX_PLACEHOLDER_ERRORS: usize = 10_000;

fn error_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b[A-Z][A-Z0-9]{1,9}-[A-Z][A-Z0-9]*-\d{3,}\b").expect("valid error id regex")
    })
}

fn table_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Z][A-Z0-9]*(?:-[A-Z0-9]+)+$").expect("valid table id regex")
    })
}

fn severity_keyword_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(CRITICAL|HIGH|MEDIUM|LOW)\b|(?i:severity)\s*[:=]\s*\**\s*(?i:(critical|high|medium|low))\b")
            .expect("valid severity regex")
    })
}

fn total_errors_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)total\s+errors\s*\**\s*[:=]\s*\**\s*(\d+)").expect("valid total regex")
    })
}

fn category_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)category\s*[:=]\s*\**\s*([A-Za-z][A-Za-z /-]*[A-Za-z])").expect("valid category regex")
    })
}

/// Stateless extractor turning validator output into `ValidationError`s.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorExtractor;

impl ErrorExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract errors from every report, in input order.
    pub fn extract_all(&self, reports: &[RawReport]) -> Vec<ValidationReport> {
        reports
            .iter()
            .map(|r| self.extract_report(&r.name, &r.content))
            .collect()
    }

    /// Extract errors from every report and flatten them into one list.
    pub fn extract_errors(&self, reports: &[RawReport]) -> Vec<ValidationError> {
        self.extract_all(reports)
            .into_iter()
            .flat_map(|r| r.errors)
            .collect()
    }

    /// Extract a single report.
    pub fn extract_report(&self, name: &str, content: &str) -> ValidationReport {
        let errors = match parse_structured(name, content) {
            Some(errors) => errors,
            None => {
                let mut errors = parse_table_rows(name, content);
                errors.extend(parse_error_report_section(name, content));
                if errors.is_empty() {
                    errors = parse_total_errors_summary(name, content);
                }
                errors
            }
        };

        debug!("Extracted {} errors from report '{}'", errors.len(), name);
        ValidationReport::new(name, content, errors)
    }
}

/// Whether any error is CRITICAL or HIGH.
pub fn has_critical_issues(errors: &[ValidationError]) -> bool {
    errors.iter().any(|e| e.is_critical())
}

/// The CRITICAL and HIGH errors, in order.
pub fn critical_issues(errors: &[ValidationError]) -> Vec<&ValidationError> {
    errors.iter().filter(|e| e.is_critical()).collect()
}

/// Count errors per severity, ordered from most to least severe.
pub fn summary_by_severity(errors: &[ValidationError]) -> Vec<(Severity, usize)> {
    [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
        Severity::Unknown,
    ]
    .into_iter()
    .map(|s| (s, errors.iter().filter(|e| e.severity == s).count()))
    .filter(|(_, n)| *n > 0)
    .collect()
}

/// Parse `{"errors": [...]}` / `{"errorReport": [...]}`.
///
/// Returns `None` when the content is not JSON of that shape, so the caller
/// falls back to pattern extraction.
fn parse_structured(name: &str, content: &str) -> Option<Vec<ValidationError>> {
    let trimmed = content.trim();
    if !trimmed.starts_with('{') {
        return None;
    }

    let value: Value = match serde_json::from_str(trimmed) {
        Ok(v) => v,
        Err(e) => {
            warn!("Report '{}' looks like JSON but failed to parse: {}", name, e);
            return None;
        }
    };

    let items = value
        .get("errors")
        .or_else(|| value.get("errorReport"))
        .and_then(Value::as_array)?;

    Some(
        items
            .iter()
            .enumerate()
            .filter_map(|(i, item)| structured_item(name, i, item))
            .collect(),
    )
}

fn structured_item(name: &str, index: usize, item: &Value) -> Option<ValidationError> {
    let obj = item.as_object()?;
    let text = |keys: &[&str]| -> String {
        keys.iter()
            .find_map(|k| obj.get(*k).and_then(Value::as_str))
            .unwrap_or("")
            .trim()
            .to_string()
    };

    let id = text(&["id", "errorId", "error_id", "code"]);
    let id = if id.is_empty() {
        placeholder_id(name, "ERR", index + 1)
    } else {
        id
    };
    let location = text(&["location", "file", "path"]);
    let service = text(&["service", "module"]);
    let service = if service.is_empty() {
        infer_service(&location)
    } else {
        service
    };
    let category = text(&["category", "type"]);

    let mut error = ValidationError::new(
        id,
        Severity::parse(&text(&["severity", "level"])),
        if category.is_empty() { "General".to_string() } else { category },
    )
    .service(service)
    .location(location)
    .description(text(&["description", "message", "title"]))
    .impact(text(&["impact"]))
    .recommendation(text(&["recommendation", "fix", "suggestedFix"]));

    let log = text(&["fullLog", "log"]);
    if !log.is_empty() {
        error = error.with_log(&log, crate::model::DEFAULT_LOG_EXCERPT_CHARS);
    }
    Some(error)
}

/// Parse markdown table rows shaped like an error table.
fn parse_table_rows(name: &str, content: &str) -> Vec<ValidationError> {
    content
        .lines()
        .filter_map(parse_table_row)
        .inspect(|e| debug!("Table row error {} in report '{}'", e.id, name))
        .collect()
}

fn parse_table_row(line: &str) -> Option<ValidationError> {
    let trimmed = line.trim();
    if !trimmed.starts_with('|') {
        return None;
    }

    let cells: Vec<String> = trimmed
        .trim_matches('|')
        .split('|')
        .map(clean_cell)
        .collect();
    if cells.len() < 5 || !table_id_regex().is_match(&cells[0]) {
        return None;
    }

    let severity = Severity::parse(&cells[1]);
    if severity == Severity::Unknown && !cells[1].eq_ignore_ascii_case("unknown") {
        return None;
    }

    let cell = |i: usize| cells.get(i).cloned().unwrap_or_default();
    let location = cell(3);
    Some(
        ValidationError::new(cell(0), severity, cell(2))
            .service(infer_service(&location))
            .location(location)
            .description(cell(4))
            .impact(cell(5))
            .recommendation(cell(6)),
    )
}

fn clean_cell(cell: &str) -> String {
    cell.trim().trim_matches(|c| c == '*' || c == '`').trim().to_string()
}

/// Scan the lines of an "Error Report" section for severity keywords.
///
/// Table rows are skipped here; they are handled by the table parser.
fn parse_error_report_section(name: &str, content: &str) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut section_level: Option<usize> = None;

    for line in content.lines() {
        let trimmed = line.trim();

        if let Some(level) = heading_level(trimmed) {
            if trimmed.to_ascii_lowercase().contains("error report") {
                section_level = Some(level);
                continue;
            }
            if section_level.is_some_and(|current| level <= current) {
                section_level = None;
            }
            continue;
        }

        if section_level.is_none() || trimmed.is_empty() || trimmed.starts_with('|') {
            continue;
        }

        let Some(caps) = severity_keyword_regex().captures(trimmed) else {
            continue;
        };
        let keyword = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str())
            .unwrap_or("");

        let id = error_id_regex()
            .find(trimmed)
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| placeholder_id(name, "R", errors.len() + 1));
        let category = category_regex()
            .captures(trimmed)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_else(|| "General".to_string());

        let description = trimmed
            .trim_start_matches(|c: char| c == '-' || c == '*' || c == '+' || c.is_whitespace())
            .to_string();

        errors.push(
            ValidationError::new(id, Severity::parse(keyword), category)
                .service(INFRASTRUCTURE_SERVICE)
                .description(description),
        );
    }

    errors
}

fn heading_level(line: &str) -> Option<usize> {
    let level = line.chars().take_while(|c| *c == '#').count();
    if level > 0 && line[level..].starts_with(' ') {
        Some(level)
    } else {
        None
    }
}

/// Produce N UNKNOWN placeholders from a `Total Errors: N` line.
fn parse_total_errors_summary(name: &str, content: &str) -> Vec<ValidationError> {
    let Some(total) = total_errors_from_summary(content) else {
        return Vec::new();
    };

    let total = if total > MAX_PLACEHOLDER_ERRORS {
        warn!(
            "Report '{}' claims {} errors, capping placeholders at {}",
            name, total, MAX_PLACEHOLDER_ERRORS
        );
        MAX_PLACEHOLDER_ERRORS
    } else {
        total
    };

    (1..=total)
        .map(|i| {
            ValidationError::new(placeholder_id(name, "UNKNOWN", i), Severity::Unknown, "Unknown")
                .description(format!(
                    "Unspecified error reported by the '{}' summary line",
                    name
                ))
        })
        .collect()
}

/// Read the `Total Errors: N` figure, if present.
pub fn total_errors_from_summary(content: &str) -> Option<usize> {
    total_errors_regex()
        .captures(content)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<usize>().ok())
}

/// Find conventional error IDs (`PREFIX-CATEGORY-NNN`) in text.
pub fn default_error_id_regex() -> &'static Regex {
    error_id_regex()
}

fn placeholder_id(source: &str, kind: &str, n: usize) -> String {
    let prefix: String = source
        .to_ascii_uppercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("{}-{}-{:03}", prefix, kind, n)
}

/// Guess the owning service from a location such as `accounts-service/src/Main.java`.
fn infer_service(location: &str) -> String {
    let first = location
        .trim_start_matches("./")
        .split(['/', '\\'])
        .next()
        .unwrap_or("")
        .trim();
    if location.contains(['/', '\\']) && !first.is_empty() {
        first.to_string()
    } else {
        INFRASTRUCTURE_SERVICE.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE_REPORT: &str = r#"# Unit Test Validation

## Error Report

| Error ID | Severity | Category | Location | Description | Impact | Recommendation |
|----------|----------|----------|----------|-------------|--------|----------------|
| UT-BUILD-001 | **CRITICAL** | Build | accounts-service/pom.xml | Missing spring-boot-starter-web | Service cannot start | Add the dependency |
| UT-API-002 | HIGH | API | ledger-service/src/LedgerController.java | Wrong response code | Clients break | Return 201 |

- UT-DB-003 CRITICAL: schema migration missing for table ACCOUNTS (Category: Database)
- Note: everything else looks fine

## Recommendations

- Fix UT-BUILD-001 first (CRITICAL path)

Total Errors: 3
"#;

    #[test]
    fn test_structured_errors_array() {
        let content = r#"{"errors":[{"id":"IT-API-001","severity":"high","category":"API","location":"gateway/routes.yml","description":"Route missing"}]}"#;
        let report = ErrorExtractor::new().extract_report("integration", content);

        assert_eq!(report.errors.len(), 1);
        let e = &report.errors[0];
        assert_eq!(e.id, "IT-API-001");
        assert_eq!(e.severity, Severity::High);
        assert_eq!(e.service, "gateway");
        assert!(!report.passed());
    }

    #[test]
    fn test_structured_error_report_key_and_missing_id() {
        let content = r#"{"errorReport":[{"severity":"LOW","message":"Slow test"}]}"#;
        let report = ErrorExtractor::new().extract_report("e2e", content);

        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].id, "E2E-ERR-001");
        assert_eq!(report.errors[0].description, "Slow test");
        assert_eq!(report.errors[0].category, "General");
    }

    #[test]
    fn test_structured_empty_array_passes() {
        let report = ErrorExtractor::new().extract_report("unit", r#"{"errors": []}"#);
        assert!(report.errors.is_empty());
        assert!(report.passed());
    }

    #[test]
    fn test_table_and_section_extraction() {
        let report = ErrorExtractor::new().extract_report("unit", TABLE_REPORT);
        let ids: Vec<_> = report.errors.iter().map(|e| e.id.as_str()).collect();

        assert_eq!(ids, vec!["UT-BUILD-001", "UT-API-002", "UT-DB-003"]);
        assert_eq!(report.errors[0].severity, Severity::Critical);
        assert_eq!(report.errors[0].service, "accounts-service");
        assert_eq!(report.errors[0].recommendation, "Add the dependency");
        assert_eq!(report.errors[2].category, "Database");
    }

    #[test]
    fn test_section_ends_at_next_heading() {
        // The "Recommendations" line mentions CRITICAL but is outside the section.
        let report = ErrorExtractor::new().extract_report("unit", TABLE_REPORT);
        assert!(report
            .errors
            .iter()
            .all(|e| !e.description.contains("Fix UT-BUILD-001 first")));
    }

    #[test]
    fn test_summary_fallback_only_when_nothing_found() {
        let content = "# Results\n\nSome tests failed.\n\n**Total Errors:** 5\n";
        let report = ErrorExtractor::new().extract_report("e2e", content);

        assert_eq!(report.errors.len(), 5);
        assert!(report.errors.iter().all(|e| e.severity == Severity::Unknown));
        assert_eq!(report.errors[4].id, "E2E-UNKNOWN-005");
    }

    #[test]
    fn test_malformed_input_yields_nothing() {
        let extractor = ErrorExtractor::new();
        assert!(extractor.extract_report("x", "{not json").errors.is_empty());
        assert!(extractor.extract_report("x", "").errors.is_empty());
        assert!(extractor.extract_report("x", "| a | b |").errors.is_empty());
    }

    #[test]
    fn test_extraction_is_idempotent() {
        let extractor = ErrorExtractor::new();
        let first = extractor.extract_report("unit", TABLE_REPORT);
        let second = extractor.extract_report("unit", TABLE_REPORT);
        assert_eq!(first.errors, second.errors);
    }

    #[test]
    fn test_duplicates_across_reports_are_preserved() {
        let content = "| UT-API-001 | HIGH | API | a/b | desc |";
        let errors = ErrorExtractor::new().extract_errors(&[
            RawReport::new("unit", content),
            RawReport::new("integration", content),
        ]);
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_critical_issue_helpers() {
        let errors = vec![
            ValidationError::new("A-B-001", Severity::Medium, "X"),
            ValidationError::new("A-B-002", Severity::High, "X"),
        ];
        assert!(has_critical_issues(&errors));
        assert_eq!(critical_issues(&errors).len(), 1);
        assert_eq!(
            summary_by_severity(&errors),
            vec![(Severity::High, 1), (Severity::Medium, 1)]
        );
        assert!(!has_critical_issues(&errors[..1]));
    }
}
