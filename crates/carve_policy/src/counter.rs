//! Error counting across validator reports.
//!
//! Counting aggregates per validator and never deduplicates across
//! validators. Within one report an error ID that recurs (a table row plus a
//! mention in a recommendations list) is counted once.

use std::collections::{BTreeMap, HashSet};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::PolicyResult;
use crate::extract::{total_errors_from_summary, ErrorExtractor, MAX_PLACEHOLDER_ERRORS};
use crate::model::{RawReport, Severity};

/// Default error ID convention: `PREFIX-CATEGORY-NNN`.
pub const DEFAULT_ERROR_ID_PATTERN: &str = r"\b[A-Z]{2,}-[A-Z0-9]+-\d{3}\b";

/// One counted error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountedError {
    pub validator: String,
    pub error_id: String,
    pub severity: Severity,
}

/// Aggregate error count for one validation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorCount {
    pub total_errors: usize,
    pub errors_by_validator: BTreeMap<String, usize>,
    pub error_details: Vec<CountedError>,
}

impl ErrorCount {
    /// The release gate: true iff no errors were counted.
    pub fn has_zero_errors(&self) -> bool {
        self.total_errors == 0
    }

    /// Number of counted CRITICAL or HIGH errors.
    pub fn critical_count(&self) -> usize {
        self.error_details
            .iter()
            .filter(|e| e.severity.is_critical())
            .count()
    }
}

/// Errors fixed between two consecutive attempts. Never negative.
pub fn calculate_errors_fixed(previous: usize, current: usize) -> usize {
    previous.saturating_sub(current)
}

/// Counts unique error IDs per validator report.
#[derive(Debug, Clone)]
pub struct ErrorCounter {
    id_pattern: Regex,
    extractor: ErrorExtractor,
}

impl Default for ErrorCounter {
    fn default() -> Self {
        Self {
            id_pattern: Regex::new(DEFAULT_ERROR_ID_PATTERN).expect("valid default id pattern"),
            extractor: ErrorExtractor::new(),
        }
    }
}

impl ErrorCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a non-default ID convention.
    pub fn with_pattern(pattern: &str) -> PolicyResult<Self> {
        Ok(Self {
            id_pattern: Regex::new(pattern)?,
            extractor: ErrorExtractor::new(),
        })
    }

    pub fn pattern(&self) -> &str {
        self.id_pattern.as_str()
    }

    /// Count errors across all reports.
    pub fn count_total_errors(&self, reports: &[RawReport]) -> ErrorCount {
        let mut count = ErrorCount::default();

        for report in reports {
            let details = self.count_report(report);
            debug!(
                "Validator '{}' contributed {} errors",
                report.name,
                details.len()
            );
            *count
                .errors_by_validator
                .entry(report.name.clone())
                .or_insert(0) += details.len();
            count.total_errors += details.len();
            count.error_details.extend(details);
        }

        count
    }

    /// Count one report.
    ///
    /// Unique IDs matched by the pattern win. Without any, a
    /// `Total Errors: N` summary yields N anonymous records. Otherwise the
    /// extractor's records are used, deduplicated by ID.
    pub fn count_report(&self, report: &RawReport) -> Vec<CountedError> {
        let ids = self.unique_ids(&report.content);
        if !ids.is_empty() {
            return ids
                .into_iter()
                .map(|id| CountedError {
                    severity: severity_near(&report.content, &id),
                    validator: report.name.clone(),
                    error_id: id,
                })
                .collect();
        }

        if let Some(total) = total_errors_from_summary(&report.content) {
            return (1..=total.min(MAX_PLACEHOLDER_ERRORS))
                .map(|i| CountedError {
                    validator: report.name.clone(),
                    error_id: format!("{}-UNKNOWN-{:03}", report.name.to_ascii_uppercase(), i),
                    severity: Severity::Unknown,
                })
                .collect();
        }

        let mut seen = HashSet::new();
        self.extractor
            .extract_report(&report.name, &report.content)
            .errors
            .into_iter()
            .filter(|e| seen.insert(e.id.clone()))
            .map(|e| CountedError {
                validator: report.name.clone(),
                error_id: e.id,
                severity: e.severity,
            })
            .collect()
    }

    fn unique_ids(&self, content: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        self.id_pattern
            .find_iter(content)
            .map(|m| m.as_str().to_string())
            .filter(|id| seen.insert(id.clone()))
            .collect()
    }
}

/// Severity label on the first line mentioning `id` that carries one.
///
/// Only the labels themselves count; prose such as "error" or "minor"
/// next to an ID leaves it `Unknown`.
fn severity_near(content: &str, id: &str) -> Severity {
    content
        .lines()
        .filter(|line| line.contains(id))
        .find_map(|line| {
            line.replace(id, " ")
                .split(|c: char| !c.is_ascii_alphabetic())
                .find_map(severity_label)
        })
        .unwrap_or_default()
}

fn severity_label(word: &str) -> Option<Severity> {
    match word.to_ascii_uppercase().as_str() {
        "CRITICAL" => Some(Severity::Critical),
        "HIGH" => Some(Severity::High),
        "MEDIUM" => Some(Severity::Medium),
        "LOW" => Some(Severity::Low),
        _ => None,
    }
}
