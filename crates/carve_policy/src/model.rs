//! Validation error model.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PolicyError, PolicyResult};

/// Default number of trailing log characters kept on an error.
pub const DEFAULT_LOG_EXCERPT_CHARS: usize = 2000;

/// Service name used for failures that are not tied to one service.
pub const INFRASTRUCTURE_SERVICE: &str = "infrastructure";

/// Severity of a validation error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Unknown,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "CRITICAL",
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Parse a severity label leniently.
    ///
    /// Case-insensitive; `error`/`warning`/`info` map to HIGH/MEDIUM/LOW and
    /// decoration such as `**HIGH**` or `🔴 Critical` is ignored.
    pub fn parse(raw: &str) -> Self {
        let cleaned: String = raw
            .chars()
            .filter(|c| c.is_ascii_alphabetic())
            .collect::<String>()
            .to_ascii_lowercase();

        match cleaned.as_str() {
            "critical" | "blocker" | "fatal" => Self::Critical,
            "high" | "error" | "major" => Self::High,
            "medium" | "warning" | "warn" | "moderate" => Self::Medium,
            "low" | "info" | "minor" => Self::Low,
            _ => Self::Unknown,
        }
    }

    /// CRITICAL and HIGH errors gate the retry/release decision.
    pub fn is_critical(&self) -> bool {
        matches!(self, Self::Critical | Self::High)
    }
}

impl Default for Severity {
    fn default() -> Self {
        Self::Unknown
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One discovered defect.
///
/// Identifiers are unique within a single validation pass only. Errors are
/// never mutated after creation; the next pass produces a fresh set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationError {
    pub id: String,
    pub severity: Severity,
    pub category: String,
    pub service: String,
    pub location: String,
    pub description: String,
    pub impact: String,
    pub recommendation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_log: Option<String>,
}

impl ValidationError {
    pub fn new(id: impl Into<String>, severity: Severity, category: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            severity,
            category: category.into(),
            service: INFRASTRUCTURE_SERVICE.to_string(),
            location: String::new(),
            description: String::new(),
            impact: String::new(),
            recommendation: String::new(),
            full_log: None,
        }
    }

    pub fn service(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }

    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn impact(mut self, impact: impl Into<String>) -> Self {
        self.impact = impact.into();
        self
    }

    pub fn recommendation(mut self, recommendation: impl Into<String>) -> Self {
        self.recommendation = recommendation.into();
        self
    }

    /// Attach a raw log excerpt, keeping only the last `max_chars` characters.
    pub fn with_log(mut self, log: &str, max_chars: usize) -> Self {
        self.full_log = Some(tail_chars(log, max_chars).to_string());
        self
    }

    pub fn is_critical(&self) -> bool {
        self.severity.is_critical()
    }
}

/// Return the last `max_chars` characters of `s` on a char boundary.
/// A zero limit yields an empty string.
pub fn tail_chars(s: &str, max_chars: usize) -> &str {
    let count = s.chars().count();
    if count <= max_chars {
        return s;
    }
    match s.char_indices().nth(count - max_chars) {
        Some((idx, _)) => &s[idx..],
        // max_chars == 0
        None => "",
    }
}

/// Raw output of one validator, before extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawReport {
    pub name: String,
    pub content: String,
}

impl RawReport {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }

    /// Read a report from disk, naming it after the file stem.
    pub fn from_file(path: &Path) -> PolicyResult<Self> {
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| PolicyError::InvalidSource(path.display().to_string()))?
            .to_string();
        let content = std::fs::read_to_string(path)?;
        Ok(Self { name, content })
    }
}

/// Outcome of one validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Pass,
    Fail,
}

/// Output of one validator for one attempt, with extracted errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub source_name: String,
    pub raw_content: String,
    pub errors: Vec<ValidationError>,
    pub status: ReportStatus,
}

impl ValidationReport {
    pub fn new(source_name: impl Into<String>, raw_content: impl Into<String>, errors: Vec<ValidationError>) -> Self {
        let status = if errors.is_empty() {
            ReportStatus::Pass
        } else {
            ReportStatus::Fail
        };
        Self {
            source_name: source_name.into(),
            raw_content: raw_content.into(),
            errors,
            status,
        }
    }

    pub fn passed(&self) -> bool {
        self.status == ReportStatus::Pass
    }

    /// Errors with severity CRITICAL or HIGH.
    pub fn critical_errors(&self) -> impl Iterator<Item = &ValidationError> {
        self.errors.iter().filter(|e| e.is_critical())
    }
}
