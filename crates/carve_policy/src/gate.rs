//! Release gate: output is only released once no errors remain.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::counter::ErrorCount;

/// Result of a gate evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateResult {
    pub gate_id: String,
    pub passed: bool,
    pub details: Vec<GateDetail>,
    pub recommendations: Vec<String>,
}

impl GateResult {
    pub fn pass(gate_id: impl Into<String>) -> Self {
        Self {
            gate_id: gate_id.into(),
            passed: true,
            details: Vec::new(),
            recommendations: Vec::new(),
        }
    }

    pub fn fail(gate_id: impl Into<String>) -> Self {
        Self {
            passed: false,
            ..Self::pass(gate_id)
        }
    }

    pub fn with_detail(mut self, detail: GateDetail) -> Self {
        self.details.push(detail);
        self
    }

    pub fn with_recommendation(mut self, rec: impl Into<String>) -> Self {
        self.recommendations.push(rec.into());
        self
    }
}

/// Per-validator outcome within a gate evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateDetail {
    pub check: String,
    pub passed: bool,
    pub message: Option<String>,
}

impl GateDetail {
    pub fn passed(check: impl Into<String>) -> Self {
        Self {
            check: check.into(),
            passed: true,
            message: None,
        }
    }

    pub fn failed(check: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            check: check.into(),
            passed: false,
            message: Some(message.into()),
        }
    }
}

/// Whether a consumer may fetch the migration output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum GateDecision {
    Open,
    Blocked { remaining: usize },
}

impl GateDecision {
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }
}

impl fmt::Display for GateDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => f.write_str("open"),
            Self::Blocked { remaining } => {
                write!(f, "blocked — {} critical errors remain", remaining)
            }
        }
    }
}

/// The zero-error release gate.
pub struct ReleaseGate;

impl ReleaseGate {
    pub const GATE_ID: &'static str = "zero-errors";

    /// Evaluate a count, with one detail per validator.
    pub fn evaluate(count: &ErrorCount) -> GateResult {
        let mut result = if count.has_zero_errors() {
            GateResult::pass(Self::GATE_ID)
        } else {
            GateResult::fail(Self::GATE_ID)
        };

        for (validator, errors) in &count.errors_by_validator {
            let detail = if *errors == 0 {
                GateDetail::passed(validator)
            } else {
                GateDetail::failed(validator, format!("{} errors", errors))
            };
            result = result.with_detail(detail);
        }

        for error in count.error_details.iter().filter(|e| e.severity.is_critical()) {
            result = result.with_recommendation(format!(
                "Fix {} ({}) reported by '{}'",
                error.error_id, error.severity, error.validator
            ));
        }

        if !result.passed && result.recommendations.is_empty() {
            result = result.with_recommendation(format!(
                "Resolve the {} remaining errors before release",
                count.total_errors
            ));
        }

        result
    }

    /// Decide whether output may be served.
    ///
    /// Blocks while errors remain and the job has not succeeded.
    pub fn decide(count: &ErrorCount, job_succeeded: bool) -> GateDecision {
        if job_succeeded || count.has_zero_errors() {
            GateDecision::Open
        } else {
            GateDecision::Blocked {
                remaining: count.total_errors,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::CountedError;
    use crate::model::Severity;

    fn count(total: usize) -> ErrorCount {
        let mut count = ErrorCount::default();
        count.errors_by_validator.insert("unit".to_string(), total);
        count.total_errors = total;
        count.error_details = (1..=total)
            .map(|i| CountedError {
                validator: "unit".to_string(),
                error_id: format!("UT-API-{:03}", i),
                severity: Severity::Critical,
            })
            .collect();
        count
    }

    #[test]
    fn test_zero_error_gate() {
        assert!(count(0).has_zero_errors());
        for n in 1..10 {
            assert!(!count(n).has_zero_errors());
        }
    }

    #[test]
    fn test_evaluate_pass() {
        let result = ReleaseGate::evaluate(&count(0));
        assert!(result.passed);
        assert!(result.details[0].passed);
        assert!(result.recommendations.is_empty());
    }

    #[test]
    fn test_evaluate_fail_lists_critical_errors() {
        let result = ReleaseGate::evaluate(&count(2));
        assert!(!result.passed);
        assert_eq!(result.details[0].message.as_deref(), Some("2 errors"));
        assert_eq!(result.recommendations.len(), 2);
        assert!(result.recommendations[0].contains("UT-API-001"));
    }

    #[test]
    fn test_decide_blocks_until_clean() {
        let decision = ReleaseGate::decide(&count(3), false);
        assert_eq!(decision, GateDecision::Blocked { remaining: 3 });
        assert_eq!(decision.to_string(), "blocked — 3 critical errors remain");

        assert!(ReleaseGate::decide(&count(0), false).is_open());
        assert!(ReleaseGate::decide(&count(3), true).is_open());
    }
}
