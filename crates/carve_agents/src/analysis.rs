//! Structured result of a retry-planning call.

use std::collections::BTreeMap;
use std::fmt::Write;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::json::extract_json;

/// Top-level fields a planning response must carry.
pub const REQUIRED_FIELDS: [&str; 4] = [
    "analysis",
    "improvementStrategy",
    "improvedMigrationPlan",
    "retryConfidence",
];

/// Planner's estimate of how likely the next attempt is to pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SuccessRate {
    #[serde(alias = "HIGH", alias = "high")]
    High,
    #[serde(alias = "MEDIUM", alias = "medium")]
    Medium,
    #[serde(alias = "LOW", alias = "low")]
    Low,
}

impl SuccessRate {
    /// High at 0.7 and above, Medium at 0.4 and above, otherwise Low.
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 0.7 {
            Self::High
        } else if confidence >= 0.4 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// Root-cause analysis of the accumulated errors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Analysis {
    pub root_cause: String,
    pub critical_issues: Vec<Value>,
    pub summary: String,
}

/// One entry of the prioritized fix list: free text or a structured item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrioritizedFix {
    Text(String),
    Detailed(FixDetail),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FixDetail {
    pub priority: Option<u32>,
    #[serde(alias = "issue")]
    pub description: String,
    #[serde(alias = "action")]
    pub fix: String,
    #[serde(alias = "service")]
    pub target: Option<String>,
}

impl PrioritizedFix {
    /// One-line rendering used in synthesized prompts.
    pub fn summary(&self) -> String {
        match self {
            Self::Text(text) => text.trim().to_string(),
            Self::Detailed(detail) => {
                let mut line = match (&detail.target, detail.description.is_empty()) {
                    (Some(target), false) => format!("[{}] {}", target, detail.description),
                    (Some(target), true) => format!("[{}]", target),
                    (None, _) => detail.description.clone(),
                };
                if !detail.fix.is_empty() {
                    if !line.is_empty() {
                        line.push_str(": ");
                    }
                    line.push_str(&detail.fix);
                }
                line
            }
        }
    }
}

/// Additions and emphasis for one generation target's prompt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PromptAdjustment {
    pub additions: Vec<String>,
    pub emphasis: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImprovementStrategy {
    pub prioritized_fixes: Vec<PrioritizedFix>,
    pub prompt_adjustments: BTreeMap<String, PromptAdjustment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryStrategy {
    pub should_retry: bool,
    pub confidence: f64,
    pub estimated_success_rate: SuccessRate,
    #[serde(default)]
    pub specific_fixes: Vec<String>,
}

/// Output of one retry-planning call. Immutable once returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorAnalysisResult {
    pub analysis: Analysis,
    pub improvement_strategy: ImprovementStrategy,
    pub improved_migration_plan: Value,
    pub retry_confidence: f64,
    pub adjusted_planner_prompt: String,
    pub retry_strategy: RetryStrategy,
}

/// Wire shape: optional fields are resolved in `ErrorAnalysisResult::parse`.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAnalysis {
    #[serde(default)]
    analysis: Analysis,
    #[serde(default)]
    improvement_strategy: ImprovementStrategy,
    improved_migration_plan: Value,
    retry_confidence: f64,
    #[serde(default)]
    adjusted_planner_prompt: Option<String>,
    #[serde(default)]
    retry_strategy: Option<RawRetryStrategy>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRetryStrategy {
    should_retry: Option<bool>,
    confidence: Option<f64>,
    estimated_success_rate: Option<SuccessRate>,
    #[serde(default)]
    specific_fixes: Vec<String>,
}

impl ErrorAnalysisResult {
    /// Parse agent output. Returns `None` when no JSON object is found or a
    /// required field is missing or mistyped.
    pub fn parse(text: &str) -> Option<Self> {
        let value = extract_json(text)?;
        let obj = value.as_object()?;

        let missing: Vec<&str> = REQUIRED_FIELDS
            .iter()
            .copied()
            .filter(|f| obj.get(*f).map_or(true, Value::is_null))
            .collect();
        if !missing.is_empty() {
            warn!("Planning response missing required fields: {}", missing.join(", "));
            return None;
        }

        let raw: RawAnalysis = match serde_json::from_value(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Planning response has unexpected shape: {}", e);
                return None;
            }
        };

        let retry_confidence = raw.retry_confidence.clamp(0.0, 1.0);
        let retry_strategy = match raw.retry_strategy {
            Some(s) => {
                let confidence = s.confidence.unwrap_or(retry_confidence).clamp(0.0, 1.0);
                RetryStrategy {
                    should_retry: s.should_retry.unwrap_or(true),
                    confidence,
                    estimated_success_rate: s
                        .estimated_success_rate
                        .unwrap_or_else(|| SuccessRate::from_confidence(confidence)),
                    specific_fixes: s.specific_fixes,
                }
            }
            None => {
                debug!("No retryStrategy in response, deriving from retryConfidence");
                RetryStrategy {
                    should_retry: true,
                    confidence: retry_confidence,
                    estimated_success_rate: SuccessRate::from_confidence(retry_confidence),
                    specific_fixes: Vec::new(),
                }
            }
        };

        let adjusted_planner_prompt = match raw.adjusted_planner_prompt {
            Some(prompt) if !prompt.trim().is_empty() => prompt,
            _ => synthesize_prompt(&raw.improvement_strategy, &raw.improved_migration_plan),
        };

        Some(Self {
            analysis: raw.analysis,
            improvement_strategy: raw.improvement_strategy,
            improved_migration_plan: raw.improved_migration_plan,
            retry_confidence,
            adjusted_planner_prompt,
            retry_strategy,
        })
    }

    pub fn should_retry(&self) -> bool {
        self.retry_strategy.should_retry
    }

    /// `criticalInstructions` of the improved plan, if present.
    pub fn critical_instructions(&self) -> Vec<String> {
        critical_instructions(&self.improved_migration_plan)
    }
}

fn critical_instructions(plan: &Value) -> Vec<String> {
    plan.get("criticalInstructions")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|v| match v.as_str() {
                    Some(s) => s.to_string(),
                    None => v.to_string(),
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Build planner guidance from the fix list and the plan's critical
/// instructions. Deterministic for a given input.
pub fn synthesize_prompt(strategy: &ImprovementStrategy, plan: &Value) -> String {
    let mut prompt = String::from(
        "The previous migration attempt failed validation. Apply these corrections.\n",
    );

    let fixes: Vec<String> = strategy
        .prioritized_fixes
        .iter()
        .map(PrioritizedFix::summary)
        .filter(|s| !s.is_empty())
        .collect();
    if !fixes.is_empty() {
        prompt.push_str("\nPrioritized fixes:\n");
        for (i, fix) in fixes.iter().enumerate() {
            let _ = writeln!(prompt, "{}. {}", i + 1, fix);
        }
    }

    let instructions = critical_instructions(plan);
    if !instructions.is_empty() {
        prompt.push_str("\nCritical instructions:\n");
        for instruction in &instructions {
            let _ = writeln!(prompt, "- {}", instruction);
        }
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"```json
{
  "analysis": {"rootCause": "Missing JPA starter", "criticalIssues": ["UT-BUILD-001"], "summary": "Build breaks"},
  "improvementStrategy": {
    "prioritizedFixes": ["Add spring-boot-starter-data-jpa", {"priority": 2, "issue": "Route missing", "fix": "Add /accounts route", "target": "gateway"}],
    "promptAdjustments": {"accounts-service": {"additions": ["Include JPA starter"], "emphasis": ["pom.xml completeness"]}}
  },
  "improvedMigrationPlan": {"services": ["accounts-service"], "criticalInstructions": ["Every service must declare its persistence starter"]},
  "retryConfidence": 0.82,
  "retryStrategy": {"shouldRetry": true, "confidence": 0.82, "estimatedSuccessRate": "High", "specificFixes": ["add dependency"]}
}
```"#;

    #[test]
    fn test_parse_full_response() {
        let result = ErrorAnalysisResult::parse(FULL).unwrap();

        assert_eq!(result.analysis.root_cause, "Missing JPA starter");
        assert!(result.should_retry());
        assert_eq!(result.retry_strategy.estimated_success_rate, SuccessRate::High);
        assert_eq!(
            result.improvement_strategy.prompt_adjustments["accounts-service"].additions,
            vec!["Include JPA starter"]
        );
        assert_eq!(result.critical_instructions().len(), 1);
    }

    #[test]
    fn test_synthesized_prompt_when_missing() {
        let result = ErrorAnalysisResult::parse(FULL).unwrap();
        let prompt = &result.adjusted_planner_prompt;

        assert!(prompt.contains("1. Add spring-boot-starter-data-jpa"));
        assert!(prompt.contains("2. [gateway] Route missing: Add /accounts route"));
        assert!(prompt.contains("- Every service must declare its persistence starter"));
        assert_eq!(prompt, &ErrorAnalysisResult::parse(FULL).unwrap().adjusted_planner_prompt);
    }

    #[test]
    fn test_explicit_prompt_kept() {
        let text = r#"{"analysis": {}, "improvementStrategy": {}, "improvedMigrationPlan": {}, "retryConfidence": 0.5, "adjustedPlannerPrompt": "Use Java 17"}"#;
        let result = ErrorAnalysisResult::parse(text).unwrap();
        assert_eq!(result.adjusted_planner_prompt, "Use Java 17");
    }

    #[test]
    fn test_missing_retry_strategy_defaults() {
        let text = r#"{"analysis": {}, "improvementStrategy": {}, "improvedMigrationPlan": {}, "retryConfidence": 0.5}"#;
        let result = ErrorAnalysisResult::parse(text).unwrap();

        assert!(result.retry_strategy.should_retry);
        assert_eq!(result.retry_strategy.confidence, 0.5);
        assert_eq!(result.retry_strategy.estimated_success_rate, SuccessRate::Medium);
    }

    #[test]
    fn test_missing_required_field_is_none() {
        for field in REQUIRED_FIELDS {
            let mut value: Value = serde_json::from_str(
                r#"{"analysis": {}, "improvementStrategy": {}, "improvedMigrationPlan": {}, "retryConfidence": 0.5}"#,
            )
            .unwrap();
            value.as_object_mut().unwrap().remove(field);
            assert!(
                ErrorAnalysisResult::parse(&value.to_string()).is_none(),
                "expected None without {}",
                field
            );
        }
    }

    #[test]
    fn test_mistyped_confidence_is_none() {
        let text = r#"{"analysis": {}, "improvementStrategy": {}, "improvedMigrationPlan": {}, "retryConfidence": "high"}"#;
        assert!(ErrorAnalysisResult::parse(text).is_none());
    }

    #[test]
    fn test_success_rate_thresholds() {
        assert_eq!(SuccessRate::from_confidence(0.7), SuccessRate::High);
        assert_eq!(SuccessRate::from_confidence(0.69), SuccessRate::Medium);
        assert_eq!(SuccessRate::from_confidence(0.4), SuccessRate::Medium);
        assert_eq!(SuccessRate::from_confidence(0.1), SuccessRate::Low);
    }
}
