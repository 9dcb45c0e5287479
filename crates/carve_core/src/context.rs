//! Per-attempt inputs handed to generators and validators.

use std::collections::BTreeMap;

use carve_agents::{ErrorAnalysisResult, PromptAdjustment};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What one attempt works on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptContext {
    pub job_id: String,
    pub attempt: u32,
    pub max_attempts: u32,
    /// Current migration plan, replaced by the planner's improved plan on retry
    pub migration_plan: Value,
}

impl AttemptContext {
    pub fn is_retry(&self) -> bool {
        self.attempt > 1
    }
}

/// Adjusted instructions for the next generation pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationGuidance {
    /// Attempt the guidance was derived from, 0 for the first pass
    pub derived_from_attempt: u32,
    pub planner_prompt: Option<String>,
    /// Additions and emphasis per generation target
    pub targets: BTreeMap<String, PromptAdjustment>,
    pub specific_fixes: Vec<String>,
    pub critical_instructions: Vec<String>,
}

impl GenerationGuidance {
    pub fn from_analysis(attempt: u32, analysis: &ErrorAnalysisResult) -> Self {
        Self {
            derived_from_attempt: attempt,
            planner_prompt: Some(analysis.adjusted_planner_prompt.clone())
                .filter(|p| !p.trim().is_empty()),
            targets: analysis.improvement_strategy.prompt_adjustments.clone(),
            specific_fixes: analysis.retry_strategy.specific_fixes.clone(),
            critical_instructions: analysis.critical_instructions(),
        }
    }

    /// True on the first pass, before any analysis.
    pub fn is_empty(&self) -> bool {
        self.planner_prompt.is_none()
            && self.targets.is_empty()
            && self.specific_fixes.is_empty()
            && self.critical_instructions.is_empty()
    }

    /// Adjustment for one target, if the planner gave one.
    pub fn for_target(&self, target: &str) -> Option<&PromptAdjustment> {
        self.targets.get(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ANALYSIS: &str = r#"{
        "analysis": {"rootCause": "missing JPA starter", "criticalIssues": [], "summary": "one build error"},
        "improvementStrategy": {
            "prioritizedFixes": ["Add spring-boot-starter-data-jpa"],
            "promptAdjustments": {
                "microservices": {"additions": ["Declare JPA starter"], "emphasis": ["Compile before emitting"]}
            }
        },
        "improvedMigrationPlan": {"criticalInstructions": ["Every service must build"]},
        "retryConfidence": 0.8,
        "adjustedPlannerPrompt": "Focus on dependencies",
        "retryStrategy": {"shouldRetry": true, "confidence": 0.8, "estimatedSuccessRate": "High", "specificFixes": ["pom.xml: add starter"]}
    }"#;

    #[test]
    fn test_guidance_from_analysis() {
        let analysis = ErrorAnalysisResult::parse(ANALYSIS).unwrap();
        let guidance = GenerationGuidance::from_analysis(1, &analysis);

        assert!(!guidance.is_empty());
        assert_eq!(guidance.derived_from_attempt, 1);
        assert_eq!(guidance.planner_prompt.as_deref(), Some("Focus on dependencies"));
        assert_eq!(
            guidance.for_target("microservices").unwrap().additions,
            vec!["Declare JPA starter"]
        );
        assert_eq!(guidance.specific_fixes, vec!["pom.xml: add starter"]);
        assert_eq!(guidance.critical_instructions, vec!["Every service must build"]);
    }

    #[test]
    fn test_default_guidance_is_empty() {
        assert!(GenerationGuidance::default().is_empty());
    }
}
