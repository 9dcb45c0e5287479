//! Phases of one build validation pass.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a validation pass is.
///
/// `NotStarted → PreflightChecked → Building → Built | BuildFailed →
/// Starting → Running → HealthChecking → Healthy | Unhealthy`, with
/// `PreflightFailed` ending the pass before anything runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationPhase {
    NotStarted,
    PreflightChecked,
    PreflightFailed,
    Building,
    Built,
    BuildFailed,
    Starting,
    Running,
    HealthChecking,
    Healthy,
    Unhealthy,
}

impl ValidationPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::PreflightFailed | Self::BuildFailed | Self::Healthy | Self::Unhealthy
        )
    }

    pub fn is_success(&self) -> bool {
        *self == Self::Healthy
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::PreflightChecked => "preflight_checked",
            Self::PreflightFailed => "preflight_failed",
            Self::Building => "building",
            Self::Built => "built",
            Self::BuildFailed => "build_failed",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::HealthChecking => "health_checking",
            Self::Healthy => "healthy",
            Self::Unhealthy => "unhealthy",
        }
    }
}

impl Default for ValidationPhase {
    fn default() -> Self {
        Self::NotStarted
    }
}

impl fmt::Display for ValidationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_phases() {
        assert!(ValidationPhase::PreflightFailed.is_terminal());
        assert!(ValidationPhase::BuildFailed.is_terminal());
        assert!(ValidationPhase::Healthy.is_terminal());
        assert!(ValidationPhase::Unhealthy.is_terminal());
        assert!(!ValidationPhase::HealthChecking.is_terminal());
        assert!(!ValidationPhase::default().is_terminal());
    }

    #[test]
    fn test_serialized_name_matches_display() {
        let json = serde_json::to_string(&ValidationPhase::HealthChecking).unwrap();
        assert_eq!(json, "\"health_checking\"");
        assert_eq!(ValidationPhase::HealthChecking.to_string(), "health_checking");
    }
}
