//! Configuration for a migration run.
//!
//! Loaded from `carve.yaml`, `carve.yml` or `carve.toml` (format chosen by
//! extension). Missing files and missing keys fall back to defaults, then a
//! small set of environment variables is applied on top.

use std::path::{Path, PathBuf};
use std::time::Duration;

use carve_agents::{LlmProvider, PlannerOptions, DEFAULT_MAX_REPORT_CHARS, DEFAULT_TEMPERATURE};
use carve_deploy::{ValidatorSettings, ValidatorTimeouts, DEFAULT_HEALTH_PATH};
use carve_policy::DEFAULT_ERROR_ID_PATTERN;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CoreError, CoreResult};

/// Config file names probed in a directory, in order.
pub const CONFIG_FILE_NAMES: &[&str] = &["carve.yaml", "carve.yml", "carve.toml"];

pub const ENV_MAX_ATTEMPTS: &str = "CARVE_MAX_ATTEMPTS";
pub const ENV_AGENT_TIMEOUT: &str = "CARVE_AGENT_TIMEOUT_SECS";
pub const ENV_LLM_MODEL: &str = "CARVE_LLM_MODEL";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CarveConfig {
    pub retry: RetryConfig,
    pub timeouts: TimeoutConfig,
    pub planner: PlannerConfig,
    pub validation: ValidationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per job, including the first pass
    pub max_attempts: u32,
    /// When set, a retry recommendation below this confidence ends the job
    pub confidence_floor: Option<f64>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            confidence_floor: None,
        }
    }
}

/// Timeouts in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub agent_call: u64,
    pub image_build: u64,
    pub container_start: u64,
    pub health_validation: u64,
    pub health_deployment: u64,
    pub health_poll_interval: u64,
    pub log_fetch: u64,
    pub cleanup: u64,
    pub ps: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            agent_call: 120,
            image_build: 600,
            container_start: 300,
            health_validation: 120,
            health_deployment: 180,
            health_poll_interval: 5,
            log_fetch: 10,
            cleanup: 60,
            ps: 30,
        }
    }
}

impl TimeoutConfig {
    pub fn agent_call(&self) -> Duration {
        Duration::from_secs(self.agent_call)
    }

    pub fn to_validator_timeouts(&self) -> ValidatorTimeouts {
        ValidatorTimeouts {
            image_build: Duration::from_secs(self.image_build),
            container_start: Duration::from_secs(self.container_start),
            health_validation: Duration::from_secs(self.health_validation),
            health_deployment: Duration::from_secs(self.health_deployment),
            health_poll_interval: Duration::from_secs(self.health_poll_interval),
            log_fetch: Duration::from_secs(self.log_fetch),
            cleanup: Duration::from_secs(self.cleanup),
            ps: Duration::from_secs(self.ps),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Provider to use; detected from available API keys when unset
    pub provider: Option<LlmProvider>,
    pub model: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub max_report_chars: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            provider: None,
            model: None,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: 8192,
            max_report_chars: DEFAULT_MAX_REPORT_CHARS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub error_id_pattern: String,
    pub log_excerpt_chars: usize,
    pub teardown_after_validation: bool,
    pub log_tail_lines: usize,
    pub health_path: String,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            error_id_pattern: DEFAULT_ERROR_ID_PATTERN.to_string(),
            log_excerpt_chars: 2000,
            teardown_after_validation: true,
            log_tail_lines: 100,
            health_path: DEFAULT_HEALTH_PATH.to_string(),
        }
    }
}

impl CarveConfig {
    /// Load a config file. The format follows the extension; anything that
    /// is not `.toml` is read as YAML.
    pub fn load(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = if path.extension().and_then(|e| e.to_str()) == Some("toml") {
            toml::from_str(&content)?
        } else if content.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(&content)?
        };
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// First config file found in `dir`.
    pub fn find(dir: &Path) -> Option<PathBuf> {
        CONFIG_FILE_NAMES
            .iter()
            .map(|name| dir.join(name))
            .find(|p| p.is_file())
    }

    /// Load `explicit`, or the first config file in `dir`, or defaults.
    /// Environment overrides are applied and the result validated.
    pub fn resolve(explicit: Option<&Path>, dir: &Path) -> CoreResult<Self> {
        let mut config = match explicit.map(Path::to_path_buf).or_else(|| Self::find(dir)) {
            Some(path) => Self::load(&path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides read through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> CoreResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_MAX_ATTEMPTS) {
            self.retry.max_attempts = raw.trim().parse().map_err(|_| {
                CoreError::InvalidConfig(format!("{} must be a positive integer, got '{}'", ENV_MAX_ATTEMPTS, raw))
            })?;
        }
        if let Some(raw) = lookup(ENV_AGENT_TIMEOUT) {
            self.timeouts.agent_call = raw.trim().parse().map_err(|_| {
                CoreError::InvalidConfig(format!("{} must be a number of seconds, got '{}'", ENV_AGENT_TIMEOUT, raw))
            })?;
        }
        if let Some(model) = lookup(ENV_LLM_MODEL).filter(|m| !m.trim().is_empty()) {
            self.planner.model = Some(model.trim().to_string());
        }
        Ok(())
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.retry.max_attempts == 0 {
            return Err(CoreError::InvalidConfig(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if let Some(floor) = self.retry.confidence_floor {
            if !(0.0..=1.0).contains(&floor) {
                return Err(CoreError::InvalidConfig(format!(
                    "retry.confidence_floor must be within [0, 1], got {}",
                    floor
                )));
            }
        }

        let t = &self.timeouts;
        if t.health_poll_interval == 0 {
            return Err(CoreError::InvalidConfig(
                "timeouts.health_poll_interval must be greater than zero".to_string(),
            ));
        }
        if t.health_poll_interval >= t.health_validation.min(t.health_deployment) {
            return Err(CoreError::InvalidConfig(
                "timeouts.health_poll_interval must be shorter than the health timeouts".to_string(),
            ));
        }
        if t.agent_call == 0 {
            return Err(CoreError::InvalidConfig(
                "timeouts.agent_call must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn validator_settings(&self) -> ValidatorSettings {
        ValidatorSettings {
            timeouts: self.timeouts.to_validator_timeouts(),
            log_tail_lines: self.validation.log_tail_lines,
            log_excerpt_chars: self.validation.log_excerpt_chars,
            teardown_after_validation: self.validation.teardown_after_validation,
            health_path: self.validation.health_path.clone(),
        }
    }

    pub fn planner_options(&self) -> PlannerOptions {
        PlannerOptions {
            model: self.planner.model.clone(),
            temperature: self.planner.temperature,
            max_tokens: self.planner.max_tokens,
            timeout: self.timeouts.agent_call(),
            max_report_chars: self.planner.max_report_chars,
        }
    }
}
