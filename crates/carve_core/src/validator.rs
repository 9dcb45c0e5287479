//! Validation seam: anything that turns an attempt into a named report.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use carve_deploy::{BuildRequest, BuildValidator, BUILD_REPORT_NAME};
use carve_policy::{RawReport, Severity, ValidationError};
use carve_runner::ComposeProject;
use tracing::{info, warn};

use crate::context::AttemptContext;
use crate::error::{CoreError, CoreResult};

#[async_trait]
pub trait Validator: Send + Sync {
    /// Report name, also the key in per-validator counts.
    fn name(&self) -> &str;

    async fn validate(&self, ctx: &AttemptContext) -> CoreResult<RawReport>;

    /// Release resources held for a job. Must be safe to call repeatedly.
    async fn cleanup(&self, _job_id: &str) -> CoreResult<()> {
        Ok(())
    }
}

/// Report standing in for a validator that could not run at all.
///
/// The failure is one CRITICAL infrastructure error, so it counts against
/// the release gate like any other defect.
pub fn infrastructure_failure_report(validator: &str, error: &CoreError) -> RawReport {
    let id_part: String = validator
        .to_ascii_uppercase()
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect();
    let id_part = if id_part.is_empty() { "VAL".to_string() } else { id_part };

    let failure = ValidationError::new(format!("{}-INFRA-001", id_part), Severity::Critical, "Infrastructure")
        .description(format!("Validator '{}' could not run: {}", validator, error))
        .impact("This validator produced no results for the attempt")
        .recommendation("Check the validator's environment and inputs");
    let content = serde_json::json!({ "errors": [failure] }).to_string();
    RawReport::new(validator, content)
}

/// Builds and health-checks the generated system in containers.
///
/// Each job gets its own compose project, derived from the job ID.
pub struct BuildValidatorSource {
    validator: Arc<BuildValidator>,
    compose_file: PathBuf,
    no_cache: bool,
}

impl BuildValidatorSource {
    pub fn new(validator: Arc<BuildValidator>, compose_file: impl Into<PathBuf>) -> Self {
        Self {
            validator,
            compose_file: compose_file.into(),
            no_cache: true,
        }
    }

    pub fn with_cache(mut self) -> Self {
        self.no_cache = false;
        self
    }

    pub fn project_for(&self, job_id: &str) -> ComposeProject {
        ComposeProject::for_job(job_id, &self.compose_file)
    }
}

#[async_trait]
impl Validator for BuildValidatorSource {
    fn name(&self) -> &str {
        BUILD_REPORT_NAME
    }

    async fn validate(&self, ctx: &AttemptContext) -> CoreResult<RawReport> {
        let mut request = BuildRequest::new(self.project_for(&ctx.job_id));
        if !self.no_cache {
            request = request.with_cache();
        }

        let result = self.validator.validate_build(&request).await;
        info!(
            "Build validation for job {} attempt {}: {} ({} errors)",
            ctx.job_id,
            ctx.attempt,
            result.phase(),
            result.errors.len()
        );
        Ok(result.to_raw_report())
    }

    async fn cleanup(&self, job_id: &str) -> CoreResult<()> {
        self.validator.cleanup(&self.project_for(job_id)).await?;
        Ok(())
    }
}

/// Reads a report file written by an external validator.
#[derive(Debug, Clone)]
pub struct ReportFileValidator {
    name: String,
    path: PathBuf,
}

impl ReportFileValidator {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

#[async_trait]
impl Validator for ReportFileValidator {
    fn name(&self) -> &str {
        &self.name
    }

    async fn validate(&self, _ctx: &AttemptContext) -> CoreResult<RawReport> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            warn!("Cannot read report {:?}: {}", self.path, e);
            CoreError::Validator {
                validator: self.name.clone(),
                message: format!("cannot read {}: {}", self.path.display(), e),
            }
        })?;
        Ok(RawReport::new(&self.name, content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carve_policy::ErrorExtractor;
    use carve_runner::MockComposeRuntime;
    use serde_json::json;
    use tempfile::TempDir;

    fn ctx() -> AttemptContext {
        AttemptContext {
            job_id: "job-7".into(),
            attempt: 1,
            max_attempts: 3,
            migration_plan: json!({}),
        }
    }

    #[tokio::test]
    async fn test_report_file_validator() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("unit.md");
        std::fs::write(&path, "Total Errors: 0").unwrap();

        let validator = ReportFileValidator::new("unit", &path);
        let report = validator.validate(&ctx()).await.unwrap();
        assert_eq!(report.name, "unit");
        assert_eq!(report.content, "Total Errors: 0");

        let missing = ReportFileValidator::new("e2e", temp_dir.path().join("nope.md"));
        assert!(matches!(
            missing.validate(&ctx()).await,
            Err(CoreError::Validator { .. })
        ));
    }

    #[test]
    fn test_infrastructure_failure_report_is_critical() {
        let error = CoreError::Validator {
            validator: "e2e".into(),
            message: "cannot read".into(),
        };
        let report = infrastructure_failure_report("e2e", &error);
        let extracted = ErrorExtractor::new().extract_report(&report.name, &report.content);

        assert_eq!(extracted.errors.len(), 1);
        assert_eq!(extracted.errors[0].id, "E2E-INFRA-001");
        assert!(extracted.errors[0].is_critical());
    }

    #[tokio::test]
    async fn test_build_source_uses_job_namespace() {
        let temp_dir = TempDir::new().unwrap();
        let runtime = MockComposeRuntime::new();
        let validator = Arc::new(BuildValidator::new(Arc::new(runtime.clone())));
        let source = BuildValidatorSource::new(validator, temp_dir.path().join("docker-compose.yml"));

        // No descriptor: preflight fails without touching the runtime
        let report = source.validate(&ctx()).await.unwrap();
        assert_eq!(report.name, "build");
        assert!(report.content.contains("BV-CONFIG-001"));
        assert!(runtime.get_calls().is_empty());

        source.cleanup("job-7").await.unwrap();
        let calls = runtime.get_calls();
        assert_eq!(calls[0].method, "down");
        assert_eq!(calls[0].project.as_deref(), Some("carve-job-7"));
    }
}
