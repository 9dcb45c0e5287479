//! Build validation: build, start and health-check generated services.
//!
//! One pass runs preflight, cleanup, build, start and health polling in
//! order. Every failure becomes a `ValidationError` on the result; the pass
//! itself never returns `Err`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use carve_policy::{RawReport, Severity, ValidationError, DEFAULT_LOG_EXCERPT_CHARS, INFRASTRUCTURE_SERVICE};
use carve_runner::{CommandOutput, ComposeProject, ComposeRuntime, RunnerError, RunnerResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::build_log::{
    classify_failure, dominant_failed_service, has_unattributed_failure, parse_build_markers,
};
use crate::compose::ComposeDescriptor;
use crate::deployment::{ContainerDeployment, ServiceStatus, DEFAULT_HEALTH_PATH};
use crate::error::DeployResult;
use crate::health::{HealthFailure, HealthPoller};
use crate::phase::ValidationPhase;

/// Report name used when a build result enters the extraction path.
pub const BUILD_REPORT_NAME: &str = "build";

/// Deadlines for each container operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorTimeouts {
    pub image_build: Duration,
    pub container_start: Duration,
    /// Health budget for the validation path
    pub health_validation: Duration,
    /// Health budget for the deployment path (tolerates slower cold starts)
    pub health_deployment: Duration,
    pub health_poll_interval: Duration,
    pub log_fetch: Duration,
    pub cleanup: Duration,
    pub ps: Duration,
}

impl Default for ValidatorTimeouts {
    fn default() -> Self {
        Self {
            image_build: Duration::from_secs(600),
            container_start: Duration::from_secs(300),
            health_validation: Duration::from_secs(120),
            health_deployment: Duration::from_secs(180),
            health_poll_interval: Duration::from_secs(5),
            log_fetch: Duration::from_secs(10),
            cleanup: Duration::from_secs(60),
            ps: Duration::from_secs(30),
        }
    }
}

/// Validator settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorSettings {
    pub timeouts: ValidatorTimeouts,
    pub log_tail_lines: usize,
    pub log_excerpt_chars: usize,
    pub teardown_after_validation: bool,
    pub health_path: String,
}

impl Default for ValidatorSettings {
    fn default() -> Self {
        Self {
            timeouts: ValidatorTimeouts::default(),
            log_tail_lines: 100,
            log_excerpt_chars: DEFAULT_LOG_EXCERPT_CHARS,
            teardown_after_validation: true,
            health_path: DEFAULT_HEALTH_PATH.to_string(),
        }
    }
}

/// What to validate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRequest {
    pub project: ComposeProject,
    /// Build without layer cache
    pub no_cache: bool,
}

impl BuildRequest {
    pub fn new(project: ComposeProject) -> Self {
        Self {
            project,
            no_cache: true,
        }
    }

    pub fn with_cache(mut self) -> Self {
        self.no_cache = false;
        self
    }
}

/// Outcome of one validation pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildValidationResult {
    pub success: bool,
    pub deployment: ContainerDeployment,
    pub errors: Vec<ValidationError>,
    /// URL per running service (deployment path)
    pub service_urls: BTreeMap<String, String>,
    pub torn_down: bool,
}

impl BuildValidationResult {
    pub fn phase(&self) -> ValidationPhase {
        self.deployment.phase
    }

    /// Render as `{"errors": [...]}` so the result can be extracted and
    /// counted like any other validator report.
    pub fn to_report_content(&self) -> String {
        serde_json::json!({ "errors": self.errors }).to_string()
    }

    pub fn to_raw_report(&self) -> RawReport {
        RawReport::new(BUILD_REPORT_NAME, self.to_report_content())
    }
}

/// Allocates `BV-<CATEGORY>-NNN` IDs, unique within one pass.
#[derive(Debug, Default)]
struct ErrorIds {
    counters: BTreeMap<&'static str, usize>,
}

impl ErrorIds {
    fn next(&mut self, category: &'static str) -> String {
        let n = self.counters.entry(category).or_insert(0);
        *n += 1;
        format!("BV-{}-{:03}", category, n)
    }
}

/// Mutable state of one pass.
struct Pass {
    deployment: ContainerDeployment,
    errors: Vec<ValidationError>,
    ids: ErrorIds,
}

impl Pass {
    fn new(project: &ComposeProject) -> Self {
        Self {
            deployment: ContainerDeployment::new(project.name.clone()),
            errors: Vec::new(),
            ids: ErrorIds::default(),
        }
    }

    fn error(&mut self, id_category: &'static str, severity: Severity, category: &str) -> ValidationError {
        ValidationError::new(self.ids.next(id_category), severity, category)
    }
}

/// Builds, starts and health-checks a compose project.
pub struct BuildValidator {
    runtime: Arc<dyn ComposeRuntime>,
    settings: ValidatorSettings,
}

impl BuildValidator {
    pub fn new(runtime: Arc<dyn ComposeRuntime>) -> Self {
        Self {
            runtime,
            settings: ValidatorSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: ValidatorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &ValidatorSettings {
        &self.settings
    }

    /// Validation path: tighter health budget, optional teardown afterwards.
    pub async fn validate_build(&self, request: &BuildRequest) -> BuildValidationResult {
        self.run(
            request,
            self.settings.timeouts.health_validation,
            self.settings.teardown_after_validation,
        )
        .await
    }

    /// Deployment path: longer health budget, services left running.
    pub async fn deploy(&self, request: &BuildRequest) -> BuildValidationResult {
        self.run(request, self.settings.timeouts.health_deployment, false)
            .await
    }

    /// Tear down a project. Safe to call repeatedly or after a job was
    /// abandoned; a failing `down` is logged, not returned.
    pub async fn cleanup(&self, project: &ComposeProject) -> DeployResult<()> {
        info!("Cleaning up project {}", project.name);
        let output = self
            .runtime
            .down(project, true, self.settings.timeouts.cleanup)
            .await?;
        if !output.success() {
            warn!(
                "Teardown of {} exited with {}: {}",
                project.name,
                output.exit_code,
                output.stderr.trim()
            );
        }
        Ok(())
    }

    async fn run(&self, request: &BuildRequest, health_timeout: Duration, teardown: bool) -> BuildValidationResult {
        let project = &request.project;
        let mut pass = Pass::new(project);
        info!("Validating build of project {}", project.name);

        if !self.preflight(project, &mut pass).await {
            pass.deployment.set_phase(ValidationPhase::PreflightFailed);
            return self.finish(pass, false);
        }
        pass.deployment.set_phase(ValidationPhase::PreflightChecked);

        self.clean_previous(project).await;

        if !self.build(request, &mut pass).await {
            pass.deployment.set_phase(ValidationPhase::BuildFailed);
            return self.finish(pass, false);
        }
        pass.deployment.set_phase(ValidationPhase::Built);

        self.start(project, &mut pass).await;
        self.check_health(project, health_timeout, &mut pass).await;

        let healthy = pass.errors.is_empty() && pass.deployment.failed_services().next().is_none();
        pass.deployment.set_phase(if healthy {
            ValidationPhase::Healthy
        } else {
            ValidationPhase::Unhealthy
        });

        let torn_down = teardown && self.teardown(project).await;
        self.finish(pass, torn_down)
    }

    /// Descriptor present and parseable, runtime reachable.
    async fn preflight(&self, project: &ComposeProject, pass: &mut Pass) -> bool {
        let path = project.compose_file.display().to_string();

        if !project.descriptor_exists() {
            warn!("Compose descriptor not found: {}", path);
            let error = pass
                .error("CONFIG", Severity::Critical, "Configuration")
                .location(&path)
                .description(format!("Compose descriptor not found: {}", path))
                .impact("No service can be built or started")
                .recommendation("Generate the docker-compose file before validating the build");
            pass.errors.push(error);
            return false;
        }

        match ComposeDescriptor::load(&project.compose_file) {
            Ok(descriptor) if descriptor.services.is_empty() => {
                warn!("Compose descriptor {} declares no services", path);
                let error = pass
                    .error("CONFIG", Severity::Critical, "Configuration")
                    .location(&path)
                    .description("Compose descriptor declares no services")
                    .impact("Nothing would be built or started, so the build cannot be verified")
                    .recommendation("Declare every generated service under the services mapping");
                pass.errors.push(error);
                return false;
            }
            Ok(descriptor) => pass
                .deployment
                .track_descriptor(&descriptor, &self.settings.health_path),
            Err(e) => {
                warn!("Invalid compose descriptor {}: {}", path, e);
                let error = pass
                    .error("CONFIG", Severity::Critical, "Configuration")
                    .location(&path)
                    .description(format!("Compose descriptor could not be read: {}", e))
                    .impact("No service can be built or started")
                    .recommendation("Fix the compose file so it declares a services mapping");
                pass.errors.push(error);
                return false;
            }
        }

        let reachable = match self.runtime.is_available().await {
            Ok(available) => available,
            Err(e) => {
                debug!("Runtime availability probe failed: {}", e);
                false
            }
        };
        if !reachable {
            warn!("Container runtime not reachable");
            let error = pass
                .error("INFRA", Severity::Critical, "Infrastructure")
                .description("Container runtime is not reachable")
                .impact("No service can be built or started")
                .recommendation("Start the Docker or Podman daemon and retry");
            pass.errors.push(error);
            return false;
        }

        true
    }

    /// Best-effort teardown of a previous run under the same project name.
    async fn clean_previous(&self, project: &ComposeProject) {
        match self
            .runtime
            .down(project, true, self.settings.timeouts.cleanup)
            .await
        {
            Ok(output) if !output.success() => {
                debug!("Pre-build cleanup of {} exited with {}", project.name, output.exit_code)
            }
            Ok(_) => {}
            Err(e) => debug!("Pre-build cleanup of {} failed: {}", project.name, e),
        }
    }

    /// Returns false when any service failed to build.
    async fn build(&self, request: &BuildRequest, pass: &mut Pass) -> bool {
        let project = &request.project;
        pass.deployment.set_phase(ValidationPhase::Building);
        pass.deployment.mark_all(ServiceStatus::Building);

        let result = self
            .runtime
            .build(project, request.no_cache, self.settings.timeouts.image_build)
            .await;

        let output = match result {
            Ok(output) => output,
            Err(e) => {
                let description = if e.is_timeout() {
                    format!(
                        "Image build timed out after {}s",
                        self.settings.timeouts.image_build.as_secs()
                    )
                } else {
                    format!("Image build could not run: {}", e)
                };
                warn!("{}", description);
                let error = pass
                    .error("BUILD", Severity::Critical, "Build")
                    .description(description)
                    .impact("No service image was produced")
                    .recommendation("Check the container runtime and retry the build");
                pass.errors.push(error);
                for service in pass.deployment.services.values_mut() {
                    service.fail("Build did not complete");
                }
                return false;
            }
        };

        let log = output.combined_output();
        let markers = parse_build_markers(&log);
        // podman-compose can exit 0 after a failed image build
        let clean = markers.failed.is_empty() && !has_unattributed_failure(&log);
        if output.success() && clean {
            if markers.is_empty() {
                debug!("No per-service build markers; exit code 0 means all built");
            }
            pass.deployment.mark_all(ServiceStatus::Pending);
            info!("Build of {} succeeded", project.name);
            return true;
        }

        let known = pass.deployment.service_names();
        let service = dominant_failed_service(&log, &markers, &known)
            .unwrap_or_else(|| INFRASTRUCTURE_SERVICE.to_string());
        let kind = classify_failure(&log);
        warn!(
            "Build of {} failed (exit {}): {} in {}",
            project.name,
            output.exit_code,
            kind.label(),
            service
        );

        let location = if service == INFRASTRUCTURE_SERVICE {
            project.compose_file.display().to_string()
        } else {
            format!("{}/Dockerfile", service)
        };
        let error = pass
            .error("BUILD", Severity::Critical, "Build")
            .service(&service)
            .location(location)
            .description(format!("Build failed for {}: {}", service, kind.label()))
            .impact("The service image could not be built, so nothing was started")
            .recommendation(kind.recommendation())
            .with_log(&log, self.settings.log_excerpt_chars);
        pass.errors.push(error);

        for (name, deployed) in pass.deployment.services.iter_mut() {
            if markers.failed.contains(name) || (markers.failed.is_empty() && !markers.succeeded.contains(name)) {
                deployed.fail(format!("Build failed: {}", kind.label()));
            } else {
                deployed.status = ServiceStatus::Stopped;
            }
        }
        false
    }

    /// Bring services up. A failure is recorded but health polling still runs.
    async fn start(&self, project: &ComposeProject, pass: &mut Pass) {
        pass.deployment.set_phase(ValidationPhase::Starting);
        pass.deployment.mark_all(ServiceStatus::Starting);

        let result: RunnerResult<CommandOutput> = self
            .runtime
            .up(project, true, self.settings.timeouts.container_start)
            .await;

        let failure = match result {
            Ok(output) if output.success() => None,
            Ok(output) => Some((
                format!("Starting services exited with code {}", output.exit_code),
                Some(output.combined_output()),
            )),
            Err(RunnerError::Timeout { seconds, .. }) => {
                Some((format!("Starting services timed out after {}s", seconds), None))
            }
            Err(e) => Some((format!("Starting services failed: {}", e), None)),
        };

        if let Some((description, log)) = failure {
            warn!("{} for {}", description, project.name);
            let kind = log.as_deref().map(classify_failure);
            let mut error = pass
                .error("RUNTIME", Severity::High, "Runtime")
                .description(description)
                .impact("Some services may not be running")
                .recommendation(
                    kind.map(|k| k.recommendation())
                        .unwrap_or("Inspect the compose output and container logs"),
                );
            if let Some(log) = log {
                error = error.with_log(&log, self.settings.log_excerpt_chars);
            }
            pass.errors.push(error);
        }

        pass.deployment.set_phase(ValidationPhase::Running);
    }

    async fn check_health(&self, project: &ComposeProject, timeout: Duration, pass: &mut Pass) {
        pass.deployment.set_phase(ValidationPhase::HealthChecking);

        let poller = HealthPoller::new(self.settings.timeouts.health_poll_interval, timeout)
            .with_ps_timeout(self.settings.timeouts.ps);
        let tracked = pass.deployment.service_names();
        let outcome = poller
            .wait_until_healthy(self.runtime.as_ref(), project, &tracked)
            .await;

        for (name, state) in &outcome.states {
            let deployed = pass.deployment.service_mut(name);
            if let Some(port) = state.published_port {
                deployed.set_port(port, &self.settings.health_path);
            }
            if !deployed.has_probe {
                deployed.has_probe = state.has_probe();
            }
            if !outcome.failures.contains_key(name) && state.is_healthy() {
                deployed.status = ServiceStatus::Running;
            }
        }

        for (name, failure) in &outcome.failures {
            pass.deployment.service_mut(name).fail(failure.message());

            let logs = self.fetch_logs(project, name).await;
            let kind = logs.as_deref().map(classify_failure);
            let description = match failure {
                HealthFailure::Timeout => format!(
                    "Service {} did not become healthy within {}s: {}",
                    name,
                    timeout.as_secs(),
                    failure.message()
                ),
                _ => format!("Service {} is not running: {}", name, failure.message()),
            };

            let mut error = pass
                .error("HEALTH", Severity::High, "Runtime")
                .service(name)
                .description(description)
                .impact("The service is unavailable to its consumers")
                .recommendation(
                    kind.map(|k| k.recommendation())
                        .unwrap_or("Check the service logs and its health endpoint"),
                );
            if let Some(logs) = logs.filter(|l| !l.trim().is_empty()) {
                error = error.with_log(&logs, self.settings.log_excerpt_chars);
            }
            pass.errors.push(error);
        }

        if outcome.timed_out && outcome.failures.is_empty() {
            warn!("No service of {} was observed before the health deadline", project.name);
            let error = pass
                .error("HEALTH", Severity::High, "Runtime")
                .service(INFRASTRUCTURE_SERVICE)
                .description(format!(
                    "No service was observed running within {}s",
                    timeout.as_secs()
                ))
                .impact("Nothing is available to consumers")
                .recommendation("Check that the compose project starts its services");
            pass.errors.push(error);
        }
    }

    async fn fetch_logs(&self, project: &ComposeProject, service: &str) -> Option<String> {
        match self
            .runtime
            .logs(
                project,
                service,
                self.settings.log_tail_lines,
                self.settings.timeouts.log_fetch,
            )
            .await
        {
            Ok(logs) => Some(logs),
            Err(e) => {
                debug!("Could not fetch logs of {}: {}", service, e);
                None
            }
        }
    }

    async fn teardown(&self, project: &ComposeProject) -> bool {
        match self.cleanup(project).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Teardown of {} failed: {}", project.name, e);
                false
            }
        }
    }

    fn finish(&self, pass: Pass, torn_down: bool) -> BuildValidationResult {
        let success = pass.deployment.phase.is_success() && pass.errors.is_empty();
        let service_urls = if torn_down {
            BTreeMap::new()
        } else {
            pass.deployment.service_urls()
        };

        info!(
            "Build validation of {} finished in phase {} with {} errors",
            pass.deployment.project,
            pass.deployment.phase,
            pass.errors.len()
        );

        BuildValidationResult {
            success,
            deployment: pass.deployment,
            errors: pass.errors,
            service_urls,
            torn_down,
        }
    }
}
