//! Runtime state of one validation build.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::compose::ComposeDescriptor;
use crate::phase::ValidationPhase;

/// Health endpoint path used for backend services.
pub const DEFAULT_HEALTH_PATH: &str = "/actuator/health";

/// Status of one deployed service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Pending,
    Building,
    Starting,
    Running,
    Failed,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    Service,
    Frontend,
}

impl ServiceKind {
    /// Guess the kind from a compose service name.
    pub fn from_name(name: &str) -> Self {
        let lower = name.to_ascii_lowercase();
        if ["frontend", "mfe", "portal", "-ui", "ui-", "shell"]
            .iter()
            .any(|marker| lower.contains(marker))
        {
            Self::Frontend
        } else {
            Self::Service
        }
    }
}

/// One service or frontend of the deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployedService {
    pub name: String,
    pub kind: ServiceKind,
    pub status: ServiceStatus,
    pub port: Option<u16>,
    pub health_url: Option<String>,
    pub has_probe: bool,
    pub error: Option<String>,
}

impl DeployedService {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            kind: ServiceKind::from_name(&name),
            name,
            status: ServiceStatus::Pending,
            port: None,
            health_url: None,
            has_probe: false,
            error: None,
        }
    }

    /// Record the published port and derive the health URL.
    pub fn set_port(&mut self, port: u16, health_path: &str) {
        self.port = Some(port);
        let path = match self.kind {
            ServiceKind::Service => health_path,
            ServiceKind::Frontend => "/",
        };
        self.health_url = Some(format!("http://localhost:{}{}", port, path));
    }

    pub fn url(&self) -> Option<String> {
        self.port.map(|p| format!("http://localhost:{}", p))
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = ServiceStatus::Failed;
        self.error = Some(error.into());
    }
}

/// All services of one validation build, mutated as phases progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerDeployment {
    pub project: String,
    pub phase: ValidationPhase,
    pub services: BTreeMap<String, DeployedService>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ContainerDeployment {
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            phase: ValidationPhase::NotStarted,
            services: BTreeMap::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Track every service the descriptor declares.
    pub fn track_descriptor(&mut self, descriptor: &ComposeDescriptor, health_path: &str) {
        for declared in &descriptor.services {
            let service = self.service_mut(&declared.name);
            service.has_probe = declared.has_healthcheck;
            if let Some(port) = declared.host_port {
                service.set_port(port, health_path);
            }
        }
    }

    /// Get a service, tracking it if it was unknown.
    pub fn service_mut(&mut self, name: &str) -> &mut DeployedService {
        self.services
            .entry(name.to_string())
            .or_insert_with(|| DeployedService::new(name))
    }

    pub fn set_phase(&mut self, phase: ValidationPhase) {
        self.phase = phase;
        if phase.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
    }

    /// Set every service that has not failed to `status`.
    pub fn mark_all(&mut self, status: ServiceStatus) {
        for service in self.services.values_mut() {
            if service.status != ServiceStatus::Failed {
                service.status = status;
            }
        }
    }

    pub fn service_names(&self) -> Vec<String> {
        self.services.keys().cloned().collect()
    }

    pub fn running_services(&self) -> impl Iterator<Item = &DeployedService> {
        self.services
            .values()
            .filter(|s| s.status == ServiceStatus::Running)
    }

    pub fn failed_services(&self) -> impl Iterator<Item = &DeployedService> {
        self.services
            .values()
            .filter(|s| s.status == ServiceStatus::Failed)
    }

    /// URL per running service that publishes a port.
    pub fn service_urls(&self) -> BTreeMap<String, String> {
        self.running_services()
            .filter_map(|s| s.url().map(|u| (s.name.clone(), u)))
            .collect()
    }
}
