//! Reading the services declared in a compose descriptor.

use std::path::Path;

use serde_yaml::Value;

use crate::error::{DeployError, DeployResult};

/// One service declared in the descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeService {
    pub name: String,
    /// First published host port
    pub host_port: Option<u16>,
    pub has_healthcheck: bool,
}

/// Services of a compose file, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComposeDescriptor {
    pub services: Vec<ComposeService>,
}

impl ComposeDescriptor {
    pub fn load(path: &Path) -> DeployResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content).map_err(|e| DeployError::InvalidDescriptor {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    pub fn parse(content: &str) -> DeployResult<Self> {
        let root: Value = serde_yaml::from_str(content)?;
        let services = root
            .get("services")
            .and_then(Value::as_mapping)
            .ok_or_else(|| DeployError::InvalidDescriptor {
                path: "<inline>".to_string(),
                message: "no services section".to_string(),
            })?;

        let services = services
            .iter()
            .filter_map(|(name, definition)| {
                let name = name.as_str()?.to_string();
                Some(ComposeService {
                    host_port: definition
                        .get("ports")
                        .and_then(Value::as_sequence)
                        .and_then(|ports| ports.iter().find_map(host_port)),
                    has_healthcheck: definition
                        .get("healthcheck")
                        .is_some_and(|hc| hc.get("disable").and_then(Value::as_bool) != Some(true)),
                    name,
                })
            })
            .collect();

        Ok(Self { services })
    }

    pub fn service_names(&self) -> Vec<String> {
        self.services.iter().map(|s| s.name.clone()).collect()
    }
}

/// Host side of a port mapping: `"8081:8080"`, `"127.0.0.1:8081:8080/tcp"`,
/// or the long form `{ published: 8081, target: 8080 }`.
fn host_port(entry: &Value) -> Option<u16> {
    match entry {
        Value::String(s) => {
            let mapping = s.split('/').next().unwrap_or(s);
            let parts: Vec<&str> = mapping.split(':').collect();
            let host = match parts.len() {
                2 => parts[0],
                3 => parts[1],
                _ => return None,
            };
            host.parse().ok()
        }
        Value::Mapping(_) => match entry.get("published")? {
            Value::Number(n) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
            Value::String(s) => s.parse().ok(),
            _ => None,
        },
        _ => None,
    }
}
