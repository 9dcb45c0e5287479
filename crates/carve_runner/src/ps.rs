//! Parsing of `compose ps --format json` output.
//!
//! Depending on the compose version the output is a JSON array, one JSON
//! object per line, or objects concatenated with no separator at all. All
//! three shapes are normalized into an array before parsing.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{RunnerError, RunnerResult};

/// Runtime state of one compose service as reported by `ps`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceState {
    /// Service name (falls back to the container name)
    pub service: String,
    /// Container state (`running`, `exited`, `restarting`, ...)
    pub state: String,
    /// Health probe status; empty when the service has no probe
    pub health: String,
    /// First published host port, if any
    pub published_port: Option<u16>,
}

impl ServiceState {
    pub fn new(service: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            state: state.into(),
            health: String::new(),
            published_port: None,
        }
    }

    pub fn with_health(mut self, health: impl Into<String>) -> Self {
        self.health = health.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.published_port = Some(port);
        self
    }

    /// Whether the service has a health probe configured.
    pub fn has_probe(&self) -> bool {
        !self.health.trim().is_empty()
    }

    pub fn is_running(&self) -> bool {
        self.state.eq_ignore_ascii_case("running")
    }

    /// A service is healthy when its probe reports healthy, or when it has
    /// no probe and is running. Missing probes are not penalized.
    pub fn is_healthy(&self) -> bool {
        if self.has_probe() {
            self.health.eq_ignore_ascii_case("healthy")
        } else {
            self.is_running()
        }
    }

    /// Whether the service has stopped for good (will not become healthy).
    pub fn has_exited(&self) -> bool {
        matches!(
            self.state.to_ascii_lowercase().as_str(),
            "exited" | "dead"
        )
    }

    fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let service = obj
            .get("Service")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .or_else(|| obj.get("Name").and_then(Value::as_str))?
            .to_string();

        let state = obj
            .get("State")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_lowercase();

        let health = obj
            .get("Health")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_lowercase();

        let published_port = obj
            .get("Publishers")
            .and_then(Value::as_array)
            .and_then(|pubs| {
                pubs.iter()
                    .filter_map(|p| p.get("PublishedPort").and_then(Value::as_u64))
                    .find(|port| *port > 0)
            })
            .and_then(|port| u16::try_from(port).ok());

        Some(Self {
            service,
            state,
            health,
            published_port,
        })
    }
}

/// Parse `ps` output into service states.
///
/// Entries without a `Service` or `Name` key are skipped.
pub fn parse_ps_output(output: &str) -> RunnerResult<Vec<ServiceState>> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let normalized = if trimmed.starts_with('[') {
        trimmed.to_string()
    } else {
        format!("[{}]", repair_concatenated_objects(trimmed))
    };

    let values: Vec<Value> = serde_json::from_str(&normalized)
        .map_err(|e| RunnerError::InvalidPsOutput(format!("{}: {}", e, truncate(trimmed, 200))))?;

    Ok(values.iter().filter_map(ServiceState::from_value).collect())
}

/// Insert commas between adjacent top-level objects (`}{` -> `},{`).
///
/// Whitespace (including newlines) between objects is tolerated, and braces
/// inside string literals are left alone.
pub fn repair_concatenated_objects(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 16);
    let mut depth: i32 = 0;
    let mut in_string = false;
    let mut escaped = false;
    let mut pending_ws = String::new();
    let mut object_closed = false;

    for c in input.chars() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        if depth == 0 && object_closed && c.is_whitespace() {
            pending_ws.push(c);
            continue;
        }

        if depth == 0 && object_closed && c == '{' {
            out.push(',');
        }
        out.push_str(&pending_ws);
        pending_ws.clear();
        object_closed = false;

        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    object_closed = true;
                }
            }
            _ => {}
        }
        out.push(c);
    }

    out
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
