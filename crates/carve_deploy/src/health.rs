//! Fixed-interval health polling with a deadline.

use std::collections::BTreeMap;
use std::time::Duration;

use carve_runner::{ComposeProject, ComposeRuntime, ServiceState};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Why a tracked service is not healthy when polling stops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthFailure {
    /// Still not healthy when the deadline passed
    Timeout,
    /// Container stopped and will not recover
    Exited(String),
    /// Never appeared in `ps` output
    Missing,
}

impl HealthFailure {
    pub fn message(&self) -> String {
        match self {
            Self::Timeout => "Health check timeout".to_string(),
            Self::Exited(state) => format!("Container {}", state),
            Self::Missing => "Container not found".to_string(),
        }
    }
}

/// Result of one polling loop.
#[derive(Debug, Clone, Default)]
pub struct HealthOutcome {
    /// Last observed state per service
    pub states: BTreeMap<String, ServiceState>,
    /// Services that are not healthy, with the reason
    pub failures: BTreeMap<String, HealthFailure>,
    pub polls: u32,
    pub timed_out: bool,
}

impl HealthOutcome {
    pub fn all_healthy(&self) -> bool {
        self.failures.is_empty() && !self.timed_out
    }
}

/// Polls `ps` until every tracked service is healthy or the deadline passes.
#[derive(Debug, Clone, Copy)]
pub struct HealthPoller {
    pub interval: Duration,
    pub timeout: Duration,
    pub ps_timeout: Duration,
}

impl HealthPoller {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout,
            ps_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_ps_timeout(mut self, ps_timeout: Duration) -> Self {
        self.ps_timeout = ps_timeout;
        self
    }

    /// Wait for `tracked` to become healthy.
    ///
    /// With an empty `tracked` list every service reported by `ps` is
    /// tracked. Failed `ps` calls are retried on the next tick. The loop ends
    /// at the deadline, or earlier once every unhealthy service has exited.
    pub async fn wait_until_healthy(
        &self,
        runtime: &dyn ComposeRuntime,
        project: &ComposeProject,
        tracked: &[String],
    ) -> HealthOutcome {
        let deadline = Instant::now() + self.timeout;
        let mut outcome = HealthOutcome::default();

        loop {
            outcome.polls += 1;
            match runtime.ps(project, self.ps_timeout).await {
                Ok(states) => {
                    for mut state in states {
                        state.service = service_key(&state.service, &project.name, tracked);
                        outcome.states.insert(state.service.clone(), state);
                    }
                }
                Err(e) => warn!("ps for {} failed (poll {}): {}", project.name, outcome.polls, e),
            }

            let pending = self.unhealthy(&outcome.states, tracked);
            if pending.is_empty() && !outcome.states.is_empty() {
                info!(
                    "All services of {} healthy after {} polls",
                    project.name, outcome.polls
                );
                return outcome;
            }

            let all_exited = !pending.is_empty()
                && pending
                    .iter()
                    .all(|name| outcome.states.get(name).is_some_and(ServiceState::has_exited));
            if all_exited {
                warn!("Unhealthy services of {} have exited, not waiting further", project.name);
                outcome.failures = self.classify(&outcome.states, pending);
                return outcome;
            }

            let now = Instant::now();
            if now >= deadline {
                warn!(
                    "Health check for {} timed out after {}s, {} services not healthy",
                    project.name,
                    self.timeout.as_secs(),
                    pending.len()
                );
                outcome.timed_out = true;
                outcome.failures = self.classify(&outcome.states, pending);
                return outcome;
            }

            debug!("Waiting on {:?}", pending);
            tokio::time::sleep(self.interval.min(deadline - now)).await;
        }
    }

    fn unhealthy(&self, states: &BTreeMap<String, ServiceState>, tracked: &[String]) -> Vec<String> {
        if tracked.is_empty() {
            return states
                .values()
                .filter(|s| !s.is_healthy())
                .map(|s| s.service.clone())
                .collect();
        }
        tracked
            .iter()
            .filter(|name| !states.get(*name).is_some_and(ServiceState::is_healthy))
            .cloned()
            .collect()
    }

    fn classify(
        &self,
        states: &BTreeMap<String, ServiceState>,
        pending: Vec<String>,
    ) -> BTreeMap<String, HealthFailure> {
        pending
            .into_iter()
            .map(|name| {
                let failure = match states.get(&name) {
                    Some(state) if state.has_exited() => HealthFailure::Exited(state.state.clone()),
                    Some(_) => HealthFailure::Timeout,
                    None => HealthFailure::Missing,
                };
                (name, failure)
            })
            .collect()
    }
}

/// Map a `ps` entry to the compose service it belongs to.
///
/// Entries without a `Service` key carry the container name instead,
/// `<project>-<service>-<replica>` (`_` separated on compose v1).
fn service_key(reported: &str, project: &str, tracked: &[String]) -> String {
    if tracked.iter().any(|t| t == reported) {
        return reported.to_string();
    }
    let Some(rest) = reported
        .strip_prefix(project)
        .and_then(|r| r.strip_prefix(['-', '_']))
    else {
        return reported.to_string();
    };
    let base = rest
        .rsplit_once(['-', '_'])
        .filter(|(_, replica)| !replica.is_empty() && replica.bytes().all(|b| b.is_ascii_digit()))
        .map_or(rest, |(base, _)| base);

    if tracked.is_empty() || tracked.iter().any(|t| t == base) {
        base.to_string()
    } else {
        reported.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carve_runner::MockComposeRuntime;

    fn project() -> ComposeProject {
        ComposeProject::new("carve-test", "docker-compose.yml")
    }

    fn tracked(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_becomes_healthy() {
        let runtime = MockComposeRuntime::new()
            .add_ps_snapshot(vec![
                ServiceState::new("api", "running").with_health("starting"),
                ServiceState::new("web", "running"),
            ])
            .add_ps_snapshot(vec![
                ServiceState::new("api", "running").with_health("healthy"),
                ServiceState::new("web", "running"),
            ]);
        let poller = HealthPoller::new(Duration::from_secs(5), Duration::from_secs(120));

        let outcome = poller
            .wait_until_healthy(&runtime, &project(), &tracked(&["api", "web"]))
            .await;

        assert!(outcome.all_healthy());
        assert!(!outcome.timed_out);
        assert_eq!(outcome.polls, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_marks_only_unhealthy() {
        let runtime = MockComposeRuntime::new().add_ps_snapshot(vec![
            ServiceState::new("api", "running").with_health("unhealthy"),
            ServiceState::new("web", "running"),
        ]);
        let poller = HealthPoller::new(Duration::from_secs(5), Duration::from_secs(120));

        let start = Instant::now();
        let outcome = poller
            .wait_until_healthy(&runtime, &project(), &tracked(&["api", "web"]))
            .await;

        assert!(outcome.timed_out);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures["api"], HealthFailure::Timeout);
        assert_eq!(outcome.failures["api"].message(), "Health check timeout");
        assert!(start.elapsed() >= Duration::from_secs(120));
        assert_eq!(outcome.polls, 25);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exited_services_stop_polling() {
        let runtime = MockComposeRuntime::new().add_ps_snapshot(vec![
            ServiceState::new("api", "exited"),
            ServiceState::new("web", "running"),
        ]);
        let poller = HealthPoller::new(Duration::from_secs(5), Duration::from_secs(120));

        let outcome = poller
            .wait_until_healthy(&runtime, &project(), &tracked(&["api", "web"]))
            .await;

        assert!(!outcome.timed_out);
        assert_eq!(outcome.polls, 1);
        assert_eq!(outcome.failures["api"], HealthFailure::Exited("exited".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_service_times_out() {
        let runtime = MockComposeRuntime::new()
            .add_ps_snapshot(vec![ServiceState::new("web", "running")]);
        let poller = HealthPoller::new(Duration::from_secs(5), Duration::from_secs(10));

        let outcome = poller
            .wait_until_healthy(&runtime, &project(), &tracked(&["api", "web"]))
            .await;

        assert!(outcome.timed_out);
        assert_eq!(outcome.failures["api"], HealthFailure::Missing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_untracked_uses_ps_services() {
        let runtime = MockComposeRuntime::new()
            .add_ps_snapshot(vec![ServiceState::new("web", "running")]);
        let poller = HealthPoller::new(Duration::from_secs(5), Duration::from_secs(10));

        let outcome = poller.wait_until_healthy(&runtime, &project(), &[]).await;
        assert!(outcome.all_healthy());
        assert_eq!(outcome.polls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_container_names_resolve_to_services() {
        let runtime = MockComposeRuntime::new().add_ps_snapshot(vec![
            ServiceState::new("carve-test-api-1", "running").with_health("healthy"),
            ServiceState::new("carve-test_web_1", "running"),
        ]);
        let poller = HealthPoller::new(Duration::from_secs(5), Duration::from_secs(10));

        let outcome = poller
            .wait_until_healthy(&runtime, &project(), &tracked(&["api", "web"]))
            .await;

        assert!(outcome.all_healthy());
        assert_eq!(outcome.polls, 1);
        assert_eq!(outcome.states.keys().collect::<Vec<_>>(), ["api", "web"]);
        assert_eq!(outcome.states["api"].service, "api");
    }

    #[test]
    fn test_service_key() {
        let tracked = tracked(&["web", "worker-2"]);
        assert_eq!(service_key("web", "carve-test", &tracked), "web");
        assert_eq!(service_key("carve-test-web-3", "carve-test", &tracked), "web");
        // replica-like suffix that is part of the service name
        assert_eq!(service_key("worker-2", "carve-test", &tracked), "worker-2");
        assert_eq!(service_key("carve-test-worker-2-1", "carve-test", &tracked), "worker-2");
        // other projects are left alone
        assert_eq!(service_key("other-web-1", "carve-test", &tracked), "other-web-1");
        assert_eq!(service_key("carve-test-db-1", "carve-test", &[]), "db");
    }
}
