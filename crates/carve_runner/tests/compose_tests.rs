//! Integration tests for the compose runtime layer.
//!
//! These tests use the mock runtime to avoid requiring an actual
//! Docker/Podman installation.

use std::sync::Arc;
use std::time::Duration;

use carve_runner::{
    parse_ps_output, ComposeProject, ComposeRuntime, MockComposeRuntime, MockResponse,
    ServiceState,
};

const TIMEOUT: Duration = Duration::from_secs(5);

/// The runtime is usable as a trait object shared across tasks.
#[tokio::test]
async fn test_runtime_as_trait_object() {
    let runtime: Arc<dyn ComposeRuntime> = Arc::new(
        MockComposeRuntime::new()
            .add_ps_snapshot(vec![ServiceState::new("accounts", "running").with_health("healthy")]),
    );
    let project = ComposeProject::for_job("abc", "docker-compose.yml");

    assert!(runtime.is_available().await.unwrap());
    let states = runtime.ps(&project, TIMEOUT).await.unwrap();
    assert_eq!(states.len(), 1);
    assert!(states[0].is_healthy());
}

/// A full build → up → down cycle records calls against the job project.
#[tokio::test]
async fn test_full_cycle_is_recorded_per_project() {
    let runtime = MockComposeRuntime::new()
        .with_build(MockResponse::success("Service accounts  Built"))
        .with_up(MockResponse::success(""));
    let project = ComposeProject::for_job("job-7", "docker-compose.yml");

    let build = runtime.build(&project, true, TIMEOUT).await.unwrap();
    assert!(build.success());
    runtime.up(&project, true, TIMEOUT).await.unwrap();
    runtime.down(&project, true, TIMEOUT).await.unwrap();

    let calls = runtime.get_calls();
    let methods: Vec<_> = calls.iter().map(|c| c.method.as_str()).collect();
    assert_eq!(methods, vec!["build", "up", "down"]);
    assert!(calls.iter().all(|c| c.project.as_deref() == Some("carve-job-7")));
    assert_eq!(calls[0].detail.as_deref(), Some("no_cache=true"));
}

/// A failing command is reported through the exit code, not an error.
#[tokio::test]
async fn test_failed_build_is_an_output() {
    let runtime = MockComposeRuntime::new()
        .with_build(MockResponse::failure(1, "failed to solve: process did not complete"));
    let project = ComposeProject::new("p", "docker-compose.yml");

    let output = runtime.build(&project, true, TIMEOUT).await.unwrap();
    assert!(!output.success());
    assert!(output.combined_output().contains("failed to solve"));
}

/// Compose v2.21+ emits one object per line with extra fields.
#[test]
fn test_parse_real_world_ps_line() {
    let line = r#"{"Command":"\"java -jar app.jar\"","CreatedAt":"2024-01-01 10:00:00 +0000 UTC","ExitCode":0,"Health":"starting","ID":"abc","Image":"carve-accounts","Labels":"","Name":"carve-job-accounts-1","Project":"carve-job","Publishers":[{"URL":"0.0.0.0","TargetPort":8080,"PublishedPort":18080,"Protocol":"tcp"}],"Service":"accounts","State":"running","Status":"Up 3 seconds (health: starting)"}"#;
    let states = parse_ps_output(line).unwrap();

    assert_eq!(states.len(), 1);
    assert_eq!(states[0].service, "accounts");
    assert_eq!(states[0].health, "starting");
    assert_eq!(states[0].published_port, Some(18080));
    assert!(!states[0].is_healthy());
}
