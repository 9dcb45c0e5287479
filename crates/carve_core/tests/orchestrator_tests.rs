//! End-to-end runs of the retry loop with scripted collaborators.

use std::collections::VecDeque;
use std::fs;
use std::sync::Arc;

use async_trait::async_trait;
use carve_agents::{
    AgentResult, CompletionAgent, CompletionRequest, CompletionResponse, RetryPlanner,
};
use carve_core::{
    AttemptContext, BroadcastSink, BuildValidatorSource, CarveConfig, CodeGenerator, CoreError,
    CoreResult, FileJobStore, GenerationGuidance, InMemoryJobStore, JobState, JobStore,
    MigrationEvent, ReportFileValidator, RetryOrchestrator, Validator,
};
use carve_deploy::BuildValidator;
use carve_policy::{GateDecision, RawReport};
use carve_runner::{MockComposeRuntime, ServiceState};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tempfile::TempDir;

const FAILING_UNIT: &str = "## Error Report\n\n\
| Error ID | Severity | Category | Location | Description | Impact | Recommendation |\n\
|---|---|---|---|---|---|---|\n\
| UT-BUILD-001 | CRITICAL | Build | accounts-service/pom.xml | Missing JPA starter | No build | Add it |\n\n\
Total Errors: 1\n";

const CLEAN: &str = "All checks passed.\n\nTotal Errors: 0\n";

fn analysis(should_retry: bool, confidence: f64) -> String {
    format!(
        "Here is my plan:\n```json\n{}\n```",
        json!({
            "analysis": {"rootCause": "missing starter", "criticalIssues": ["UT-BUILD-001"], "summary": "build broken"},
            "improvementStrategy": {
                "prioritizedFixes": ["Declare spring-boot-starter-data-jpa"],
                "promptAdjustments": {"microservices": {"additions": ["Declare JPA starter"], "emphasis": []}}
            },
            "improvedMigrationPlan": {"services": ["accounts-service"], "criticalInstructions": ["Compile every service"]},
            "retryConfidence": confidence,
            "adjustedPlannerPrompt": "Fix the accounts-service build first",
            "retryStrategy": {"shouldRetry": should_retry, "confidence": confidence, "specificFixes": ["pom.xml"]}
        })
    )
}

/// Answers every planning request with the same text and counts calls.
struct ScriptedAgent {
    reply: String,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedAgent {
    fn replying(reply: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.into(),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.prompts.lock().len()
    }
}

#[async_trait]
impl CompletionAgent for ScriptedAgent {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: CompletionRequest) -> AgentResult<CompletionResponse> {
        self.prompts.lock().push(request.prompt);
        Ok(CompletionResponse::text(self.reply.clone()))
    }
}

/// Records the guidance of every attempt.
#[derive(Default)]
struct RecordingGenerator {
    seen: Mutex<Vec<(AttemptContext, GenerationGuidance)>>,
    fail: bool,
}

impl RecordingGenerator {
    fn failing() -> Arc<Self> {
        Arc::new(Self {
            seen: Mutex::new(Vec::new()),
            fail: true,
        })
    }

    fn calls(&self) -> usize {
        self.seen.lock().len()
    }
}

#[async_trait]
impl CodeGenerator for RecordingGenerator {
    fn name(&self) -> &str {
        "recording"
    }

    async fn generate(&self, ctx: &AttemptContext, guidance: &GenerationGuidance) -> CoreResult<()> {
        self.seen.lock().push((ctx.clone(), guidance.clone()));
        if self.fail {
            return Err(CoreError::Generation("agent crashed".to_string()));
        }
        Ok(())
    }
}

/// Returns one scripted report per attempt; the last one repeats.
struct ScriptedValidator {
    name: String,
    reports: Mutex<VecDeque<String>>,
}

impl ScriptedValidator {
    fn new(name: &str, reports: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            reports: Mutex::new(reports.iter().map(|r| r.to_string()).collect()),
        })
    }
}

#[async_trait]
impl Validator for ScriptedValidator {
    fn name(&self) -> &str {
        &self.name
    }

    async fn validate(&self, _ctx: &AttemptContext) -> CoreResult<RawReport> {
        let mut reports = self.reports.lock();
        let content = if reports.len() > 1 {
            reports.pop_front().unwrap_or_default()
        } else {
            reports.front().cloned().unwrap_or_default()
        };
        Ok(RawReport::new(&self.name, content))
    }
}

fn orchestrator(
    generator: Arc<RecordingGenerator>,
    agent: Arc<ScriptedAgent>,
    store: Arc<dyn JobStore>,
) -> RetryOrchestrator {
    RetryOrchestrator::new(CarveConfig::default(), generator, RetryPlanner::new(agent), store).unwrap()
}

fn plan() -> Value {
    json!({"services": ["accounts-service", "ledger-service"], "frontends": ["portal"]})
}

#[tokio::test]
async fn test_zero_errors_succeeds_on_first_attempt() {
    let generator = Arc::new(RecordingGenerator::default());
    let agent = ScriptedAgent::replying(analysis(true, 0.9));
    let sink = Arc::new(BroadcastSink::new(64));
    let mut events = sink.subscribe();

    let orchestrator = orchestrator(generator.clone(), agent.clone(), Arc::new(InMemoryJobStore::new()))
        .with_validator(ScriptedValidator::new("unit", &[CLEAN]))
        .with_validator(ScriptedValidator::new("integration", &[r#"{"errors": []}"#]))
        .with_sink(sink);

    let job = orchestrator.run("banking", plan()).await.unwrap();

    assert_eq!(job.state, JobState::Succeeded);
    assert_eq!(job.attempt, 1);
    assert_eq!(job.history.len(), 1);
    assert_eq!(job.last_count.as_ref().unwrap().total_errors, 0);
    assert_eq!(agent.calls(), 0);
    assert_eq!(generator.calls(), 1);
    assert!(generator.seen.lock()[0].1.is_empty());
    assert_eq!(orchestrator.release_status(&job.id).await.unwrap(), GateDecision::Open);

    let mut received = Vec::new();
    while let Ok(event) = events.try_recv() {
        received.push(event);
    }
    assert!(matches!(received.first(), Some(MigrationEvent::JobStarted { .. })));
    assert!(matches!(received.last(), Some(MigrationEvent::JobSucceeded { attempts: 1, .. })));
}

#[tokio::test]
async fn test_retries_are_bounded_by_max_attempts() {
    let generator = Arc::new(RecordingGenerator::default());
    let agent = ScriptedAgent::replying(analysis(true, 0.9));
    let orchestrator = orchestrator(generator.clone(), agent.clone(), Arc::new(InMemoryJobStore::new()))
        .with_validator(ScriptedValidator::new("unit", &[FAILING_UNIT]));

    let job = orchestrator.run("banking", plan()).await.unwrap();

    assert_eq!(job.state, JobState::Failed);
    assert_eq!(job.attempt, 3);
    assert_eq!(generator.calls(), 3);
    assert_eq!(agent.calls(), 2);

    let attempts = job.history.attempts();
    assert_eq!(attempts.len(), 3);
    assert!(attempts.iter().all(|a| a.errors_fixed == 0));
    assert!(attempts.iter().all(|a| a.errors_at_start == 1));
    assert!(attempts[0].analysis.is_some());
    assert!(attempts[2].analysis.is_none());

    let outcome = job.outcome.as_ref().unwrap();
    assert!(outcome.manual_intervention_required);
    assert!(outcome.reason.contains("after 3 attempts"));
    assert_eq!(outcome.remaining_errors.len(), 1);
    assert_eq!(outcome.remaining_errors[0].id, "UT-BUILD-001");

    let decision = orchestrator.release_status(&job.id).await.unwrap();
    assert_eq!(decision, GateDecision::Blocked { remaining: 1 });
    assert_eq!(decision.to_string(), "blocked — 1 critical errors remain");
}

#[tokio::test]
async fn test_guidance_reaches_next_generation() {
    let generator = Arc::new(RecordingGenerator::default());
    let agent = ScriptedAgent::replying(analysis(true, 0.8));
    let orchestrator = orchestrator(generator.clone(), agent.clone(), Arc::new(InMemoryJobStore::new()))
        .with_validator(ScriptedValidator::new("unit", &[FAILING_UNIT, CLEAN]));

    let job = orchestrator.run("banking", plan()).await.unwrap();

    assert_eq!(job.state, JobState::Succeeded);
    assert_eq!(job.attempt, 2);
    assert_eq!(job.history.attempts()[1].errors_fixed, 1);
    assert_eq!(job.history.confidence_trend(), vec![0.8]);

    let seen = generator.seen.lock();
    let (ctx, guidance) = &seen[1];
    assert!(ctx.is_retry());
    assert_eq!(
        guidance.planner_prompt.as_deref(),
        Some("Fix the accounts-service build first")
    );
    assert_eq!(guidance.critical_instructions, vec!["Compile every service"]);
    assert_eq!(ctx.migration_plan["criticalInstructions"][0], "Compile every service");

    let prompts = agent.prompts.lock();
    assert!(prompts[0].contains("Migration attempt 1/3"));
    assert!(prompts[0].contains("UT-BUILD-001"));
}

#[tokio::test]
async fn test_unusable_planner_response_ends_job() {
    let generator = Arc::new(RecordingGenerator::default());
    let agent = ScriptedAgent::replying(r#"{"analysis": {}, "improvementStrategy": {}, "improvedMigrationPlan": {}}"#);
    let orchestrator = orchestrator(generator.clone(), agent.clone(), Arc::new(InMemoryJobStore::new()))
        .with_validator(ScriptedValidator::new("unit", &[FAILING_UNIT]));

    let job = orchestrator.run("banking", plan()).await.unwrap();

    assert_eq!(job.state, JobState::Failed);
    assert_eq!(job.attempt, 1);
    assert_eq!(job.history.len(), 1);
    assert!(job.history.attempts()[0].analysis.is_none());
    assert!(job.outcome.unwrap().reason.contains("no usable analysis"));
}

#[tokio::test]
async fn test_should_retry_false_is_honored() {
    let generator = Arc::new(RecordingGenerator::default());
    let agent = ScriptedAgent::replying(analysis(false, 0.95));
    let orchestrator = orchestrator(generator.clone(), agent, Arc::new(InMemoryJobStore::new()))
        .with_validator(ScriptedValidator::new("unit", &[FAILING_UNIT]));

    let job = orchestrator.run("banking", plan()).await.unwrap();

    assert_eq!(job.state, JobState::Failed);
    assert_eq!(generator.calls(), 1);
    assert!(job.outcome.unwrap().reason.contains("advised against"));
}

#[tokio::test]
async fn test_confidence_floor_stops_low_confidence_retry() {
    let generator = Arc::new(RecordingGenerator::default());
    let agent = ScriptedAgent::replying(analysis(true, 0.1));
    let mut config = CarveConfig::default();
    config.retry.confidence_floor = Some(0.5);

    let orchestrator = RetryOrchestrator::new(
        config,
        generator.clone(),
        RetryPlanner::new(agent),
        Arc::new(InMemoryJobStore::new()),
    )
    .unwrap()
    .with_validator(ScriptedValidator::new("unit", &[FAILING_UNIT]));

    let job = orchestrator.run("banking", plan()).await.unwrap();
    assert_eq!(job.state, JobState::Failed);
    assert_eq!(generator.calls(), 1);
}

#[tokio::test]
async fn test_generation_failure_is_fatal_but_recorded() {
    let generator = RecordingGenerator::failing();
    let agent = ScriptedAgent::replying(analysis(true, 0.9));
    let orchestrator = orchestrator(generator, agent.clone(), Arc::new(InMemoryJobStore::new()))
        .with_validator(ScriptedValidator::new("unit", &[CLEAN]));

    let job = orchestrator.run("banking", plan()).await.unwrap();

    assert_eq!(job.state, JobState::Failed);
    assert_eq!(job.history.len(), 1);
    assert!(job.outcome.unwrap().reason.contains("agent crashed"));
    assert_eq!(agent.calls(), 0);
    assert!(!orchestrator.release_status(&job.id).await.unwrap().is_open());
}

#[tokio::test]
async fn test_missing_report_counts_as_critical_error() {
    let temp_dir = TempDir::new().unwrap();
    let generator = Arc::new(RecordingGenerator::default());
    let agent = ScriptedAgent::replying(analysis(false, 0.2));
    let orchestrator = orchestrator(generator, agent, Arc::new(InMemoryJobStore::new()))
        .with_validator(ScriptedValidator::new("unit", &[CLEAN]))
        .with_validator(Arc::new(ReportFileValidator::new(
            "e2e",
            temp_dir.path().join("e2e-report.md"),
        )));

    let job = orchestrator.run("banking", plan()).await.unwrap();

    let count = job.last_count.as_ref().unwrap();
    assert_eq!(count.total_errors, 1);
    assert_eq!(count.errors_by_validator["e2e"], 1);
    assert_eq!(count.errors_by_validator["unit"], 0);
    assert_eq!(job.state, JobState::Failed);
}

#[tokio::test]
async fn test_jobs_persist_to_file_store() {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(FileJobStore::new(temp_dir.path().join("jobs")));
    let generator = Arc::new(RecordingGenerator::default());
    let agent = ScriptedAgent::replying(analysis(true, 0.9));
    let orchestrator = orchestrator(generator, agent, store.clone())
        .with_validator(ScriptedValidator::new("unit", &[CLEAN]));

    let job = orchestrator.run("banking", plan()).await.unwrap();

    let stored = store.get(&job.id).await.unwrap().unwrap();
    assert_eq!(stored, job);
    assert_eq!(store.list().await.unwrap().len(), 1);

    assert!(matches!(
        orchestrator.release_status("no-such-job").await,
        Err(CoreError::JobNotFound(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_build_validation_in_the_loop() {
    let temp_dir = TempDir::new().unwrap();
    let compose = temp_dir.path().join("docker-compose.yml");
    fs::write(
        &compose,
        "services:\n  accounts-service:\n    build: ./accounts-service\n    ports:\n      - \"8081:8080\"\n",
    )
    .unwrap();

    let runtime = MockComposeRuntime::new()
        .add_ps_snapshot(vec![ServiceState::new("accounts-service", "running").with_port(8081)]);
    let build = Arc::new(BuildValidator::new(Arc::new(runtime.clone())));
    let source = Arc::new(BuildValidatorSource::new(build, &compose));

    let generator = Arc::new(RecordingGenerator::default());
    let agent = ScriptedAgent::replying(analysis(true, 0.9));
    let orchestrator = orchestrator(generator, agent, Arc::new(InMemoryJobStore::new()))
        .with_validator(source);

    let job = orchestrator.run("banking", plan()).await.unwrap();
    assert_eq!(job.state, JobState::Succeeded);

    let project = format!("carve-{}", job.id);
    assert!(runtime
        .get_calls()
        .iter()
        .filter(|c| c.method == "build")
        .all(|c| c.project.as_deref() == Some(project.as_str())));

    runtime.clear_calls();
    orchestrator.cleanup(&job.id).await.unwrap();
    orchestrator.cleanup(&job.id).await.unwrap();
    assert_eq!(runtime.call_count("down"), 2);
}
