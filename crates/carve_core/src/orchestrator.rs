//! The bounded generate/validate/retry loop.
//!
//! ```text
//! Generating -> Validating -> zero errors -> Succeeded
//!                          -> errors -> Analyzing -> Deciding -> retry -> Generating
//!                                                             -> give up -> Failed
//! ```
//!
//! One job runs strictly sequentially. Separate jobs share nothing but the
//! store and the container runtime, and their compose projects are
//! namespaced by job ID.

use std::sync::Arc;

use carve_agents::{ErrorAnalysisResult, NamedReport, PlanningInput, RetryPlanner};
use carve_policy::{ErrorCount, ErrorCounter, ErrorExtractor, GateDecision, RawReport, ValidationError};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::config::CarveConfig;
use crate::context::{AttemptContext, GenerationGuidance};
use crate::error::{CoreError, CoreResult};
use crate::events::{EventBus, EventSink, MigrationEvent};
use crate::generator::CodeGenerator;
use crate::job::{JobState, MigrationJob};
use crate::store::JobStore;
use crate::validator::{infrastructure_failure_report, Validator};

/// Outcome of the decision step.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    Retry(Box<ErrorAnalysisResult>),
    GiveUp(String),
}

/// Decide whether to retry.
///
/// `shouldRetry` is honored literally unless a confidence floor is set.
pub fn decide_retry(analysis: Option<ErrorAnalysisResult>, confidence_floor: Option<f64>) -> RetryDecision {
    let analysis = match analysis {
        Some(a) => a,
        None => {
            return RetryDecision::GiveUp(
                "Retry planner produced no usable analysis; manual intervention required".to_string(),
            )
        }
    };

    if !analysis.should_retry() {
        return RetryDecision::GiveUp(format!(
            "Retry planner advised against retrying (confidence {:.2}); manual intervention required",
            analysis.retry_strategy.confidence
        ));
    }

    if let Some(floor) = confidence_floor {
        if analysis.retry_strategy.confidence < floor {
            return RetryDecision::GiveUp(format!(
                "Retry confidence {:.2} is below the configured floor {:.2}; manual intervention required",
                analysis.retry_strategy.confidence, floor
            ));
        }
    }

    RetryDecision::Retry(Box::new(analysis))
}

pub struct RetryOrchestrator {
    config: CarveConfig,
    generator: Arc<dyn CodeGenerator>,
    validators: Vec<Arc<dyn Validator>>,
    planner: RetryPlanner,
    store: Arc<dyn JobStore>,
    events: EventBus,
    counter: ErrorCounter,
    extractor: ErrorExtractor,
}

impl RetryOrchestrator {
    pub fn new(
        config: CarveConfig,
        generator: Arc<dyn CodeGenerator>,
        planner: RetryPlanner,
        store: Arc<dyn JobStore>,
    ) -> CoreResult<Self> {
        config.validate()?;
        let counter = ErrorCounter::with_pattern(&config.validation.error_id_pattern)?;
        Ok(Self {
            config,
            generator,
            validators: Vec::new(),
            planner,
            store,
            events: EventBus::new(),
            counter,
            extractor: ErrorExtractor::new(),
        })
    }

    pub fn with_validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validators.push(validator);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events.attach(sink);
        self
    }

    pub fn config(&self) -> &CarveConfig {
        &self.config
    }

    /// Create a job and drive it to a terminal state.
    ///
    /// Returns `Err` only for infrastructure the loop itself depends on
    /// (the job store). Generation failures, validation errors and
    /// exhausted retries all end in a `Failed` job.
    pub async fn run(&self, name: &str, plan: Value) -> CoreResult<MigrationJob> {
        let job = MigrationJob::new(name, self.config.retry.max_attempts);
        self.drive(job, plan).await
    }

    /// Drive a freshly created job. Useful when the caller picks the job ID.
    pub async fn drive(&self, mut job: MigrationJob, plan: Value) -> CoreResult<MigrationJob> {
        if job.state != JobState::Pending {
            return Err(CoreError::InvalidState(format!(
                "Job {} is {} and cannot be started",
                job.id, job.state
            )));
        }
        if self.validators.is_empty() {
            return Err(CoreError::InvalidConfig("no validators configured".to_string()));
        }

        self.store.put(&job).await?;
        info!(
            "Starting migration job {} ({}) with up to {} attempts",
            job.name, job.id, job.max_attempts
        );
        self.events.publish(MigrationEvent::JobStarted {
            job_id: job.id.clone(),
            name: job.name.clone(),
            max_attempts: job.max_attempts,
        });

        let mut plan = plan;
        let mut guidance = GenerationGuidance::default();

        loop {
            job.attempt += 1;
            let ctx = AttemptContext {
                job_id: job.id.clone(),
                attempt: job.attempt,
                max_attempts: job.max_attempts,
                migration_plan: plan.clone(),
            };

            self.enter(&mut job, JobState::Generating).await?;
            if let Err(e) = self.generator.generate(&ctx, &guidance).await {
                error!("Generation failed for job {} attempt {}: {}", job.id, job.attempt, e);
                let count = job.last_count.clone().unwrap_or_default();
                job.history.record(job.attempt, &count, None);
                return self.finish_failed(job, format!("Code generation failed: {}", e), Vec::new()).await;
            }

            self.enter(&mut job, JobState::Validating).await?;
            let reports = self.collect_reports(&ctx).await;
            let count = self.counter.count_total_errors(&reports);
            let remaining = self.extractor.extract_errors(&reports);
            job.last_count = Some(count.clone());
            self.publish_validation(&job, &count);

            if count.has_zero_errors() {
                job.history.record(job.attempt, &count, None);
                job.succeed();
                self.store.put(&job).await?;
                info!("Job {} succeeded on attempt {}", job.id, job.attempt);
                self.events.publish(MigrationEvent::JobSucceeded {
                    job_id: job.id.clone(),
                    attempts: job.attempt,
                });
                return Ok(job);
            }

            if !job.has_attempts_left() {
                job.history.record(job.attempt, &count, None);
                let reason = format!(
                    "{} errors remain after {} attempts; manual intervention required",
                    count.total_errors, job.attempt
                );
                return self.finish_failed(job, reason, remaining).await;
            }

            self.enter(&mut job, JobState::Analyzing).await?;
            let analysis = self.analyze(&job, &plan, &reports).await;
            job.history.record(job.attempt, &count, analysis.clone());

            self.enter(&mut job, JobState::Deciding).await?;
            match decide_retry(analysis, self.config.retry.confidence_floor) {
                RetryDecision::GiveUp(reason) => {
                    return self.finish_failed(job, reason, remaining).await;
                }
                RetryDecision::Retry(analysis) => {
                    guidance = GenerationGuidance::from_analysis(job.attempt, &analysis);
                    if analysis.improved_migration_plan.as_object().is_some_and(|o| !o.is_empty()) {
                        plan = analysis.improved_migration_plan.clone();
                    }
                    info!(
                        "Retrying job {}: attempt {} of {} (confidence {:.2})",
                        job.id,
                        job.attempt + 1,
                        job.max_attempts,
                        analysis.retry_strategy.confidence
                    );
                    self.events.publish(MigrationEvent::RetryScheduled {
                        job_id: job.id.clone(),
                        next_attempt: job.attempt + 1,
                        errors_remaining: count.total_errors,
                    });
                }
            }
        }
    }

    /// Release gate decision for a stored job.
    pub async fn release_status(&self, job_id: &str) -> CoreResult<GateDecision> {
        Ok(self.load(job_id).await?.release_decision())
    }

    /// Tear down every validator's resources for a job.
    ///
    /// Works for finished and abandoned jobs alike, and tolerates being
    /// called more than once.
    pub async fn cleanup(&self, job_id: &str) -> CoreResult<()> {
        self.load(job_id).await?;
        for validator in &self.validators {
            validator.cleanup(job_id).await?;
        }
        info!("Cleaned up resources of job {}", job_id);
        Ok(())
    }

    pub async fn load(&self, job_id: &str) -> CoreResult<MigrationJob> {
        self.store
            .get(job_id)
            .await?
            .ok_or_else(|| CoreError::JobNotFound(job_id.to_string()))
    }

    async fn enter(&self, job: &mut MigrationJob, state: JobState) -> CoreResult<()> {
        let from = job.transition(state);
        self.store.put(job).await?;
        self.events.publish(MigrationEvent::PhaseChanged {
            job_id: job.id.clone(),
            attempt: job.attempt,
            from,
            to: state,
        });
        Ok(())
    }

    /// Run every validator in order. A validator that fails to run
    /// contributes a CRITICAL infrastructure error instead of its report.
    async fn collect_reports(&self, ctx: &AttemptContext) -> Vec<RawReport> {
        let mut reports = Vec::with_capacity(self.validators.len());
        for validator in &self.validators {
            match validator.validate(ctx).await {
                Ok(report) => reports.push(report),
                Err(e) => {
                    warn!("Validator '{}' failed to run: {}", validator.name(), e);
                    reports.push(infrastructure_failure_report(validator.name(), &e));
                }
            }
        }
        reports
    }

    async fn analyze(&self, job: &MigrationJob, plan: &Value, reports: &[RawReport]) -> Option<ErrorAnalysisResult> {
        let input = PlanningInput {
            migration_plan: plan.clone(),
            reports: reports
                .iter()
                .map(|r| NamedReport::new(&r.name, &r.content))
                .collect(),
            attempt: job.attempt,
            max_attempts: job.max_attempts,
        };

        let analysis = self.planner.plan_retry(&input).await;
        self.events.publish(MigrationEvent::AnalysisCompleted {
            job_id: job.id.clone(),
            attempt: job.attempt,
            should_retry: analysis.as_ref().map(ErrorAnalysisResult::should_retry),
            confidence: analysis.as_ref().map(|a| a.retry_strategy.confidence),
        });
        analysis
    }

    fn publish_validation(&self, job: &MigrationJob, count: &ErrorCount) {
        info!(
            "Job {} attempt {}: {} errors",
            job.id, job.attempt, count.total_errors
        );
        self.events.publish(MigrationEvent::ValidationCompleted {
            job_id: job.id.clone(),
            attempt: job.attempt,
            total_errors: count.total_errors,
            errors_by_validator: count.errors_by_validator.clone(),
        });
    }

    async fn finish_failed(
        &self,
        mut job: MigrationJob,
        reason: String,
        remaining: Vec<ValidationError>,
    ) -> CoreResult<MigrationJob> {
        warn!("Job {} failed: {}", job.id, reason);
        job.fail(&reason, remaining);
        self.store.put(&job).await?;
        self.events.publish(MigrationEvent::JobFailed {
            job_id: job.id.clone(),
            attempts: job.attempt,
            reason,
            errors_remaining: job.remaining_errors(),
        });
        Ok(job)
    }
}
