//! Typed job events and the sinks they are published to.
//!
//! Publishing never fails and never blocks; a job behaves the same with
//! no sink attached.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::job::JobState;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum MigrationEvent {
    JobStarted {
        job_id: String,
        name: String,
        max_attempts: u32,
    },
    PhaseChanged {
        job_id: String,
        attempt: u32,
        from: JobState,
        to: JobState,
    },
    ValidationCompleted {
        job_id: String,
        attempt: u32,
        total_errors: usize,
        errors_by_validator: BTreeMap<String, usize>,
    },
    AnalysisCompleted {
        job_id: String,
        attempt: u32,
        /// `None` when the planner could not produce a usable analysis
        should_retry: Option<bool>,
        confidence: Option<f64>,
    },
    RetryScheduled {
        job_id: String,
        next_attempt: u32,
        errors_remaining: usize,
    },
    JobSucceeded {
        job_id: String,
        attempts: u32,
    },
    JobFailed {
        job_id: String,
        attempts: u32,
        reason: String,
        errors_remaining: usize,
    },
}

impl MigrationEvent {
    pub fn job_id(&self) -> &str {
        match self {
            Self::JobStarted { job_id, .. }
            | Self::PhaseChanged { job_id, .. }
            | Self::ValidationCompleted { job_id, .. }
            | Self::AnalysisCompleted { job_id, .. }
            | Self::RetryScheduled { job_id, .. }
            | Self::JobSucceeded { job_id, .. }
            | Self::JobFailed { job_id, .. } => job_id,
        }
    }
}

/// Receives job events.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: &MigrationEvent);
}

/// Fans events out over a tokio broadcast channel.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<MigrationEvent>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MigrationEvent> {
        self.tx.subscribe()
    }
}

impl EventSink for BroadcastSink {
    fn publish(&self, event: &MigrationEvent) {
        // No receivers is fine
        let _ = self.tx.send(event.clone());
    }
}

/// Logs every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn publish(&self, event: &MigrationEvent) {
        match serde_json::to_string(event) {
            Ok(json) => info!(target: "carve::events", job_id = event.job_id(), "{}", json),
            Err(e) => warn!("Failed to serialize event: {}", e),
        }
    }
}

/// The set of sinks a job publishes to.
#[derive(Clone, Default)]
pub struct EventBus {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, sink: Arc<dyn EventSink>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub fn publish(&self, event: MigrationEvent) {
        for sink in &self.sinks {
            sink.publish(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started() -> MigrationEvent {
        MigrationEvent::JobStarted {
            job_id: "job-1".into(),
            name: "banking".into(),
            max_attempts: 3,
        }
    }

    #[tokio::test]
    async fn test_broadcast_delivers_to_subscribers() {
        let sink = BroadcastSink::new(16);
        let mut rx = sink.subscribe();

        sink.publish(&started());
        assert_eq!(rx.recv().await.unwrap(), started());
    }

    #[test]
    fn test_broadcast_without_receivers_does_not_panic() {
        let sink = BroadcastSink::new(16);
        sink.publish(&started());
    }

    #[test]
    fn test_event_wire_format() {
        let event = MigrationEvent::PhaseChanged {
            job_id: "job-1".into(),
            attempt: 2,
            from: JobState::Generating,
            to: JobState::Validating,
        };
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "PhaseChanged");
        assert_eq!(json["data"]["to"], "validating");
        assert_eq!(event.job_id(), "job-1");
    }

    #[test]
    fn test_empty_bus() {
        let bus = EventBus::new();
        assert!(bus.is_empty());
        bus.publish(started());
    }
}
