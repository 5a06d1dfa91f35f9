//! Saga journal events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Events recorded while a saga runs, in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum SagaEvent {
    /// Saga execution started.
    SagaStarted(SagaStartedData),

    /// A forward step completed successfully.
    StepCompleted(StepCompletedData),

    /// A forward step failed; no later step ran.
    StepFailed(StepFailedData),

    /// Rollback commands were scheduled for emission.
    CompensationScheduled(CompensationData),

    /// All forward steps succeeded, or the failure was handled.
    SagaFinished(SagaFinishedData),
}

impl SagaEvent {
    /// Returns the event name.
    pub fn event_type(&self) -> &'static str {
        match self {
            SagaEvent::SagaStarted(_) => "SagaStarted",
            SagaEvent::StepCompleted(_) => "StepCompleted",
            SagaEvent::StepFailed(_) => "StepFailed",
            SagaEvent::CompensationScheduled(_) => "CompensationScheduled",
            SagaEvent::SagaFinished(_) => "SagaFinished",
        }
    }
}

/// Data for SagaStarted event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaStartedData {
    pub saga_id: Uuid,
    /// The kind of saga, e.g. `create_card`.
    pub saga_type: String,
    pub started_at: DateTime<Utc>,
}

/// Data for StepCompleted event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepCompletedData {
    pub step_name: String,
    /// Whether the step left state behind in another service.
    pub durable: bool,
}

/// Data for StepFailed event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepFailedData {
    pub step_name: String,
    pub index: usize,
    pub error: String,
}

/// Data for CompensationScheduled event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompensationData {
    /// The step whose failure triggered compensation.
    pub from_step: String,
    /// Rollback types of the scheduled commands.
    pub rollback_types: Vec<String>,
}

/// Data for SagaFinished event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaFinishedData {
    pub finished_at: DateTime<Utc>,
}

// Convenience constructors
impl SagaEvent {
    /// Creates a SagaStarted event with a fresh saga id.
    pub fn saga_started(saga_type: impl Into<String>) -> Self {
        SagaEvent::SagaStarted(SagaStartedData {
            saga_id: Uuid::new_v4(),
            saga_type: saga_type.into(),
            started_at: Utc::now(),
        })
    }

    /// Creates a StepCompleted event.
    pub fn step_completed(step_name: impl Into<String>, durable: bool) -> Self {
        SagaEvent::StepCompleted(StepCompletedData {
            step_name: step_name.into(),
            durable,
        })
    }

    /// Creates a StepFailed event.
    pub fn step_failed(step_name: impl Into<String>, index: usize, error: impl Into<String>) -> Self {
        SagaEvent::StepFailed(StepFailedData {
            step_name: step_name.into(),
            index,
            error: error.into(),
        })
    }

    /// Creates a CompensationScheduled event.
    pub fn compensation_scheduled(from_step: impl Into<String>, rollback_types: Vec<String>) -> Self {
        SagaEvent::CompensationScheduled(CompensationData {
            from_step: from_step.into(),
            rollback_types,
        })
    }

    /// Creates a SagaFinished event.
    pub fn saga_finished() -> Self {
        SagaEvent::SagaFinished(SagaFinishedData {
            finished_at: Utc::now(),
        })
    }
}
