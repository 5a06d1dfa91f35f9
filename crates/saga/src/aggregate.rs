//! Saga instance built from its journal.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::events::SagaEvent;
use crate::state::SagaState;

/// The state of one saga execution, folded from its [`SagaEvent`]s.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SagaInstance {
    id: Option<Uuid>,
    saga_type: String,
    state: SagaState,
    completed_steps: Vec<String>,
    durable_steps: usize,
    failed_step: Option<String>,
    failure_reason: Option<String>,
    scheduled_rollbacks: Vec<String>,
    journal: Vec<SagaEvent>,
}

impl SagaInstance {
    /// Starts a new instance of `saga_type`.
    pub fn start(saga_type: &str) -> Self {
        let mut instance = Self::default();
        instance.apply(SagaEvent::saga_started(saga_type));
        instance
    }

    /// Applies an event and appends it to the journal.
    pub fn apply(&mut self, event: SagaEvent) {
        match &event {
            SagaEvent::SagaStarted(data) => {
                self.id = Some(data.saga_id);
                self.saga_type = data.saga_type.clone();
                self.state = SagaState::Running;
            }
            SagaEvent::StepCompleted(data) => {
                self.completed_steps.push(data.step_name.clone());
                if data.durable {
                    self.durable_steps += 1;
                }
            }
            SagaEvent::StepFailed(data) => {
                if self.state.can_fail() {
                    self.state = SagaState::Failed;
                }
                self.failed_step = Some(data.step_name.clone());
                self.failure_reason = Some(data.error.clone());
            }
            SagaEvent::CompensationScheduled(data) => {
                self.state = SagaState::CompensatingAsync;
                self.scheduled_rollbacks
                    .extend(data.rollback_types.iter().cloned());
            }
            SagaEvent::SagaFinished(_) => {
                if self.state.can_finish() {
                    self.state = SagaState::Done;
                }
            }
        }
        self.journal.push(event);
    }
}

// Query methods
impl SagaInstance {
    /// Returns the saga instance ID.
    pub fn id(&self) -> Option<Uuid> {
        self.id
    }

    /// Returns the saga state.
    pub fn state(&self) -> SagaState {
        self.state
    }

    /// Returns the saga type.
    pub fn saga_type(&self) -> &str {
        &self.saga_type
    }

    /// Returns the list of completed step names.
    pub fn completed_steps(&self) -> &[String] {
        &self.completed_steps
    }

    /// Returns how many completed steps left durable state behind.
    pub fn durable_steps(&self) -> usize {
        self.durable_steps
    }

    /// Returns the failed step, if any.
    pub fn failed_step(&self) -> Option<&str> {
        self.failed_step.as_deref()
    }

    /// Returns the failure reason, if any.
    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    /// Returns the rollback types scheduled for emission.
    pub fn scheduled_rollbacks(&self) -> &[String] {
        &self.scheduled_rollbacks
    }

    /// Returns every applied event, in order.
    pub fn journal(&self) -> &[SagaEvent] {
        &self.journal
    }
}
