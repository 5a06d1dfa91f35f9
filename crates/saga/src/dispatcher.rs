//! Saga controller: runs the forward steps and schedules compensation.

use std::sync::Arc;
use std::time::Instant;

use futures_util::future::join_all;
use rollback::{RollbackCommand, RollbackEmitter};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::aggregate::SagaInstance;
use crate::error::{Result, SagaError, StepError};
use crate::events::SagaEvent;
use crate::executor::RemoteStepExecutor;
use crate::step::{Effect, SagaStep, StepContext};

/// A saga that ran every step successfully.
#[derive(Debug, Clone)]
pub struct SagaRun {
    pub instance: SagaInstance,
    pub context: StepContext,
}

/// Runs sagas and emits rollback commands when one fails part way.
///
/// On failure, one command is emitted for each earlier durable step whose
/// compensation applies to its output. A step reported successful is treated
/// as fully applied, so handlers must tolerate undoing something that only
/// half happened. Emission runs on a spawned task: the caller gets the
/// original error without waiting for it. [`flush`](Self::flush) waits for
/// the pending emissions.
pub struct CompensationDispatcher<E: RollbackEmitter + 'static> {
    emitter: Arc<E>,
    executor: RemoteStepExecutor,
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl<E: RollbackEmitter + 'static> CompensationDispatcher<E> {
    /// Creates a dispatcher emitting through `emitter`.
    pub fn new(emitter: E) -> Self {
        Self::with_shared(Arc::new(emitter))
    }

    /// Creates a dispatcher sharing an emitter.
    pub fn with_shared(emitter: Arc<E>) -> Self {
        Self {
            emitter,
            executor: RemoteStepExecutor::new(),
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Returns the emitter.
    pub fn emitter(&self) -> &Arc<E> {
        &self.emitter
    }

    /// Runs `steps` as one saga of `saga_type`.
    ///
    /// Returns [`SagaError::Validation`] when the failing step rejected its
    /// input and nothing needs undoing, [`SagaError::RemoteStep`] otherwise.
    #[tracing::instrument(skip(self, steps), fields(steps = steps.len()))]
    pub async fn run(&self, saga_type: &str, steps: &[SagaStep]) -> Result<SagaRun> {
        metrics::counter!("saga_executions_total", "saga_type" => saga_type.to_string())
            .increment(1);
        let saga_start = Instant::now();

        let mut instance = SagaInstance::start(saga_type);
        let report = self.executor.execute(steps).await;
        for step in &report.completed {
            instance.apply(SagaEvent::step_completed(
                step.name,
                step.effect == Effect::Durable,
            ));
        }

        let Some(failure) = report.failure else {
            instance.apply(SagaEvent::saga_finished());
            metrics::histogram!("saga_duration_seconds", "saga_type" => saga_type.to_string())
                .record(saga_start.elapsed().as_secs_f64());
            tracing::info!(saga_id = ?instance.id(), "saga completed");
            return Ok(SagaRun {
                instance,
                context: report.context,
            });
        };

        instance.apply(SagaEvent::step_failed(
            failure.name,
            failure.index,
            failure.error.to_string(),
        ));
        metrics::counter!(
            "saga_failures_total",
            "saga_type" => saga_type.to_string(),
            "step" => failure.name
        )
        .increment(1);

        let commands: Vec<RollbackCommand> = report
            .completed
            .iter()
            .filter_map(|done| steps[done.index].rollback_for(&done.output))
            .collect();
        let compensations = commands.len();

        if commands.is_empty() {
            instance.apply(SagaEvent::saga_finished());
            tracing::warn!(
                saga_id = ?instance.id(),
                step = failure.name,
                "saga failed before any durable effect"
            );
        } else {
            instance.apply(SagaEvent::compensation_scheduled(
                failure.name,
                commands.iter().map(|c| c.rollback_type.clone()).collect(),
            ));
            tracing::warn!(
                saga_id = ?instance.id(),
                step = failure.name,
                compensations,
                "saga failed, compensation scheduled"
            );
            self.schedule(instance, commands).await;
        }

        metrics::histogram!("saga_duration_seconds", "saga_type" => saga_type.to_string())
            .record(saga_start.elapsed().as_secs_f64());

        Err(match failure.error {
            StepError::Validation(reason) if compensations == 0 => SagaError::Validation(reason),
            error => SagaError::RemoteStep {
                step: failure.name.to_string(),
                index: failure.index,
                reason: error.to_string(),
                compensations,
            },
        })
    }

    async fn schedule(&self, mut instance: SagaInstance, commands: Vec<RollbackCommand>) {
        let emitter = Arc::clone(&self.emitter);
        let handle = tokio::spawn(async move {
            let results = emitter.emit_all(commands.clone()).await;
            for (command, result) in commands.iter().zip(results) {
                if let Err(error) = result {
                    // The bus is the only durable record of the command, so log it whole.
                    tracing::error!(
                        rollback_type = %command.rollback_type,
                        params = ?command.params,
                        %error,
                        "failed to emit rollback command"
                    );
                    metrics::counter!(
                        "rollback_emit_failures_total",
                        "type" => command.rollback_type.clone()
                    )
                    .increment(1);
                }
            }
            instance.apply(SagaEvent::saga_finished());
            tracing::info!(
                saga_id = ?instance.id(),
                saga_type = instance.saga_type(),
                state = %instance.state(),
                "saga compensation emitted"
            );
        });

        let mut pending = self.pending.lock().await;
        pending.retain(|h| !h.is_finished());
        pending.push(handle);
    }

    /// Waits until every scheduled emission has finished.
    pub async fn flush(&self) {
        let handles = std::mem::take(&mut *self.pending.lock().await);
        for result in join_all(handles).await {
            if let Err(error) = result {
                tracing::error!(%error, "compensation task failed");
            }
        }
    }

    /// Returns the number of emissions that may still be running.
    pub async fn pending(&self) -> usize {
        let mut pending = self.pending.lock().await;
        pending.retain(|h| !h.is_finished());
        pending.len()
    }
}
