//! Strictly sequential execution of saga steps.

use crate::error::StepError;
use crate::step::{Effect, SagaStep, StepContext, StepOutput};

/// A step that ran to success.
#[derive(Debug, Clone)]
pub struct CompletedStep {
    pub index: usize,
    pub name: &'static str,
    pub effect: Effect,
    pub output: StepOutput,
}

/// The step that stopped execution.
#[derive(Debug, Clone)]
pub struct StepFailure {
    pub index: usize,
    pub name: &'static str,
    pub error: StepError,
}

/// How far an execution got.
#[derive(Debug, Clone, Default)]
pub struct ExecutionReport {
    /// Successful steps, in execution order.
    pub completed: Vec<CompletedStep>,
    /// Set when a step failed; no later step ran.
    pub failure: Option<StepFailure>,
    /// Outputs of the completed steps, by name.
    pub context: StepContext,
}

impl ExecutionReport {
    /// Returns true if every step succeeded.
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    /// Index of the last successful step, if any step succeeded.
    pub fn last_successful(&self) -> Option<usize> {
        self.completed.last().map(|step| step.index)
    }
}

/// Runs steps one after another, stopping at the first failure.
///
/// The executor never retries a step and never undoes anything; deciding what
/// to compensate is left to the caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoteStepExecutor;

impl RemoteStepExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Executes `steps` in order.
    pub async fn execute(&self, steps: &[SagaStep]) -> ExecutionReport {
        let mut report = ExecutionReport::default();

        for (index, step) in steps.iter().enumerate() {
            tracing::info!(step = step.name(), index, "saga step started");

            match step.run(report.context.clone()).await {
                Ok(output) => {
                    tracing::debug!(step = step.name(), index, "saga step completed");
                    report.context.record(step.name(), output.clone());
                    report.completed.push(CompletedStep {
                        index,
                        name: step.name(),
                        effect: step.effect(),
                        output,
                    });
                }
                Err(error) => {
                    tracing::warn!(step = step.name(), index, %error, "saga step failed");
                    report.failure = Some(StepFailure {
                        index,
                        name: step.name(),
                        error,
                    });
                    break;
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::ResourceId;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn ok_step(name: &'static str, calls: Arc<AtomicU32>) -> SagaStep {
        SagaStep::durable(name, move |_| {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(StepOutput::None)
            }
        })
    }

    #[tokio::test]
    async fn test_all_steps_succeed() {
        let calls = Arc::new(AtomicU32::new(0));
        let steps = vec![
            ok_step("a", calls.clone()),
            ok_step("b", calls.clone()),
            ok_step("c", calls.clone()),
        ];

        let report = RemoteStepExecutor::new().execute(&steps).await;

        assert!(report.is_success());
        assert_eq!(report.last_successful(), Some(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_stops_at_first_failure() {
        let calls = Arc::new(AtomicU32::new(0));
        let steps = vec![
            ok_step("a", calls.clone()),
            SagaStep::durable("b", |_| async { Err(StepError::Remote("boom".into())) }),
            ok_step("c", calls.clone()),
        ];

        let report = RemoteStepExecutor::new().execute(&steps).await;

        let failure = report.failure.as_ref().unwrap();
        assert_eq!(failure.index, 1);
        assert_eq!(failure.name, "b");
        assert_eq!(report.last_successful(), Some(0));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_first_step_failure_has_no_successful_step() {
        let steps = vec![SagaStep::precondition("validate", |_| async {
            Err(StepError::Validation("title is blank".into()))
        })];

        let report = RemoteStepExecutor::new().execute(&steps).await;
        assert_eq!(report.last_successful(), None);
        assert!(report.completed.is_empty());
    }

    #[tokio::test]
    async fn test_outputs_flow_to_later_steps() {
        let steps = vec![
            SagaStep::durable("upload", |_| async {
                Ok(StepOutput::Resources(vec![ResourceId::new(101), ResourceId::new(102)]))
            }),
            SagaStep::precondition("count", |ctx: StepContext| async move {
                Ok(StepOutput::Value(serde_json::json!(ctx.resources("upload").len())))
            }),
        ];

        let report = RemoteStepExecutor::new().execute(&steps).await;
        assert_eq!(
            report.context.get("count").and_then(StepOutput::value),
            Some(&serde_json::json!(2))
        );
    }
}
