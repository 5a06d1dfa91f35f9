//! Saga steps: a forward action paired with its compensation.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use common::ResourceId;
use futures_util::future::{BoxFuture, FutureExt};
use rollback::RollbackCommand;

use crate::error::StepError;

/// Whether a step leaves state behind in another service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// A check or read; nothing to undo.
    Precondition,
    /// Changes state somewhere else; may need undoing.
    Durable,
}

/// What a successful step returned.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum StepOutput {
    #[default]
    None,
    /// Ids of resources created or touched in another service.
    Resources(Vec<ResourceId>),
    /// Any other record, e.g. deleted rows kept for restoration.
    Value(serde_json::Value),
}

impl StepOutput {
    /// Returns the resource ids, or an empty slice.
    pub fn resources(&self) -> &[ResourceId] {
        match self {
            StepOutput::Resources(ids) => ids,
            _ => &[],
        }
    }

    /// Returns the JSON value, if any.
    pub fn value(&self) -> Option<&serde_json::Value> {
        match self {
            StepOutput::Value(value) => Some(value),
            _ => None,
        }
    }
}

/// Outputs of the steps that already succeeded, by step name.
#[derive(Debug, Clone, Default)]
pub struct StepContext {
    outputs: HashMap<&'static str, StepOutput>,
}

impl StepContext {
    /// Returns the output of `step`, if it ran.
    pub fn get(&self, step: &str) -> Option<&StepOutput> {
        self.outputs.get(step)
    }

    /// Returns the resource ids produced by `step`, or an empty slice.
    pub fn resources(&self, step: &str) -> &[ResourceId] {
        self.get(step).map(StepOutput::resources).unwrap_or(&[])
    }

    pub(crate) fn record(&mut self, step: &'static str, output: StepOutput) {
        self.outputs.insert(step, output);
    }
}

type Action =
    Arc<dyn Fn(StepContext) -> BoxFuture<'static, Result<StepOutput, StepError>> + Send + Sync>;
type Compensation = Arc<dyn Fn(&StepOutput) -> Option<RollbackCommand> + Send + Sync>;

/// One forward action of a saga and how to undo it.
///
/// The compensation maps the step's output to the rollback command that undoes
/// it, or `None` when the output shows there is nothing to undo (e.g. no
/// images were moved).
#[derive(Clone)]
pub struct SagaStep {
    name: &'static str,
    effect: Effect,
    action: Action,
    compensation: Option<Compensation>,
}

impl SagaStep {
    /// Creates a step with no durable effect.
    pub fn precondition<F, Fut>(name: &'static str, action: F) -> Self
    where
        F: Fn(StepContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<StepOutput, StepError>> + Send + 'static,
    {
        Self::new(name, Effect::Precondition, action)
    }

    /// Creates a step whose effect persists in another service.
    pub fn durable<F, Fut>(name: &'static str, action: F) -> Self
    where
        F: Fn(StepContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<StepOutput, StepError>> + Send + 'static,
    {
        Self::new(name, Effect::Durable, action)
    }

    fn new<F, Fut>(name: &'static str, effect: Effect, action: F) -> Self
    where
        F: Fn(StepContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<StepOutput, StepError>> + Send + 'static,
    {
        Self {
            name,
            effect,
            action: Arc::new(move |ctx| action(ctx).boxed()),
            compensation: None,
        }
    }

    /// Attaches the compensation of a durable step.
    pub fn compensate_with<F>(mut self, compensation: F) -> Self
    where
        F: Fn(&StepOutput) -> Option<RollbackCommand> + Send + Sync + 'static,
    {
        self.compensation = Some(Arc::new(compensation));
        self
    }

    /// Returns the step name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the step's effect.
    pub fn effect(&self) -> Effect {
        self.effect
    }

    /// Returns true if a compensation is attached.
    pub fn has_compensation(&self) -> bool {
        self.compensation.is_some()
    }

    pub(crate) async fn run(&self, ctx: StepContext) -> Result<StepOutput, StepError> {
        (self.action)(ctx).await
    }

    /// Builds the rollback command for a successful run of this step.
    ///
    /// Precondition steps never compensate.
    pub fn rollback_for(&self, output: &StepOutput) -> Option<RollbackCommand> {
        if self.effect != Effect::Durable {
            return None;
        }
        self.compensation.as_ref().and_then(|c| c(output))
    }
}

impl fmt::Debug for SagaStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SagaStep")
            .field("name", &self.name)
            .field("effect", &self.effect)
            .field("compensation", &self.compensation.is_some())
            .finish()
    }
}
