//! Sagas spanning the card store and its sibling services.
//!
//! A saga is an ordered list of [`SagaStep`]s. The [`RemoteStepExecutor`] runs
//! them strictly in sequence and stops at the first failure without undoing
//! anything. The [`CompensationDispatcher`] then emits one rollback command
//! per earlier durable step and returns the original error right away; the
//! commands are applied later by the rollback consumer through the
//! [`handlers`] registered here.
//!
//! The card and user operations built on top live in [`workflows`].

pub mod aggregate;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod executor;
pub mod handlers;
pub mod services;
pub mod state;
pub mod step;
pub mod workflows;

pub use aggregate::SagaInstance;
pub use dispatcher::{CompensationDispatcher, SagaRun};
pub use error::{Result, SagaError, ServiceError, StepError};
pub use events::SagaEvent;
pub use executor::{CompletedStep, ExecutionReport, RemoteStepExecutor, StepFailure};
pub use services::{InMemoryServices, Services};
pub use state::SagaState;
pub use step::{Effect, SagaStep, StepContext, StepOutput};
pub use workflows::{CardPatch, MAX_CARD_IMAGES, NewCard, Workflows};
