//! Saga error types.

use cache::CacheError;
use common::EntityId;
use thiserror::Error;

use crate::state::SagaState;

/// Failure reported by a sibling service or the local store.
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    /// The service could not be reached or failed the call.
    #[error("{service} unavailable: {reason}")]
    Unavailable {
        service: &'static str,
        reason: String,
    },

    /// The service refused the call.
    #[error("{service} rejected the request: {reason}")]
    Rejected {
        service: &'static str,
        reason: String,
    },
}

impl ServiceError {
    pub(crate) fn unavailable(service: &'static str, reason: impl Into<String>) -> Self {
        ServiceError::Unavailable {
            service,
            reason: reason.into(),
        }
    }
}

/// Why a single saga step failed.
#[derive(Debug, Clone, Error)]
pub enum StepError {
    /// Input rejected before any side effect.
    #[error("{0}")]
    Validation(String),

    /// A remote call failed or returned non-success.
    #[error("{0}")]
    Remote(String),
}

impl From<ServiceError> for StepError {
    fn from(error: ServiceError) -> Self {
        StepError::Remote(error.to_string())
    }
}

impl From<serde_json::Error> for StepError {
    fn from(error: serde_json::Error) -> Self {
        StepError::Remote(format!("serialization: {error}"))
    }
}

/// Errors surfaced to the caller of a saga-backed operation.
#[derive(Debug, Error)]
pub enum SagaError {
    /// Bad input. Nothing durable happened, nothing is compensated.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A remote step failed.
    ///
    /// `compensations` rollback commands were scheduled for the steps that
    /// had already succeeded; they run after this error is returned.
    #[error("Saga step '{step}' (#{index}) failed: {reason}")]
    RemoteStep {
        step: String,
        index: usize,
        reason: String,
        compensations: usize,
    },

    /// The aggregate the operation targets does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: EntityId },

    /// A service call outside any saga failed.
    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    /// Cache error.
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SagaError {
    /// Name of the failed step, for remote step failures.
    pub fn failed_step(&self) -> Option<&str> {
        match self {
            SagaError::RemoteStep { step, .. } => Some(step.as_str()),
            _ => None,
        }
    }

    /// State the saga was left in when this error was surfaced.
    pub fn saga_state(&self) -> SagaState {
        match self {
            SagaError::RemoteStep { compensations, .. } if *compensations > 0 => {
                SagaState::CompensatingAsync
            }
            _ => SagaState::Failed,
        }
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
