//! Rollback error types.

use bus::BusError;
use thiserror::Error;

/// A compensation handler failed to undo its effect.
///
/// Never surfaced to the caller of the original operation; the consumer
/// retries the command with a fixed delay.
#[derive(Debug, Error)]
pub enum CompensationError {
    /// The command's params do not match the handler's schema.
    #[error("Invalid params for rollback '{rollback_type}': {source}")]
    InvalidParams {
        rollback_type: String,
        #[source]
        source: serde_json::Error,
    },

    /// The sibling service rejected or failed the undo call.
    #[error("Remote call failed during rollback '{rollback_type}': {reason}")]
    Remote {
        rollback_type: String,
        reason: String,
    },
}

/// Errors from building the registry or emitting commands.
#[derive(Debug, Error)]
pub enum RollbackError {
    /// Two handlers claimed the same rollback type.
    #[error("Handler for rollback type '{0}' is already registered")]
    DuplicateHandler(String),

    /// Command params could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The bus refused the command.
    #[error("Bus error: {0}")]
    Bus(#[from] BusError),
}

/// Result type for rollback operations.
pub type Result<T> = std::result::Result<T, RollbackError>;
