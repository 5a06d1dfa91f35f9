//! Compensation handler trait.

use async_trait::async_trait;

use crate::CompensationError;
use crate::command::RollbackParams;

/// Undoes one kind of durable effect.
///
/// Commands are delivered at least once and sagas over-compensate when a
/// remote outcome was ambiguous, so `compensate` must be idempotent: calling
/// it again after success, or when there is nothing left to undo, succeeds
/// without changing anything. Write it as delete-if-exists or
/// move-if-present, never as an operation that assumes an exact pre-state.
#[async_trait]
pub trait CompensationHandler: Send + Sync {
    /// The command type this handler resolves.
    fn rollback_type(&self) -> &'static str;

    /// Undoes the effect described by `params`.
    async fn compensate(&self, params: &RollbackParams) -> Result<(), CompensationError>;
}
