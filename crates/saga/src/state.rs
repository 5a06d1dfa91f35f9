//! Saga state machine.

use serde::{Deserialize, Serialize};

/// The state of a saga in its lifecycle.
///
/// State transitions:
/// ```text
/// Running ──┬──────────────────────────► Done
///           ├──► Failed ───────────────► Done
///           └──► CompensatingAsync ────► Done
/// ```
///
/// `Failed` means nothing durable happened and nothing is compensated.
/// `CompensatingAsync` means rollback commands were scheduled; the caller
/// already has its error while they are emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SagaState {
    /// Forward steps are being executed.
    #[default]
    Running,

    /// A step failed before any durable effect.
    Failed,

    /// A step failed after durable effects; compensation is in flight.
    CompensatingAsync,

    /// Finished (terminal state).
    Done,
}

impl SagaState {
    /// Returns true if a step failure can still be recorded.
    pub fn can_fail(&self) -> bool {
        matches!(self, SagaState::Running)
    }

    /// Returns true if the saga can move to `Done` from here.
    pub fn can_finish(&self) -> bool {
        !self.is_terminal()
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SagaState::Done)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaState::Running => "Running",
            SagaState::Failed => "Failed",
            SagaState::CompensatingAsync => "CompensatingAsync",
            SagaState::Done => "Done",
        }
    }
}

impl std::fmt::Display for SagaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
