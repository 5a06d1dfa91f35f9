//! Projection error types.

use common::EntityId;
use thiserror::Error;

/// Errors that can occur while publishing or applying projection events.
#[derive(Debug, Error)]
pub enum ProjectionError {
    /// The search index rejected or failed the write.
    #[error("Search index sync failed for {entity_id}: {reason}")]
    Sync { entity_id: EntityId, reason: String },

    /// Failed to serialize or deserialize an event.
    #[error("Event serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The bus refused the event.
    #[error("Bus error: {0}")]
    Bus(#[from] bus::BusError),
}

/// Result type for projection operations.
pub type Result<T> = std::result::Result<T, ProjectionError>;
