//! Bus error types.

use thiserror::Error;

/// Errors that can occur when publishing or consuming messages.
#[derive(Debug, Error)]
pub enum BusError {
    /// The delivery was already acked, requeued or dead-lettered.
    #[error("Unknown delivery tag {tag} on queue '{queue}'")]
    UnknownDelivery { queue: String, tag: u64 },

    /// A payload could not be serialized or deserialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The broker connection is unavailable.
    #[error("Bus unavailable: {0}")]
    Unavailable(String),
}

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;
