//! Message envelope and delivery handle.

use chrono::{DateTime, Utc};
use common::MessageId;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A message as stored on the bus.
///
/// The payload is opaque JSON; the bus never inspects it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    /// Queue the message was published to.
    pub destination: String,
    pub payload: serde_json::Value,
    /// Delivery attempt, starting at 1 and increased on every requeue.
    pub attempt: u32,
    pub published_at: DateTime<Utc>,
}

impl Message {
    /// Creates a first-attempt message for `destination`.
    pub fn new(destination: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: MessageId::new(),
            destination: destination.into(),
            payload,
            attempt: 1,
            published_at: Utc::now(),
        }
    }

    /// Deserializes the payload.
    pub fn decode<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        T::deserialize(&self.payload)
    }
}

/// A message handed to a consumer and not yet settled.
///
/// Exactly one of `ack`, `requeue` or `dead_letter` must be called with it;
/// until then the bus keeps the message in flight.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub queue: String,
    pub tag: u64,
    pub message: Message,
}

impl Delivery {
    /// Returns the delivery attempt of the carried message.
    pub fn attempt(&self) -> u32 {
        self.message.attempt
    }
}
