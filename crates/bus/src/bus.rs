//! Message bus trait.

use std::time::Duration;

use async_trait::async_trait;
use common::MessageId;
use serde::Serialize;

use crate::Result;
use crate::message::Delivery;

/// Boundary to the broker.
///
/// Delivery is at-least-once: a received message stays owned by the bus until
/// it is acked, requeued or dead-lettered. Nothing is ordered.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publishes a payload to `destination`.
    async fn publish(&self, destination: &str, payload: serde_json::Value) -> Result<MessageId>;

    /// Waits for the next message on `queue`.
    async fn receive(&self, queue: &str) -> Result<Delivery>;

    /// Takes the next ready message on `queue` without waiting.
    async fn try_receive(&self, queue: &str) -> Result<Option<Delivery>>;

    /// Settles a delivery as processed.
    async fn ack(&self, delivery: Delivery) -> Result<()>;

    /// Puts a delivery back on its queue after `delay`, bumping its attempt.
    async fn requeue(&self, delivery: Delivery, delay: Duration) -> Result<()>;

    /// Moves a delivery to the queue's dead-letter queue.
    async fn dead_letter(&self, delivery: Delivery, reason: &str) -> Result<()>;
}

/// Name of the dead-letter queue paired with `queue`.
pub fn dead_letter_queue(queue: &str) -> String {
    format!("{queue}.dlq")
}

/// Serializes `value` and publishes it to `destination`.
pub async fn publish_json<B, T>(bus: &B, destination: &str, value: &T) -> Result<MessageId>
where
    B: MessageBus + ?Sized,
    T: Serialize + ?Sized,
{
    let payload = serde_json::to_value(value)?;
    bus.publish(destination, payload).await
}
