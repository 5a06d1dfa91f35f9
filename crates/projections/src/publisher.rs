//! Publishing projection events.

use bus::{MessageBus, publish_json};
use common::MessageId;

use crate::Result;
use crate::event::ProjectionEvent;

/// Publishes projection events to the queue of their operation.
#[derive(Debug, Clone)]
pub struct ProjectionPublisher<B: MessageBus> {
    bus: B,
}

impl<B: MessageBus> ProjectionPublisher<B> {
    /// Creates a publisher over `bus`.
    pub fn new(bus: B) -> Self {
        Self { bus }
    }

    /// Publishes `event` after a committed mutation.
    ///
    /// Callers log a failure here and carry on: the primary write already
    /// happened and the index converges on the next mutation of the entity.
    #[tracing::instrument(skip(self, event), fields(entity_id = %event.entity_id, operation = %event.operation))]
    pub async fn emit_projection(&self, event: &ProjectionEvent) -> Result<MessageId> {
        let id = publish_json(&self.bus, event.operation.queue(), event).await?;
        metrics::counter!(
            "projection_events_published_total",
            "operation" => event.operation.as_str()
        )
        .increment(1);
        Ok(id)
    }
}
