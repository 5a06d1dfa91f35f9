//! Bus consumer applying projection events.

use async_trait::async_trait;
use bus::{Disposition, HandlerError, Message, MessageHandler};

use crate::event::{Operation, ProjectionEvent};
use crate::processor::ProjectionProcessor;

/// Applies events from one operation's queue through a processor.
///
/// An event that cannot be decoded, or whose payload does not fit its
/// operation, is dead-lettered: redelivery would not fix it and the event
/// must not be lost. Any other failure is returned so the bus retries it.
#[derive(Clone)]
pub struct ProjectionConsumer {
    operation: Operation,
    processor: ProjectionProcessor,
}

impl ProjectionConsumer {
    /// Creates a consumer for `operation`'s queue.
    pub fn new(operation: Operation, processor: ProjectionProcessor) -> Self {
        Self {
            operation,
            processor,
        }
    }

    /// Creates one consumer per operation, sharing the processor.
    pub fn for_all(processor: &ProjectionProcessor) -> Vec<Self> {
        Operation::ALL
            .iter()
            .map(|op| Self::new(*op, processor.clone()))
            .collect()
    }

    /// Returns the consumed operation.
    pub fn operation(&self) -> Operation {
        self.operation
    }
}

#[async_trait]
impl MessageHandler for ProjectionConsumer {
    fn queue(&self) -> &str {
        self.operation.queue()
    }

    #[tracing::instrument(skip(self, message), fields(queue = self.operation.queue(), message_id = %message.id))]
    async fn handle(&self, message: &Message) -> Result<Disposition, HandlerError> {
        let event: ProjectionEvent = match message.decode() {
            Ok(event) => event,
            Err(error) => {
                tracing::error!(%error, "undecodable projection event");
                return Ok(Disposition::DeadLetter(format!("undecodable: {error}")));
            }
        };

        if let Err(reason) = event.validate() {
            tracing::error!(%reason, "invalid projection event");
            return Ok(Disposition::DeadLetter(reason));
        }

        if event.operation != self.operation {
            tracing::warn!(
                expected = %self.operation,
                actual = %event.operation,
                "projection event on another operation's queue"
            );
        }

        self.processor.process_event(&event).await?;
        Ok(Disposition::Ack)
    }
}
