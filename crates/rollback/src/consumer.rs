//! Bus consumer that resolves rollback commands.

use std::sync::Arc;

use async_trait::async_trait;
use bus::{Disposition, HandlerError, Message, MessageHandler};

use crate::CompensationError;
use crate::command::RollbackCommand;
use crate::registry::{DispatchOutcome, HandlerRegistry};

/// Queue carrying rollback commands.
pub const ROLLBACK_QUEUE: &str = "rollback";

/// Resolves each received command through the registry.
///
/// - unknown type, undecodable payload or params the handler rejects: warned
///   once and dropped, since redelivery cannot make it resolvable
/// - handler failure: returned as an error so the consumer requeues it
/// - handler success: acked
#[derive(Clone)]
pub struct RollbackConsumer {
    registry: Arc<HandlerRegistry>,
    queue: String,
}

impl RollbackConsumer {
    /// Creates a consumer on [`ROLLBACK_QUEUE`].
    pub fn new(registry: Arc<HandlerRegistry>) -> Self {
        Self::on_queue(registry, ROLLBACK_QUEUE)
    }

    /// Creates a consumer on a custom queue.
    pub fn on_queue(registry: Arc<HandlerRegistry>, queue: impl Into<String>) -> Self {
        Self {
            registry,
            queue: queue.into(),
        }
    }

    /// Returns the shared registry.
    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }
}

#[async_trait]
impl MessageHandler for RollbackConsumer {
    fn queue(&self) -> &str {
        &self.queue
    }

    #[tracing::instrument(skip(self, message), fields(message_id = %message.id, attempt = message.attempt))]
    async fn handle(&self, message: &Message) -> Result<Disposition, HandlerError> {
        let command: RollbackCommand = match message.decode() {
            Ok(command) => command,
            Err(error) => {
                tracing::warn!(%error, "undecodable rollback command dropped");
                metrics::counter!("rollback_unresolved_total", "reason" => "undecodable")
                    .increment(1);
                return Ok(Disposition::Drop);
            }
        };

        let rollback_type = command.rollback_type.clone();
        match self.registry.dispatch(&command).await {
            Ok(DispatchOutcome::Compensated) => {
                tracing::info!(%rollback_type, "rollback compensated");
                metrics::counter!("rollback_compensated_total", "type" => rollback_type)
                    .increment(1);
                Ok(Disposition::Ack)
            }
            Ok(DispatchOutcome::Unresolved) => {
                tracing::warn!(%rollback_type, "no handler for rollback type, command dropped");
                metrics::counter!("rollback_unresolved_total", "reason" => "unknown_type")
                    .increment(1);
                Ok(Disposition::Drop)
            }
            Err(error @ CompensationError::InvalidParams { .. }) => {
                tracing::warn!(%rollback_type, %error, "rollback command with invalid params dropped");
                metrics::counter!("rollback_unresolved_total", "reason" => "invalid_params")
                    .increment(1);
                Ok(Disposition::Drop)
            }
            Err(error) => {
                metrics::counter!("rollback_handler_failures_total", "type" => rollback_type)
                    .increment(1);
                Err(error.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{RollbackParams, decode_params};
    use crate::handler::CompensationHandler;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct ToggleHandler {
        fail: AtomicBool,
    }

    /// Requires an `imageId` param.
    struct StrictHandler;

    #[derive(serde::Deserialize)]
    #[serde(rename_all = "camelCase")]
    #[allow(dead_code)]
    struct StrictParams {
        image_id: i64,
    }

    #[async_trait]
    impl CompensationHandler for StrictHandler {
        fn rollback_type(&self) -> &'static str {
            "DeleteSavedImages"
        }

        async fn compensate(&self, params: &RollbackParams) -> Result<(), CompensationError> {
            decode_params::<StrictParams>("DeleteSavedImages", params).map(|_| ())
        }
    }

    #[async_trait]
    impl CompensationHandler for ToggleHandler {
        fn rollback_type(&self) -> &'static str {
            "RestoreProfileImage"
        }

        async fn compensate(&self, _params: &RollbackParams) -> Result<(), CompensationError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(CompensationError::Remote {
                    rollback_type: "RestoreProfileImage".into(),
                    reason: "image service unavailable".into(),
                });
            }
            Ok(())
        }
    }

    fn consumer(fail: bool) -> RollbackConsumer {
        let registry = HandlerRegistry::builder()
            .register(ToggleHandler {
                fail: AtomicBool::new(fail),
            })
            .unwrap()
            .build();
        RollbackConsumer::new(Arc::new(registry))
    }

    fn message_for(command: &RollbackCommand) -> Message {
        Message::new(ROLLBACK_QUEUE, serde_json::to_value(command).unwrap())
    }

    #[tokio::test]
    async fn test_known_command_is_acked() {
        let command = RollbackCommand::new("RestoreProfileImage", RollbackParams::new());
        let disposition = consumer(false).handle(&message_for(&command)).await.unwrap();
        assert_eq!(disposition, Disposition::Ack);
    }

    #[tokio::test]
    async fn test_unknown_type_is_dropped() {
        let command = RollbackCommand::new("SendApologyEmail", RollbackParams::new());
        let disposition = consumer(false).handle(&message_for(&command)).await.unwrap();
        assert_eq!(disposition, Disposition::Drop);
    }

    #[tokio::test]
    async fn test_garbage_payload_is_dropped() {
        let message = Message::new(ROLLBACK_QUEUE, serde_json::json!("garbage"));
        let disposition = consumer(false).handle(&message).await.unwrap();
        assert_eq!(disposition, Disposition::Drop);
    }

    #[tokio::test]
    async fn test_invalid_params_are_dropped_not_requeued() {
        let registry = HandlerRegistry::builder()
            .register(StrictHandler)
            .unwrap()
            .build();
        let consumer = RollbackConsumer::new(Arc::new(registry));
        let command = RollbackCommand::new("DeleteSavedImages", RollbackParams::new());

        let disposition = consumer.handle(&message_for(&command)).await.unwrap();
        assert_eq!(disposition, Disposition::Drop);
    }

    #[tokio::test]
    async fn test_handler_failure_is_an_error() {
        let command = RollbackCommand::new("RestoreProfileImage", RollbackParams::new());
        let result = consumer(true).handle(&message_for(&command)).await;
        assert!(result.is_err());
    }
}
