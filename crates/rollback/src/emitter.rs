//! Publishing rollback commands.

use async_trait::async_trait;
use bus::{MessageBus, publish_json};
use common::MessageId;
use futures_util::future::join_all;
use serde::Serialize;

use crate::Result;
use crate::command::RollbackCommand;
use crate::consumer::ROLLBACK_QUEUE;

/// Sends rollback commands to whoever resolves them.
#[async_trait]
pub trait RollbackEmitter: Send + Sync {
    /// Publishes one command.
    async fn emit(&self, command: RollbackCommand) -> Result<MessageId>;

    /// Publishes every command concurrently, returning one result per command
    /// in input order.
    async fn emit_all(&self, commands: Vec<RollbackCommand>) -> Vec<Result<MessageId>> {
        join_all(commands.into_iter().map(|command| self.emit(command))).await
    }
}

/// Emits commands onto a bus queue.
#[derive(Debug, Clone)]
pub struct BusRollbackEmitter<B: MessageBus> {
    bus: B,
    queue: String,
}

impl<B: MessageBus> BusRollbackEmitter<B> {
    /// Creates an emitter publishing to [`ROLLBACK_QUEUE`].
    pub fn new(bus: B) -> Self {
        Self::on_queue(bus, ROLLBACK_QUEUE)
    }

    /// Creates an emitter publishing to `queue`.
    pub fn on_queue(bus: B, queue: impl Into<String>) -> Self {
        Self {
            bus,
            queue: queue.into(),
        }
    }

    /// Returns the destination queue.
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Builds a command from typed params and publishes it.
    pub async fn emit_rollback<P: Serialize + Sync>(
        &self,
        rollback_type: &str,
        params: &P,
    ) -> Result<MessageId> {
        let command = RollbackCommand::with_params(rollback_type, params)?;
        self.emit(command).await
    }
}

#[async_trait]
impl<B: MessageBus> RollbackEmitter for BusRollbackEmitter<B> {
    async fn emit(&self, command: RollbackCommand) -> Result<MessageId> {
        let id = publish_json(&self.bus, &self.queue, &command).await?;
        tracing::debug!(
            rollback_type = %command.rollback_type,
            message_id = %id,
            "rollback command emitted"
        );
        metrics::counter!("rollback_commands_emitted_total", "type" => command.rollback_type)
            .increment(1);
        Ok(id)
    }
}
