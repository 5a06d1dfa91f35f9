//! Message bus used by the rollback and projection pipelines.
//!
//! - [`MessageBus`] is the publish/receive/ack boundary.
//! - [`InMemoryBus`] keeps unacknowledged messages until they are acked,
//!   requeued or dead-lettered, giving at-least-once delivery in-process.
//! - [`Consumer`] drives one queue through a [`MessageHandler`], applying a
//!   [`RetryPolicy`] when the handler fails.
//!
//! No ordering is guaranteed between messages, on the same queue or across
//! queues. Handlers must tolerate duplicates.

pub mod bus;
pub mod consumer;
pub mod error;
pub mod memory;
pub mod message;
pub mod retry;

pub use bus::{MessageBus, dead_letter_queue, publish_json};
pub use consumer::{
    ConsumeOutcome, Consumer, DEFAULT_ERROR_BACKOFF, Disposition, HandlerError, MessageHandler,
};
pub use error::{BusError, Result};
pub use memory::InMemoryBus;
pub use message::{Delivery, Message};
pub use retry::{RetryDecision, RetryPolicy};
