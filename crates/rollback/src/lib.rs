//! Rollback command bus and compensation handler registry.
//!
//! A [`RollbackCommand`] describes how to undo one durable effect of a failed
//! saga. Commands travel on the bus as opaque JSON; the [`HandlerRegistry`]
//! maps a command's type to the [`CompensationHandler`] that understands its
//! params. The registry is built once at startup and never mutated.

pub mod command;
pub mod consumer;
pub mod emitter;
pub mod error;
pub mod handler;
pub mod registry;

pub use command::{RollbackCommand, RollbackParams};
pub use consumer::{ROLLBACK_QUEUE, RollbackConsumer};
pub use emitter::{BusRollbackEmitter, RollbackEmitter};
pub use error::{CompensationError, Result, RollbackError};
pub use handler::CompensationHandler;
pub use registry::{DispatchOutcome, HandlerRegistry, HandlerRegistryBuilder};
