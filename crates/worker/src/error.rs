//! Worker error types.

use bus::BusError;
use rollback::RollbackError;
use thiserror::Error;

/// Errors that stop the worker.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The handler registry could not be built.
    #[error("Rollback setup error: {0}")]
    Rollback(#[from] RollbackError),

    /// A consumer lost its connection to the bus.
    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    /// A consumer task panicked or was cancelled.
    #[error("Consumer task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// The metrics recorder could not be installed.
    #[error("Metrics setup error: {0}")]
    Metrics(String),

    /// The admin listener could not be bound or served.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for worker operations.
pub type Result<T> = std::result::Result<T, WorkerError>;
