//! Cache error types.

use thiserror::Error;

/// Errors that can occur when talking to the cache.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The cache store rejected or failed an operation.
    #[error("Cache store error: {0}")]
    Store(String),

    /// A cached value could not be serialized or deserialized.
    #[error("Cache serialization error for key '{key}': {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
