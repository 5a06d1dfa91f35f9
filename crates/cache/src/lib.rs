//! Cache store abstraction and the tag-based invalidation index.
//!
//! - [`CacheStore`] is the boundary to the key/value store (exists, get,
//!   set-with-TTL, delete, set membership).
//! - [`InMemoryCacheStore`] implements it for tests and single-node runs.
//! - [`CacheIndex`] layers serialization, the fixed TTL, and tag bookkeeping
//!   for list-style results on top of a store.

pub mod error;
pub mod index;
pub mod keys;
pub mod memory;
pub mod store;

pub use error::{CacheError, Result};
pub use index::{CacheIndex, DEFAULT_TTL};
pub use memory::InMemoryCacheStore;
pub use store::CacheStore;
