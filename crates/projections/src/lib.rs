//! Eventual-consistency pipeline between the primary store and the search
//! index.
//!
//! - [`ProjectionPublisher`] publishes a [`ProjectionEvent`] after every
//!   committed mutation, on the queue of its [`Operation`]
//! - [`ProjectionConsumer`] applies events from one queue through a
//!   [`ProjectionProcessor`]
//! - [`SearchIndexProjection`] upserts snapshots, merges non-blank patch
//!   fields and deletes documents in a [`SearchIndex`]
//!
//! Sync failures never reach the caller of the primary mutation. They are
//! retried by the bus consumer.

pub mod consumer;
pub mod error;
pub mod event;
pub mod index;
pub mod merge;
pub mod processor;
pub mod projection;
pub mod publisher;
pub mod views;

pub use consumer::ProjectionConsumer;
pub use error::{ProjectionError, Result};
pub use event::{Operation, ProjectionEvent};
pub use index::{InMemorySearchIndex, SearchIndex};
pub use merge::{is_blank, merge_patch};
pub use processor::ProjectionProcessor;
pub use projection::Projection;
pub use publisher::ProjectionPublisher;
pub use views::SearchIndexProjection;
