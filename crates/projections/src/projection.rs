//! Projection trait.

use async_trait::async_trait;

use crate::Result;
use crate::event::ProjectionEvent;

/// A projection that applies committed mutations to a derived store.
///
/// Delivery is at-least-once and unordered, so `handle` must give the same
/// result when an event is applied twice.
#[async_trait]
pub trait Projection: Send + Sync {
    /// Returns the name of this projection.
    fn name(&self) -> &'static str;

    /// Applies a single event to the derived store.
    async fn handle(&self, event: &ProjectionEvent) -> Result<()>;
}
