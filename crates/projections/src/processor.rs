//! Fan-out of projection events to registered projections.

use std::sync::Arc;

use crate::Result;
use crate::event::ProjectionEvent;
use crate::projection::Projection;

/// Delivers events to every registered projection.
#[derive(Clone, Default)]
pub struct ProjectionProcessor {
    projections: Vec<Arc<dyn Projection>>,
}

impl ProjectionProcessor {
    /// Creates a processor with no projections.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a projection with this processor.
    pub fn register(&mut self, projection: Arc<dyn Projection>) {
        self.projections.push(projection);
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, projection: Arc<dyn Projection>) -> Self {
        self.register(projection);
        self
    }

    /// Returns the number of registered projections.
    pub fn projection_count(&self) -> usize {
        self.projections.len()
    }

    /// Delivers a single event to all registered projections.
    ///
    /// Stops at the first failing projection; projections that already
    /// applied the event see it again on redelivery.
    #[tracing::instrument(skip(self, event), fields(entity_id = %event.entity_id, operation = %event.operation))]
    pub async fn process_event(&self, event: &ProjectionEvent) -> Result<()> {
        for projection in &self.projections {
            projection.handle(event).await?;
        }
        Ok(())
    }
}
