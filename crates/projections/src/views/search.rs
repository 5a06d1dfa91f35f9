//! Search index projection for one entity type.

use async_trait::async_trait;

use crate::Result;
use crate::event::{Operation, ProjectionEvent};
use crate::index::SearchIndex;
use crate::merge::merge_patch;
use crate::projection::Projection;

/// Keeps a search index aligned with the primary store for one entity type.
///
/// - `Create` upserts the snapshot.
/// - `Update` merges the non-blank fields of the patch into the indexed
///   document. A patch for a document that is not indexed is skipped.
/// - `Delete` removes the document; a missing document is fine.
///
/// Events for other entity types are ignored.
#[derive(Clone)]
pub struct SearchIndexProjection<I: SearchIndex> {
    entity_type: String,
    index: I,
}

impl<I: SearchIndex> SearchIndexProjection<I> {
    /// Creates a projection of `entity_type` into `index`.
    pub fn new(entity_type: impl Into<String>, index: I) -> Self {
        Self {
            entity_type: entity_type.into(),
            index,
        }
    }

    /// Returns the projected entity type.
    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    /// Returns the backing index.
    pub fn index(&self) -> &I {
        &self.index
    }

    async fn apply(&self, event: &ProjectionEvent) -> Result<()> {
        let id = event.entity_id;
        match event.operation {
            Operation::Create => self.index.upsert(id, event.payload.clone()).await,
            Operation::Update => {
                let Some(mut document) = self.index.get(id).await? else {
                    tracing::warn!(entity_id = %id, "update for unindexed document skipped");
                    metrics::counter!("projection_update_missing_total").increment(1);
                    return Ok(());
                };
                let written = merge_patch(&mut document, &event.payload);
                if written.is_empty() {
                    return Ok(());
                }
                tracing::debug!(entity_id = %id, fields = ?written, "document patched");
                self.index.upsert(id, document).await
            }
            Operation::Delete => {
                if !self.index.delete(id).await? {
                    tracing::debug!(entity_id = %id, "delete for unindexed document");
                }
                Ok(())
            }
        }
    }
}

#[async_trait]
impl<I: SearchIndex> Projection for SearchIndexProjection<I> {
    fn name(&self) -> &'static str {
        "SearchIndexProjection"
    }

    #[tracing::instrument(skip(self, event), fields(entity_type = %event.entity_type, operation = %event.operation))]
    async fn handle(&self, event: &ProjectionEvent) -> Result<()> {
        if event.entity_type != self.entity_type {
            return Ok(());
        }

        self.apply(event).await?;
        metrics::counter!(
            "projection_events_applied_total",
            "operation" => event.operation.as_str()
        )
        .increment(1);
        Ok(())
    }
}
