//! Search index boundary and in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use common::EntityId;
use tokio::sync::RwLock;

use crate::{ProjectionError, Result};

/// Document store queried by search, owned by another service.
///
/// Documents are opaque JSON objects keyed by entity id.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Returns the document for `id`, if indexed.
    async fn get(&self, id: EntityId) -> Result<Option<serde_json::Value>>;

    /// Inserts or replaces the document for `id`.
    async fn upsert(&self, id: EntityId, document: serde_json::Value) -> Result<()>;

    /// Removes the document for `id`. Returns whether it existed.
    async fn delete(&self, id: EntityId) -> Result<bool>;
}

/// In-memory search index for testing and single-process runs.
#[derive(Debug, Clone, Default)]
pub struct InMemorySearchIndex {
    documents: Arc<RwLock<HashMap<EntityId, serde_json::Value>>>,
    fail_on_write: Arc<AtomicBool>,
}

impl InMemorySearchIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent writes fail, as an unreachable index would.
    pub fn set_fail_on_write(&self, fail: bool) {
        self.fail_on_write.store(fail, Ordering::SeqCst);
    }

    /// Returns the number of indexed documents.
    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    /// Returns true if nothing is indexed.
    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }

    fn check_writable(&self, id: EntityId) -> Result<()> {
        if self.fail_on_write.load(Ordering::SeqCst) {
            return Err(ProjectionError::Sync {
                entity_id: id,
                reason: "search index unavailable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl SearchIndex for InMemorySearchIndex {
    async fn get(&self, id: EntityId) -> Result<Option<serde_json::Value>> {
        Ok(self.documents.read().await.get(&id).cloned())
    }

    async fn upsert(&self, id: EntityId, document: serde_json::Value) -> Result<()> {
        self.check_writable(id)?;
        self.documents.write().await.insert(id, document);
        Ok(())
    }

    async fn delete(&self, id: EntityId) -> Result<bool> {
        self.check_writable(id)?;
        Ok(self.documents.write().await.remove(&id).is_some())
    }
}
