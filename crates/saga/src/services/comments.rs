//! Comment service trait and in-memory implementation.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::{Comment, EntityId, ResourceId};

use crate::error::ServiceError;

const SERVICE: &str = "comment service";

/// Store of comments attached to cards.
#[async_trait]
pub trait CommentService: Send + Sync {
    /// Deletes every comment of `card_id` and returns the deleted records.
    async fn delete_by_card(&self, card_id: EntityId) -> Result<Vec<Comment>, ServiceError>;

    /// Re-inserts comments whose id is absent. Returns how many were inserted.
    async fn restore(&self, comments: &[Comment]) -> Result<usize, ServiceError>;
}

#[derive(Debug, Default)]
struct InMemoryCommentState {
    comments: BTreeMap<ResourceId, Comment>,
    fail_on_delete: bool,
    fail_on_restore: bool,
}

/// In-memory comment service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCommentService {
    state: Arc<RwLock<InMemoryCommentState>>,
}

impl InMemoryCommentService {
    /// Creates a new in-memory comment service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a comment.
    pub fn insert(&self, comment: Comment) {
        self.state
            .write()
            .unwrap()
            .comments
            .insert(comment.id, comment);
    }

    /// Configures the service to fail deletes.
    pub fn set_fail_on_delete(&self, fail: bool) {
        self.state.write().unwrap().fail_on_delete = fail;
    }

    /// Configures the service to fail restores.
    pub fn set_fail_on_restore(&self, fail: bool) {
        self.state.write().unwrap().fail_on_restore = fail;
    }

    /// Returns the comments of `card_id`, ordered by id.
    pub fn comments_for(&self, card_id: EntityId) -> Vec<Comment> {
        self.state
            .read()
            .unwrap()
            .comments
            .values()
            .filter(|c| c.card_id == card_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl CommentService for InMemoryCommentService {
    async fn delete_by_card(&self, card_id: EntityId) -> Result<Vec<Comment>, ServiceError> {
        let mut state = self.state.write().unwrap();
        if state.fail_on_delete {
            return Err(ServiceError::unavailable(SERVICE, "delete failed"));
        }

        let ids: Vec<ResourceId> = state
            .comments
            .values()
            .filter(|c| c.card_id == card_id)
            .map(|c| c.id)
            .collect();
        Ok(ids
            .iter()
            .filter_map(|id| state.comments.remove(id))
            .collect())
    }

    async fn restore(&self, comments: &[Comment]) -> Result<usize, ServiceError> {
        let mut state = self.state.write().unwrap();
        if state.fail_on_restore {
            return Err(ServiceError::unavailable(SERVICE, "restore failed"));
        }

        let mut inserted = 0;
        for comment in comments {
            if !state.comments.contains_key(&comment.id) {
                state.comments.insert(comment.id, comment.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }
}
