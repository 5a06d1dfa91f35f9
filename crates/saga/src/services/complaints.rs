//! Complaint service trait and in-memory implementation.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::EntityId;

use crate::error::ServiceError;

const SERVICE: &str = "complaint service";

/// Store of user complaints about cards.
///
/// Deleted complaints are not restorable; callers accept losing them when a
/// later step fails.
#[async_trait]
pub trait ComplaintService: Send + Sync {
    /// Deletes complaints about `card_id`. Returns how many were deleted.
    async fn delete_by_card(&self, card_id: EntityId) -> Result<usize, ServiceError>;

    /// Deletes complaints filed by `user_id`. Returns how many were deleted.
    async fn delete_by_user(&self, user_id: EntityId) -> Result<usize, ServiceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Complaint {
    card_id: EntityId,
    author_id: EntityId,
}

#[derive(Debug, Default)]
struct InMemoryComplaintState {
    complaints: Vec<Complaint>,
    fail_on_delete: bool,
}

/// In-memory complaint service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryComplaintService {
    state: Arc<RwLock<InMemoryComplaintState>>,
}

impl InMemoryComplaintService {
    /// Creates a new in-memory complaint service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Files a complaint by `author_id` about `card_id`.
    pub fn file(&self, card_id: EntityId, author_id: EntityId) {
        self.state.write().unwrap().complaints.push(Complaint {
            card_id,
            author_id,
        });
    }

    /// Configures the service to fail deletes.
    pub fn set_fail_on_delete(&self, fail: bool) {
        self.state.write().unwrap().fail_on_delete = fail;
    }

    /// Returns the number of stored complaints.
    pub fn count(&self) -> usize {
        self.state.read().unwrap().complaints.len()
    }

    fn delete_where(&self, matches: impl Fn(&Complaint) -> bool) -> Result<usize, ServiceError> {
        let mut state = self.state.write().unwrap();
        if state.fail_on_delete {
            return Err(ServiceError::unavailable(SERVICE, "delete failed"));
        }

        let before = state.complaints.len();
        state.complaints.retain(|c| !matches(c));
        Ok(before - state.complaints.len())
    }
}

#[async_trait]
impl ComplaintService for InMemoryComplaintService {
    async fn delete_by_card(&self, card_id: EntityId) -> Result<usize, ServiceError> {
        self.delete_where(|c| c.card_id == card_id)
    }

    async fn delete_by_user(&self, user_id: EntityId) -> Result<usize, ServiceError> {
        self.delete_where(|c| c.author_id == user_id)
    }
}
