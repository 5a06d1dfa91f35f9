//! Local card store trait and in-memory implementation.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::{Card, EntityId};

use crate::error::ServiceError;

const SERVICE: &str = "card store";

/// The primary store for cards.
#[async_trait]
pub trait CardStore: Send + Sync {
    /// Reserves the id of a card about to be created.
    async fn next_id(&self) -> Result<EntityId, ServiceError>;

    /// Returns a card by id.
    async fn get(&self, id: EntityId) -> Result<Option<Card>, ServiceError>;

    /// Inserts or replaces a card.
    async fn save(&self, card: &Card) -> Result<(), ServiceError>;

    /// Deletes a card. Returns whether it existed.
    async fn delete(&self, id: EntityId) -> Result<bool, ServiceError>;

    /// Returns the cards of `owner_id`, ordered by id.
    async fn by_owner(&self, owner_id: EntityId) -> Result<Vec<Card>, ServiceError>;

    /// Returns cards newest first, skipping `offset`.
    async fn list(&self, offset: usize, limit: usize) -> Result<Vec<Card>, ServiceError>;
}

#[derive(Debug, Default)]
struct InMemoryCardState {
    cards: BTreeMap<EntityId, Card>,
    next_id: i64,
    fail_on_save: bool,
    fail_on_delete: bool,
}

/// In-memory card store for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCardStore {
    state: Arc<RwLock<InMemoryCardState>>,
}

impl InMemoryCardStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the store to fail saves.
    pub fn set_fail_on_save(&self, fail: bool) {
        self.state.write().unwrap().fail_on_save = fail;
    }

    /// Configures the store to fail deletes.
    pub fn set_fail_on_delete(&self, fail: bool) {
        self.state.write().unwrap().fail_on_delete = fail;
    }

    /// Returns the number of stored cards.
    pub fn count(&self) -> usize {
        self.state.read().unwrap().cards.len()
    }

    /// Returns true if the card exists.
    pub fn contains(&self, id: EntityId) -> bool {
        self.state.read().unwrap().cards.contains_key(&id)
    }
}

#[async_trait]
impl CardStore for InMemoryCardStore {
    async fn next_id(&self) -> Result<EntityId, ServiceError> {
        let mut state = self.state.write().unwrap();
        state.next_id += 1;
        Ok(EntityId::new(state.next_id))
    }

    async fn get(&self, id: EntityId) -> Result<Option<Card>, ServiceError> {
        Ok(self.state.read().unwrap().cards.get(&id).cloned())
    }

    async fn save(&self, card: &Card) -> Result<(), ServiceError> {
        let mut state = self.state.write().unwrap();
        if state.fail_on_save {
            return Err(ServiceError::unavailable(SERVICE, "save failed"));
        }
        if card.id.get() > state.next_id {
            state.next_id = card.id.get();
        }
        state.cards.insert(card.id, card.clone());
        Ok(())
    }

    async fn delete(&self, id: EntityId) -> Result<bool, ServiceError> {
        let mut state = self.state.write().unwrap();
        if state.fail_on_delete {
            return Err(ServiceError::unavailable(SERVICE, "delete failed"));
        }
        Ok(state.cards.remove(&id).is_some())
    }

    async fn by_owner(&self, owner_id: EntityId) -> Result<Vec<Card>, ServiceError> {
        Ok(self
            .state
            .read()
            .unwrap()
            .cards
            .values()
            .filter(|c| c.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn list(&self, offset: usize, limit: usize) -> Result<Vec<Card>, ServiceError> {
        Ok(self
            .state
            .read()
            .unwrap()
            .cards
            .values()
            .rev()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }
}
