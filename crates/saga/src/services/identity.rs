//! Identity service trait and in-memory implementation.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::{EntityId, UserProfile};

use crate::error::ServiceError;

const SERVICE: &str = "identity service";

/// Owner of user profiles, card ownership links and favorites.
#[async_trait]
pub trait IdentityService: Send + Sync {
    /// Returns the profile of `user_id`.
    async fn get_user(&self, user_id: EntityId) -> Result<Option<UserProfile>, ServiceError>;

    /// Adds `card_id` to the user's cards. Linking twice is a no-op.
    async fn link_card(&self, user_id: EntityId, card_id: EntityId) -> Result<(), ServiceError>;

    /// Removes `card_id` from the user's cards. Returns whether it was linked.
    async fn unlink_card(&self, user_id: EntityId, card_id: EntityId)
    -> Result<bool, ServiceError>;

    /// Removes `card_id` from every user's favorites. Returns how many users
    /// had it.
    async fn unlink_favorite_everywhere(&self, card_id: EntityId) -> Result<usize, ServiceError>;

    /// Deletes the user record. Returns whether it existed.
    async fn delete_user(&self, user_id: EntityId) -> Result<bool, ServiceError>;
}

#[derive(Debug, Default)]
struct InMemoryIdentityState {
    users: HashMap<EntityId, UserProfile>,
    favorites: HashMap<EntityId, BTreeSet<EntityId>>,
    fail_on_link: bool,
    fail_on_unlink: bool,
    fail_on_delete: bool,
}

/// In-memory identity service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryIdentityService {
    state: Arc<RwLock<InMemoryIdentityState>>,
}

impl InMemoryIdentityService {
    /// Creates a new in-memory identity service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a user profile.
    pub fn insert_user(&self, profile: UserProfile) {
        self.state.write().unwrap().users.insert(profile.id, profile);
    }

    /// Marks `card_id` as a favorite of `user_id`.
    pub fn add_favorite(&self, user_id: EntityId, card_id: EntityId) {
        self.state
            .write()
            .unwrap()
            .favorites
            .entry(user_id)
            .or_default()
            .insert(card_id);
    }

    /// Configures the service to fail link calls.
    pub fn set_fail_on_link(&self, fail: bool) {
        self.state.write().unwrap().fail_on_link = fail;
    }

    /// Configures the service to fail unlink calls, favorites included.
    pub fn set_fail_on_unlink(&self, fail: bool) {
        self.state.write().unwrap().fail_on_unlink = fail;
    }

    /// Configures the service to fail user deletion.
    pub fn set_fail_on_delete(&self, fail: bool) {
        self.state.write().unwrap().fail_on_delete = fail;
    }

    /// Returns the cards linked to `user_id`.
    pub fn linked_cards(&self, user_id: EntityId) -> Vec<EntityId> {
        self.state
            .read()
            .unwrap()
            .users
            .get(&user_id)
            .map(|u| u.card_ids.clone())
            .unwrap_or_default()
    }

    /// Returns true if any user has `card_id` as a favorite.
    pub fn is_favorite_anywhere(&self, card_id: EntityId) -> bool {
        self.state
            .read()
            .unwrap()
            .favorites
            .values()
            .any(|cards| cards.contains(&card_id))
    }

    /// Returns true if the user record exists.
    pub fn has_user(&self, user_id: EntityId) -> bool {
        self.state.read().unwrap().users.contains_key(&user_id)
    }
}

#[async_trait]
impl IdentityService for InMemoryIdentityService {
    async fn get_user(&self, user_id: EntityId) -> Result<Option<UserProfile>, ServiceError> {
        Ok(self.state.read().unwrap().users.get(&user_id).cloned())
    }

    async fn link_card(&self, user_id: EntityId, card_id: EntityId) -> Result<(), ServiceError> {
        let mut state = self.state.write().unwrap();
        if state.fail_on_link {
            return Err(ServiceError::unavailable(SERVICE, "link failed"));
        }

        let user = state
            .users
            .get_mut(&user_id)
            .ok_or_else(|| ServiceError::Rejected {
                service: SERVICE,
                reason: format!("unknown user {user_id}"),
            })?;
        if !user.card_ids.contains(&card_id) {
            user.card_ids.push(card_id);
        }
        Ok(())
    }

    async fn unlink_card(
        &self,
        user_id: EntityId,
        card_id: EntityId,
    ) -> Result<bool, ServiceError> {
        let mut state = self.state.write().unwrap();
        if state.fail_on_unlink {
            return Err(ServiceError::unavailable(SERVICE, "unlink failed"));
        }

        let Some(user) = state.users.get_mut(&user_id) else {
            return Ok(false);
        };
        let before = user.card_ids.len();
        user.card_ids.retain(|id| *id != card_id);
        Ok(user.card_ids.len() != before)
    }

    async fn unlink_favorite_everywhere(&self, card_id: EntityId) -> Result<usize, ServiceError> {
        let mut state = self.state.write().unwrap();
        if state.fail_on_unlink {
            return Err(ServiceError::unavailable(SERVICE, "unlink favorites failed"));
        }

        Ok(state
            .favorites
            .values_mut()
            .filter_map(|cards| cards.remove(&card_id).then_some(()))
            .count())
    }

    async fn delete_user(&self, user_id: EntityId) -> Result<bool, ServiceError> {
        let mut state = self.state.write().unwrap();
        if state.fail_on_delete {
            return Err(ServiceError::unavailable(SERVICE, "delete user failed"));
        }

        state.favorites.remove(&user_id);
        Ok(state.users.remove(&user_id).is_some())
    }
}
