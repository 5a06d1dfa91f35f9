//! Aggregate records shared by the saga, projection and cache layers.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{EntityId, ResourceId};

/// A classified ad.
///
/// `image_ids` are owned by the image service. They are only meaningful once
/// the saga that produced them ran to completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: EntityId,
    pub owner_id: EntityId,
    pub title: String,
    pub text: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub image_ids: Vec<ResourceId>,
    pub created_at: NaiveDate,
}

impl Card {
    /// Returns true if the card references the given image.
    pub fn has_image(&self, image_id: ResourceId) -> bool {
        self.image_ids.contains(&image_id)
    }
}

/// A user profile held by the identity service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: EntityId,
    pub name: String,
    /// Profile picture, if the user uploaded one.
    pub profile_image_id: Option<ResourceId>,
    #[serde(default)]
    pub card_ids: Vec<EntityId>,
}

/// A comment attached to a card, as returned by the comment service when it
/// deletes it. The full record is kept so it can be restored.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: ResourceId,
    pub card_id: EntityId,
    pub author_id: EntityId,
    pub text: String,
}
