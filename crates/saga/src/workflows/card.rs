//! Card creation, deletion and patching, plus cached card reads.

use std::sync::Arc;

use bus::MessageBus;
use cache::CacheStore;
use cache::keys::{CARDS_PAGINATION_TAG, SearchKey, entity_key, page_key, profile_key};
use chrono::Utc;
use common::{Card, Comment, EntityId, ResourceId};
use projections::ProjectionEvent;
use rollback::RollbackCommand;
use serde::{Deserialize, Serialize};

use super::{CARD_ENTITY, CARD_KEY_PREFIX, Workflows};
use crate::error::{Result, SagaError, StepError};
use crate::handlers::{
    self, CARD_AND_USER_LINK, CardLinkParams, CommentsParams, DELETE_SAVED_IMAGES,
    ImageIdsParams, MOVE_IMAGES_TO_IMAGE_PACKAGE, RESTORE_DELETED_COMMENTS,
    UNLINK_CARD_FROM_USER,
};
use crate::step::{SagaStep, StepContext, StepOutput};

/// Most images a card may carry.
pub const MAX_CARD_IMAGES: usize = 10;

pub const CREATE_CARD_SAGA: &str = "create_card";
pub const DELETE_CARD_SAGA: &str = "delete_card";
pub const PATCH_CARD_SAGA: &str = "patch_card";
pub const DELETE_CARD_IMAGE_SAGA: &str = "delete_card_image";

pub const VALIDATE_CARD: &str = "validate_card";
pub const UPLOAD_IMAGES: &str = "upload_images";
pub const LINK_OWNER: &str = "link_owner";
pub const SAVE_CARD: &str = "save_card";

pub const DELETE_COMPLAINTS: &str = "delete_complaints";
pub const UNLINK_OWNER: &str = "unlink_owner";
pub const TRASH_IMAGES: &str = "trash_images";
pub const DELETE_COMMENTS: &str = "delete_comments";
pub const UNLINK_FAVORITES: &str = "unlink_favorites";
pub const PURGE_IMAGES: &str = "purge_images";
pub const DELETE_CARD: &str = "delete_card";

pub const VALIDATE_PATCH: &str = "validate_patch";
pub const TRASH_CARD_IMAGE: &str = "trash_card_image";

/// Input of [`Workflows::create_card`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCard {
    pub owner_id: EntityId,
    pub title: String,
    pub text: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Names of the files to upload, in display order.
    #[serde(default)]
    pub image_files: Vec<String>,
}

impl NewCard {
    /// Checks the card's text and image count.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("title must not be blank".into());
        }
        if self.text.trim().is_empty() {
            return Err("text must not be blank".into());
        }
        if self.image_files.len() > MAX_CARD_IMAGES {
            return Err(format!(
                "a card holds at most {MAX_CARD_IMAGES} images, got {}",
                self.image_files.len()
            ));
        }
        Ok(())
    }
}

/// Partial update of a card. Blank fields mean "no change".
///
/// `image_files` are uploaded and appended to the card's images. They never
/// reach the projection payload; the resulting `imageIds` do.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing)]
    pub image_files: Vec<String>,
}

fn present(value: &Option<String>) -> Option<&String> {
    value.as_ref().filter(|v| !v.trim().is_empty())
}

impl CardPatch {
    /// Returns true if applying the patch would change nothing.
    pub fn is_empty(&self) -> bool {
        present(&self.title).is_none()
            && present(&self.text).is_none()
            && self.tags.as_ref().is_none_or(Vec::is_empty)
            && self.image_files.is_empty()
    }

    /// Checks that the new images fit next to the `existing` ones.
    pub fn validate_images(&self, existing: usize) -> std::result::Result<(), String> {
        let total = existing + self.image_files.len();
        if total > MAX_CARD_IMAGES {
            return Err(format!(
                "a card holds at most {MAX_CARD_IMAGES} images, it would hold {total}"
            ));
        }
        Ok(())
    }

    /// Applies the non-blank fields to `card` and returns their names.
    pub fn apply(&self, card: &mut Card) -> Vec<&'static str> {
        let mut changed = Vec::new();
        if let Some(title) = present(&self.title) {
            card.title = title.clone();
            changed.push("title");
        }
        if let Some(text) = present(&self.text) {
            card.text = text.clone();
            changed.push("text");
        }
        if let Some(tags) = self.tags.as_ref().filter(|t| !t.is_empty()) {
            card.tags = tags.clone();
            changed.push("tags");
        }
        changed
    }
}

fn images_command(rollback_type: &str, output: &StepOutput) -> Option<RollbackCommand> {
    let image_ids = output.resources();
    if image_ids.is_empty() {
        return None;
    }
    handlers::command(
        rollback_type,
        &ImageIdsParams {
            image_ids: image_ids.to_vec(),
        },
    )
}

fn delete_uploaded_images(output: &StepOutput) -> Option<RollbackCommand> {
    images_command(DELETE_SAVED_IMAGES, output)
}

fn restore_trashed_images(output: &StepOutput) -> Option<RollbackCommand> {
    images_command(MOVE_IMAGES_TO_IMAGE_PACKAGE, output)
}

/// Projection payload of a patch: its fields plus the full image list when
/// images were added.
fn patch_fields(
    patch: &CardPatch,
    card: &Card,
    with_images: bool,
) -> serde_json::Result<serde_json::Value> {
    let mut fields = serde_json::to_value(patch)?;
    if with_images {
        if let Some(object) = fields.as_object_mut() {
            object.insert("imageIds".into(), serde_json::to_value(&card.image_ids)?);
        }
    }
    Ok(fields)
}

fn matches_search(card: &Card, query: &str, search: &SearchKey<'_>) -> bool {
    let text_matches = query.is_empty()
        || card.title.to_lowercase().contains(query)
        || card.text.to_lowercase().contains(query);
    let date_matches = search.created_on.is_none_or(|date| card.created_at == date);
    let tags_match = search.tags.iter().all(|tag| card.tags.contains(tag));
    text_matches && date_matches && tags_match
}

impl<B: MessageBus + Clone + 'static, C: CacheStore> Workflows<B, C> {
    /// Creates a card: uploads its images and links it to its owner before
    /// saving it locally.
    #[tracing::instrument(skip(self, new), fields(owner_id = %new.owner_id))]
    pub async fn create_card(&self, new: NewCard) -> Result<Card> {
        let card_id = self.services.cards.next_id().await?;
        let mut card = Card {
            id: card_id,
            owner_id: new.owner_id,
            title: new.title.clone(),
            text: new.text.clone(),
            tags: new.tags.clone(),
            image_ids: Vec::new(),
            created_at: Utc::now().date_naive(),
        };

        let run = self
            .dispatcher
            .run(CREATE_CARD_SAGA, &self.create_card_steps(&new, &card))
            .await?;
        card.image_ids = run.context.resources(UPLOAD_IMAGES).to_vec();

        match serde_json::to_value(&card) {
            Ok(snapshot) => {
                self.project(ProjectionEvent::create(CARD_ENTITY, card_id, snapshot))
                    .await
            }
            Err(error) => tracing::error!(%card_id, %error, "card snapshot not serializable"),
        }
        self.invalidate_listings().await;

        tracing::info!(%card_id, images = card.image_ids.len(), "card created");
        Ok(card)
    }

    fn create_card_steps(&self, new: &NewCard, draft: &Card) -> Vec<SagaStep> {
        let validation = new.validate();
        let files = new.image_files.clone();
        let images = Arc::clone(&self.services.images);
        let identity = Arc::clone(&self.services.identity);
        let cards = Arc::clone(&self.services.cards);
        let link = CardLinkParams {
            card_id: draft.id,
            user_id: draft.owner_id,
        };
        let draft = draft.clone();

        vec![
            SagaStep::precondition(VALIDATE_CARD, move |_| {
                let validation = validation.clone();
                async move {
                    validation
                        .map(|()| StepOutput::None)
                        .map_err(StepError::Validation)
                }
            }),
            SagaStep::durable(UPLOAD_IMAGES, move |_| {
                let images = Arc::clone(&images);
                let files = files.clone();
                async move { Ok::<_, StepError>(StepOutput::Resources(images.upload(&files).await?)) }
            })
            .compensate_with(delete_uploaded_images),
            SagaStep::durable(LINK_OWNER, move |_| {
                let identity = Arc::clone(&identity);
                async move {
                    identity.link_card(link.user_id, link.card_id).await?;
                    Ok::<_, StepError>(StepOutput::None)
                }
            })
            .compensate_with(move |_| handlers::command(UNLINK_CARD_FROM_USER, &link)),
            SagaStep::durable(SAVE_CARD, move |ctx: StepContext| {
                let cards = Arc::clone(&cards);
                let mut card = draft.clone();
                card.image_ids = ctx.resources(UPLOAD_IMAGES).to_vec();
                async move {
                    cards.save(&card).await?;
                    Ok::<_, StepError>(StepOutput::None)
                }
            }),
        ]
    }

    /// Deletes a card along with its images, comments, complaints and links.
    #[tracing::instrument(skip(self))]
    pub async fn delete_card(&self, card_id: EntityId) -> Result<()> {
        let card = self.load_card(card_id).await?;
        self.cache
            .invalidate(&[entity_key(CARD_KEY_PREFIX, card_id)])
            .await?;

        self.dispatcher
            .run(DELETE_CARD_SAGA, &self.delete_card_steps(&card))
            .await?;

        self.project(ProjectionEvent::delete(CARD_ENTITY, card_id))
            .await;
        self.invalidate_listings().await;

        tracing::info!(%card_id, "card deleted");
        Ok(())
    }

    fn delete_card_steps(&self, card: &Card) -> Vec<SagaStep> {
        let card_id = card.id;
        let link = CardLinkParams {
            card_id,
            user_id: card.owner_id,
        };
        let image_ids = card.image_ids.clone();
        let complaints = Arc::clone(&self.services.complaints);
        let identity = Arc::clone(&self.services.identity);
        let favorites = Arc::clone(&self.services.identity);
        let images = Arc::clone(&self.services.images);
        let purge = Arc::clone(&self.services.images);
        let comments = Arc::clone(&self.services.comments);
        let cards = Arc::clone(&self.services.cards);

        vec![
            SagaStep::durable(DELETE_COMPLAINTS, move |_| {
                let complaints = Arc::clone(&complaints);
                async move {
                    let deleted = complaints.delete_by_card(card_id).await?;
                    tracing::debug!(deleted, "complaints deleted");
                    Ok::<_, StepError>(StepOutput::None)
                }
            }),
            SagaStep::durable(UNLINK_OWNER, move |_| {
                let identity = Arc::clone(&identity);
                async move {
                    identity.unlink_card(link.user_id, link.card_id).await?;
                    Ok::<_, StepError>(StepOutput::None)
                }
            })
            .compensate_with(move |_| handlers::command(CARD_AND_USER_LINK, &link)),
            SagaStep::durable(TRASH_IMAGES, move |_| {
                let images = Arc::clone(&images);
                let image_ids = image_ids.clone();
                async move {
                    images.move_to_trash(&image_ids).await?;
                    Ok::<_, StepError>(StepOutput::Resources(image_ids))
                }
            })
            .compensate_with(restore_trashed_images),
            SagaStep::durable(DELETE_COMMENTS, move |_| {
                let comments = Arc::clone(&comments);
                async move {
                    let deleted = comments.delete_by_card(card_id).await?;
                    Ok::<_, StepError>(StepOutput::Value(serde_json::to_value(deleted)?))
                }
            })
            .compensate_with(|output| {
                let comments: Vec<Comment> = serde_json::from_value(output.value()?.clone()).ok()?;
                if comments.is_empty() {
                    return None;
                }
                handlers::command(RESTORE_DELETED_COMMENTS, &CommentsParams { comments })
            }),
            SagaStep::durable(UNLINK_FAVORITES, move |_| {
                let favorites = Arc::clone(&favorites);
                async move {
                    let users = favorites.unlink_favorite_everywhere(card_id).await?;
                    tracing::debug!(users, "favorites unlinked");
                    Ok::<_, StepError>(StepOutput::None)
                }
            }),
            SagaStep::durable(PURGE_IMAGES, move |ctx: StepContext| {
                let purge = Arc::clone(&purge);
                let image_ids = ctx.resources(TRASH_IMAGES).to_vec();
                async move {
                    purge.delete(&image_ids).await?;
                    Ok::<_, StepError>(StepOutput::None)
                }
            }),
            SagaStep::durable(DELETE_CARD, move |_| {
                let cards = Arc::clone(&cards);
                async move {
                    cards.delete(card_id).await?;
                    Ok::<_, StepError>(StepOutput::None)
                }
            }),
        ]
    }

    /// Applies the non-blank fields of `patch` to a card and appends its new
    /// images.
    ///
    /// Uploads run before the local save; a failed save deletes them again.
    #[tracing::instrument(skip(self, patch))]
    pub async fn patch_card(&self, card_id: EntityId, patch: CardPatch) -> Result<Card> {
        if patch.is_empty() {
            return Err(SagaError::Validation("patch changes nothing".into()));
        }

        let mut card = self.load_card(card_id).await?;
        let mut changed = patch.apply(&mut card);

        let run = self
            .dispatcher
            .run(PATCH_CARD_SAGA, &self.patch_card_steps(&patch, &card))
            .await?;
        let added = run.context.resources(UPLOAD_IMAGES);
        card.image_ids.extend_from_slice(added);
        let images_added = !added.is_empty();
        if images_added {
            changed.push("imageIds");
        }

        match patch_fields(&patch, &card, images_added) {
            Ok(fields) => {
                self.project(ProjectionEvent::update(CARD_ENTITY, card_id, fields))
                    .await
            }
            Err(error) => tracing::error!(%card_id, %error, "card patch not serializable"),
        }

        let mut keys = vec![entity_key(CARD_KEY_PREFIX, card_id)];
        match self.services.identity.get_user(card.owner_id).await {
            Ok(Some(owner)) => keys.push(profile_key(&owner.name)),
            Ok(None) => {}
            Err(error) => tracing::warn!(%error, "owner lookup failed, profile left to expire"),
        }
        self.evict(&keys).await;
        self.invalidate_listings().await;

        tracing::info!(%card_id, ?changed, "card patched");
        Ok(card)
    }

    fn patch_card_steps(&self, patch: &CardPatch, patched: &Card) -> Vec<SagaStep> {
        let validation = patch.validate_images(patched.image_ids.len());
        let files = patch.image_files.clone();
        let images = Arc::clone(&self.services.images);
        let cards = Arc::clone(&self.services.cards);
        let patched = patched.clone();

        vec![
            SagaStep::precondition(VALIDATE_PATCH, move |_| {
                let validation = validation.clone();
                async move {
                    validation
                        .map(|()| StepOutput::None)
                        .map_err(StepError::Validation)
                }
            }),
            SagaStep::durable(UPLOAD_IMAGES, move |_| {
                let images = Arc::clone(&images);
                let files = files.clone();
                async move {
                    if files.is_empty() {
                        return Ok(StepOutput::None);
                    }
                    Ok::<_, StepError>(StepOutput::Resources(images.upload(&files).await?))
                }
            })
            .compensate_with(delete_uploaded_images),
            SagaStep::durable(SAVE_CARD, move |ctx: StepContext| {
                let cards = Arc::clone(&cards);
                let mut card = patched.clone();
                card.image_ids.extend_from_slice(ctx.resources(UPLOAD_IMAGES));
                async move {
                    cards.save(&card).await?;
                    Ok::<_, StepError>(StepOutput::None)
                }
            }),
        ]
    }

    /// Removes one image from a card.
    ///
    /// The image is trashed before the card is saved without it, so a failed
    /// save restores it. Purging it afterwards is best effort: a failure
    /// leaves it in the trash.
    #[tracing::instrument(skip(self))]
    pub async fn delete_card_image(
        &self,
        card_id: EntityId,
        image_id: ResourceId,
    ) -> Result<Card> {
        let mut card = self.load_card(card_id).await?;
        if !card.image_ids.contains(&image_id) {
            return Err(SagaError::Validation(format!(
                "card {card_id} has no image {image_id}"
            )));
        }
        card.image_ids.retain(|id| *id != image_id);

        self.dispatcher
            .run(
                DELETE_CARD_IMAGE_SAGA,
                &self.delete_card_image_steps(&card, image_id),
            )
            .await?;

        if let Err(error) = self.services.images.delete(&[image_id]).await {
            tracing::warn!(%image_id, %error, "image left in trash");
        }

        self.evict(&[entity_key(CARD_KEY_PREFIX, card_id)]).await;
        self.invalidate_listings().await;
        // An update cannot clear the image list, so the whole snapshot is upserted.
        match serde_json::to_value(&card) {
            Ok(snapshot) => {
                self.project(ProjectionEvent::create(CARD_ENTITY, card_id, snapshot))
                    .await
            }
            Err(error) => tracing::error!(%card_id, %error, "card snapshot not serializable"),
        }

        tracing::info!(%card_id, %image_id, "card image deleted");
        Ok(card)
    }

    fn delete_card_image_steps(&self, updated: &Card, image_id: ResourceId) -> Vec<SagaStep> {
        let images = Arc::clone(&self.services.images);
        let cards = Arc::clone(&self.services.cards);
        let updated = updated.clone();

        vec![
            SagaStep::durable(TRASH_CARD_IMAGE, move |_| {
                let images = Arc::clone(&images);
                async move {
                    let moved = images.move_to_trash(&[image_id]).await?;
                    Ok::<_, StepError>(StepOutput::Resources(moved))
                }
            })
            .compensate_with(restore_trashed_images),
            SagaStep::durable(SAVE_CARD, move |_| {
                let cards = Arc::clone(&cards);
                let card = updated.clone();
                async move {
                    cards.save(&card).await?;
                    Ok::<_, StepError>(StepOutput::None)
                }
            }),
        ]
    }

    /// Returns a card, through the cache.
    pub async fn get_card(&self, card_id: EntityId) -> Result<Card> {
        self.cache
            .get_or_load(&entity_key(CARD_KEY_PREFIX, card_id), || {
                self.load_card(card_id)
            })
            .await
    }

    /// Returns a page of cards, newest first, through the cache.
    pub async fn list_cards(&self, page: u32, limit: u32) -> Result<Vec<Card>> {
        let offset = page as usize * limit as usize;
        self.cache
            .get_or_load_tagged(CARDS_PAGINATION_TAG, &page_key(page, limit), || async move {
                Ok::<_, SagaError>(self.services.cards.list(offset, limit as usize).await?)
            })
            .await
    }

    /// Returns a page of cards matching `search`, through the cache.
    ///
    /// The query matches title or text, case-insensitively. Every requested
    /// tag must be present.
    pub async fn search_cards(&self, search: &SearchKey<'_>) -> Result<Vec<Card>> {
        let offset = search.page as usize * search.limit as usize;
        let query = search.query.trim().to_lowercase();
        self.cache
            .get_or_load_tagged(CARDS_PAGINATION_TAG, &search.to_key(), || async move {
                let cards = self.services.cards.list(0, usize::MAX).await?;
                Ok::<_, SagaError>(
                    cards
                        .into_iter()
                        .filter(|card| matches_search(card, &query, search))
                        .skip(offset)
                        .take(search.limit as usize)
                        .collect(),
                )
            })
            .await
    }

    async fn load_card(&self, card_id: EntityId) -> Result<Card> {
        self.services
            .cards
            .get(card_id)
            .await?
            .ok_or(SagaError::NotFound {
                entity: CARD_ENTITY,
                id: card_id,
            })
    }
}
