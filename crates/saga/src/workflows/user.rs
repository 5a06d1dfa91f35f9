//! User deletion.

use std::sync::Arc;

use bus::MessageBus;
use cache::CacheStore;
use cache::keys::{favorites_key, profile_key};
use common::{EntityId, UserProfile};

use super::Workflows;
use crate::error::{Result, SagaError, StepError};
use crate::handlers::{self, ProfileImageParams, RESTORE_PROFILE_IMAGE};
use crate::step::{SagaStep, StepContext, StepOutput};

pub const DELETE_USER_SAGA: &str = "delete_user";

pub const TRASH_PROFILE_IMAGE: &str = "trash_profile_image";
pub const DELETE_USER_COMPLAINTS: &str = "delete_user_complaints";
pub const PURGE_PROFILE_IMAGE: &str = "purge_profile_image";
pub const DELETE_USER: &str = "delete_user";

impl<B: MessageBus + Clone + 'static, C: CacheStore> Workflows<B, C> {
    /// Deletes a user, the cards they own and the complaints they filed.
    ///
    /// Every card goes through [`delete_card`](Self::delete_card) first, so its
    /// images, comments and links are removed and its deletion is projected
    /// and evicted on its own. The first card that cannot be deleted stops
    /// the operation before the user saga runs.
    ///
    /// Only the profile image is restorable. Complaints deleted before a
    /// later step fails stay deleted.
    #[tracing::instrument(skip(self))]
    pub async fn delete_user(&self, user_id: EntityId) -> Result<()> {
        let user = self
            .services
            .identity
            .get_user(user_id)
            .await?
            .ok_or(SagaError::NotFound {
                entity: "user",
                id: user_id,
            })?;

        let result = match self.delete_owned_cards(user_id).await {
            Ok(cards) => self
                .dispatcher
                .run(DELETE_USER_SAGA, &self.delete_user_steps(&user))
                .await
                .map(|_| cards),
            Err(error) => Err(error),
        };
        // Cards may be gone even if the user saga failed.
        self.evict(&[profile_key(&user.name), favorites_key(&user.name)])
            .await;
        let cards = result?;

        tracing::info!(%user_id, cards, "user deleted");
        Ok(())
    }

    async fn delete_owned_cards(&self, user_id: EntityId) -> Result<usize> {
        let owned = self.services.cards.by_owner(user_id).await?;
        for card in &owned {
            self.delete_card(card.id).await?;
        }
        Ok(owned.len())
    }

    fn delete_user_steps(&self, user: &UserProfile) -> Vec<SagaStep> {
        let user_id = user.id;
        let profile_image = user.profile_image_id;
        let images = Arc::clone(&self.services.images);
        let purge = Arc::clone(&self.services.images);
        let complaints = Arc::clone(&self.services.complaints);
        let identity = Arc::clone(&self.services.identity);

        vec![
            SagaStep::durable(TRASH_PROFILE_IMAGE, move |_| {
                let images = Arc::clone(&images);
                async move {
                    let Some(image_id) = profile_image else {
                        return Ok(StepOutput::None);
                    };
                    images.move_to_trash(&[image_id]).await?;
                    Ok::<_, StepError>(StepOutput::Resources(vec![image_id]))
                }
            })
            .compensate_with(|output| {
                let image_id = *output.resources().first()?;
                handlers::command(RESTORE_PROFILE_IMAGE, &ProfileImageParams { image_id })
            }),
            SagaStep::durable(DELETE_USER_COMPLAINTS, move |_| {
                let complaints = Arc::clone(&complaints);
                async move {
                    let deleted = complaints.delete_by_user(user_id).await?;
                    tracing::debug!(deleted, "complaints deleted");
                    Ok::<_, StepError>(StepOutput::None)
                }
            }),
            SagaStep::durable(PURGE_PROFILE_IMAGE, move |ctx: StepContext| {
                let purge = Arc::clone(&purge);
                let image_ids = ctx.resources(TRASH_PROFILE_IMAGE).to_vec();
                async move {
                    purge.delete(&image_ids).await?;
                    Ok::<_, StepError>(StepOutput::None)
                }
            }),
            SagaStep::durable(DELETE_USER, move |_| {
                let identity = Arc::clone(&identity);
                async move {
                    identity.delete_user(user_id).await?;
                    Ok::<_, StepError>(StepOutput::None)
                }
            }),
        ]
    }
}
