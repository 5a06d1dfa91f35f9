//! Compensation handlers undoing saga effects in sibling services.
//!
//! Every handler is written as delete-if-exists or move-if-present, so a
//! redelivered command, or one emitted for a step that only half happened,
//! succeeds without changing anything.

use std::sync::Arc;

use async_trait::async_trait;
use common::{Comment, EntityId, ResourceId};
use rollback::{
    CompensationError, CompensationHandler, HandlerRegistry, HandlerRegistryBuilder,
    RollbackCommand, RollbackParams, command::decode_params,
};
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;
use crate::services::{CommentService, IdentityService, ImageService, Services};

pub const DELETE_SAVED_IMAGES: &str = "DeleteSavedImages";
pub const MOVE_IMAGES_TO_IMAGE_PACKAGE: &str = "MoveImagesToImagePackage";
pub const CARD_AND_USER_LINK: &str = "CardAndUserLink";
pub const UNLINK_CARD_FROM_USER: &str = "UnlinkCardFromUser";
pub const RESTORE_DELETED_COMMENTS: &str = "RestoreDeletedComments";
pub const RESTORE_PROFILE_IMAGE: &str = "RestoreProfileImage";

/// Params of `DeleteSavedImages` and `MoveImagesToImagePackage`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageIdsParams {
    pub image_ids: Vec<ResourceId>,
}

/// Params of `CardAndUserLink` and `UnlinkCardFromUser`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardLinkParams {
    pub card_id: EntityId,
    pub user_id: EntityId,
}

/// Params of `RestoreDeletedComments`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentsParams {
    pub comments: Vec<Comment>,
}

/// Params of `RestoreProfileImage`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileImageParams {
    pub image_id: ResourceId,
}

/// Builds a rollback command from typed params.
///
/// The params structs above always serialize to objects.
pub fn command<P: Serialize>(rollback_type: &str, params: &P) -> Option<RollbackCommand> {
    match RollbackCommand::with_params(rollback_type, params) {
        Ok(command) => Some(command),
        Err(error) => {
            tracing::error!(rollback_type, %error, "rollback params not serializable");
            None
        }
    }
}

fn remote(rollback_type: &'static str) -> impl Fn(ServiceError) -> CompensationError {
    move |error| CompensationError::Remote {
        rollback_type: rollback_type.to_string(),
        reason: error.to_string(),
    }
}

/// Deletes freshly uploaded images after a failed creation.
pub struct DeleteSavedImagesHandler {
    images: Arc<dyn ImageService>,
}

impl DeleteSavedImagesHandler {
    pub fn new(images: Arc<dyn ImageService>) -> Self {
        Self { images }
    }
}

#[async_trait]
impl CompensationHandler for DeleteSavedImagesHandler {
    fn rollback_type(&self) -> &'static str {
        DELETE_SAVED_IMAGES
    }

    async fn compensate(&self, params: &RollbackParams) -> Result<(), CompensationError> {
        let params: ImageIdsParams = decode_params(DELETE_SAVED_IMAGES, params)?;
        let removed = self
            .images
            .delete(&params.image_ids)
            .await
            .map_err(remote(DELETE_SAVED_IMAGES))?;
        tracing::info!(requested = params.image_ids.len(), removed, "saved images deleted");
        Ok(())
    }
}

/// Moves trashed card images back to the active bucket.
pub struct MoveImagesToImagePackageHandler {
    images: Arc<dyn ImageService>,
}

impl MoveImagesToImagePackageHandler {
    pub fn new(images: Arc<dyn ImageService>) -> Self {
        Self { images }
    }
}

#[async_trait]
impl CompensationHandler for MoveImagesToImagePackageHandler {
    fn rollback_type(&self) -> &'static str {
        MOVE_IMAGES_TO_IMAGE_PACKAGE
    }

    async fn compensate(&self, params: &RollbackParams) -> Result<(), CompensationError> {
        let params: ImageIdsParams = decode_params(MOVE_IMAGES_TO_IMAGE_PACKAGE, params)?;
        let moved = self
            .images
            .restore_from_trash(&params.image_ids)
            .await
            .map_err(remote(MOVE_IMAGES_TO_IMAGE_PACKAGE))?;
        tracing::info!(moved = moved.len(), "images restored from trash");
        Ok(())
    }
}

/// Re-links a card to its owner.
pub struct CardAndUserLinkHandler {
    identity: Arc<dyn IdentityService>,
}

impl CardAndUserLinkHandler {
    pub fn new(identity: Arc<dyn IdentityService>) -> Self {
        Self { identity }
    }
}

#[async_trait]
impl CompensationHandler for CardAndUserLinkHandler {
    fn rollback_type(&self) -> &'static str {
        CARD_AND_USER_LINK
    }

    async fn compensate(&self, params: &RollbackParams) -> Result<(), CompensationError> {
        let params: CardLinkParams = decode_params(CARD_AND_USER_LINK, params)?;
        self.identity
            .link_card(params.user_id, params.card_id)
            .await
            .map_err(remote(CARD_AND_USER_LINK))
    }
}

/// Removes a link made by a creation that failed afterwards.
pub struct UnlinkCardFromUserHandler {
    identity: Arc<dyn IdentityService>,
}

impl UnlinkCardFromUserHandler {
    pub fn new(identity: Arc<dyn IdentityService>) -> Self {
        Self { identity }
    }
}

#[async_trait]
impl CompensationHandler for UnlinkCardFromUserHandler {
    fn rollback_type(&self) -> &'static str {
        UNLINK_CARD_FROM_USER
    }

    async fn compensate(&self, params: &RollbackParams) -> Result<(), CompensationError> {
        let params: CardLinkParams = decode_params(UNLINK_CARD_FROM_USER, params)?;
        self.identity
            .unlink_card(params.user_id, params.card_id)
            .await
            .map(|_| ())
            .map_err(remote(UNLINK_CARD_FROM_USER))
    }
}

/// Re-inserts comments deleted with a card.
pub struct RestoreDeletedCommentsHandler {
    comments: Arc<dyn CommentService>,
}

impl RestoreDeletedCommentsHandler {
    pub fn new(comments: Arc<dyn CommentService>) -> Self {
        Self { comments }
    }
}

#[async_trait]
impl CompensationHandler for RestoreDeletedCommentsHandler {
    fn rollback_type(&self) -> &'static str {
        RESTORE_DELETED_COMMENTS
    }

    async fn compensate(&self, params: &RollbackParams) -> Result<(), CompensationError> {
        let params: CommentsParams = decode_params(RESTORE_DELETED_COMMENTS, params)?;
        let inserted = self
            .comments
            .restore(&params.comments)
            .await
            .map_err(remote(RESTORE_DELETED_COMMENTS))?;
        tracing::info!(inserted, "deleted comments restored");
        Ok(())
    }
}

/// Moves a trashed profile image back to the active bucket.
pub struct RestoreProfileImageHandler {
    images: Arc<dyn ImageService>,
}

impl RestoreProfileImageHandler {
    pub fn new(images: Arc<dyn ImageService>) -> Self {
        Self { images }
    }
}

#[async_trait]
impl CompensationHandler for RestoreProfileImageHandler {
    fn rollback_type(&self) -> &'static str {
        RESTORE_PROFILE_IMAGE
    }

    async fn compensate(&self, params: &RollbackParams) -> Result<(), CompensationError> {
        let params: ProfileImageParams = decode_params(RESTORE_PROFILE_IMAGE, params)?;
        self.images
            .restore_from_trash(&[params.image_id])
            .await
            .map(|_| ())
            .map_err(remote(RESTORE_PROFILE_IMAGE))
    }
}

/// Adds every handler of this crate to `builder`.
pub fn register_all(
    builder: HandlerRegistryBuilder,
    services: &Services,
) -> rollback::Result<HandlerRegistryBuilder> {
    builder
        .register(DeleteSavedImagesHandler::new(services.images.clone()))?
        .register(MoveImagesToImagePackageHandler::new(services.images.clone()))?
        .register(CardAndUserLinkHandler::new(services.identity.clone()))?
        .register(UnlinkCardFromUserHandler::new(services.identity.clone()))?
        .register(RestoreDeletedCommentsHandler::new(services.comments.clone()))?
        .register(RestoreProfileImageHandler::new(services.images.clone()))
}

/// Builds the registry of every handler of this crate.
pub fn registry(services: &Services) -> rollback::Result<HandlerRegistry> {
    Ok(register_all(HandlerRegistry::builder(), services)?.build())
}
