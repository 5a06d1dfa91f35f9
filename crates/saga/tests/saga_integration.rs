//! End-to-end saga scenarios: forward steps, emitted rollback commands and
//! their replay through the rollback consumer.

use std::sync::Arc;
use std::time::Duration;

use bus::{ConsumeOutcome, Consumer, InMemoryBus, RetryPolicy};
use cache::keys::{CARDS_PAGINATION_TAG, SearchKey, entity_key, page_key, profile_key};
use cache::{CacheIndex, CacheStore, InMemoryCacheStore};
use common::{Card, Comment, EntityId, ResourceId, UserProfile};
use projections::{Operation, ProjectionEvent};
use rollback::{
    BusRollbackEmitter, ROLLBACK_QUEUE, RollbackCommand, RollbackConsumer, RollbackEmitter,
};
use saga::handlers::{
    self, CARD_AND_USER_LINK, DELETE_SAVED_IMAGES, MOVE_IMAGES_TO_IMAGE_PACKAGE,
    RESTORE_DELETED_COMMENTS, RESTORE_PROFILE_IMAGE, UNLINK_CARD_FROM_USER,
};
use saga::services::{CardStore, IdentityService};
use saga::{
    CardPatch, InMemoryServices, MAX_CARD_IMAGES, NewCard, SagaError, SagaState, Workflows,
};

const OWNER: EntityId = EntityId::new(1);

struct TestHarness {
    services: InMemoryServices,
    cache: InMemoryCacheStore,
    bus: InMemoryBus,
    workflows: Workflows<InMemoryBus, InMemoryCacheStore>,
    rollbacks: Consumer<InMemoryBus, RollbackConsumer>,
}

impl TestHarness {
    fn new() -> Self {
        let services = InMemoryServices::new();
        services.identity.insert_user(UserProfile {
            id: OWNER,
            name: "alice".into(),
            profile_image_id: None,
            card_ids: Vec::new(),
        });

        let cache = InMemoryCacheStore::new();
        let bus = InMemoryBus::new();
        let registry = handlers::registry(&services.handles()).unwrap();
        let workflows = Workflows::new(
            services.handles(),
            CacheIndex::new(cache.clone()),
            bus.clone(),
        );
        let rollbacks = Consumer::new(
            bus.clone(),
            RollbackConsumer::new(Arc::new(registry)),
            RetryPolicy::unlimited(Duration::ZERO),
        );

        Self {
            services,
            cache,
            bus,
            workflows,
            rollbacks,
        }
    }

    /// Waits for emission and returns the queued rollback commands.
    async fn queued_rollbacks(&self) -> Vec<RollbackCommand> {
        self.workflows.dispatcher().flush().await;
        self.bus
            .peek(ROLLBACK_QUEUE)
            .await
            .iter()
            .map(|m| m.decode().unwrap())
            .collect()
    }

    async fn queued_projections(&self, operation: Operation) -> Vec<ProjectionEvent> {
        self.bus
            .peek(operation.queue())
            .await
            .iter()
            .map(|m| m.decode().unwrap())
            .collect()
    }

    async fn seed_card(&self, id: i64, image_ids: &[i64]) -> Card {
        self.seed_owned_card(OWNER, id, image_ids).await
    }

    async fn seed_owned_card(&self, owner: EntityId, id: i64, image_ids: &[i64]) -> Card {
        let card = Card {
            id: EntityId::new(id),
            owner_id: owner,
            title: format!("card {id}"),
            text: "for sale".into(),
            tags: vec!["sport".into()],
            image_ids: image_ids.iter().map(|i| ResourceId::new(*i)).collect(),
            created_at: chrono::Utc::now().date_naive(),
        };
        for image_id in &card.image_ids {
            self.services.images.seed(*image_id);
        }
        self.services.cards.save(&card).await.unwrap();
        self.services
            .identity
            .link_card(owner, card.id)
            .await
            .unwrap();
        card
    }

    fn insert_user(&self, id: EntityId, name: &str, profile_image_id: Option<ResourceId>) {
        if let Some(image) = profile_image_id {
            self.services.images.seed(image);
        }
        self.services.identity.insert_user(UserProfile {
            id,
            name: name.into(),
            profile_image_id,
            card_ids: Vec::new(),
        });
    }
}

fn new_card(images: usize) -> NewCard {
    NewCard {
        owner_id: OWNER,
        title: "Red bike".into(),
        text: "Barely used".into(),
        tags: vec!["sport".into()],
        image_files: (0..images).map(|i| format!("photo{i}.png")).collect(),
    }
}

fn types(commands: &[RollbackCommand]) -> Vec<&str> {
    let mut types: Vec<&str> = commands.iter().map(|c| c.rollback_type.as_str()).collect();
    types.sort_unstable();
    types
}

#[tokio::test]
async fn test_create_card_success() {
    let harness = TestHarness::new();

    let card = harness.workflows.create_card(new_card(2)).await.unwrap();

    assert_eq!(card.image_ids, vec![ResourceId::new(101), ResourceId::new(102)]);
    assert!(harness.services.cards.contains(card.id));
    assert_eq!(harness.services.identity.linked_cards(OWNER), vec![card.id]);
    assert!(harness.queued_rollbacks().await.is_empty());

    let created = harness.queued_projections(Operation::Create).await;
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].entity_id, card.id);
    assert_eq!(created[0].payload["imageIds"], serde_json::json!([101, 102]));
}

#[tokio::test]
async fn test_link_failure_deletes_uploaded_images() {
    let harness = TestHarness::new();
    harness.services.identity.set_fail_on_link(true);

    let error = harness.workflows.create_card(new_card(2)).await.unwrap_err();

    assert_eq!(error.failed_step(), Some("link_owner"));
    assert_eq!(error.saga_state(), SagaState::CompensatingAsync);
    assert!(matches!(
        error,
        SagaError::RemoteStep {
            compensations: 1,
            ..
        }
    ));
    assert_eq!(harness.services.cards.count(), 0);

    let commands = harness.queued_rollbacks().await;
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0].rollback_type, DELETE_SAVED_IMAGES);
    assert_eq!(commands[0].params["imageIds"], serde_json::json!([101, 102]));

    // Nothing is undone until the rollback consumer runs.
    assert!(harness.services.images.is_active(ResourceId::new(101)));

    let outcomes = harness.rollbacks.drain().await.unwrap();
    assert_eq!(outcomes, vec![ConsumeOutcome::Acked]);
    assert!(harness.services.images.is_gone(ResourceId::new(101)));
    assert!(harness.services.images.is_gone(ResourceId::new(102)));

    // A redelivered command finds nothing left to undo.
    BusRollbackEmitter::new(harness.bus.clone())
        .emit(commands[0].clone())
        .await
        .unwrap();
    let outcomes = harness.rollbacks.drain().await.unwrap();
    assert_eq!(outcomes, vec![ConsumeOutcome::Acked]);
    assert_eq!(harness.services.images.active_count(), 0);
}

#[tokio::test]
async fn test_save_failure_compensates_upload_and_link() {
    let harness = TestHarness::new();
    harness.services.cards.set_fail_on_save(true);

    let error = harness.workflows.create_card(new_card(1)).await.unwrap_err();
    assert_eq!(error.failed_step(), Some("save_card"));

    let commands = harness.queued_rollbacks().await;
    assert_eq!(
        types(&commands),
        vec![DELETE_SAVED_IMAGES, UNLINK_CARD_FROM_USER]
    );

    harness.rollbacks.drain().await.unwrap();
    assert!(harness.services.identity.linked_cards(OWNER).is_empty());
    assert_eq!(harness.services.images.active_count(), 0);
}

#[tokio::test]
async fn test_invalid_card_is_rejected_without_side_effects() {
    let harness = TestHarness::new();
    let mut card = new_card(2);
    card.title = "   ".into();

    let error = harness.workflows.create_card(card).await.unwrap_err();

    assert!(matches!(error, SagaError::Validation(_)));
    assert_eq!(error.saga_state(), SagaState::Failed);
    assert_eq!(harness.services.images.active_count(), 0);
    assert!(harness.queued_rollbacks().await.is_empty());
}

#[tokio::test]
async fn test_delete_card_invalidates_entity_and_listings() {
    let harness = TestHarness::new();
    let card = harness.seed_card(42, &[]).await;
    let card_key = entity_key("card", card.id);
    let page = page_key(0, 5);

    harness.workflows.get_card(card.id).await.unwrap();
    let listed = harness.workflows.list_cards(0, 5).await.unwrap();
    assert_eq!(listed, vec![card.clone()]);
    assert_eq!(card_key, "card42");
    assert!(harness.cache.exists(&card_key).await.unwrap());
    assert!(harness.cache.exists(&page).await.unwrap());

    harness.workflows.delete_card(card.id).await.unwrap();

    assert!(!harness.cache.exists(&card_key).await.unwrap());
    assert!(!harness.cache.exists(&page).await.unwrap());
    assert!(!harness.cache.has_set(CARDS_PAGINATION_TAG).await);
    assert!(!harness.services.cards.contains(card.id));
    assert!(harness.services.identity.linked_cards(OWNER).is_empty());

    let deleted = harness.queued_projections(Operation::Delete).await;
    assert_eq!(deleted.len(), 1);
    assert_eq!(deleted[0].entity_id, card.id);

    // The next read rebuilds the page from the store.
    assert!(harness.workflows.list_cards(0, 5).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_card_failure_restores_prior_steps() {
    let harness = TestHarness::new();
    let card = harness.seed_card(7, &[11, 12]).await;
    let comment = Comment {
        id: ResourceId::new(900),
        card_id: card.id,
        author_id: EntityId::new(2),
        text: "still available?".into(),
    };
    harness.services.comments.insert(comment.clone());
    harness.services.complaints.file(card.id, EntityId::new(3));
    harness.services.identity.add_favorite(EntityId::new(2), card.id);
    harness.services.images.set_fail_on_delete(true);

    let error = harness.workflows.delete_card(card.id).await.unwrap_err();
    assert_eq!(error.failed_step(), Some("purge_images"));

    let commands = harness.queued_rollbacks().await;
    assert_eq!(
        types(&commands),
        vec![
            CARD_AND_USER_LINK,
            MOVE_IMAGES_TO_IMAGE_PACKAGE,
            RESTORE_DELETED_COMMENTS,
        ]
    );
    assert!(harness.services.images.is_trashed(ResourceId::new(11)));

    let outcomes = harness.rollbacks.drain().await.unwrap();
    assert_eq!(outcomes.len(), 3);
    assert!(outcomes.iter().all(|o| *o == ConsumeOutcome::Acked));

    assert!(harness.services.cards.contains(card.id));
    assert_eq!(harness.services.identity.linked_cards(OWNER), vec![card.id]);
    assert!(harness.services.images.is_active(ResourceId::new(11)));
    assert!(harness.services.images.is_active(ResourceId::new(12)));
    assert_eq!(harness.services.comments.comments_for(card.id), vec![comment]);
    // Complaints and favorites have no compensation.
    assert_eq!(harness.services.complaints.count(), 0);
    assert!(!harness.services.identity.is_favorite_anywhere(card.id));
}

#[tokio::test]
async fn test_delete_missing_card() {
    let harness = TestHarness::new();

    let error = harness
        .workflows
        .delete_card(EntityId::new(404))
        .await
        .unwrap_err();

    assert!(matches!(error, SagaError::NotFound { entity: "card", .. }));
    assert!(harness.queued_rollbacks().await.is_empty());
}

#[tokio::test]
async fn test_patch_card_skips_blank_fields_and_evicts() {
    let harness = TestHarness::new();
    let card = harness.seed_card(5, &[]).await;
    let index = harness.workflows.cache();
    index.put(&profile_key("alice"), &"cached profile").await.unwrap();
    harness.workflows.get_card(card.id).await.unwrap();
    harness.workflows.list_cards(0, 5).await.unwrap();

    let patched = harness
        .workflows
        .patch_card(
            card.id,
            CardPatch {
                title: Some(String::new()),
                text: Some("Price lowered".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(patched.title, card.title);
    assert_eq!(patched.text, "Price lowered");
    assert!(!harness.cache.exists(&entity_key("card", card.id)).await.unwrap());
    assert!(!harness.cache.exists(&profile_key("alice")).await.unwrap());
    assert!(!harness.cache.has_set(CARDS_PAGINATION_TAG).await);

    let updates = harness.queued_projections(Operation::Update).await;
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].payload["text"], "Price lowered");
    assert_eq!(updates[0].payload["title"], "");

    let reloaded = harness.workflows.get_card(card.id).await.unwrap();
    assert_eq!(reloaded.text, "Price lowered");
}

#[tokio::test]
async fn test_empty_patch_is_a_validation_error() {
    let harness = TestHarness::new();
    let card = harness.seed_card(5, &[]).await;

    let error = harness
        .workflows
        .patch_card(card.id, CardPatch::default())
        .await
        .unwrap_err();

    assert!(matches!(error, SagaError::Validation(_)));
    assert!(harness.queued_projections(Operation::Update).await.is_empty());
}

#[tokio::test]
async fn test_search_results_are_tagged() {
    let harness = TestHarness::new();
    harness.seed_card(1, &[]).await;
    let mut other = harness.seed_card(2, &[]).await;
    other.title = "Garden chair".into();
    other.tags = vec!["home".into()];
    harness.services.cards.save(&other).await.unwrap();

    let tags = vec!["sport".to_string()];
    let search = SearchKey {
        query: "CARD",
        page: 0,
        limit: 10,
        created_on: None,
        tags: &tags,
    };
    let found = harness.workflows.search_cards(&search).await.unwrap();

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, EntityId::new(1));
    assert!(harness.cache.exists(&search.to_key()).await.unwrap());
    assert!(harness.cache.has_set(CARDS_PAGINATION_TAG).await);
}

#[tokio::test]
async fn test_delete_user_removes_cards_and_profile_image() {
    let harness = TestHarness::new();
    let user = EntityId::new(2);
    let image = ResourceId::new(55);
    harness.insert_user(user, "bob", Some(image));
    harness.seed_owned_card(user, 20, &[]).await;
    harness.seed_owned_card(user, 21, &[]).await;
    harness.services.complaints.file(EntityId::new(99), user);

    harness.workflows.delete_user(user).await.unwrap();

    assert!(!harness.services.identity.has_user(user));
    assert!(harness.services.images.is_gone(image));
    assert_eq!(harness.services.cards.count(), 0);
    assert_eq!(harness.services.complaints.count(), 0);
    assert_eq!(harness.queued_projections(Operation::Delete).await.len(), 2);
    assert!(harness.queued_rollbacks().await.is_empty());
}

#[tokio::test]
async fn test_delete_user_removes_card_images_and_comments() {
    let harness = TestHarness::new();
    let user = EntityId::new(2);
    harness.insert_user(user, "bob", None);
    let card = harness.seed_owned_card(user, 30, &[71, 72]).await;
    harness.services.comments.insert(Comment {
        id: ResourceId::new(800),
        card_id: card.id,
        author_id: OWNER,
        text: "is it still for sale?".into(),
    });
    harness.services.identity.add_favorite(OWNER, card.id);

    harness.workflows.delete_user(user).await.unwrap();

    assert!(harness.services.images.is_gone(ResourceId::new(71)));
    assert!(harness.services.images.is_gone(ResourceId::new(72)));
    assert!(harness.services.comments.comments_for(card.id).is_empty());
    assert!(!harness.services.identity.is_favorite_anywhere(card.id));
    assert!(!harness.services.cards.contains(card.id));
}

#[tokio::test]
async fn test_delete_user_failure_keeps_deleted_cards_consistent() {
    let harness = TestHarness::new();
    let user = EntityId::new(2);
    harness.insert_user(user, "bob", None);
    harness.seed_owned_card(user, 40, &[]).await;
    harness.seed_owned_card(user, 41, &[]).await;
    let page = page_key(0, 5);
    assert_eq!(harness.workflows.list_cards(0, 5).await.unwrap().len(), 2);
    assert!(harness.cache.exists(&page).await.unwrap());
    harness.services.identity.set_fail_on_delete(true);

    let error = harness.workflows.delete_user(user).await.unwrap_err();

    assert_eq!(error.failed_step(), Some("delete_user"));
    assert!(harness.services.identity.has_user(user));
    assert_eq!(harness.services.cards.count(), 0);
    let deleted: Vec<EntityId> = harness
        .queued_projections(Operation::Delete)
        .await
        .iter()
        .map(|event| event.entity_id)
        .collect();
    assert_eq!(deleted.len(), 2);
    assert!(deleted.contains(&EntityId::new(40)));
    assert!(deleted.contains(&EntityId::new(41)));
    assert!(!harness.cache.exists(&page).await.unwrap());
    assert!(harness.workflows.list_cards(0, 5).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_user_failure_restores_profile_image() {
    let harness = TestHarness::new();
    let user = EntityId::new(2);
    let image = ResourceId::new(55);
    harness.insert_user(user, "bob", Some(image));
    harness.services.complaints.set_fail_on_delete(true);

    let error = harness.workflows.delete_user(user).await.unwrap_err();
    assert_eq!(error.failed_step(), Some("delete_user_complaints"));

    let commands = harness.queued_rollbacks().await;
    assert_eq!(types(&commands), vec![RESTORE_PROFILE_IMAGE]);
    assert!(harness.services.images.is_trashed(image));

    harness.rollbacks.drain().await.unwrap();
    assert!(harness.services.images.is_active(image));
    assert!(harness.services.identity.has_user(user));
}

#[tokio::test]
async fn test_patch_card_uploads_new_images() {
    let harness = TestHarness::new();
    let card = harness.seed_card(5, &[11]).await;
    harness.workflows.get_card(card.id).await.unwrap();

    let patched = harness
        .workflows
        .patch_card(
            card.id,
            CardPatch {
                image_files: vec!["back.png".into()],
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(
        patched.image_ids,
        vec![ResourceId::new(11), ResourceId::new(101)]
    );
    assert!(harness.services.images.is_active(ResourceId::new(101)));
    assert!(!harness.cache.exists(&entity_key("card", card.id)).await.unwrap());

    let updates = harness.queued_projections(Operation::Update).await;
    assert_eq!(updates[0].payload["imageIds"], serde_json::json!([11, 101]));
    assert!(harness.queued_rollbacks().await.is_empty());
}

#[tokio::test]
async fn test_patch_card_over_image_limit_uploads_nothing() {
    let harness = TestHarness::new();
    let existing: Vec<i64> = (1..=MAX_CARD_IMAGES as i64).collect();
    let card = harness.seed_card(5, &existing).await;

    let error = harness
        .workflows
        .patch_card(
            card.id,
            CardPatch {
                text: Some("More photos".into()),
                image_files: vec!["extra.png".into()],
                ..Default::default()
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(error, SagaError::Validation(_)));
    assert_eq!(harness.services.images.active_count(), MAX_CARD_IMAGES);
    assert_eq!(
        harness.services.cards.get(card.id).await.unwrap().unwrap().text,
        card.text
    );
    assert!(harness.queued_projections(Operation::Update).await.is_empty());
}

#[tokio::test]
async fn test_patch_card_save_failure_deletes_uploaded_images() {
    let harness = TestHarness::new();
    let card = harness.seed_card(5, &[]).await;
    harness.services.cards.set_fail_on_save(true);

    let error = harness
        .workflows
        .patch_card(
            card.id,
            CardPatch {
                image_files: vec!["a.png".into(), "b.png".into()],
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(error.failed_step(), Some("save_card"));

    let commands = harness.queued_rollbacks().await;
    assert_eq!(types(&commands), vec![DELETE_SAVED_IMAGES]);
    assert_eq!(commands[0].params["imageIds"], serde_json::json!([101, 102]));

    harness.rollbacks.drain().await.unwrap();
    assert_eq!(harness.services.images.active_count(), 0);
    assert!(harness.queued_projections(Operation::Update).await.is_empty());
}

#[tokio::test]
async fn test_delete_card_image_evicts_card_and_purges_image() {
    let harness = TestHarness::new();
    let card = harness.seed_card(8, &[11, 12]).await;
    let card_key = entity_key("card", card.id);
    harness.workflows.get_card(card.id).await.unwrap();
    assert!(harness.cache.exists(&card_key).await.unwrap());

    let updated = harness
        .workflows
        .delete_card_image(card.id, ResourceId::new(11))
        .await
        .unwrap();

    assert_eq!(updated.image_ids, vec![ResourceId::new(12)]);
    assert!(harness.services.images.is_gone(ResourceId::new(11)));
    assert!(harness.services.images.is_active(ResourceId::new(12)));
    assert!(!harness.cache.exists(&card_key).await.unwrap());
    assert_eq!(
        harness.workflows.get_card(card.id).await.unwrap().image_ids,
        vec![ResourceId::new(12)]
    );

    let snapshots = harness.queued_projections(Operation::Create).await;
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].payload["imageIds"], serde_json::json!([12]));
}

#[tokio::test]
async fn test_delete_card_image_save_failure_restores_image() {
    let harness = TestHarness::new();
    let card = harness.seed_card(8, &[11]).await;
    harness.services.cards.set_fail_on_save(true);

    let error = harness
        .workflows
        .delete_card_image(card.id, ResourceId::new(11))
        .await
        .unwrap_err();
    assert_eq!(error.failed_step(), Some("save_card"));
    assert!(harness.services.images.is_trashed(ResourceId::new(11)));

    let commands = harness.queued_rollbacks().await;
    assert_eq!(types(&commands), vec![MOVE_IMAGES_TO_IMAGE_PACKAGE]);
    harness.rollbacks.drain().await.unwrap();
    assert!(harness.services.images.is_active(ResourceId::new(11)));
}

#[tokio::test]
async fn test_delete_unknown_card_image_is_rejected() {
    let harness = TestHarness::new();
    let card = harness.seed_card(8, &[11]).await;

    let error = harness
        .workflows
        .delete_card_image(card.id, ResourceId::new(99))
        .await
        .unwrap_err();

    assert!(matches!(error, SagaError::Validation(_)));
    assert!(harness.services.images.is_active(ResourceId::new(11)));
}

#[tokio::test]
async fn test_bus_outage_still_surfaces_step_failure() {
    let harness = TestHarness::new();
    harness.services.identity.set_fail_on_link(true);
    harness.bus.set_fail_on_publish(true);

    let error = harness.workflows.create_card(new_card(1)).await.unwrap_err();

    assert_eq!(error.failed_step(), Some("link_owner"));
    harness.workflows.dispatcher().flush().await;
    harness.bus.set_fail_on_publish(false);
    assert!(harness.queued_rollbacks().await.is_empty());
    // Without a delivered command the upload stays behind.
    assert!(harness.services.images.is_active(ResourceId::new(101)));
}
