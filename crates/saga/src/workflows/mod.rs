//! Saga-backed card and user operations.
//!
//! Each operation runs its remote steps through the [`CompensationDispatcher`],
//! then publishes projection events and invalidates the cache. Those follow-up
//! effects are best effort: the primary mutation already happened, so their
//! failures are logged, not returned.

pub mod card;
pub mod user;

use std::sync::Arc;

use bus::MessageBus;
use cache::keys::CARDS_PAGINATION_TAG;
use cache::{CacheIndex, CacheStore};
use projections::{ProjectionEvent, ProjectionPublisher};
use rollback::BusRollbackEmitter;

use crate::dispatcher::CompensationDispatcher;
use crate::services::Services;

pub use card::{CardPatch, MAX_CARD_IMAGES, NewCard};

/// Entity type of cards in projection events.
pub const CARD_ENTITY: &str = "card";

/// Prefix of single-card cache keys.
pub const CARD_KEY_PREFIX: &str = "card";

/// Entry point for the card and user sagas.
#[derive(Clone)]
pub struct Workflows<B: MessageBus + 'static, C: CacheStore> {
    services: Services,
    cache: CacheIndex<C>,
    projections: ProjectionPublisher<B>,
    dispatcher: Arc<CompensationDispatcher<BusRollbackEmitter<B>>>,
}

impl<B: MessageBus + Clone + 'static, C: CacheStore> Workflows<B, C> {
    /// Creates the workflows. Rollback commands and projection events are
    /// both published on `bus`.
    pub fn new(services: Services, cache: CacheIndex<C>, bus: B) -> Self {
        Self {
            services,
            cache,
            projections: ProjectionPublisher::new(bus.clone()),
            dispatcher: Arc::new(CompensationDispatcher::new(BusRollbackEmitter::new(bus))),
        }
    }

    /// Returns the service handles.
    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Returns the cache index.
    pub fn cache(&self) -> &CacheIndex<C> {
        &self.cache
    }

    /// Returns the dispatcher, mostly to [`flush`](CompensationDispatcher::flush) it.
    pub fn dispatcher(&self) -> &Arc<CompensationDispatcher<BusRollbackEmitter<B>>> {
        &self.dispatcher
    }

    async fn project(&self, event: ProjectionEvent) {
        if let Err(error) = self.projections.emit_projection(&event).await {
            tracing::error!(
                entity_id = %event.entity_id,
                operation = %event.operation,
                %error,
                "failed to publish projection event"
            );
        }
    }

    async fn invalidate_listings(&self) {
        if let Err(error) = self.cache.invalidate_tag(CARDS_PAGINATION_TAG).await {
            tracing::warn!(%error, "failed to invalidate card listings");
        }
    }

    async fn evict(&self, keys: &[String]) {
        if let Err(error) = self.cache.invalidate(keys).await {
            tracing::warn!(?keys, %error, "failed to evict cache keys");
        }
    }
}
