//! Sibling service traits and in-memory implementations for saga steps.

pub mod cards;
pub mod comments;
pub mod complaints;
pub mod identity;
pub mod images;

use std::sync::Arc;

pub use cards::{CardStore, InMemoryCardStore};
pub use comments::{CommentService, InMemoryCommentService};
pub use complaints::{ComplaintService, InMemoryComplaintService};
pub use identity::{IdentityService, InMemoryIdentityService};
pub use images::{ImageService, InMemoryImageService};

/// Handles to every service a saga or compensation handler may call.
#[derive(Clone)]
pub struct Services {
    pub images: Arc<dyn ImageService>,
    pub identity: Arc<dyn IdentityService>,
    pub comments: Arc<dyn CommentService>,
    pub complaints: Arc<dyn ComplaintService>,
    pub cards: Arc<dyn CardStore>,
}

/// In-memory services plus typed handles to drive their failure toggles.
#[derive(Clone, Default)]
pub struct InMemoryServices {
    pub images: InMemoryImageService,
    pub identity: InMemoryIdentityService,
    pub comments: InMemoryCommentService,
    pub complaints: InMemoryComplaintService,
    pub cards: InMemoryCardStore,
}

impl InMemoryServices {
    /// Creates empty services.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns type-erased handles sharing the same state.
    pub fn handles(&self) -> Services {
        Services {
            images: Arc::new(self.images.clone()),
            identity: Arc::new(self.identity.clone()),
            comments: Arc::new(self.comments.clone()),
            complaints: Arc::new(self.complaints.clone()),
            cards: Arc::new(self.cards.clone()),
        }
    }
}
