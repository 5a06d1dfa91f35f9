//! Shared identifiers and aggregate records used across the workspace.

pub mod model;
pub mod types;

pub use model::{Card, Comment, UserProfile};
pub use types::{EntityId, MessageId, ResourceId};
