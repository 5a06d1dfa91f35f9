//! Projection event model.

use std::fmt;

use chrono::{DateTime, Utc};
use common::EntityId;
use serde::{Deserialize, Serialize};

/// Kind of committed mutation an event mirrors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl Operation {
    /// All operations, one consumer queue each.
    pub const ALL: [Operation; 3] = [Operation::Create, Operation::Update, Operation::Delete];

    /// Returns the queue carrying events of this operation.
    pub fn queue(&self) -> &'static str {
        match self {
            Operation::Create => "projection.create",
            Operation::Update => "projection.update",
            Operation::Delete => "projection.delete",
        }
    }

    /// Returns the operation as a lowercase label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time record of a committed mutation.
///
/// `Create` carries a full snapshot, `Update` a partial patch and `Delete`
/// only the identity (its payload is `null`). The payload is taken at commit
/// time and never changes afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionEvent {
    pub entity_id: EntityId,
    pub entity_type: String,
    pub operation: Operation,
    #[serde(default)]
    pub payload: serde_json::Value,
    pub committed_at: DateTime<Utc>,
}

impl ProjectionEvent {
    /// Full snapshot of a newly created entity.
    pub fn create(
        entity_type: impl Into<String>,
        entity_id: EntityId,
        snapshot: serde_json::Value,
    ) -> Self {
        Self::new(entity_type, entity_id, Operation::Create, snapshot)
    }

    /// Partial patch of an existing entity.
    pub fn update(
        entity_type: impl Into<String>,
        entity_id: EntityId,
        patch: serde_json::Value,
    ) -> Self {
        Self::new(entity_type, entity_id, Operation::Update, patch)
    }

    /// Removal of an entity.
    pub fn delete(entity_type: impl Into<String>, entity_id: EntityId) -> Self {
        Self::new(
            entity_type,
            entity_id,
            Operation::Delete,
            serde_json::Value::Null,
        )
    }

    fn new(
        entity_type: impl Into<String>,
        entity_id: EntityId,
        operation: Operation,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            entity_id,
            entity_type: entity_type.into(),
            operation,
            payload,
            committed_at: Utc::now(),
        }
    }

    /// Checks that the payload has the shape its operation requires.
    pub fn validate(&self) -> std::result::Result<(), String> {
        match self.operation {
            Operation::Create | Operation::Update if !self.payload.is_object() => Err(format!(
                "{} event for {} must carry an object payload",
                self.operation, self.entity_id
            )),
            _ => Ok(()),
        }
    }
}
