//! Rollback command model.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::CompensationError;

/// Ordered parameter map of a command. Its schema belongs to the handler.
pub type RollbackParams = BTreeMap<String, serde_json::Value>;

/// Instruction to undo one durable effect of a failed saga.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackCommand {
    /// Discriminator used to find the handler.
    pub rollback_type: String,
    #[serde(default)]
    pub params: RollbackParams,
    pub created_at: DateTime<Utc>,
}

impl RollbackCommand {
    /// Creates a command from a raw parameter map.
    pub fn new(rollback_type: impl Into<String>, params: RollbackParams) -> Self {
        Self {
            rollback_type: rollback_type.into(),
            params,
            created_at: Utc::now(),
        }
    }

    /// Creates a command from a typed params struct.
    ///
    /// `params` must serialize to a JSON object.
    pub fn with_params<P: Serialize>(
        rollback_type: impl Into<String>,
        params: &P,
    ) -> serde_json::Result<Self> {
        let map = match serde_json::to_value(params)? {
            serde_json::Value::Object(map) => map.into_iter().collect(),
            other => {
                return Err(<serde_json::Error as serde::ser::Error>::custom(format!(
                    "rollback params must be an object, got {other}"
                )));
            }
        };
        Ok(Self::new(rollback_type, map))
    }

    /// Decodes the params into the handler's typed schema.
    pub fn decode_params<P: DeserializeOwned>(&self) -> Result<P, CompensationError> {
        decode_params(&self.rollback_type, &self.params)
    }
}

/// Decodes a raw parameter map into a typed schema.
pub fn decode_params<P: DeserializeOwned>(
    rollback_type: &str,
    params: &RollbackParams,
) -> Result<P, CompensationError> {
    let object: serde_json::Map<String, serde_json::Value> =
        params.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    serde_json::from_value(serde_json::Value::Object(object)).map_err(|source| {
        CompensationError::InvalidParams {
            rollback_type: rollback_type.to_string(),
            source,
        }
    })
}
