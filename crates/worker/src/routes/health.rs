//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::AdminState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub queues: Vec<String>,
    pub rollback_types: Vec<String>,
    pub projections: usize,
}

/// GET /health: reports the consumed queues and registered handlers.
pub async fn check(State(state): State<Arc<AdminState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        queues: state.queues.clone(),
        rollback_types: state.rollback_types.clone(),
        projections: state.projections,
    })
}
