//! Background worker for the rollback and projection queues.
//!
//! Runs one consumer per queue and serves an admin router with health and
//! Prometheus metrics, with structured logging (tracing).

pub mod config;
pub mod error;
pub mod routes;
pub mod runtime;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::trace::TraceLayer;

pub use config::{Config, LogFormat};
pub use error::{Result, WorkerError};
pub use runtime::{ConsumerSet, Pipeline, Runtime};

/// What the health endpoint reports.
#[derive(Debug, Clone, Default)]
pub struct AdminState {
    pub queues: Vec<String>,
    pub rollback_types: Vec<String>,
    pub projections: usize,
}

/// Creates the admin router.
pub fn create_app(state: Arc<AdminState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .with_state(state)
        .merge(metrics_router)
        .layer(TraceLayer::new_for_http())
}
