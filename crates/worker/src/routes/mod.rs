//! Admin endpoints.

pub mod health;
pub mod metrics;
