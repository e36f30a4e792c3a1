//! Health and metrics endpoints.
//!
//! These endpoints are used by load balancers and monitoring systems.

use crate::state::AppState;
use axum::{extract::State, http::StatusCode};

/// Liveness probe. Does not check the database.
///
/// ```text
/// GET /health
/// ```
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// Prometheus exposition.
///
/// ```text
/// GET /metrics
/// ```
///
/// `404` when metrics are disabled.
#[allow(clippy::unused_async)]
pub async fn metrics(State(state): State<AppState>) -> (StatusCode, String) {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::NOT_FOUND, "metrics disabled".to_string()),
    }
}
