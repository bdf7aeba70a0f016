//! Operator HTTP surface: health, queue stats and metrics.

use std::collections::BTreeMap;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::error;

use bigfoot_queue::{QueueCounts, QueueManager};

/// Shared admin state.
#[derive(Clone)]
pub struct AdminState {
    pub manager: QueueManager,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Liveness check. Reports 503 once shutdown has begun.
pub async fn health(State(state): State<AdminState>) -> (StatusCode, Json<HealthResponse>) {
    let (code, status) = if state.manager.is_shutting_down() {
        (StatusCode::SERVICE_UNAVAILABLE, "shutting_down")
    } else {
        (StatusCode::OK, "healthy")
    };

    (
        code,
        Json(HealthResponse {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: Utc::now().to_rfc3339(),
        }),
    )
}

/// Per-queue waiting/active/completed/failed counts.
pub async fn queue_stats(
    State(state): State<AdminState>,
) -> Result<Json<BTreeMap<String, QueueCounts>>, (StatusCode, Json<ErrorResponse>)> {
    state.manager.get_queue_stats().await.map(Json).map_err(|e| {
        error!(error = %e, "Failed to read queue stats");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: e.to_string(),
            }),
        )
    })
}

/// Create the admin router.
pub fn create_router(state: AdminState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .route("/health", get(health))
        .route("/api/queues/stats", get(queue_stats))
        .with_state(state)
        .merge(metrics_routes)
        .layer(TraceLayer::new_for_http())
}
