use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::warn;

use crate::AppState;
use crate::metrics;

/// Health check endpoint - returns server and engine link status
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.metrics.snapshot();

    let status = if snapshot.errors.persistence == 0 && snapshot.errors.websocket == 0 {
        "healthy"
    } else {
        "degraded"
    };

    Json(metrics::HealthStatus {
        status: status.to_string(),
        link: state.session.link_state().await,
        connections: snapshot.connections.active,
        uptime_secs: snapshot.uptime_secs,
    })
}

/// Metrics endpoint - runtime counters plus ledger totals
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let database = match state.db.get_stats().await {
        Ok(stats) => Some(stats),
        Err(e) => {
            warn!("Failed to read database stats: {:#}", e);
            None
        }
    };

    Json(serde_json::json!({
        "server": state.metrics.snapshot(),
        "database": database,
    }))
}

/// Liveness probe - returns 200 if the server is running
pub async fn health_live_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "alive" }))
}

/// Readiness probe - returns 200 if the server is ready to accept requests
pub async fn health_ready_handler(State(state): State<AppState>) -> Response {
    let db_ok = state.db.pool.acquire().await.is_ok();

    if db_ok {
        Json(serde_json::json!({
            "status": "ready",
            "database": "connected"
        }))
        .into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "not_ready",
                "database": "disconnected"
            })),
        )
            .into_response()
    }
}
