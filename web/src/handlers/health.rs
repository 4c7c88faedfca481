//! Liveness, readiness and metrics endpoints.

use crate::state::AppState;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: &'static str,
    /// Service version
    pub version: &'static str,
}

/// `GET /health`: the process is up. Does not touch the store.
#[allow(clippy::unused_async)] // Axum handler signature requires async
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Readiness check response.
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    /// Whether the store answered
    pub ready: bool,
    /// Open-class spaces free right now
    pub open_free: Option<u32>,
}

/// `GET /ready`: the store answers a counter read.
pub async fn readiness_check(
    State(state): State<AppState>) -> (StatusCode, Json<ReadinessResponse>,
) {
    match state.store.occupancy().await {
        Ok(occupancy) => (
            StatusCode::OK,
            Json(ReadinessResponse {
                ready: true,
                open_free: Some(occupancy.open_free()),
            }),
        ),
        Err(error) => {
            tracing::warn!(error = %error, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ReadinessResponse {
                    ready: false,
                    open_free: None,
                }),
            )
        }
    }
}

/// `GET /metrics`: Prometheus text exposition, 404 when metrics are disabled.
#[allow(clippy::unused_async)] // Axum handler signature requires async
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    match state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::NOT_FOUND, "metrics disabled".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn health_reports_version() {
        let Json(body) = health_check().await;
        assert_eq!(body.status, "ok");
        assert_eq!(body.version, env!("CARGO_PKG_VERSION"));
    }
}
