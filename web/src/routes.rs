//! Router configuration.

use crate::handlers::{assignments, health, holders, incidents, reports, spaces, websocket};
use crate::state::AppState;
use axum::{
    Router,
    http::HeaderValue,
    routing::{get, post, put},
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Builds the complete router over `state`, answering browser requests from
/// `cors_origins`.
pub fn build_router(state: AppState, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/metrics", get(health::metrics))
        // Spaces
        .route("/spaces", get(spaces::list_spaces).post(spaces::create_space))
        .route("/spaces/available", get(spaces::available_spaces))
        .route("/spaces/:id", get(spaces::get_space))
        .route("/spaces/:id/class", put(spaces::set_space_class))
        .route("/spaces/:id/release", put(spaces::release_space))
        // Assignments
        .route("/assignments", post(assignments::request_assignment))
        .route("/assignments/active", get(assignments::active_assignments))
        .route("/assignments/:id", get(assignments::get_assignment))
        .route("/assignments/:id/release", put(assignments::release_assignment))
        // Incidents
        .route(
            "/incidents",
            get(incidents::list_incidents).post(incidents::report_incident),
        )
        .route("/incidents/:id", get(incidents::get_incident))
        .route("/incidents/:id/resolve", put(incidents::resolve_incident))
        // Reservation holders
        .route(
            "/holders",
            get(holders::list_holders).post(holders::register_holder),
        )
        .route(
            "/holders/:key",
            get(holders::get_holder)
                .put(holders::rename_holder)
                .delete(holders::remove_holder),
        )
        // Reports
        .route("/reports/statistics", get(reports::statistics))
        // Event stream
        .route("/ws", get(websocket::handle))
        .layer(cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// CORS policy for `origins`. A `*` entry allows any origin; entries that are
/// not valid header values are skipped.
#[must_use]
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.iter().any(|origin| origin == "*") {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(allowed))
}
