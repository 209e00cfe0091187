//! Axum router construction for the Observer API.
//!
//! Assembles all routes (REST + control + `WebSocket`) into a single
//! [`Router`] with CORS middleware enabled for cross-origin dashboard
//! access.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::operator;
use crate::state::AppState;
use crate::ws;

/// Build the complete Axum router for the Observer server.
///
/// The router includes:
/// - `GET /` -- minimal HTML status page
/// - `GET /ws/steps` -- `WebSocket` step summary stream
/// - `GET /api/snapshot` -- the full published snapshot
/// - `GET /api/vehicles` -- current vehicle set
/// - `GET /api/lights` -- current light heads
/// - `GET /api/metrics` -- current derived metrics
/// - `GET /api/export` -- serialized snapshot export
/// - `POST /api/control/*` -- control requests (connect, disconnect,
///   start, stop, speed, light override, clear-error)
/// - `GET /api/control/status` -- control status
///
/// CORS is configured to allow any origin for development. In
/// production this should be restricted.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Status page
        .route("/", get(handlers::index))
        // WebSocket
        .route("/ws/steps", get(ws::ws_steps))
        // Snapshot REST API
        .route("/api/snapshot", get(handlers::get_snapshot))
        .route("/api/vehicles", get(handlers::list_vehicles))
        .route("/api/lights", get(handlers::list_lights))
        .route("/api/metrics", get(handlers::get_metrics))
        .route("/api/export", get(handlers::export))
        // Control API
        .route("/api/control/connect", post(operator::connect))
        .route("/api/control/disconnect", post(operator::disconnect))
        .route("/api/control/start", post(operator::start))
        .route("/api/control/stop", post(operator::stop))
        .route("/api/control/speed", post(operator::set_speed))
        .route("/api/control/lights/{id}", post(operator::override_light))
        .route("/api/control/clear-error", post(operator::clear_error))
        .route("/api/control/status", get(operator::status))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
