//! REST API endpoint handlers for the Observer server.
//!
//! All handlers read from the in-memory [`ControlSnapshot`] via the
//! shared [`AppState`]; none of them touches the session directly.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/` | Minimal HTML status page |
//! | `GET` | `/api/snapshot` | The full published snapshot |
//! | `GET` | `/api/vehicles` | Current vehicle set |
//! | `GET` | `/api/lights` | Current light heads |
//! | `GET` | `/api/metrics` | Current derived metrics |
//! | `GET` | `/api/export` | Serialized snapshot export document |
//!
//! [`ControlSnapshot`]: crate::state::ControlSnapshot

use std::sync::Arc;

use axum::extract::State;
use axum::response::{Html, IntoResponse};
use axum::Json;

use crate::state::AppState;

// ---------------------------------------------------------------------------
// GET / -- minimal HTML status page
// ---------------------------------------------------------------------------

/// Serve a minimal HTML page showing control-plane status and API links.
pub async fn index(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.snapshot.read().await;
    let status = format!("{:?}", snapshot.connection_status);
    let running = if snapshot.running { "RUNNING" } else { "IDLE" };
    let step = snapshot.step_count;
    let vehicle_count = snapshot.vehicles.len();
    let density = format!("{:?}", snapshot.detection_density);
    let error = snapshot
        .last_error
        .as_ref()
        .map_or_else(|| String::from("none"), |e| e.message.clone());

    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <title>Greenwave Observer</title>
    <style>
        body {{
            background: #0d1117;
            color: #c9d1d9;
            font-family: 'Cascadia Code', 'Fira Code', 'Consolas', monospace;
            padding: 2rem;
            max-width: 800px;
            margin: 0 auto;
        }}
        h1 {{ color: #3fb950; margin-bottom: 0.25rem; }}
        .subtitle {{ color: #8b949e; margin-top: 0; }}
        .metric {{
            display: inline-block;
            background: #161b22;
            border: 1px solid #30363d;
            border-radius: 6px;
            padding: 1rem 1.5rem;
            margin: 0.5rem 0.5rem 0.5rem 0;
            min-width: 120px;
        }}
        .metric .label {{ color: #8b949e; font-size: 0.85rem; }}
        .metric .value {{ color: #3fb950; font-size: 1.5rem; font-weight: bold; }}
        a {{ color: #58a6ff; text-decoration: none; }}
        a:hover {{ text-decoration: underline; }}
        ul {{ list-style: none; padding: 0; }}
        li {{ padding: 0.3rem 0; }}
        li::before {{ content: "GET "; color: #7ee787; font-weight: bold; }}
        hr {{ border: none; border-top: 1px solid #30363d; margin: 1.5rem 0; }}
    </style>
</head>
<body>
    <h1>Greenwave Observer</h1>
    <p class="subtitle">Traffic signal control plane</p>

    <div>
        <div class="metric">
            <div class="label">Session</div>
            <div class="value">{status}</div>
        </div>
        <div class="metric">
            <div class="label">Scheduler</div>
            <div class="value">{running}</div>
        </div>
        <div class="metric">
            <div class="label">Step</div>
            <div class="value">{step}</div>
        </div>
        <div class="metric">
            <div class="label">Vehicles</div>
            <div class="value">{vehicle_count}</div>
        </div>
        <div class="metric">
            <div class="label">Density</div>
            <div class="value">{density}</div>
        </div>
    </div>

    <p>Last error: {error}</p>

    <hr>

    <ul>
        <li><a href="/api/snapshot">/api/snapshot</a></li>
        <li><a href="/api/vehicles">/api/vehicles</a></li>
        <li><a href="/api/lights">/api/lights</a></li>
        <li><a href="/api/metrics">/api/metrics</a></li>
        <li><a href="/api/export">/api/export</a></li>
        <li><a href="/api/control/status">/api/control/status</a></li>
        <li><a href="/ws/steps">/ws/steps</a> (WebSocket)</li>
    </ul>
</body>
</html>"#
    ))
}

// ---------------------------------------------------------------------------
// GET /api/snapshot
// ---------------------------------------------------------------------------

/// Return the full published snapshot.
pub async fn get_snapshot(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.snapshot.read().await;
    Json(snapshot.clone())
}

// ---------------------------------------------------------------------------
// GET /api/vehicles
// ---------------------------------------------------------------------------

/// Return the current vehicle set.
pub async fn list_vehicles(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.snapshot.read().await;
    Json(snapshot.vehicles.clone())
}

// ---------------------------------------------------------------------------
// GET /api/lights
// ---------------------------------------------------------------------------

/// Return the current light heads.
pub async fn list_lights(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.snapshot.read().await;
    Json(snapshot.traffic_lights.clone())
}

// ---------------------------------------------------------------------------
// GET /api/metrics
// ---------------------------------------------------------------------------

/// Return the current derived metrics.
pub async fn get_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.snapshot.read().await;
    Json(snapshot.metrics)
}

// ---------------------------------------------------------------------------
// GET /api/export
// ---------------------------------------------------------------------------

/// Return the serialized snapshot export document.
pub async fn export(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.snapshot.read().await;
    Json(snapshot.export())
}
