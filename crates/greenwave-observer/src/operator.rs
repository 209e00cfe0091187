//! Control REST API handlers for runtime management.
//!
//! These endpoints are separate from the read-only snapshot API. They
//! provide one-way command authority from the operator to the control
//! loop: each handler only sets a request flag (or queues an override) on
//! the shared [`ControlState`]; the loop services requests between ticks,
//! so no endpoint can ever interleave with an in-flight tick.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/control/connect` | Open the simulation session |
//! | `POST` | `/api/control/disconnect` | Close the session |
//! | `POST` | `/api/control/start` | Start stepping |
//! | `POST` | `/api/control/stop` | Stop stepping (cooperative) |
//! | `POST` | `/api/control/speed` | Set step interval (ms) |
//! | `POST` | `/api/control/lights/{id}` | Manual light override |
//! | `POST` | `/api/control/clear-error` | Clear the error state |
//! | `GET` | `/api/control/status` | Current control status |
//!
//! [`ControlState`]: greenwave_core::control::ControlState

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use greenwave_core::control::{ControlState, ManualOverride, RunStatus};
use greenwave_types::{Approach, ConnectionStatus, LightState};

use crate::error::ObserverError;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Request body for `POST /api/control/speed`.
#[derive(Debug, serde::Deserialize)]
pub struct SetSpeedRequest {
    /// New step interval in milliseconds (minimum 100).
    pub step_interval_ms: u64,
}

/// Request body for `POST /api/control/lights/{id}`.
#[derive(Debug, serde::Deserialize)]
pub struct OverrideLightRequest {
    /// The state to set the head to.
    pub state: LightState,
}

/// Generic success response.
#[derive(Debug, serde::Serialize)]
struct ControlResponse {
    /// Whether the operation was accepted.
    ok: bool,
    /// Human-readable message.
    message: String,
}

fn control_of(state: &AppState) -> Result<&Arc<ControlState>, ObserverError> {
    state
        .control
        .as_ref()
        .ok_or_else(|| ObserverError::Internal(String::from("control state not available")))
}

// ---------------------------------------------------------------------------
// POST /api/control/connect
// ---------------------------------------------------------------------------

/// Request a session connect.
///
/// The control loop opens the session before its next tick; a failure is
/// surfaced in the snapshot's error state.
pub async fn connect(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ObserverError> {
    control_of(&state)?.request_connect();
    Ok(Json(ControlResponse {
        ok: true,
        message: String::from("Connect requested"),
    }))
}

// ---------------------------------------------------------------------------
// POST /api/control/disconnect
// ---------------------------------------------------------------------------

/// Request a session disconnect.
///
/// Safe to call at any time: stepping is forced off first and an
/// in-flight tick completes before the teardown. Idempotent.
pub async fn disconnect(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ObserverError> {
    control_of(&state)?.request_disconnect();
    Ok(Json(ControlResponse {
        ok: true,
        message: String::from("Disconnect requested"),
    }))
}

// ---------------------------------------------------------------------------
// POST /api/control/start
// ---------------------------------------------------------------------------

/// Request the scheduler to start stepping.
///
/// A no-op if already running or not connected.
pub async fn start(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ObserverError> {
    control_of(&state)?.request_start();
    Ok(Json(ControlResponse {
        ok: true,
        message: String::from("Start requested"),
    }))
}

// ---------------------------------------------------------------------------
// POST /api/control/stop
// ---------------------------------------------------------------------------

/// Request the scheduler to stop stepping.
///
/// Cooperative: the in-flight tick (if any) completes, no new tick
/// begins afterwards.
pub async fn stop(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ObserverError> {
    control_of(&state)?.request_stop();
    Ok(Json(ControlResponse {
        ok: true,
        message: String::from("Stop requested"),
    }))
}

// ---------------------------------------------------------------------------
// POST /api/control/speed
// ---------------------------------------------------------------------------

/// Change the step interval at runtime.
///
/// The new interval takes effect before the next tick's wait. Minimum
/// 100 ms to prevent runaway stepping.
pub async fn set_speed(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SetSpeedRequest>,
) -> Result<impl IntoResponse, ObserverError> {
    let control = control_of(&state)?;
    control.set_step_interval_ms(body.step_interval_ms).map_or_else(
        || {
            Err(ObserverError::InvalidRequest(String::from(
                "step_interval_ms must be at least 100",
            )))
        },
        |prev| {
            Ok(Json(serde_json::json!({
                "ok": true,
                "message": format!(
                    "Step interval changed from {}ms to {}ms",
                    prev, body.step_interval_ms
                ),
                "previous_interval_ms": prev,
                "new_interval_ms": body.step_interval_ms,
            })))
        },
    )
}

// ---------------------------------------------------------------------------
// POST /api/control/lights/{id}
// ---------------------------------------------------------------------------

/// Queue a manual light override for the next tick.
///
/// Available only while the session is connected. The override bypasses
/// the optimizer for one tick and does not persist as an optimizer
/// preference.
pub async fn override_light(
    State(state): State<Arc<AppState>>,
    Path(light_id): Path<String>,
    Json(body): Json<OverrideLightRequest>,
) -> Result<impl IntoResponse, ObserverError> {
    let control = control_of(&state)?;

    let approach = Approach::from_light_id(&light_id)
        .ok_or_else(|| ObserverError::NotFound(format!("unknown light head: {light_id}")))?;

    let connected = {
        let snapshot = state.snapshot.read().await;
        snapshot.connection_status == ConnectionStatus::Connected
    };
    if !connected {
        return Err(ObserverError::Conflict(String::from(
            "manual override requires a connected session",
        )));
    }

    control
        .queue_override(ManualOverride {
            approach,
            state: body.state,
        })
        .await;

    Ok(Json(ControlResponse {
        ok: true,
        message: format!("Override queued: {light_id} -> {:?}", body.state),
    }))
}

// ---------------------------------------------------------------------------
// POST /api/control/clear-error
// ---------------------------------------------------------------------------

/// Request the error state to be cleared.
///
/// Errors are never cleared automatically, so operators can see failures
/// that have since self-healed until they acknowledge them here.
pub async fn clear_error(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ObserverError> {
    control_of(&state)?.request_clear_error();
    Ok(Json(ControlResponse {
        ok: true,
        message: String::from("Clear-error requested"),
    }))
}

// ---------------------------------------------------------------------------
// GET /api/control/status
// ---------------------------------------------------------------------------

/// Return the current control status: connection, run flag, step count,
/// interval, elapsed time, and the last error.
pub async fn status(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ObserverError> {
    let control = control_of(&state)?;
    let snapshot = state.snapshot.read().await;

    let status = RunStatus {
        connection_status: snapshot.connection_status,
        running: control.is_running(),
        step_count: snapshot.step_count,
        step_interval_ms: control.step_interval_ms(),
        elapsed_seconds: control.elapsed_seconds(),
        started_at: control.started_at().to_rfc3339(),
        last_error: snapshot.last_error.clone(),
    };

    Ok(Json(status))
}
