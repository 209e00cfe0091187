//! Shared application state for the Observer API server.
//!
//! [`AppState`] holds the broadcast channel for step summaries and the
//! in-memory [`ControlSnapshot`] that the REST endpoints serve. The
//! control loop replaces snapshot fields atomically after every tick and
//! every lifecycle change, so consumers never observe a half-applied
//! transition.

use std::sync::Arc;

use greenwave_core::control::ControlState;
use greenwave_types::{
    Axis, ConnectionStatus, LastError, LightSummary, SnapshotExport, TrafficDensity, TrafficLight,
    TrafficMetrics, Vehicle,
};
use tokio::sync::{broadcast, RwLock};

/// Capacity of the broadcast channel for step summaries.
///
/// If a subscriber falls behind by more than this many messages it will
/// receive a [`broadcast::error::RecvError::Lagged`] and skip to the
/// newest message.
const BROADCAST_CAPACITY: usize = 256;

/// JSON-serializable step summary pushed over the `WebSocket`.
///
/// A lightweight projection of the core tick summary that can be
/// serialized without pulling the full vehicle set along.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct StepBroadcast {
    /// The step number.
    pub step: u64,
    /// Number of vehicles in this step.
    pub total_vehicles: u32,
    /// Mean vehicle speed in meters per second.
    pub average_speed: f64,
    /// The axis holding green after this step, if exactly one does.
    pub green_axis: Option<Axis>,
    /// The switch applied this step, if any.
    pub switched: Option<Axis>,
    /// Current detection density classification.
    pub density: TrafficDensity,
}

/// In-memory snapshot of the control-plane state served by REST endpoints.
///
/// Updated by the control loop after every published state change. All
/// reads are served from this snapshot so the observer never blocks the
/// tick cycle.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ControlSnapshot {
    /// Current session connection status.
    pub connection_status: ConnectionStatus,
    /// Whether the scheduler is stepping.
    pub running: bool,
    /// Steps completed since connect.
    pub step_count: u64,
    /// The current vehicle set (replaced wholesale each step).
    pub vehicles: Vec<Vehicle>,
    /// The four light heads (empty while disconnected).
    pub traffic_lights: Vec<TrafficLight>,
    /// Metrics recomputed from the current vehicle set.
    pub metrics: TrafficMetrics,
    /// Detection density classification from the feed.
    pub detection_density: TrafficDensity,
    /// Advisory recommendations (feed plus optimizer output).
    pub recommendations: Vec<String>,
    /// The last observed error, if any.
    pub last_error: Option<LastError>,
}

impl ControlSnapshot {
    /// Build the serialized export document from this snapshot.
    ///
    /// The field set is fixed: timestamp, step, vehicle count, metrics,
    /// and the light summary.
    pub fn export(&self) -> SnapshotExport {
        SnapshotExport {
            timestamp: chrono::Utc::now(),
            step: self.step_count,
            vehicle_count: u32::try_from(self.vehicles.len()).unwrap_or(u32::MAX),
            metrics: self.metrics,
            traffic_lights: self
                .traffic_lights
                .iter()
                .map(|light| LightSummary {
                    id: light.light_id().to_owned(),
                    state: light.state,
                })
                .collect(),
        }
    }
}

/// Shared state for the Axum application.
///
/// Wrapped in [`Arc`] and injected via Axum's `State` extractor. The
/// broadcast sender pushes step summaries to all connected `WebSocket`
/// clients; the snapshot is a read-write lock protecting the published
/// control-plane state.
#[derive(Clone)]
pub struct AppState {
    /// Broadcast sender for step summary messages.
    pub tx: broadcast::Sender<StepBroadcast>,
    /// The current published snapshot.
    pub snapshot: Arc<RwLock<ControlSnapshot>>,
    /// Shared control state (present when a control loop is attached).
    pub control: Option<Arc<ControlState>>,
}

impl AppState {
    /// Create a new application state with an empty snapshot and no
    /// attached control loop (read-only observer).
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            tx,
            snapshot: Arc::new(RwLock::new(ControlSnapshot::default())),
            control: None,
        }
    }

    /// Create a new application state with control state attached.
    pub fn with_control(control: Arc<ControlState>) -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            tx,
            snapshot: Arc::new(RwLock::new(ControlSnapshot::default())),
            control: Some(control),
        }
    }

    /// Subscribe to the step broadcast channel.
    ///
    /// Returns a receiver that will yield [`StepBroadcast`] messages for
    /// every step the control loop publishes.
    pub fn subscribe(&self) -> broadcast::Receiver<StepBroadcast> {
        self.tx.subscribe()
    }

    /// Publish a step summary to all connected clients.
    ///
    /// Returns the number of receivers that received the message.
    /// Returns 0 if no clients are connected (this is not an error).
    pub fn broadcast(&self, summary: &StepBroadcast) -> usize {
        // send returns Err only when there are zero receivers, which is
        // normal when no WebSocket clients are connected.
        self.tx.send(summary.clone()).unwrap_or(0)
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
