//! Step callback that updates the Observer API state.
//!
//! After every published state change, this callback replaces the
//! in-memory [`ControlSnapshot`] and, for completed steps, broadcasts a
//! [`StepBroadcast`] to all connected `WebSocket` clients.
//!
//! [`ControlSnapshot`]: greenwave_observer::state::ControlSnapshot

use std::sync::Arc;

use greenwave_core::scheduler::{PublishContext, StepCallback};
use greenwave_observer::state::{AppState, StepBroadcast};
use greenwave_types::TrafficMetrics;
use tracing::debug;

/// Callback that bridges the control loop to the Observer API.
pub struct ObserverCallback {
    state: Arc<AppState>,
}

impl ObserverCallback {
    /// Create a new observer callback backed by the given app state.
    pub const fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }
}

impl StepCallback for ObserverCallback {
    fn on_publish(&mut self, ctx: &PublishContext<'_>) {
        // Broadcast completed steps to WebSocket clients.
        if let Some(summary) = ctx.summary {
            let broadcast = StepBroadcast {
                step: summary.step,
                total_vehicles: summary.metrics.total_vehicles,
                average_speed: summary.metrics.average_speed,
                green_axis: summary.green_axis,
                switched: summary.switched,
                density: ctx.density,
            };
            let receivers = self.state.broadcast(&broadcast);
            debug!(step = summary.step, receivers, "step broadcast sent");
        }

        // Update the snapshot. Use try_write to avoid blocking the
        // control loop; if a REST handler holds the read lock, skip this
        // update and the next publish catches up.
        if let Ok(mut snap) = self.state.snapshot.try_write() {
            snap.connection_status = ctx.session.status();
            snap.running = ctx.running;
            snap.step_count = ctx.session.step_count();
            snap.vehicles = ctx.session.vehicles().to_vec();
            snap.traffic_lights = ctx.session.lights();
            snap.detection_density = ctx.density;
            snap.recommendations = ctx.recommendations.to_vec();
            snap.last_error = ctx.session.last_error().cloned();

            if let Some(summary) = ctx.summary {
                snap.metrics = summary.metrics;
            } else if !ctx.session.is_connected() {
                // No session, no telemetry.
                snap.metrics = TrafficMetrics::default();
            }
        }
    }
}
