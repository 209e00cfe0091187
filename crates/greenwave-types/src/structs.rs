//! Core entity structs for the Greenwave traffic control plane.
//!
//! Vehicles and lights as reported by the simulation session, derived
//! metrics, detection summaries, and the snapshot export document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{Approach, LightState, ObjectClass};

// ---------------------------------------------------------------------------
// Vehicles
// ---------------------------------------------------------------------------

/// A position on the simulated network, in meters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Position {
    /// X coordinate.
    pub x: f64,
    /// Y coordinate.
    pub y: f64,
}

/// One simulated vehicle, as reported by a single simulation step.
///
/// Vehicles are ephemeral: the set is replaced wholesale each step and is
/// never merged across steps. The id is only unique within one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Vehicle {
    /// Identifier, unique within the current step.
    pub id: String,
    /// Vehicle type as named by the simulation (e.g. `car`, `truck`).
    pub kind: String,
    /// Current speed in meters per second.
    pub speed: f64,
    /// Current position.
    pub position: Position,
    /// Lane identifier. Lane names encode the approach axis
    /// (e.g. `north_in_0`, `east_in_1`).
    pub lane: String,
    /// Remaining route as an ordered sequence of edge identifiers.
    pub route: Vec<String>,
}

// ---------------------------------------------------------------------------
// Traffic lights
// ---------------------------------------------------------------------------

/// One traffic light head of the fixed four-approach set.
///
/// Persistent across steps; mutated only by the signal optimizer or an
/// explicit manual override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct TrafficLight {
    /// Which approach this head controls.
    pub approach: Approach,
    /// Current signal state.
    pub state: LightState,
    /// Phase index within the signal program.
    pub phase: u32,
    /// Planned phase duration in seconds.
    pub duration_s: u32,
}

impl TrafficLight {
    /// The wire identifier of this head (e.g. `tl_north`).
    pub const fn light_id(&self) -> &'static str {
        self.approach.light_id()
    }
}

/// Compact light representation for the snapshot export document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct LightSummary {
    /// Wire identifier of the light head.
    pub id: String,
    /// Current signal state.
    pub state: LightState,
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Summary statistics derived from the current vehicle set.
///
/// Recomputed fully each step -- never incrementally updated, so a dropped
/// step can never cause drift.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct TrafficMetrics {
    /// Number of vehicles in the current step.
    pub total_vehicles: u32,
    /// Mean vehicle speed in meters per second (0 for an empty set).
    pub average_speed: f64,
    /// Estimated mean waiting time in seconds.
    pub average_wait_time_s: f64,
    /// Estimated junction throughput in vehicles per hour.
    pub throughput_per_hour: f64,
    /// Number of queued (near-stationary) vehicles.
    pub queue_length: u32,
    /// Estimated CO2 output for this step, in kilograms.
    pub co2_emissions_kg: f64,
}

// ---------------------------------------------------------------------------
// Detection feed
// ---------------------------------------------------------------------------

/// Axis-aligned bounding box in detector image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct BoundingBox {
    /// Left edge.
    pub x: f64,
    /// Top edge.
    pub y: f64,
    /// Box width.
    pub width: f64,
    /// Box height.
    pub height: f64,
}

/// A classified-object summary produced by one detection cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct DetectedObject {
    /// Object class.
    pub class: ObjectClass,
    /// How many objects of this class were detected.
    pub count: u32,
    /// Detector confidence in the range 0.0 to 1.0.
    pub confidence: f64,
    /// Representative bounding box, if the detector provides one.
    pub bbox: Option<BoundingBox>,
}

// ---------------------------------------------------------------------------
// Error state
// ---------------------------------------------------------------------------

/// The last error observed by the control loop.
///
/// Cleared explicitly by the operator, never automatically, so failures
/// that have since self-healed remain visible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct LastError {
    /// Human-readable error message.
    pub message: String,
    /// When the error was observed.
    pub at: DateTime<Utc>,
    /// Whether the error stopped the scheduler.
    pub fatal: bool,
}

impl LastError {
    /// Record a non-fatal error observed now.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            at: Utc::now(),
            fatal: false,
        }
    }

    /// Record a fatal error observed now.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            at: Utc::now(),
            fatal: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshot export
// ---------------------------------------------------------------------------

/// Serialized export of the current snapshot, requested by consumers.
///
/// The field set is fixed: timestamp, step, vehicle count, metrics, and
/// the light summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct SnapshotExport {
    /// When the export was produced.
    pub timestamp: DateTime<Utc>,
    /// Step counter at export time.
    pub step: u64,
    /// Number of vehicles in the current step.
    pub vehicle_count: u32,
    /// Current derived metrics.
    pub metrics: TrafficMetrics,
    /// Current state of the four light heads.
    pub traffic_lights: Vec<LightSummary>,
}
