//! Shared type definitions for the Greenwave traffic control plane.
//!
//! This crate is the single source of truth for all types used across the
//! Greenwave workspace. Types defined here flow downstream to `TypeScript`
//! via `ts-rs` for the operator dashboard.
//!
//! # Modules
//!
//! - [`enums`] -- Enumeration types (light states, approaches, statuses,
//!   detected object classes)
//! - [`structs`] -- Core entity structs (vehicles, lights, metrics,
//!   detections, snapshot export)

pub mod enums;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{Approach, Axis, ConnectionStatus, LightState, ObjectClass, TrafficDensity};
pub use structs::{
    BoundingBox, DetectedObject, LastError, LightSummary, Position, SnapshotExport, TrafficLight,
    TrafficMetrics, Vehicle,
};
