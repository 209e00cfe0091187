//! Observer API server for the Greenwave control plane.
//!
//! This crate is the State Publisher surface: an Axum HTTP server that
//! exposes
//!
//! - **`WebSocket` endpoint** (`/ws/steps`) for real-time step summary
//!   streaming via [`tokio::sync::broadcast`]
//! - **REST endpoints** for the published snapshot (vehicles, lights,
//!   metrics, detection density, recommendations, last error) and the
//!   serialized snapshot export
//! - **Control REST endpoints** for runtime management (connect,
//!   disconnect, start, stop, speed, manual light override, clear-error,
//!   status)
//! - **Minimal HTML dashboard** (`GET /`) showing step count, connection
//!   state, and links to API endpoints
//!
//! # Architecture
//!
//! The observer reads from an in-memory [`ControlSnapshot`] that is
//! updated atomically after every tick and every state change. All REST
//! reads are served from this snapshot so the observer never blocks the
//! tick loop. `WebSocket` clients receive step summaries via a broadcast
//! channel with automatic lag handling. Control endpoints only set
//! request flags on the shared [`ControlState`]; the control loop
//! services them between ticks.
//!
//! [`ControlSnapshot`]: state::ControlSnapshot
//! [`ControlState`]: greenwave_core::control::ControlState

pub mod error;
pub mod handlers;
pub mod operator;
pub mod router;
pub mod server;
pub mod startup;
pub mod state;
pub mod ws;

// Re-export primary types for convenience.
pub use router::build_router;
pub use server::{start_server, ServerConfig, ServerError};
pub use startup::spawn_observer;
pub use state::{AppState, ControlSnapshot, StepBroadcast};
