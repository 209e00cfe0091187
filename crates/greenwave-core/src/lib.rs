//! Session state machine, step scheduler, and signal optimizer for the
//! Greenwave traffic control plane.
//!
//! This crate owns the control loop that drives the external stepped
//! simulation: session lifecycle, periodic step pipeline, telemetry
//! aggregation, and the density-based signal policy.
//!
//! # Modules
//!
//! - [`config`] -- Configuration loading from `greenwave-config.yaml`
//!   into strongly-typed structs.
//! - [`link`] -- [`SimulationLink`] trait over the simulation control
//!   protocol, plus the scripted [`StubLink`].
//! - [`session`] -- Session state machine (connect, disconnect, scenario
//!   loading, step advance, atomic light batches).
//! - [`control`] -- Shared operator control state: run flag, requests,
//!   step interval, manual overrides.
//! - [`metrics`] -- Pure telemetry aggregation with a pluggable
//!   congestion estimator.
//! - [`optimizer`] -- Hysteresis-based green-axis policy with detection
//!   fusion and pedestrian advisories.
//! - [`tick`] -- The per-step pipeline.
//! - [`scheduler`] -- The timer-driven control loop with failure
//!   escalation.
//!
//! [`SimulationLink`]: link::SimulationLink
//! [`StubLink`]: link::StubLink

pub mod config;
pub mod control;
pub mod link;
pub mod metrics;
pub mod optimizer;
pub mod scheduler;
pub mod session;
pub mod tick;
