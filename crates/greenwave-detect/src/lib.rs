//! Detection feed adapter for the Greenwave traffic control plane.
//!
//! The object-detection subsystem runs on its own cadence, independent of
//! the simulation stepping cadence. This crate owns that boundary: a
//! [`DetectionSource`] produces classified-object summaries, a background
//! poll loop writes them into the [`DetectionFeed`], and the control loop
//! reads the feed's last known value without ever blocking on it.
//!
//! Staleness is a degraded mode, not an error: when the feed has no fresh
//! data the optimizer falls back to simulation-only decisions.
//!
//! # Modules
//!
//! - [`error`] -- [`DetectionError`] for fetch and decode failures.
//! - [`source`] -- [`DetectionSource`] trait and the scripted
//!   [`StubDetectionSource`] used by tests.
//! - [`feed`] -- Last-known-value store with density classification and
//!   advisory recommendations.
//! - [`task`] -- Background poll loop on a blocking thread.
//!
//! [`StubDetectionSource`]: source::StubDetectionSource

pub mod error;
pub mod feed;
pub mod source;
pub mod task;

pub use error::DetectionError;
pub use feed::{DetectionFeed, DetectionView, FeedOptions};
pub use source::{DetectionSource, StubDetectionSource};
pub use task::{spawn_detection_loop, DetectionTask};
