//! Shared control state for runtime scheduler management.
//!
//! This module provides the shared atomic state used by the control loop
//! and the operator API. The operator can connect/disconnect the session,
//! start/stop stepping, change the step interval, queue manual light
//! overrides, and clear the error state -- all without stopping the
//! process.
//!
//! # Architecture
//!
//! All mutable control fields use [`std::sync::atomic`] types wrapped in
//! [`Arc`](std::sync::Arc) so they can be shared between the control loop
//! task and the observer handler tasks without locks on the hot path.
//! Requests are flags consumed by the loop between ticks, which is what
//! makes `disconnect` safe to call concurrently with an in-flight tick.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use greenwave_types::{Approach, ConnectionStatus, LastError, LightState};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Notify};

/// Lowest accepted step interval in milliseconds.
const MIN_STEP_INTERVAL_MS: u64 = 100;

/// A queued manual light override.
///
/// Applied at the start of the next tick; the optimizer is bypassed for
/// that tick so the override is observable for at least one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualOverride {
    /// Which approach's head to set.
    pub approach: Approach,
    /// The state to set it to.
    pub state: LightState,
}

/// Shared control state.
///
/// Wrapped in [`Arc`](std::sync::Arc) and shared between the control loop
/// and the operator API handlers. Atomic fields are used for lock-free
/// reads on the tick-loop hot path.
#[derive(Debug)]
pub struct ControlState {
    /// Whether the scheduler is currently stepping.
    running: AtomicBool,

    /// Pending request to start stepping.
    start_requested: AtomicBool,

    /// Pending request to stop stepping.
    stop_requested: AtomicBool,

    /// Pending request to open the session.
    connect_requested: AtomicBool,

    /// Pending request to close the session.
    disconnect_requested: AtomicBool,

    /// Pending request to clear the error state.
    clear_error_requested: AtomicBool,

    /// Process shutdown requested; the loop tears down and returns.
    shutdown_requested: AtomicBool,

    /// Current step interval in milliseconds (runtime-adjustable).
    step_interval_ms: AtomicU64,

    /// Notification used to wake an idle control loop.
    command_notify: Notify,

    /// Wall-clock time when the control plane started.
    started_at: DateTime<Utc>,

    /// Queue of manual light overrides awaiting the next tick.
    overrides: Mutex<Vec<ManualOverride>>,
}

impl ControlState {
    /// Create a new control state with the given step interval.
    pub fn new(step_interval_ms: u64) -> Self {
        Self {
            running: AtomicBool::new(false),
            start_requested: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            connect_requested: AtomicBool::new(false),
            disconnect_requested: AtomicBool::new(false),
            clear_error_requested: AtomicBool::new(false),
            shutdown_requested: AtomicBool::new(false),
            step_interval_ms: AtomicU64::new(step_interval_ms.max(MIN_STEP_INTERVAL_MS)),
            command_notify: Notify::new(),
            started_at: Utc::now(),
            overrides: Mutex::new(Vec::new()),
        }
    }

    // -----------------------------------------------------------------------
    // Running flag
    // -----------------------------------------------------------------------

    /// Whether the scheduler is currently stepping.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Set the running flag. Only the control loop calls this.
    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    // -----------------------------------------------------------------------
    // Requests
    // -----------------------------------------------------------------------

    /// Request the scheduler to start stepping.
    ///
    /// A no-op at the loop if already running or not connected.
    pub fn request_start(&self) {
        self.start_requested.store(true, Ordering::Release);
        self.command_notify.notify_one();
    }

    /// Consume a pending start request.
    pub fn take_start_request(&self) -> bool {
        self.start_requested.swap(false, Ordering::AcqRel)
    }

    /// Request the scheduler to stop stepping (cooperative: the in-flight
    /// tick completes).
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
        self.command_notify.notify_one();
    }

    /// Consume a pending stop request.
    pub fn take_stop_request(&self) -> bool {
        self.stop_requested.swap(false, Ordering::AcqRel)
    }

    /// Request a session connect.
    pub fn request_connect(&self) {
        self.connect_requested.store(true, Ordering::Release);
        self.command_notify.notify_one();
    }

    /// Consume a pending connect request.
    pub fn take_connect_request(&self) -> bool {
        self.connect_requested.swap(false, Ordering::AcqRel)
    }

    /// Request a session disconnect.
    pub fn request_disconnect(&self) {
        self.disconnect_requested.store(true, Ordering::Release);
        self.command_notify.notify_one();
    }

    /// Consume a pending disconnect request.
    pub fn take_disconnect_request(&self) -> bool {
        self.disconnect_requested.swap(false, Ordering::AcqRel)
    }

    /// Request the error state to be cleared.
    pub fn request_clear_error(&self) {
        self.clear_error_requested.store(true, Ordering::Release);
        self.command_notify.notify_one();
    }

    /// Consume a pending clear-error request.
    pub fn take_clear_error_request(&self) -> bool {
        self.clear_error_requested.swap(false, Ordering::AcqRel)
    }

    /// Request a clean process shutdown.
    pub fn request_shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::Release);
        self.command_notify.notify_one();
    }

    /// Whether a shutdown has been requested.
    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::Acquire)
    }

    /// Wait until any request arrives.
    ///
    /// Returns immediately if a request was made since the last wakeup
    /// (the notify permit is stored), so requests are never lost.
    pub async fn wait_for_command(&self) {
        self.command_notify.notified().await;
    }

    // -----------------------------------------------------------------------
    // Step interval
    // -----------------------------------------------------------------------

    /// Get the current step interval in milliseconds.
    pub fn step_interval_ms(&self) -> u64 {
        self.step_interval_ms.load(Ordering::Acquire)
    }

    /// Set the step interval in milliseconds. Must be at least 100 ms.
    ///
    /// Returns the previous interval on success, or `None` if the value
    /// was rejected (below the floor).
    pub fn set_step_interval_ms(&self, ms: u64) -> Option<u64> {
        if ms < MIN_STEP_INTERVAL_MS {
            return None;
        }
        let prev = self.step_interval_ms.swap(ms, Ordering::AcqRel);
        Some(prev)
    }

    // -----------------------------------------------------------------------
    // Manual overrides
    // -----------------------------------------------------------------------

    /// Queue a manual light override for the next tick.
    pub async fn queue_override(&self, request: ManualOverride) {
        let mut queue = self.overrides.lock().await;
        queue.push(request);
        drop(queue);
        self.command_notify.notify_one();
    }

    /// Drain all queued overrides.
    pub async fn drain_overrides(&self) -> Vec<ManualOverride> {
        let mut queue = self.overrides.lock().await;
        std::mem::take(&mut *queue)
    }

    // -----------------------------------------------------------------------
    // Bookkeeping
    // -----------------------------------------------------------------------

    /// Wall-clock time the control plane started.
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Elapsed seconds since the control plane started.
    pub fn elapsed_seconds(&self) -> u64 {
        let elapsed = Utc::now()
            .signed_duration_since(self.started_at)
            .num_seconds();
        u64::try_from(elapsed.max(0)).unwrap_or(u64::MAX)
    }
}

/// JSON-serializable control status for the operator API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStatus {
    /// Current connection status.
    pub connection_status: ConnectionStatus,
    /// Whether the scheduler is stepping.
    pub running: bool,
    /// Steps completed since connect.
    pub step_count: u64,
    /// Current step interval in milliseconds.
    pub step_interval_ms: u64,
    /// Elapsed wall-clock seconds since process start.
    pub elapsed_seconds: u64,
    /// ISO 8601 timestamp of when the control plane started.
    pub started_at: String,
    /// The last observed error, if any.
    pub last_error: Option<LastError>,
}
