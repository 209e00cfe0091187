//! The timer-driven control loop.
//!
//! This module provides [`run_control_loop`], the top-level async function
//! that drives periodic simulation steps while the session is connected
//! and the scheduler is running, with support for:
//!
//! - **Operator requests**: connect, disconnect, start, stop, clear-error,
//!   manual light overrides -- all serviced between ticks, which is what
//!   makes `disconnect` safe against an in-flight tick.
//! - **Cooperative stop**: an in-flight tick completes; no new tick
//!   begins afterwards.
//! - **Drop-not-queue timing**: a timer fire that lands while a tick is
//!   busy is skipped, never queued, so a slow session cannot build an
//!   unbounded backlog.
//! - **Failure escalation**: a tick failure records the error and skips
//!   that tick's remaining effects; three consecutive failures stop the
//!   scheduler with a fatal error.
//! - **Bounded runs**: `max_steps` limits the run for tests and batch
//!   experiments (0 = unlimited).
//!
//! The loop wraps the single-tick [`run_tick`] function and adds the
//! control plane around it.
//!
//! [`run_tick`]: crate::tick::run_tick

use std::sync::Arc;
use std::time::Duration;

use greenwave_detect::DetectionFeed;
use greenwave_types::{LastError, TrafficDensity};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::PolicyConfig;
use crate::control::ControlState;
use crate::metrics::CongestionEstimator;
use crate::session::SessionManager;
use crate::tick::{self, TickSummary};

/// Consecutive tick failures that escalate to a fatal stop.
pub const MAX_CONSECUTIVE_FAILURES: u32 = 3;

/// Why the control loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopEndReason {
    /// A process shutdown was requested; the session has been torn down.
    Shutdown,
    /// The configured `max_steps` bound was reached. The session is left
    /// connected so callers can inspect or resume it.
    StepLimitReached,
}

/// Result of a control loop run.
#[derive(Debug)]
pub struct ControlLoopResult {
    /// Why the loop ended.
    pub end_reason: LoopEndReason,
    /// Total successful steps executed.
    pub total_steps: u64,
    /// The last successful tick summary, if any.
    pub last_summary: Option<TickSummary>,
}

/// Everything a publisher needs to build one consistent snapshot.
///
/// Handed to the [`StepCallback`] after every state change, so consumers
/// never observe a half-applied transition.
pub struct PublishContext<'a> {
    /// The session (status, lights, vehicles, step count, last error).
    pub session: &'a SessionManager,
    /// Whether the scheduler is currently stepping.
    pub running: bool,
    /// The tick summary, when publishing a completed tick.
    pub summary: Option<&'a TickSummary>,
    /// Current detection density classification.
    pub density: TrafficDensity,
    /// Combined feed recommendations and optimizer advisories.
    pub recommendations: &'a [String],
}

/// Callback invoked after every published state change.
///
/// Implementations use this to update the observer snapshot and broadcast
/// step summaries.
pub trait StepCallback: Send {
    /// Called with a consistent view of the control-plane state.
    fn on_publish(&mut self, ctx: &PublishContext<'_>);
}

/// A no-op step callback for testing.
pub struct NoOpCallback;

impl StepCallback for NoOpCallback {
    fn on_publish(&mut self, _ctx: &PublishContext<'_>) {}
}

/// Run the control loop until shutdown (or the step bound) is reached.
///
/// The loop owns all session mutation: operator requests are consumed
/// between ticks, at most one tick is ever in flight, and every mutation
/// is followed by exactly one publish.
pub async fn run_control_loop(
    session: &mut SessionManager,
    control: &Arc<ControlState>,
    feed: &DetectionFeed,
    estimator: &dyn CongestionEstimator,
    policy: &PolicyConfig,
    callback: &mut dyn StepCallback,
    max_steps: u64,
) -> ControlLoopResult {
    let mut failure_streak: u32 = 0;
    let mut total_steps: u64 = 0;
    let mut last_summary: Option<TickSummary> = None;

    let mut interval_ms = control.step_interval_ms();
    let mut ticker = make_ticker(interval_ms);

    info!(
        step_interval_ms = interval_ms,
        max_steps, "control loop started"
    );

    let end_reason = loop {
        // --- Service operator requests (between ticks) ---
        if service_requests(session, control, feed, callback, &mut failure_streak) {
            break LoopEndReason::Shutdown;
        }

        // --- Idle until connected and running ---
        if !(control.is_running() && session.is_connected()) {
            control.wait_for_command().await;
            continue;
        }

        // --- Wait one step interval; missed fires are dropped ---
        let current = control.step_interval_ms();
        if current != interval_ms {
            interval_ms = current;
            ticker = make_ticker(interval_ms);
            debug!(step_interval_ms = interval_ms, "step interval changed");
        }
        ticker.tick().await;

        // A request may have arrived during the wait. Stop means no new
        // tick begins, so service before ticking.
        if service_requests(session, control, feed, callback, &mut failure_streak) {
            break LoopEndReason::Shutdown;
        }
        if !(control.is_running() && session.is_connected()) {
            continue;
        }

        // --- Execute one tick ---
        let overrides = control.drain_overrides().await;
        let detection_view = feed.view();

        match tick::run_tick(
            session,
            estimator,
            policy,
            detection_view.as_ref(),
            &overrides,
        ) {
            Ok(summary) => {
                failure_streak = 0;
                total_steps = total_steps.saturating_add(1);
                publish(callback, session, control, feed, Some(&summary));
                last_summary = Some(summary);

                if max_steps > 0 && total_steps >= max_steps {
                    info!(total_steps, "step limit reached");
                    control.set_running(false);
                    break LoopEndReason::StepLimitReached;
                }
            }
            Err(e) => {
                failure_streak = failure_streak.saturating_add(1);
                if failure_streak >= MAX_CONSECUTIVE_FAILURES {
                    control.set_running(false);
                    session.set_error(LastError::fatal(format!(
                        "{e} ({failure_streak} consecutive step failures)"
                    )));
                    error!(
                        error = %e,
                        failures = failure_streak,
                        "stopping scheduler after consecutive step failures"
                    );
                } else {
                    session.set_error(LastError::new(e.to_string()));
                    warn!(
                        error = %e,
                        failures = failure_streak,
                        "step failed, retrying on next tick"
                    );
                }
                // The error must be visible in the snapshot even though
                // the tick's data effects were skipped.
                publish(callback, session, control, feed, None);
            }
        }
    };

    if end_reason == LoopEndReason::Shutdown {
        control.set_running(false);
        session.disconnect();
    }
    publish(callback, session, control, feed, None);

    info!(total_steps, end_reason = ?end_reason, "control loop ended");

    ControlLoopResult {
        end_reason,
        total_steps,
        last_summary,
    }
}

/// Consume pending operator requests. Returns `true` on shutdown.
fn service_requests(
    session: &mut SessionManager,
    control: &ControlState,
    feed: &DetectionFeed,
    callback: &mut dyn StepCallback,
    failure_streak: &mut u32,
) -> bool {
    if control.is_shutdown_requested() {
        return true;
    }

    if control.take_clear_error_request() {
        session.clear_error();
        info!("error state cleared");
        publish(callback, session, control, feed, None);
    }

    if control.take_disconnect_request() {
        // Stepping is forced off before teardown.
        control.set_running(false);
        session.disconnect();
        *failure_streak = 0;
        publish(callback, session, control, feed, None);
    }

    if control.take_connect_request() {
        if session.is_connected() {
            debug!("connect requested while already connected");
        } else {
            if let Err(e) = session.connect() {
                warn!(error = %e, "connect failed");
                session.set_error(LastError::new(e.to_string()));
            }
            publish(callback, session, control, feed, None);
        }
    }

    if control.take_stop_request() {
        if control.is_running() {
            control.set_running(false);
            info!("scheduler stopped");
            publish(callback, session, control, feed, None);
        } else {
            debug!("stop requested while not running");
        }
    }

    if control.take_start_request() {
        if session.is_connected() && !control.is_running() {
            control.set_running(true);
            *failure_streak = 0;
            info!("scheduler started");
            publish(callback, session, control, feed, None);
        } else {
            debug!(
                connected = session.is_connected(),
                running = control.is_running(),
                "start request ignored"
            );
        }
    }

    false
}

/// Publish one consistent snapshot through the callback.
fn publish(
    callback: &mut dyn StepCallback,
    session: &SessionManager,
    control: &ControlState,
    feed: &DetectionFeed,
    summary: Option<&TickSummary>,
) {
    let mut recommendations = feed.recommendations();
    if let Some(summary) = summary {
        recommendations.extend_from_slice(&summary.advisories);
    }
    let ctx = PublishContext {
        session,
        running: control.is_running(),
        summary,
        density: feed.traffic_density(),
        recommendations: &recommendations,
    };
    callback.on_publish(&ctx);
}

/// A step ticker that drops missed fires instead of queueing them.
fn make_ticker(interval_ms: u64) -> tokio::time::Interval {
    let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}
