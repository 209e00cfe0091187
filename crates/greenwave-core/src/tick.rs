//! The per-step pipeline.
//!
//! Each tick runs through these phases:
//!
//! 1. **Overrides** -- apply queued manual light overrides as one atomic
//!    batch; the optimizer is bypassed for this tick so the override is
//!    observable for at least one step.
//! 2. **Advance** -- request one simulation advance, replacing the
//!    vehicle set wholesale.
//! 3. **Metrics** -- recompute the full metric set from the new vehicles.
//! 4. **Optimize** -- evaluate the signal policy and apply a switch as
//!    one atomic four-head batch.
//! 5. **Count** -- increment the step counter.
//!
//! Publishing the snapshot is the scheduler's job, after this function
//! returns. A failure at any phase aborts the remaining phases for this
//! tick only; the scheduler records the error and retries on the next
//! scheduled tick.

use greenwave_detect::DetectionView;
use greenwave_types::Axis;
use greenwave_types::TrafficMetrics;
use tracing::debug;

use crate::config::PolicyConfig;
use crate::control::ManualOverride;
use crate::link::LightCommand;
use crate::metrics::{compute_metrics, CongestionEstimator};
use crate::optimizer::{self, AxisCounts};
use crate::session::{SessionError, SessionManager};

/// Errors that can occur during tick execution.
#[derive(Debug, thiserror::Error)]
pub enum TickError {
    /// A manual override batch failed to apply.
    #[error("manual override failed: {source}")]
    Override {
        /// The underlying session error.
        source: SessionError,
    },

    /// The simulation advance failed.
    #[error("step advance failed: {source}")]
    Advance {
        /// The underlying session error.
        source: SessionError,
    },

    /// The optimizer's light batch failed to apply.
    #[error("light command failed: {source}")]
    Lights {
        /// The underlying session error.
        source: SessionError,
    },
}

/// Summary of a single tick's execution.
#[derive(Debug, Clone, PartialEq)]
pub struct TickSummary {
    /// The step number after this tick (1-based).
    pub step: u64,
    /// Vehicle tallies per axis.
    pub counts: AxisCounts,
    /// Metrics recomputed from this tick's vehicle set.
    pub metrics: TrafficMetrics,
    /// The axis holding green after this tick, if exactly one does.
    pub green_axis: Option<Axis>,
    /// The switch applied this tick, if any.
    pub switched: Option<Axis>,
    /// Advisory output surfaced to consumers.
    pub advisories: Vec<String>,
    /// Number of manual overrides applied at the start of this tick.
    pub overrides_applied: u32,
    /// Whether a fresh detection cycle corroborated the congestion.
    pub detection_confirmed: Option<bool>,
}

/// Execute one complete tick of the control loop.
///
/// # Errors
///
/// Returns [`TickError`] if an override batch, the advance, or the
/// optimizer's light batch fails. The step counter is only incremented
/// when every phase succeeded.
pub fn run_tick(
    session: &mut SessionManager,
    estimator: &dyn CongestionEstimator,
    policy: &PolicyConfig,
    detection: Option<&DetectionView>,
    overrides: &[ManualOverride],
) -> Result<TickSummary, TickError> {
    // --- Phase 1: manual overrides (bypass the optimizer this tick) ---
    let overrides_applied = u32::try_from(overrides.len()).unwrap_or(u32::MAX);
    if !overrides.is_empty() {
        let batch: Vec<LightCommand> = overrides
            .iter()
            .map(|o| LightCommand {
                approach: o.approach,
                state: o.state,
            })
            .collect();
        session
            .apply_lights(&batch)
            .map_err(|source| TickError::Override { source })?;
        debug!(overrides = overrides.len(), "manual overrides applied");
    }

    // --- Phase 2: advance the simulation, replacing the vehicle set ---
    // --- Phase 3: recompute metrics from the new set ---
    let (counts, metrics) = {
        let vehicles = session
            .advance_step()
            .map_err(|source| TickError::Advance { source })?;
        (
            optimizer::count_by_axis(vehicles),
            compute_metrics(vehicles, estimator, policy),
        )
    };

    // --- Phase 4: evaluate the signal policy ---
    let (switched, advisories, detection_confirmed) = if overrides.is_empty() {
        let outcome = optimizer::evaluate(counts, session.green_axis(), detection, policy);
        let switched = match outcome.decision {
            Some(decision) => {
                session
                    .apply_lights(&decision.commands)
                    .map_err(|source| TickError::Lights { source })?;
                Some(decision.target)
            }
            None => None,
        };
        (switched, outcome.advisories, outcome.detection_confirmed)
    } else {
        (None, Vec::new(), None)
    };

    // --- Phase 5: the tick completed all its effects ---
    session.mark_step_complete();

    Ok(TickSummary {
        step: session.step_count(),
        counts,
        metrics,
        green_axis: session.green_axis(),
        switched,
        advisories,
        overrides_applied,
        detection_confirmed,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use greenwave_types::{Approach, LightState};

    use super::*;
    use crate::config::SimulationConfig;
    use crate::link::StubLink;
    use crate::metrics::ReferenceEstimator;

    fn setup(link: StubLink) -> (SessionManager, ReferenceEstimator, PolicyConfig) {
        let mut session = SessionManager::new(Box::new(link), SimulationConfig::default());
        session.connect().unwrap();
        let policy = PolicyConfig::default();
        (session, ReferenceEstimator::from_policy(&policy), policy)
    }

    #[test]
    fn tick_advances_and_counts() {
        let mut link = StubLink::new();
        link.push_axis_counts(2, 2);
        let (mut session, estimator, policy) = setup(link);

        let summary = run_tick(&mut session, &estimator, &policy, None, &[]).unwrap();
        assert_eq!(summary.step, 1);
        assert_eq!(summary.counts.north_south, 2);
        assert_eq!(summary.counts.east_west, 2);
        assert_eq!(summary.metrics.total_vehicles, 4);
        // Balanced counts: the initial east-west green holds.
        assert_eq!(summary.switched, None);
        assert_eq!(summary.green_axis, Some(Axis::EastWest));
    }

    #[test]
    fn tick_applies_a_clear_switch() {
        let mut link = StubLink::new();
        link.push_axis_counts(12, 3);
        let (mut session, estimator, policy) = setup(link);

        let summary = run_tick(&mut session, &estimator, &policy, None, &[]).unwrap();
        assert_eq!(summary.switched, Some(Axis::NorthSouth));
        assert_eq!(summary.green_axis, Some(Axis::NorthSouth));
        assert_eq!(session.green_axis(), Some(Axis::NorthSouth));
    }

    #[test]
    fn failed_advance_leaves_step_count_untouched() {
        let mut link = StubLink::new();
        link.push_step_failure();
        let (mut session, estimator, policy) = setup(link);

        let err = run_tick(&mut session, &estimator, &policy, None, &[]).unwrap_err();
        assert!(matches!(err, TickError::Advance { .. }));
        assert_eq!(session.step_count(), 0);
    }

    #[test]
    fn overrides_bypass_the_optimizer_for_one_tick() {
        let mut link = StubLink::new();
        // Congestion that would normally force a north-south switch.
        link.push_axis_counts(12, 3);
        link.push_axis_counts(12, 3);
        let (mut session, estimator, policy) = setup(link);

        let overrides = [ManualOverride {
            approach: Approach::East,
            state: LightState::Red,
        }];
        let first = run_tick(&mut session, &estimator, &policy, None, &overrides).unwrap();
        assert_eq!(first.overrides_applied, 1);
        // The optimizer was bypassed despite the congestion.
        assert_eq!(first.switched, None);

        // The next tick is back under optimizer control and settles the
        // mixed state left by the override.
        let second = run_tick(&mut session, &estimator, &policy, None, &[]).unwrap();
        assert_eq!(second.switched, Some(Axis::NorthSouth));
    }

    #[test]
    fn empty_vehicle_set_is_a_valid_tick() {
        let link = StubLink::new();
        let (mut session, estimator, policy) = setup(link);

        let summary = run_tick(&mut session, &estimator, &policy, None, &[]).unwrap();
        assert_eq!(summary.metrics.total_vehicles, 0);
        assert!(summary.metrics.average_speed.abs() < f64::EPSILON);
        assert_eq!(summary.switched, None);
    }
}
