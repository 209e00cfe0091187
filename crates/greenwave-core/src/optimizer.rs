//! Density-based signal optimization policy.
//!
//! Once per tick, after metrics, the optimizer partitions the vehicle set
//! into the two approach axes and decides whether the green axis should
//! switch. The decision rule carries hysteresis: the winning axis must
//! exceed the other by more than the configured margin, otherwise the
//! lights stay as they are -- oscillating counts inside the margin never
//! cause flicker.
//!
//! A fresh detection summary is a secondary confirming signal: its
//! vehicle total is recorded on the outcome, and a disagreement between a
//! congested simulation and an empty camera scene is logged, but the
//! simulated counts stay authoritative (the feed carries no axis
//! information). A stale or absent feed silently falls back to
//! simulation-only counts.
//!
//! The optimizer emits intended terminal red/green states only. A
//! production deployment must insert a yellow/all-red clearance interval
//! before a green assignment takes effect; scheduling that interval is an
//! extension point of the session's light-command path, not of this
//! policy.

use greenwave_types::{Axis, LightState, Vehicle};
use tracing::{debug, warn};

use crate::config::PolicyConfig;
use crate::link::LightCommand;
use greenwave_detect::DetectionView;

/// Vehicle tallies per approach axis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AxisCounts {
    /// Vehicles on north/south lanes.
    pub north_south: u32,
    /// Vehicles on east/west lanes.
    pub east_west: u32,
}

impl AxisCounts {
    /// The tally for one axis.
    pub const fn for_axis(&self, axis: Axis) -> u32 {
        match axis {
            Axis::NorthSouth => self.north_south,
            Axis::EastWest => self.east_west,
        }
    }
}

/// Partition the vehicle set into axis tallies by lane identifier.
///
/// Lane names encode the approach direction; a lane mentioning north or
/// south belongs to the north-south group, east or west to the east-west
/// group. Unmatched lanes (internal junction lanes) are not counted.
pub fn count_by_axis(vehicles: &[Vehicle]) -> AxisCounts {
    let mut counts = AxisCounts::default();
    for vehicle in vehicles {
        if vehicle.lane.contains("north") || vehicle.lane.contains("south") {
            counts.north_south = counts.north_south.saturating_add(1);
        } else if vehicle.lane.contains("east") || vehicle.lane.contains("west") {
            counts.east_west = counts.east_west.saturating_add(1);
        }
    }
    counts
}

/// A decided green-axis switch: one atomic four-head batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchDecision {
    /// The axis that receives green.
    pub target: Axis,
    /// The full four-head batch realizing the switch.
    pub commands: Vec<LightCommand>,
}

/// Result of one optimizer evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptimizerOutcome {
    /// The switch to apply, if the hysteresis rule fired.
    pub decision: Option<SwitchDecision>,
    /// Advisory output surfaced to consumers, never auto-applied.
    pub advisories: Vec<String>,
    /// Whether a fresh detection cycle corroborated the congestion
    /// (`None` when the feed was stale or absent).
    pub detection_confirmed: Option<bool>,
}

/// Evaluate the signal policy for one tick.
///
/// `current_green` is the axis currently holding green (`None` when a
/// manual override has left the heads mixed). `detection` is the fresh
/// detection view, or `None` to decide from simulation alone.
pub fn evaluate(
    counts: AxisCounts,
    current_green: Option<Axis>,
    detection: Option<&DetectionView>,
    policy: &PolicyConfig,
) -> OptimizerOutcome {
    let mut outcome = OptimizerOutcome::default();

    let target = winning_axis(counts, policy.switch_margin);

    if let Some(view) = detection {
        outcome.detection_confirmed = Some(view.vehicle_count > 0);

        if view.pedestrian_count > policy.pedestrian_threshold {
            outcome.advisories.push(format!(
                "Shorten vehicle green phase: {} pedestrians waiting",
                view.pedestrian_count
            ));
        }
    }

    let Some(target) = target else {
        debug!(
            north_south = counts.north_south,
            east_west = counts.east_west,
            margin = policy.switch_margin,
            "axis counts within hysteresis margin, lights unchanged"
        );
        return outcome;
    };

    if current_green == Some(target) {
        // The busier axis already holds green.
        return outcome;
    }

    if outcome.detection_confirmed == Some(false) {
        // The camera sees an empty scene while the simulation is
        // congested; the simulation stays authoritative.
        warn!(
            target = ?target,
            north_south = counts.north_south,
            east_west = counts.east_west,
            "detection feed does not corroborate simulated congestion"
        );
    }

    debug!(
        target = ?target,
        north_south = counts.north_south,
        east_west = counts.east_west,
        "switching green axis"
    );

    outcome.decision = Some(SwitchDecision {
        target,
        commands: switch_batch(target),
    });
    outcome
}

/// The axis exceeding the other by more than the margin, if any.
fn winning_axis(counts: AxisCounts, margin: u32) -> Option<Axis> {
    if counts.north_south > counts.east_west.saturating_add(margin) {
        Some(Axis::NorthSouth)
    } else if counts.east_west > counts.north_south.saturating_add(margin) {
        Some(Axis::EastWest)
    } else {
        None
    }
}

/// Build the atomic four-head batch giving `target` green.
///
/// The batch always carries all four heads so the engine applies the
/// switch in one exchange -- both axes green is never observable, and a
/// mixed state left by a manual override is settled in the same step.
fn switch_batch(target: Axis) -> Vec<LightCommand> {
    let mut commands = Vec::with_capacity(4);
    for approach in target.approaches() {
        commands.push(LightCommand {
            approach,
            state: LightState::Green,
        });
    }
    for approach in target.opposing().approaches() {
        commands.push(LightCommand {
            approach,
            state: LightState::Red,
        });
    }
    commands
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use greenwave_types::Approach;

    use super::*;
    use crate::link::StubLink;

    fn policy() -> PolicyConfig {
        PolicyConfig::default()
    }

    fn counts(north_south: u32, east_west: u32) -> AxisCounts {
        AxisCounts {
            north_south,
            east_west,
        }
    }

    #[test]
    fn lane_names_partition_into_axes() {
        let vehicles = vec![
            StubLink::vehicle("a", "north_in_0", 10.0),
            StubLink::vehicle("b", "south_in_1", 10.0),
            StubLink::vehicle("c", "east_in_0", 10.0),
            StubLink::vehicle("d", "west_in_0", 10.0),
            StubLink::vehicle("e", "junction_internal", 10.0),
        ];
        let counts = count_by_axis(&vehicles);
        assert_eq!(counts.north_south, 2);
        assert_eq!(counts.east_west, 2);
    }

    #[test]
    fn oscillation_within_margin_never_switches() {
        let policy = policy();
        // 5 vs 4 and 4 vs 5, repeatedly: difference never exceeds the
        // margin, so the lights must not change.
        for _ in 0..10 {
            let a = evaluate(counts(5, 4), Some(Axis::EastWest), None, &policy);
            assert!(a.decision.is_none());
            let b = evaluate(counts(4, 5), Some(Axis::EastWest), None, &policy);
            assert!(b.decision.is_none());
        }
    }

    #[test]
    fn difference_equal_to_margin_does_not_switch() {
        let policy = policy();
        let outcome = evaluate(counts(7, 4), Some(Axis::EastWest), None, &policy);
        assert!(outcome.decision.is_none());
    }

    #[test]
    fn clear_winner_switches_atomically() {
        let policy = policy();
        let outcome = evaluate(counts(12, 3), Some(Axis::EastWest), None, &policy);
        let decision = outcome.decision.unwrap();
        assert_eq!(decision.target, Axis::NorthSouth);

        // One batch of exactly four heads: NS green, EW red.
        assert_eq!(decision.commands.len(), 4);
        let state_of = |approach: Approach| {
            decision
                .commands
                .iter()
                .find(|c| c.approach == approach)
                .map(|c| c.state)
                .unwrap()
        };
        assert_eq!(state_of(Approach::North), LightState::Green);
        assert_eq!(state_of(Approach::South), LightState::Green);
        assert_eq!(state_of(Approach::East), LightState::Red);
        assert_eq!(state_of(Approach::West), LightState::Red);
    }

    #[test]
    fn winner_already_green_is_left_alone() {
        let policy = policy();
        let outcome = evaluate(counts(12, 3), Some(Axis::NorthSouth), None, &policy);
        assert!(outcome.decision.is_none());
    }

    #[test]
    fn mixed_lights_are_settled_by_a_clear_winner() {
        let policy = policy();
        // current_green None models a manual override having split an axis.
        let outcome = evaluate(counts(12, 3), None, None, &policy);
        assert_eq!(
            outcome.decision.map(|d| d.target),
            Some(Axis::NorthSouth)
        );
    }

    #[test]
    fn east_west_can_win_too() {
        let policy = policy();
        let outcome = evaluate(counts(2, 8), Some(Axis::NorthSouth), None, &policy);
        assert_eq!(outcome.decision.map(|d| d.target), Some(Axis::EastWest));
    }

    #[test]
    fn absent_detection_falls_back_to_simulation_only() {
        let policy = policy();
        let outcome = evaluate(counts(12, 3), Some(Axis::EastWest), None, &policy);
        assert!(outcome.decision.is_some());
        assert_eq!(outcome.detection_confirmed, None);
        assert!(outcome.advisories.is_empty());
    }

    #[test]
    fn fresh_detection_is_recorded_as_confirmation() {
        let policy = policy();
        let view = DetectionView {
            vehicle_count: 9,
            pedestrian_count: 0,
            emergency_present: false,
        };
        let outcome = evaluate(counts(12, 3), Some(Axis::EastWest), Some(&view), &policy);
        assert!(outcome.decision.is_some());
        assert_eq!(outcome.detection_confirmed, Some(true));
    }

    #[test]
    fn empty_camera_scene_does_not_veto_the_switch() {
        let policy = policy();
        let view = DetectionView {
            vehicle_count: 0,
            pedestrian_count: 0,
            emergency_present: false,
        };
        let outcome = evaluate(counts(12, 3), Some(Axis::EastWest), Some(&view), &policy);
        // Simulation stays authoritative; the disagreement is only logged.
        assert!(outcome.decision.is_some());
        assert_eq!(outcome.detection_confirmed, Some(false));
    }

    #[test]
    fn pedestrian_override_is_advisory_only() {
        let policy = policy();
        let view = DetectionView {
            vehicle_count: 4,
            pedestrian_count: 6,
            emergency_present: false,
        };
        let outcome = evaluate(counts(5, 4), Some(Axis::EastWest), Some(&view), &policy);
        // No forced state change...
        assert!(outcome.decision.is_none());
        // ...but the shorten-green advisory is emitted.
        assert_eq!(outcome.advisories.len(), 1);
        assert!(outcome
            .advisories
            .first()
            .unwrap()
            .contains("Shorten vehicle green phase"));
    }

    #[test]
    fn pedestrians_at_threshold_do_not_trigger_advisory() {
        let policy = policy();
        let view = DetectionView {
            vehicle_count: 4,
            pedestrian_count: 5,
            emergency_present: false,
        };
        let outcome = evaluate(counts(0, 0), Some(Axis::EastWest), Some(&view), &policy);
        assert!(outcome.advisories.is_empty());
    }
}
