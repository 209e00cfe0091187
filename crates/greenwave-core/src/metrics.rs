//! Telemetry aggregation: derived metrics over the current vehicle set.
//!
//! Aggregation is a pure function of the vehicle set -- no hidden state,
//! no incremental updates, so a dropped step can never cause drift. Wait
//! time, throughput, and queue length are proxy statistics behind the
//! pluggable [`CongestionEstimator`] trait; the reference implementation
//! is fully deterministic.

use greenwave_types::{TrafficMetrics, Vehicle};

use crate::config::PolicyConfig;

/// Proxy congestion statistics derived from the vehicle set.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CongestionEstimate {
    /// Estimated mean waiting time in seconds.
    pub average_wait_time_s: f64,
    /// Estimated junction throughput in vehicles per hour.
    pub throughput_per_hour: f64,
    /// Number of queued (near-stationary) vehicles.
    pub queue_length: u32,
}

/// Estimator for the proxy congestion statistics.
///
/// The interface is the contract: implementations must be monotonic in
/// congestion -- adding vehicles or lowering speeds never decreases
/// `queue_length` or `average_wait_time_s` -- and deterministic for a
/// given vehicle set. Estimators are shared with the control loop task,
/// hence the `Send + Sync` bound.
pub trait CongestionEstimator: Send + Sync {
    /// Estimate congestion statistics for the current vehicle set.
    fn estimate(&self, vehicles: &[Vehicle]) -> CongestionEstimate;
}

/// The reference estimator.
///
/// A vehicle below the slow-speed threshold counts as queued. Waiting
/// time grows linearly with the queue; throughput counts the vehicles
/// still moving, scaled to a nominal one junction clearance per moving
/// vehicle per minute.
#[derive(Debug, Clone, Copy)]
pub struct ReferenceEstimator {
    slow_speed_threshold: f64,
    wait_per_queued_s: f64,
}

impl ReferenceEstimator {
    /// Nominal junction clearances per moving vehicle per hour.
    const CLEARANCES_PER_HOUR: f64 = 60.0;

    /// Build the estimator from policy configuration.
    pub const fn from_policy(policy: &PolicyConfig) -> Self {
        Self {
            slow_speed_threshold: policy.slow_speed_threshold,
            wait_per_queued_s: policy.wait_per_queued_s,
        }
    }
}

impl CongestionEstimator for ReferenceEstimator {
    fn estimate(&self, vehicles: &[Vehicle]) -> CongestionEstimate {
        let queued = vehicles
            .iter()
            .filter(|v| v.speed < self.slow_speed_threshold)
            .count();
        let queue_length = u32::try_from(queued).unwrap_or(u32::MAX);

        let moving = vehicles.len().saturating_sub(queued);
        let moving = u32::try_from(moving).unwrap_or(u32::MAX);

        CongestionEstimate {
            average_wait_time_s: f64::from(queue_length) * self.wait_per_queued_s,
            throughput_per_hour: f64::from(moving) * Self::CLEARANCES_PER_HOUR,
            queue_length,
        }
    }
}

/// Recompute the full metric set from the current vehicle set.
///
/// `average_speed` is the mean over all vehicles, 0 for an empty set.
/// CO2 output is the per-vehicle base emission times the vehicle count,
/// plus a speed-dependent penalty: every queued vehicle adds the
/// configured congestion emission on top (idling traffic emits more).
pub fn compute_metrics(
    vehicles: &[Vehicle],
    estimator: &dyn CongestionEstimator,
    policy: &PolicyConfig,
) -> TrafficMetrics {
    let total_vehicles = u32::try_from(vehicles.len()).unwrap_or(u32::MAX);

    let average_speed = if vehicles.is_empty() {
        0.0
    } else {
        let speed_sum: f64 = vehicles.iter().map(|v| v.speed).sum();
        speed_sum / f64::from(total_vehicles)
    };

    let congestion = estimator.estimate(vehicles);

    let co2_emissions_kg = policy.base_emission_kg.mul_add(
        f64::from(total_vehicles),
        policy.congestion_emission_kg * f64::from(congestion.queue_length),
    );

    TrafficMetrics {
        total_vehicles,
        average_speed,
        average_wait_time_s: congestion.average_wait_time_s,
        throughput_per_hour: congestion.throughput_per_hour,
        queue_length: congestion.queue_length,
        co2_emissions_kg,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::link::StubLink;

    const EPSILON: f64 = 1e-9;

    fn setup() -> (ReferenceEstimator, PolicyConfig) {
        let policy = PolicyConfig::default();
        (ReferenceEstimator::from_policy(&policy), policy)
    }

    #[test]
    fn empty_set_has_zero_average_speed() {
        let (estimator, policy) = setup();
        let metrics = compute_metrics(&[], &estimator, &policy);
        assert_eq!(metrics.total_vehicles, 0);
        assert!(metrics.average_speed.abs() < EPSILON);
        assert_eq!(metrics.queue_length, 0);
        assert!(metrics.co2_emissions_kg.abs() < EPSILON);
    }

    #[test]
    fn average_speed_is_the_mean() {
        let (estimator, policy) = setup();
        let vehicles = vec![
            StubLink::vehicle("a", "north_in_0", 10.0),
            StubLink::vehicle("b", "north_in_0", 20.0),
            StubLink::vehicle("c", "east_in_0", 30.0),
        ];
        let metrics = compute_metrics(&vehicles, &estimator, &policy);
        assert!((metrics.average_speed - 20.0).abs() < EPSILON);
        assert_eq!(metrics.total_vehicles, 3);
    }

    #[test]
    fn queued_vehicles_are_those_below_threshold() {
        let (estimator, _) = setup();
        let vehicles = vec![
            StubLink::vehicle("stopped", "north_in_0", 0.0),
            StubLink::vehicle("crawling", "north_in_0", 1.5),
            StubLink::vehicle("moving", "east_in_0", 12.0),
        ];
        let estimate = estimator.estimate(&vehicles);
        assert_eq!(estimate.queue_length, 2);
        assert!((estimate.throughput_per_hour - 60.0).abs() < EPSILON);
        assert!((estimate.average_wait_time_s - 5.0).abs() < EPSILON);
    }

    #[test]
    fn estimator_is_monotonic_in_congestion() {
        let (estimator, _) = setup();
        let mut vehicles = vec![
            StubLink::vehicle("a", "north_in_0", 0.5),
            StubLink::vehicle("b", "north_in_0", 9.0),
        ];
        let before = estimator.estimate(&vehicles);

        // Adding a vehicle never decreases queue length or wait time.
        vehicles.push(StubLink::vehicle("c", "east_in_0", 0.5));
        let with_more = estimator.estimate(&vehicles);
        assert!(with_more.queue_length >= before.queue_length);
        assert!(with_more.average_wait_time_s >= before.average_wait_time_s);

        // Slowing a vehicle never decreases them either.
        if let Some(v) = vehicles.get_mut(1) {
            v.speed = 0.1;
        }
        let with_slower = estimator.estimate(&vehicles);
        assert!(with_slower.queue_length >= with_more.queue_length);
        assert!(with_slower.average_wait_time_s >= with_more.average_wait_time_s);
    }

    #[test]
    fn metrics_are_deterministic() {
        let (estimator, policy) = setup();
        let vehicles = vec![
            StubLink::vehicle("a", "north_in_0", 4.2),
            StubLink::vehicle("b", "east_in_0", 0.3),
        ];
        let first = compute_metrics(&vehicles, &estimator, &policy);
        let second = compute_metrics(&vehicles, &estimator, &policy);
        assert_eq!(first, second);
    }

    #[test]
    fn congestion_raises_emissions() {
        let (estimator, policy) = setup();
        let free_flow = vec![
            StubLink::vehicle("a", "north_in_0", 12.0),
            StubLink::vehicle("b", "east_in_0", 14.0),
        ];
        let jammed = vec![
            StubLink::vehicle("a", "north_in_0", 0.0),
            StubLink::vehicle("b", "east_in_0", 0.0),
        ];

        let free_metrics = compute_metrics(&free_flow, &estimator, &policy);
        let jam_metrics = compute_metrics(&jammed, &estimator, &policy);

        // Same vehicle count, but idling traffic emits more.
        assert!((free_metrics.co2_emissions_kg - 0.24).abs() < EPSILON);
        assert!(jam_metrics.co2_emissions_kg > free_metrics.co2_emissions_kg);
    }
}
