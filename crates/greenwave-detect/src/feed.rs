//! Last-known-value store for detection output.
//!
//! The [`DetectionFeed`] holds the most recent detection cycle's object
//! summaries, overwritten wholesale on every ingest. Readers never block
//! and never wait for the detection cadence: they get the last known value
//! (possibly stale, possibly empty) immediately.
//!
//! Freshness is tracked with the ingest timestamp. The optimizer-facing
//! [`view`](DetectionFeed::view) returns `None` when the feed is stale or
//! has never received data, which the optimizer treats as "fall back to
//! simulation-only counts" -- not as an error.

use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use greenwave_types::{DetectedObject, ObjectClass, TrafficDensity};

/// Vehicle-count boundary between medium and high density.
const HIGH_DENSITY_THRESHOLD: u32 = 10;

/// Tuning options for a [`DetectionFeed`].
#[derive(Debug, Clone)]
pub struct FeedOptions {
    /// Minimum confidence for an object summary to be kept.
    pub confidence_threshold: f64,
    /// Maximum age in milliseconds before the feed counts as stale.
    pub staleness_ms: u64,
    /// Pedestrian count above which crossing recommendations are emitted.
    pub pedestrian_threshold: u32,
}

impl Default for FeedOptions {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            staleness_ms: 5_000,
            pedestrian_threshold: 5,
        }
    }
}

/// Optimizer-facing projection of a fresh detection cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectionView {
    /// Total detected vehicle-class objects (car, truck, bus, motorcycle).
    pub vehicle_count: u32,
    /// Total detected pedestrians.
    pub pedestrian_count: u32,
    /// Whether an emergency vehicle is present in the scene.
    pub emergency_present: bool,
}

/// Inner mutable state guarded by the feed lock.
#[derive(Debug, Default)]
struct FeedState {
    /// Object summaries from the most recent detection cycle.
    objects: Vec<DetectedObject>,
    /// When the most recent cycle was ingested.
    received_at: Option<DateTime<Utc>>,
}

/// Shared last-known-value store for detection output.
///
/// Cloning is cheap: all clones share the same inner state, so the poll
/// loop writes through one clone while the control loop reads another.
#[derive(Debug, Clone)]
pub struct DetectionFeed {
    inner: Arc<RwLock<FeedState>>,
    options: FeedOptions,
}

impl DetectionFeed {
    /// Create an empty feed with the given options.
    pub fn new(options: FeedOptions) -> Self {
        Self {
            inner: Arc::new(RwLock::new(FeedState::default())),
            options,
        }
    }

    /// Replace the feed contents with one detection cycle's output.
    ///
    /// Summaries below the confidence threshold and summaries with a zero
    /// count are dropped during normalization. The ingest timestamp is
    /// refreshed even when the normalized set is empty -- an empty scene
    /// is still a fresh observation.
    pub fn ingest(&self, objects: Vec<DetectedObject>) {
        let normalized: Vec<DetectedObject> = objects
            .into_iter()
            .filter(|o| o.count > 0 && o.confidence >= self.options.confidence_threshold)
            .collect();

        let mut state = self.write_state();
        state.objects = normalized;
        state.received_at = Some(Utc::now());
    }

    /// The last known object summaries, empty if none received yet.
    ///
    /// Non-blocking; may be stale.
    pub fn latest(&self) -> Vec<DetectedObject> {
        self.read_state().objects.clone()
    }

    /// When the most recent detection cycle was ingested.
    pub fn received_at(&self) -> Option<DateTime<Utc>> {
        self.read_state().received_at
    }

    /// Whether the feed has data younger than the staleness window.
    pub fn is_fresh(&self) -> bool {
        self.read_state().received_at.is_some_and(|at| {
            let elapsed = Utc::now().signed_duration_since(at).num_milliseconds();
            u64::try_from(elapsed.max(0)).unwrap_or(u64::MAX) <= self.options.staleness_ms
        })
    }

    /// Total detected vehicle-class objects in the last known cycle.
    pub fn vehicle_count(&self) -> u32 {
        self.read_state()
            .objects
            .iter()
            .filter(|o| o.class.is_vehicle())
            .fold(0u32, |acc, o| acc.saturating_add(o.count))
    }

    /// Total detected pedestrians in the last known cycle.
    pub fn pedestrian_count(&self) -> u32 {
        self.read_state()
            .objects
            .iter()
            .filter(|o| o.class == ObjectClass::Pedestrian)
            .fold(0u32, |acc, o| acc.saturating_add(o.count))
    }

    /// Whether an emergency vehicle is present in the last known cycle.
    pub fn emergency_present(&self) -> bool {
        self.read_state()
            .objects
            .iter()
            .any(|o| o.class == ObjectClass::EmergencyVehicle)
    }

    /// Classify traffic density from the detected vehicle count.
    ///
    /// Zero vehicles is low, below ten is medium, ten or more is high.
    pub fn traffic_density(&self) -> TrafficDensity {
        let vehicles = self.vehicle_count();
        if vehicles == 0 {
            TrafficDensity::Low
        } else if vehicles < HIGH_DENSITY_THRESHOLD {
            TrafficDensity::Medium
        } else {
            TrafficDensity::High
        }
    }

    /// Advisory recommendations derived from the last known cycle.
    ///
    /// These are surfaced to consumers in the published snapshot; nothing
    /// here is auto-applied to the signal program.
    pub fn recommendations(&self) -> Vec<String> {
        let mut recommendations = Vec::new();

        if self.traffic_density() == TrafficDensity::High {
            recommendations.push(String::from("Consider extending green light duration"));
            recommendations.push(String::from("Monitor for potential congestion"));
        }

        if self.pedestrian_count() > self.options.pedestrian_threshold {
            recommendations.push(String::from("Activate pedestrian crossing signals"));
            recommendations.push(String::from("Reduce vehicle green light time"));
        }

        if self.emergency_present() {
            recommendations.push(String::from("PRIORITY: Clear path for emergency vehicle"));
        }

        recommendations
    }

    /// Optimizer-facing projection of the feed.
    ///
    /// Returns `None` when the feed is stale or has never received data;
    /// the optimizer then decides from simulated counts alone.
    pub fn view(&self) -> Option<DetectionView> {
        if !self.is_fresh() {
            return None;
        }
        Some(DetectionView {
            vehicle_count: self.vehicle_count(),
            pedestrian_count: self.pedestrian_count(),
            emergency_present: self.emergency_present(),
        })
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, FeedState> {
        // A poisoned lock only means a writer panicked mid-update; the
        // last-known-value contract still holds, so recover the guard.
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, FeedState> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use greenwave_types::ObjectClass;

    use super::*;
    use crate::source::StubDetectionSource;

    fn feed() -> DetectionFeed {
        DetectionFeed::new(FeedOptions::default())
    }

    #[test]
    fn empty_feed_is_stale_and_low_density() {
        let feed = feed();
        assert!(feed.latest().is_empty());
        assert!(!feed.is_fresh());
        assert_eq!(feed.traffic_density(), TrafficDensity::Low);
        assert!(feed.view().is_none());
    }

    #[test]
    fn ingest_overwrites_wholesale() {
        let feed = feed();
        feed.ingest(vec![StubDetectionSource::object(ObjectClass::Car, 4, 0.9)]);
        feed.ingest(vec![StubDetectionSource::object(ObjectClass::Bus, 1, 0.9)]);

        let latest = feed.latest();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest.first().map(|o| o.class), Some(ObjectClass::Bus));
        assert!(feed.is_fresh());
    }

    #[test]
    fn low_confidence_and_zero_counts_are_dropped() {
        let feed = feed();
        feed.ingest(vec![
            StubDetectionSource::object(ObjectClass::Car, 4, 0.3),
            StubDetectionSource::object(ObjectClass::Truck, 0, 0.9),
            StubDetectionSource::object(ObjectClass::Bus, 2, 0.8),
        ]);

        let latest = feed.latest();
        assert_eq!(latest.len(), 1);
        assert_eq!(feed.vehicle_count(), 2);
    }

    #[test]
    fn density_thresholds() {
        let feed = feed();
        assert_eq!(feed.traffic_density(), TrafficDensity::Low);

        feed.ingest(vec![StubDetectionSource::object(ObjectClass::Car, 9, 0.9)]);
        assert_eq!(feed.traffic_density(), TrafficDensity::Medium);

        feed.ingest(vec![
            StubDetectionSource::object(ObjectClass::Car, 9, 0.9),
            StubDetectionSource::object(ObjectClass::Truck, 1, 0.9),
        ]);
        assert_eq!(feed.traffic_density(), TrafficDensity::High);
    }

    #[test]
    fn pedestrians_and_bicycles_do_not_count_as_vehicles() {
        let feed = feed();
        feed.ingest(vec![
            StubDetectionSource::object(ObjectClass::Pedestrian, 8, 0.9),
            StubDetectionSource::object(ObjectClass::Bicycle, 3, 0.9),
        ]);
        assert_eq!(feed.vehicle_count(), 0);
        assert_eq!(feed.traffic_density(), TrafficDensity::Low);
        assert_eq!(feed.pedestrian_count(), 8);
    }

    #[test]
    fn recommendations_for_crowded_scene() {
        let feed = feed();
        feed.ingest(vec![
            StubDetectionSource::object(ObjectClass::Car, 12, 0.9),
            StubDetectionSource::object(ObjectClass::Pedestrian, 6, 0.9),
            StubDetectionSource::object(ObjectClass::EmergencyVehicle, 1, 0.9),
        ]);

        let recommendations = feed.recommendations();
        assert!(recommendations
            .iter()
            .any(|r| r.contains("extending green light")));
        assert!(recommendations
            .iter()
            .any(|r| r.contains("pedestrian crossing")));
        assert!(recommendations.iter().any(|r| r.starts_with("PRIORITY")));
    }

    #[test]
    fn quiet_scene_has_no_recommendations() {
        let feed = feed();
        feed.ingest(vec![StubDetectionSource::object(ObjectClass::Car, 2, 0.9)]);
        assert!(feed.recommendations().is_empty());
    }

    #[test]
    fn view_reflects_fresh_scene() {
        let feed = feed();
        feed.ingest(vec![
            StubDetectionSource::object(ObjectClass::Car, 5, 0.9),
            StubDetectionSource::object(ObjectClass::Pedestrian, 2, 0.9),
        ]);

        let view = feed.view().unwrap();
        assert_eq!(view.vehicle_count, 5);
        assert_eq!(view.pedestrian_count, 2);
        assert!(!view.emergency_present);
    }

    #[test]
    fn zero_staleness_window_is_immediately_stale() {
        let feed = DetectionFeed::new(FeedOptions {
            staleness_ms: 0,
            ..FeedOptions::default()
        });
        feed.ingest(vec![StubDetectionSource::object(ObjectClass::Car, 5, 0.9)]);
        // received_at is set, but a zero window can only match the exact
        // ingest instant; by the time we check, the feed is stale.
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(!feed.is_fresh());
        assert!(feed.view().is_none());
        // latest() still serves the last known value.
        assert_eq!(feed.latest().len(), 1);
    }
}
