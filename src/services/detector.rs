//! Harsh-driving and overspeeding detection over a closing batch
//!
//! Harsh events are evaluated on median-smoothed speeds across 1/2/3-step
//! windows; each window emits independently, so one point can produce
//! several events. Overspeeding is evaluated per point against the limit
//! for its classified road.

use crate::domain::store::EventRecord;
use crate::domain::timestamp::{normalize_timestamp, parse_point_timestamp};
use crate::domain::types::{DriveEventKind, GpsPoint};
use crate::services::road_classifier::RoadClassifier;
use crate::services::speed_limit::SpeedLimitResolver;
use chrono::NaiveDateTime;
use tracing::debug;

/// Below this (both current and previous smoothed speed), an interval is
/// parking/creep noise and is not evaluated
const LOW_SPEED_FLOOR_KMH: f64 = 10.0;

/// Median smoothing window over raw speeds
const SMOOTHING_WINDOW: usize = 3;

// Thresholds in km/h per second, per evaluation window
const BRAKE_1_STEP: f64 = -15.0;
const ACCEL_1_STEP: f64 = 19.0;
const BRAKE_2_STEP: f64 = -13.5;
const ACCEL_2_STEP: f64 = 13.5;
const BRAKE_3_STEP: f64 = -13.3;
const ACCEL_3_STEP: f64 = 11.7;

/// Interval assumed when a point timestamp does not parse
const DEFAULT_STEP_SECS: f64 = 1.0;

/// Centered median smoothing, window clipped at sequence boundaries.
/// Sequences shorter than the window pass through unchanged.
pub fn smooth_speeds(speeds: &[f64]) -> Vec<f64> {
    if speeds.len() < SMOOTHING_WINDOW {
        return speeds.to_vec();
    }

    let half = SMOOTHING_WINDOW / 2;
    (0..speeds.len())
        .map(|i| {
            let start = i.saturating_sub(half);
            let end = (i + half + 1).min(speeds.len());
            median(&speeds[start..end])
        })
        .collect()
}

fn median(window: &[f64]) -> f64 {
    let mut sorted = window.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        sorted[mid]
    } else {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    }
}

fn elapsed_secs(earlier: Option<&NaiveDateTime>, later: Option<&NaiveDateTime>) -> Option<f64> {
    match (earlier, later) {
        (Some(a), Some(b)) => Some((*b - *a).num_milliseconds() as f64 / 1000.0),
        _ => None,
    }
}

fn event_at(
    vehicle_id: &str,
    driver_id: &str,
    point: &GpsPoint,
    kind: DriveEventKind,
) -> EventRecord {
    EventRecord {
        vehicle_id: vehicle_id.to_string(),
        driver_id: driver_id.to_string(),
        timestamp: normalize_timestamp(&point.timestamp),
        lat: point.lat,
        lon: point.lon,
        kind,
    }
}

/// Detect harsh braking/acceleration events over a batch.
///
/// Requires at least two points. Each 1/2/3-step threshold crossing emits
/// an independent event at the current point.
pub fn harsh_events(vehicle_id: &str, driver_id: &str, points: &[GpsPoint]) -> Vec<EventRecord> {
    if points.len() < 2 {
        return Vec::new();
    }

    let speeds: Vec<f64> = points.iter().map(|p| p.speed).collect();
    let smoothed = smooth_speeds(&speeds);
    let parsed: Vec<Option<NaiveDateTime>> =
        points.iter().map(|p| parse_point_timestamp(&p.timestamp)).collect();

    let mut events = Vec::new();

    for i in 1..points.len() {
        let current = smoothed[i];
        let previous = smoothed[i - 1];

        if current < LOW_SPEED_FLOOR_KMH && previous < LOW_SPEED_FLOOR_KMH {
            continue;
        }

        let point = &points[i];

        // 1-step window. Unparseable timestamps assume a 1 s interval;
        // a duplicate or out-of-order timestamp skips this window only.
        let one_step = match elapsed_secs(parsed[i - 1].as_ref(), parsed[i].as_ref()) {
            Some(dt) if dt <= 0.0 => None,
            Some(dt) => Some(dt),
            None => Some(DEFAULT_STEP_SECS),
        };
        if let Some(dt) = one_step {
            let accel = (current - previous) / dt;
            if accel <= BRAKE_1_STEP {
                events.push(event_at(vehicle_id, driver_id, point, DriveEventKind::HarshBrake));
            } else if accel >= ACCEL_1_STEP {
                events.push(event_at(
                    vehicle_id,
                    driver_id,
                    point,
                    DriveEventKind::HarshAcceleration,
                ));
            }
        }

        // 2-step window
        if i >= 2 {
            if let Some(dt) = elapsed_secs(parsed[i - 2].as_ref(), parsed[i].as_ref()) {
                if dt > 0.0 {
                    let accel = (current - smoothed[i - 2]) / dt;
                    if accel <= BRAKE_2_STEP {
                        events.push(event_at(
                            vehicle_id,
                            driver_id,
                            point,
                            DriveEventKind::HarshBrake,
                        ));
                    } else if accel >= ACCEL_2_STEP {
                        events.push(event_at(
                            vehicle_id,
                            driver_id,
                            point,
                            DriveEventKind::HarshAcceleration,
                        ));
                    }
                }
            }
        }

        // 3-step window
        if i >= 3 {
            if let Some(dt) = elapsed_secs(parsed[i - 3].as_ref(), parsed[i].as_ref()) {
                if dt > 0.0 {
                    let accel = (current - smoothed[i - 3]) / dt;
                    if accel <= BRAKE_3_STEP {
                        events.push(event_at(
                            vehicle_id,
                            driver_id,
                            point,
                            DriveEventKind::HarshBrake,
                        ));
                    } else if accel >= ACCEL_3_STEP {
                        events.push(event_at(
                            vehicle_id,
                            driver_id,
                            point,
                            DriveEventKind::HarshAcceleration,
                        ));
                    }
                }
            }
        }
    }

    if !events.is_empty() {
        debug!(vehicle_id, driver_id, count = %events.len(), "harsh_events_detected");
    }

    events
}

/// Derives driving events for a closing batch
pub struct EventDetector {
    classifier: RoadClassifier,
    limits: SpeedLimitResolver,
}

impl EventDetector {
    pub fn new(classifier: RoadClassifier, limits: SpeedLimitResolver) -> Self {
        Self { classifier, limits }
    }

    /// Overspeeding events for every point from index 1 onward (each point
    /// is evaluated when paired with its predecessor, so the first point
    /// of a batch is never checked).
    pub async fn overspeeding_events(
        &mut self,
        vehicle_id: &str,
        driver_id: &str,
        points: &[GpsPoint],
    ) -> Vec<EventRecord> {
        let mut events = Vec::new();

        for point in points.iter().skip(1) {
            let road = self.classifier.classify(point.lat, point.lon).await;
            let limit = self.limits.resolve(vehicle_id, road).await;

            if point.speed > limit {
                debug!(
                    vehicle_id,
                    speed = %point.speed,
                    limit = %limit,
                    road = %road,
                    "overspeeding_detected"
                );
                events.push(event_at(vehicle_id, driver_id, point, DriveEventKind::Overspeeding));
            }
        }

        events
    }

    pub fn harsh_events(
        &self,
        vehicle_id: &str,
        driver_id: &str,
        points: &[GpsPoint],
    ) -> Vec<EventRecord> {
        harsh_events(vehicle_id, driver_id, points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::RoadCategory;
    use crate::io::store::MemoryStore;
    use crate::services::road_classifier::{LookupError, RoadLookup};
    use async_trait::async_trait;
    use std::sync::Arc;

    fn point(ts: &str, speed: f64) -> GpsPoint {
        GpsPoint { timestamp: ts.to_string(), lat: 24.8607, lon: 67.0011, speed }
    }

    fn seconds_apart(speeds: &[f64]) -> Vec<GpsPoint> {
        speeds
            .iter()
            .enumerate()
            .map(|(i, &s)| point(&format!("2024-05-01 08:00:{:02}", i), s))
            .collect()
    }

    fn kinds(events: &[EventRecord]) -> Vec<DriveEventKind> {
        events.iter().map(|e| e.kind).collect()
    }

    #[test]
    fn test_median_odd_and_even() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0]), 2.5);
    }

    #[test]
    fn test_smoothing_suppresses_spike() {
        let smoothed = smooth_speeds(&[10.0, 100.0, 10.0]);
        assert_eq!(smoothed[1], 10.0);
    }

    #[test]
    fn test_smoothing_short_sequence_passthrough() {
        assert_eq!(smooth_speeds(&[60.0, 40.0]), vec![60.0, 40.0]);
    }

    #[test]
    fn test_no_events_for_single_point() {
        let points = seconds_apart(&[120.0]);
        assert!(harsh_events("veh1", "drv1", &points).is_empty());
    }

    #[test]
    fn test_stationary_batch_emits_nothing() {
        let points = seconds_apart(&[0.0, 0.0]);
        assert!(harsh_events("veh1", "drv1", &points).is_empty());
    }

    #[test]
    fn test_low_speed_creep_exempt() {
        let points = seconds_apart(&[9.0, 0.5]);
        assert!(harsh_events("veh1", "drv1", &points).is_empty());
    }

    #[test]
    fn test_single_harsh_brake() {
        // 60 -> 40 over 1 s is -20 km/h/s
        let points = seconds_apart(&[60.0, 40.0]);
        let events = harsh_events("veh1", "drv1", &points);

        assert_eq!(kinds(&events), vec![DriveEventKind::HarshBrake]);
        assert_eq!(events[0].timestamp, "2024-05-01 08:00:01");
        assert_eq!(events[0].lat, 24.8607);
    }

    #[test]
    fn test_single_harsh_acceleration() {
        // 50 -> 70 over 1 s is +20 km/h/s
        let points = seconds_apart(&[50.0, 70.0]);
        let events = harsh_events("veh1", "drv1", &points);

        assert_eq!(kinds(&events), vec![DriveEventKind::HarshAcceleration]);
    }

    #[test]
    fn test_moderate_braking_below_threshold() {
        let points = seconds_apart(&[60.0, 50.0]);
        assert!(harsh_events("veh1", "drv1", &points).is_empty());
    }

    #[test]
    fn test_duplicate_timestamp_skips_one_step_window() {
        // Same second twice; would be a massive deceleration otherwise
        let points = vec![point("2024-05-01 08:00:00", 60.0), point("2024-05-01 08:00:00", 20.0)];
        assert!(harsh_events("veh1", "drv1", &points).is_empty());
    }

    #[test]
    fn test_unparseable_timestamp_assumes_one_second() {
        let points =
            vec![point("2024-05-01T08:00:00Z", 60.0), point("2024-05-01T08:00:01Z", 40.0)];
        let events = harsh_events("veh1", "drv1", &points);

        assert_eq!(kinds(&events), vec![DriveEventKind::HarshBrake]);
        // Event timestamp is normalized into the storage zone
        assert_eq!(events[0].timestamp, "2024-05-01 13:00:01");
    }

    #[test]
    fn test_multi_window_braking_without_one_step_crossing() {
        // Raw speeds chosen so the smoothed sequence is [94, 80, 66, 52]:
        // every 1-step change is -14 (under the -15 threshold) while the
        // 2- and 3-step windows average -14 and cross theirs.
        let points = seconds_apart(&[108.0, 80.0, 66.0, 38.0]);
        let events = harsh_events("veh1", "drv1", &points);

        assert_eq!(
            kinds(&events),
            vec![DriveEventKind::HarshBrake, DriveEventKind::HarshBrake, DriveEventKind::HarshBrake]
        );
        // i=2 fires the 2-step window; i=3 fires both the 2- and 3-step
        assert_eq!(events[0].timestamp, "2024-05-01 08:00:02");
        assert_eq!(events[1].timestamp, "2024-05-01 08:00:03");
        assert_eq!(events[2].timestamp, "2024-05-01 08:00:03");
    }

    struct StaticLookup(Option<&'static str>);

    #[async_trait]
    impl RoadLookup for StaticLookup {
        async fn highway_tag(&self, _lat: f64, _lon: f64) -> Result<Option<String>, LookupError> {
            Ok(self.0.map(str::to_string))
        }
    }

    fn detector_with(tag: Option<&'static str>, store: Arc<MemoryStore>) -> EventDetector {
        let classifier = RoadClassifier::new(Arc::new(StaticLookup(tag)), 64);
        let limits = SpeedLimitResolver::new(store);
        EventDetector::new(classifier, limits)
    }

    #[tokio::test]
    async fn test_overspeeding_skips_first_point() {
        let store = Arc::new(MemoryStore::in_memory());
        let mut detector = detector_with(None, store);

        // Limit on Other Roads is 50; only the third point both exceeds it
        // and is eligible (index >= 1)
        let points = seconds_apart(&[60.0, 45.0, 70.0]);
        let events = detector.overspeeding_events("veh1", "drv1", &points).await;

        assert_eq!(kinds(&events), vec![DriveEventKind::Overspeeding]);
        assert_eq!(events[0].timestamp, "2024-05-01 08:00:02");
    }

    #[tokio::test]
    async fn test_no_overspeeding_at_or_below_limit() {
        let store = Arc::new(MemoryStore::in_memory());
        let mut detector = detector_with(None, store);

        let points = seconds_apart(&[40.0, 50.0]);
        assert!(detector.overspeeding_events("veh1", "drv1", &points).await.is_empty());
    }

    #[tokio::test]
    async fn test_overspeeding_respects_road_category() {
        let store = Arc::new(MemoryStore::in_memory());
        let mut detector = detector_with(Some("motorway"), store);

        // 110 km/h is fine on a motorway (limit 120)
        let points = seconds_apart(&[100.0, 110.0]);
        assert!(detector.overspeeding_events("veh1", "drv1", &points).await.is_empty());
    }

    #[tokio::test]
    async fn test_overspeeding_respects_vehicle_override() {
        let store = Arc::new(
            MemoryStore::in_memory().with_speed_limit("veh1", RoadCategory::OtherRoads, 60.0),
        );
        let mut detector = detector_with(None, store);

        let points = seconds_apart(&[55.0, 55.0]);
        assert!(detector.overspeeding_events("veh1", "drv1", &points).await.is_empty());
    }
}
