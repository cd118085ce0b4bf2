//! Movement classification: MOVING vs HALTED.

use log::debug;

use crate::geo_utils::haversine_distance;
use crate::{GpsPoint, MovementState, PositionReport};

/// Default halt threshold in meters, roughly the GPS jitter floor.
pub const DEFAULT_HALT_THRESHOLD_METERS: f64 = 20.0;

/// Decides whether the procession is moving from the two most recent points.
///
/// An explicit operator status in the report always wins. Otherwise the first
/// report of a session counts as moving, and later reports are halted when
/// they landed less than `halt_threshold_meters` from the previous trail point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MovementClassifier {
    pub halt_threshold_meters: f64,
}

impl Default for MovementClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_HALT_THRESHOLD_METERS)
    }
}

impl MovementClassifier {
    pub fn new(halt_threshold_meters: f64) -> Self {
        Self { halt_threshold_meters }
    }

    /// Classify `report` against the previous trail tail.
    pub fn classify(&self, previous: Option<&GpsPoint>, report: &PositionReport) -> MovementState {
        if let Some(status) = report.status {
            return status;
        }

        let Some(previous) = previous else {
            return MovementState::Moving;
        };

        let distance = haversine_distance(previous, &report.point);
        let state = if distance < self.halt_threshold_meters {
            MovementState::Halted
        } else {
            MovementState::Moving
        };
        debug!(
            "[MovementClassifier] {:.1}m since last point -> {}",
            distance, state
        );
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn report(lat: f64, lng: f64, status: Option<MovementState>) -> PositionReport {
        PositionReport {
            point: GpsPoint::new(lat, lng),
            place_name: String::new(),
            district: String::new(),
            status,
            observed_at: Utc::now(),
        }
    }

    #[test]
    fn test_first_report_is_moving() {
        let classifier = MovementClassifier::default();
        assert_eq!(classifier.classify(None, &report(10.0, 76.0, None)), MovementState::Moving);
    }

    #[test]
    fn test_jitter_is_halted() {
        let classifier = MovementClassifier::default();
        let previous = GpsPoint::new(10.0, 76.0);
        let state = classifier.classify(Some(&previous), &report(10.00005, 76.00005, None));
        assert_eq!(state, MovementState::Halted);
    }

    #[test]
    fn test_real_step_is_moving() {
        let classifier = MovementClassifier::default();
        let previous = GpsPoint::new(10.0, 76.0);
        // ~55 m north
        let state = classifier.classify(Some(&previous), &report(10.0005, 76.0, None));
        assert_eq!(state, MovementState::Moving);
    }

    #[test]
    fn test_explicit_status_wins() {
        let classifier = MovementClassifier::default();
        let previous = GpsPoint::new(10.0, 76.0);

        // Far away but operator says halted
        let halted = report(10.5, 76.5, Some(MovementState::Halted));
        assert_eq!(classifier.classify(Some(&previous), &halted), MovementState::Halted);

        // Same spot but operator says moving
        let moving = report(10.0, 76.0, Some(MovementState::Moving));
        assert_eq!(classifier.classify(Some(&previous), &moving), MovementState::Moving);

        // Also on the first report
        assert_eq!(classifier.classify(None, &halted), MovementState::Halted);
    }

    #[test]
    fn test_deterministic() {
        let classifier = MovementClassifier::default();
        let previous = GpsPoint::new(10.0, 76.0);
        let next = report(10.0001, 76.0001, None);
        let first = classifier.classify(Some(&previous), &next);
        for _ in 0..10 {
            assert_eq!(classifier.classify(Some(&previous), &next), first);
        }
    }

    #[test]
    fn test_custom_threshold() {
        let classifier = MovementClassifier::new(5.0);
        let previous = GpsPoint::new(10.0, 76.0);
        // ~7.8 m is movement under a 5 m threshold
        let state = classifier.classify(Some(&previous), &report(10.00005, 76.00005, None));
        assert_eq!(state, MovementState::Moving);
    }
}
