//! Bounded travel trail.

use std::collections::VecDeque;

use geo::{Coord, LineString};

use crate::geo_utils::polyline_length;
use crate::{GpsPoint, TrailPoint};

/// Default number of points kept in the trail.
pub const DEFAULT_TRAIL_CAPACITY: usize = 50;

/// Append-only history of recent positions, oldest first.
///
/// Once `capacity` points are held, each append evicts the oldest point.
/// Identical consecutive points are kept; they render as zero-length segments.
#[derive(Debug, Clone, PartialEq)]
pub struct TrailBuffer {
    points: VecDeque<TrailPoint>,
    capacity: usize,
}

impl Default for TrailBuffer {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_TRAIL_CAPACITY)
    }
}

impl TrailBuffer {
    /// Create an empty trail holding at most `capacity` points (minimum 1).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            points: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a point, evicting the oldest one at the bound. Returns the new
    /// trail length.
    pub fn append(&mut self, point: TrailPoint) -> usize {
        while self.points.len() >= self.capacity {
            self.points.pop_front();
        }
        self.points.push_back(point);
        self.points.len()
    }

    /// Most recent point, if any.
    pub fn tail(&self) -> Option<&TrailPoint> {
        self.points.back()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }

    /// Trail points in arrival order.
    pub fn points(&self) -> Vec<GpsPoint> {
        self.points.iter().copied().collect()
    }

    /// Distance covered along the trail in meters.
    pub fn length_meters(&self) -> f64 {
        polyline_length(&self.points())
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrailPoint> {
        self.points.iter()
    }

    /// The trail as a polyline (x = longitude, y = latitude) for map rendering.
    pub fn to_line_string(&self) -> LineString<f64> {
        LineString::new(
            self.points
                .iter()
                .map(|p| Coord { x: p.longitude, y: p.latitude })
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo_utils::haversine_distance;

    fn point(i: usize) -> GpsPoint {
        GpsPoint::new(10.0 + i as f64 * 0.001, 76.0)
    }

    #[test]
    fn test_first_append_seeds_trail() {
        let mut trail = TrailBuffer::default();
        assert!(trail.tail().is_none());
        trail.append(point(0));
        assert_eq!(trail.points(), vec![point(0)]);
    }

    #[test]
    fn test_bound_evicts_oldest() {
        let mut trail = TrailBuffer::default();
        for i in 0..50 {
            assert_eq!(trail.append(point(i)), i + 1);
        }
        assert_eq!(trail.append(point(50)), 50);
        let points = trail.points();
        assert_eq!(points[0], point(1));
        assert_eq!(*points.last().unwrap(), point(50));
    }

    #[test]
    fn test_never_exceeds_capacity() {
        let mut trail = TrailBuffer::with_capacity(5);
        for i in 0..500 {
            trail.append(point(i));
            assert!(trail.len() <= 5);
            assert_eq!(trail.tail(), Some(&point(i)));
        }
    }

    #[test]
    fn test_duplicates_are_kept() {
        let mut trail = TrailBuffer::default();
        trail.append(point(3));
        trail.append(point(3));
        assert_eq!(trail.len(), 2);
        assert_eq!(trail.length_meters(), 0.0);
    }

    #[test]
    fn test_length_follows_trail() {
        let mut trail = TrailBuffer::default();
        assert_eq!(trail.length_meters(), 0.0);
        trail.append(point(0));
        trail.append(point(1));
        trail.append(point(2));
        let expected = haversine_distance(&point(0), &point(1)) + haversine_distance(&point(1), &point(2));
        assert!((trail.length_meters() - expected).abs() < 1e-9);
        assert!((trail.length_meters() - 222.4).abs() < 0.5);
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let mut trail = TrailBuffer::with_capacity(0);
        trail.append(point(0));
        trail.append(point(1));
        assert_eq!(trail.points(), vec![point(1)]);
    }

    #[test]
    fn test_line_string_axis_order() {
        let mut trail = TrailBuffer::default();
        trail.append(GpsPoint::new(10.0, 76.0));
        let line = trail.to_line_string();
        assert_eq!(line.0[0], Coord { x: 76.0, y: 10.0 });
    }
}
