//! # Geographic Utilities
//!
//! Geographic computations used by the live tracking pipeline.
//!
//! ## Overview
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`haversine_distance`] | Great-circle distance between two GPS points |
//! | [`polyline_length`] | Total length of a GPS path in meters |
//! | [`compute_bounds`] | Bounding box used to fit the map view |
//! | [`round_coordinate`] | Round a coordinate to a fixed number of decimals |
//! | [`format_distance`] | Human-readable distance ("850 m", "15.7 km") |
//!
//! ## Example
//!
//! ```rust
//! use yatra_live::{GpsPoint, geo_utils};
//!
//! let start = GpsPoint::new(9.9, 76.1);
//! let end = GpsPoint::new(10.0, 76.2);
//!
//! let dist = geo_utils::haversine_distance(&start, &end);
//! assert_eq!(geo_utils::format_distance(dist), "15.6 km");
//! ```
//!
//! ## Algorithm Notes
//!
//! ### Haversine Formula
//!
//! Distances assume a spherical Earth with radius 6,371,000 m. The halted/moving
//! threshold and straight-line fallback distances are both computed this way so
//! the two always agree.
//!
//! Reference: [Haversine formula (Wikipedia)](https://en.wikipedia.org/wiki/Haversine_formula)

use geo::{BoundingRect, Coord, MultiPoint, Point};

use crate::{Bounds, GpsPoint};

/// Earth radius used for all great-circle distances, in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

// =============================================================================
// Distance Functions
// =============================================================================

/// Calculate the great-circle distance between two GPS points using the Haversine formula.
///
/// The result is symmetric and zero for identical points.
///
/// # Example
///
/// ```rust
/// use yatra_live::{GpsPoint, geo_utils};
///
/// let a = GpsPoint::new(10.0, 76.0);
/// let b = GpsPoint::new(10.00005, 76.00005);
///
/// let d = geo_utils::haversine_distance(&a, &b);
/// assert!(d > 6.0 && d < 9.0); // jitter-sized step
/// ```
#[inline]
pub fn haversine_distance(p1: &GpsPoint, p2: &GpsPoint) -> f64 {
    let phi1 = p1.latitude.to_radians();
    let phi2 = p2.latitude.to_radians();
    let d_phi = (p2.latitude - p1.latitude).to_radians();
    let d_lambda = (p2.longitude - p1.longitude).to_radians();

    let a = (d_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);

    // Clamp guards against a > 1.0 from rounding on near-antipodal points
    let a = a.clamp(0.0, 1.0);
    EARTH_RADIUS_METERS * 2.0 * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Calculate the total length of a polyline (GPS path) in meters.
///
/// Empty or single-point paths return 0.0.
pub fn polyline_length(points: &[GpsPoint]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }

    points
        .windows(2)
        .map(|w| haversine_distance(&w[0], &w[1]))
        .sum()
}

// =============================================================================
// Map View
// =============================================================================

/// Compute the bounding box of a set of GPS points.
///
/// Used to fit the map view around the trail, the current marker and the
/// route to the destination. Returns `None` for empty input.
///
/// # Example
///
/// ```rust
/// use yatra_live::{GpsPoint, geo_utils};
///
/// let points = vec![
///     GpsPoint::new(9.90, 76.10),
///     GpsPoint::new(10.00, 76.20),
/// ];
///
/// let bounds = geo_utils::compute_bounds(&points).unwrap();
/// assert_eq!(bounds.min_lat, 9.90);
/// assert_eq!(bounds.max_lng, 76.20);
/// ```
pub fn compute_bounds(points: &[GpsPoint]) -> Option<Bounds> {
    let multi: MultiPoint<f64> = points
        .iter()
        .map(|p| Point::from(Coord { x: p.longitude, y: p.latitude }))
        .collect();

    multi.bounding_rect().map(|rect| Bounds {
        min_lat: rect.min().y,
        max_lat: rect.max().y,
        min_lng: rect.min().x,
        max_lng: rect.max().x,
    })
}

// =============================================================================
// Formatting
// =============================================================================

/// Round a coordinate to `decimals` decimal places.
///
/// The publisher sends coordinates rounded to 4 decimals (~11 m) so the exact
/// device position is not exposed on the public page.
#[inline]
pub fn round_coordinate(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// Format a distance in meters for display.
///
/// Below one kilometre the value is shown in whole meters, otherwise in
/// kilometres with one decimal.
pub fn format_distance(meters: f64) -> String {
    if meters < 1000.0 {
        format!("{:.0} m", meters)
    } else {
        format!("{:.1} km", meters / 1000.0)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
        (a - b).abs() < epsilon
    }

    #[test]
    fn test_haversine_distance_same_point() {
        let p = GpsPoint::new(10.0, 76.0);
        assert_eq!(haversine_distance(&p, &p), 0.0);
    }

    #[test]
    fn test_haversine_distance_symmetric() {
        let a = GpsPoint::new(9.9, 76.1);
        let b = GpsPoint::new(10.0, 76.2);
        assert_eq!(haversine_distance(&a, &b), haversine_distance(&b, &a));
    }

    #[test]
    fn test_haversine_distance_known_value() {
        // Roughly Kochi to Aluva region
        let a = GpsPoint::new(9.9, 76.1);
        let b = GpsPoint::new(10.0, 76.2);
        let dist = haversine_distance(&a, &b);
        assert!(approx_eq(dist, 15_600.0, 300.0), "got {}", dist);
    }

    #[test]
    fn test_haversine_jitter_step() {
        let a = GpsPoint::new(10.0, 76.0);
        let b = GpsPoint::new(10.00005, 76.00005);
        let dist = haversine_distance(&a, &b);
        assert!(dist > 6.0 && dist < 9.0, "got {}", dist);
    }

    #[test]
    fn test_polyline_length_empty_and_single() {
        assert_eq!(polyline_length(&[]), 0.0);
        assert_eq!(polyline_length(&[GpsPoint::new(10.0, 76.0)]), 0.0);
    }

    #[test]
    fn test_polyline_length_sums_segments() {
        let a = GpsPoint::new(10.0, 76.0);
        let b = GpsPoint::new(10.001, 76.0);
        let c = GpsPoint::new(10.002, 76.0);
        let total = polyline_length(&[a, b, c]);
        let expected = haversine_distance(&a, &b) + haversine_distance(&b, &c);
        assert!(approx_eq(total, expected, 1e-9));
    }

    #[test]
    fn test_compute_bounds() {
        let points = vec![
            GpsPoint::new(10.00, 76.30),
            GpsPoint::new(10.10, 76.20),
            GpsPoint::new(10.05, 76.25),
        ];
        let bounds = compute_bounds(&points).unwrap();
        assert_eq!(bounds.min_lat, 10.00);
        assert_eq!(bounds.max_lat, 10.10);
        assert_eq!(bounds.min_lng, 76.20);
        assert_eq!(bounds.max_lng, 76.30);
    }

    #[test]
    fn test_compute_bounds_empty() {
        assert!(compute_bounds(&[]).is_none());
    }

    #[test]
    fn test_round_coordinate() {
        assert_eq!(round_coordinate(9.931_249, 4), 9.9312);
        assert_eq!(round_coordinate(76.267_351, 4), 76.2674);
    }

    #[test]
    fn test_format_distance() {
        assert_eq!(format_distance(850.4), "850 m");
        assert_eq!(format_distance(15_712.0), "15.7 km");
    }
}
