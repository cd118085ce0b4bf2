//! # Yatra Live
//!
//! Live location tracking core for a publicly shared procession map.
//!
//! An operator (the *publisher*) periodically pushes GPS fixes, a movement
//! status and a "next destination" into a hosted document store. A public
//! *viewer* polls that store and derives everything the map needs:
//! - a validated current position ([`ingest`])
//! - a MOVING / HALTED status ([`movement`])
//! - a bounded travel trail ([`trail`])
//! - a road route or straight-line fallback to the destination ([`route`])
//! - a human-readable place and district ([`place`])
//!
//! ## Features
//!
//! - **`http`** (default) - Nominatim and OSRM collaborators over `reqwest`
//!
//! ## Quick Start
//!
//! ```rust
//! use yatra_live::{GpsPoint, MovementState, TrailBuffer, MovementClassifier};
//! use yatra_live::ingest::{ingest, RawPositionReport};
//!
//! let mut trail = TrailBuffer::default();
//! let classifier = MovementClassifier::default();
//!
//! let first = ingest(&RawPositionReport::from_coordinates(10.0, 76.0)).unwrap();
//! assert_eq!(classifier.classify(trail.tail(), &first), MovementState::Moving);
//! trail.append(first.point);
//!
//! // ~7 m later: GPS jitter, not movement
//! let second = ingest(&RawPositionReport::from_coordinates(10.00005, 76.00005)).unwrap();
//! assert_eq!(classifier.classify(trail.tail(), &second), MovementState::Halted);
//! trail.append(second.point);
//! assert_eq!(trail.len(), 2);
//! ```

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod config;
pub mod error;
pub mod geo_utils;
pub mod ingest;
pub mod movement;
pub mod place;
pub mod publisher;
pub mod route;
pub mod session;
pub mod store;
pub mod ticker;
pub mod trail;
pub mod viewer;

// HTTP collaborators for geocoding and routing
#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "http")]
pub use http::{build_client, NominatimClient, OsrmClient};

pub use config::TrackerConfig;
pub use error::{Result, TrackerError};
pub use ingest::{ingest, RawPositionReport, Rejected};
pub use movement::MovementClassifier;
pub use place::{ForwardGeocoder, GeocodeMatch, PlaceResolver, ReverseGeocoder};
pub use publisher::{DestinationForm, DeviceLocator, Publisher};
pub use route::{RouteDisplay, RouteOutcome, RouteResolver, RoutingService};
pub use session::{PollState, ViewerSession};
pub use store::{InMemoryStore, LocationStore, LocationUpdate};
pub use ticker::{PeriodicTask, TaskScope};
pub use trail::TrailBuffer;
pub use viewer::Viewer;

// ============================================================================
// Core Types
// ============================================================================

/// A GPS coordinate with latitude and longitude.
///
/// Trail points are plain `GpsPoint`s kept in arrival order.
///
/// # Example
/// ```
/// use yatra_live::GpsPoint;
/// let point = GpsPoint::new(9.9312, 76.2673); // Kochi
/// assert!(point.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// A single point of the travel trail.
pub type TrailPoint = GpsPoint;

impl GpsPoint {
    /// Create a new GPS point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

impl fmt::Display for GpsPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}, {:.4}", self.latitude, self.longitude)
    }
}

/// Bounding box around the points shown on the map.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Get the center point of the bounds.
    pub fn center(&self) -> GpsPoint {
        GpsPoint::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }
}

/// Whether the procession is currently moving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MovementState {
    #[default]
    Moving,
    Halted,
}

impl MovementState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementState::Moving => "MOVING",
            MovementState::Halted => "HALTED",
        }
    }
}

impl fmt::Display for MovementState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "MOVING" => Ok(MovementState::Moving),
            "HALTED" => Ok(MovementState::Halted),
            other => Err(format!("Unknown movement status: {}", other)),
        }
    }
}

/// A validated, normalized position report.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionReport {
    pub point: GpsPoint,
    /// Publisher-supplied place name ("" when absent)
    pub place_name: String,
    /// Publisher-supplied district ("" when absent)
    pub district: String,
    /// Explicit operator status; overrides distance-based inference
    pub status: Option<MovementState>,
    pub observed_at: DateTime<Utc>,
}

/// The singleton "next destination" record.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Destination {
    #[serde(rename = "destination", default)]
    pub name: String,
    #[serde(default)]
    pub district: String,
    /// Free-form display text, e.g. "around 5 PM"
    #[serde(default)]
    pub arrival_time: String,
    #[serde(default)]
    pub note: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lng: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

impl Destination {
    /// Coordinates of the destination, when both are present and valid.
    pub fn coordinates(&self) -> Option<GpsPoint> {
        match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => Some(GpsPoint::new(lat, lng)).filter(GpsPoint::is_valid),
            _ => None,
        }
    }
}

/// Human-readable place and district for a position.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PlaceInfo {
    pub place: String,
    pub district: String,
}

impl PlaceInfo {
    pub fn new(place: impl Into<String>, district: impl Into<String>) -> Self {
        Self {
            place: place.into(),
            district: district.into(),
        }
    }

    /// Display label: the place name, or the coordinates when no name is known.
    pub fn label(&self, point: &GpsPoint) -> String {
        if self.place.is_empty() {
            point.to_string()
        } else {
            self.place.clone()
        }
    }
}

/// A successfully resolved road route.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteResult {
    /// Road path in (lat, lng) order
    pub path: Vec<GpsPoint>,
    /// Road distance in meters
    pub distance_meters: f64,
    /// Estimated driving time in seconds
    pub duration_secs: f64,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gps_point_validation() {
        assert!(GpsPoint::new(10.0, 76.0).is_valid());
        assert!(!GpsPoint::new(91.0, 0.0).is_valid());
        assert!(!GpsPoint::new(0.0, 181.0).is_valid());
        assert!(!GpsPoint::new(f64::NAN, 0.0).is_valid());
    }

    #[test]
    fn test_movement_state_parsing() {
        assert_eq!("MOVING".parse::<MovementState>().unwrap(), MovementState::Moving);
        assert_eq!("halted".parse::<MovementState>().unwrap(), MovementState::Halted);
        assert!("PARKED".parse::<MovementState>().is_err());
        assert_eq!(MovementState::default(), MovementState::Moving);
    }

    #[test]
    fn test_movement_state_serde() {
        let json = serde_json::to_string(&MovementState::Halted).unwrap();
        assert_eq!(json, "\"HALTED\"");
    }

    #[test]
    fn test_destination_document_shape() {
        let dest: Destination = serde_json::from_str(
            r#"{"destination":"Thrissur","district":"Thrissur","arrivalTime":"5 PM","note":"","lat":10.52,"lng":76.21}"#,
        )
        .unwrap();
        assert_eq!(dest.name, "Thrissur");
        assert_eq!(dest.arrival_time, "5 PM");
        assert_eq!(dest.coordinates(), Some(GpsPoint::new(10.52, 76.21)));
    }

    #[test]
    fn test_destination_without_coordinates() {
        let dest: Destination = serde_json::from_str(r#"{"destination":"Kannur"}"#).unwrap();
        assert_eq!(dest.coordinates(), None);
        assert_eq!(dest.district, "");
    }

    #[test]
    fn test_place_label_fallback() {
        let point = GpsPoint::new(9.93123, 76.26734);
        assert_eq!(PlaceInfo::default().label(&point), "9.9312, 76.2673");
        assert_eq!(PlaceInfo::new("Edappally", "Ernakulam").label(&point), "Edappally");
    }
}
