//! Place resolution: coordinates to a place name and district.
//!
//! Lookups go through the [`ReverseGeocoder`] collaborator (Nominatim in
//! production). A name already stored by the publisher is trusted as-is so the
//! public page does not re-geocode every poll and stays within the public
//! service's rate limits.
//!
//! Field priority is tuned for Indian address hierarchies, where the useful
//! label is the urban sub-locality rather than the city:
//!
//! | Output | Priority (first non-empty wins) |
//! |--------|---------------------------------|
//! | place | suburb, neighbourhood, quarter, village, city_district |
//! | district | state_district, county, city, town |

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::{GpsPoint, PlaceInfo};

/// Default bound on a single lookup.
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

/// The `address` object of a Nominatim response, reduced to the fields we read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressFields {
    #[serde(default)]
    pub suburb: Option<String>,
    #[serde(default)]
    pub neighbourhood: Option<String>,
    #[serde(default)]
    pub quarter: Option<String>,
    #[serde(default)]
    pub village: Option<String>,
    #[serde(default)]
    pub city_district: Option<String>,
    #[serde(default)]
    pub state_district: Option<String>,
    #[serde(default)]
    pub county: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub town: Option<String>,
}

impl AddressFields {
    /// Most specific locality name, or "" when none is present.
    pub fn place(&self) -> String {
        first_non_empty(&[
            &self.suburb,
            &self.neighbourhood,
            &self.quarter,
            &self.village,
            &self.city_district,
        ])
    }

    /// Administrative district, or "" when none is present.
    pub fn district(&self) -> String {
        first_non_empty(&[&self.state_district, &self.county, &self.city, &self.town])
    }

    pub fn to_place_info(&self) -> PlaceInfo {
        PlaceInfo::new(self.place(), self.district())
    }
}

fn first_non_empty(candidates: &[&Option<String>]) -> String {
    candidates
        .iter()
        .filter_map(|c| c.as_deref())
        .find(|s| !s.is_empty())
        .unwrap_or_default()
        .to_string()
}

/// Coordinates to address lookup.
#[async_trait]
pub trait ReverseGeocoder: Send + Sync {
    /// Address details for `point`; `Ok(None)` when the service knows no address.
    async fn reverse(&self, point: GpsPoint) -> Result<Option<AddressFields>>;
}

/// First match of a free-text place search.
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodeMatch {
    pub point: GpsPoint,
    pub display_name: String,
    pub address: AddressFields,
}

impl GeocodeMatch {
    pub fn district(&self) -> String {
        self.address.district()
    }
}

/// Free text to coordinates lookup.
#[async_trait]
pub trait ForwardGeocoder: Send + Sync {
    /// First match for `query`, or `Ok(None)` when nothing was found.
    async fn search(&self, query: &str) -> Result<Option<GeocodeMatch>>;
}

/// Resolves a place name and district for a position.
///
/// Never fails: any lookup problem yields an empty [`PlaceInfo`].
#[derive(Clone)]
pub struct PlaceResolver {
    geocoder: Arc<dyn ReverseGeocoder>,
    timeout: Duration,
}

impl PlaceResolver {
    pub fn new(geocoder: Arc<dyn ReverseGeocoder>) -> Self {
        Self::with_timeout(geocoder, DEFAULT_LOOKUP_TIMEOUT)
    }

    pub fn with_timeout(geocoder: Arc<dyn ReverseGeocoder>, timeout: Duration) -> Self {
        Self { geocoder, timeout }
    }

    /// Resolve the place for `point`.
    ///
    /// A non-empty `stored_place` is returned with `stored_district` without
    /// any lookup.
    pub async fn resolve(&self, point: GpsPoint, stored_place: &str, stored_district: &str) -> PlaceInfo {
        if !stored_place.is_empty() {
            return PlaceInfo::new(stored_place, stored_district);
        }
        self.lookup(point).await
    }

    /// Always performs a fresh lookup.
    pub async fn lookup(&self, point: GpsPoint) -> PlaceInfo {
        match tokio::time::timeout(self.timeout, self.geocoder.reverse(point)).await {
            Ok(Ok(Some(address))) => {
                let info = address.to_place_info();
                debug!(
                    "[PlaceResolver] {} -> place='{}' district='{}'",
                    point, info.place, info.district
                );
                info
            }
            Ok(Ok(None)) => {
                debug!("[PlaceResolver] No address for {}", point);
                PlaceInfo::default()
            }
            Ok(Err(e)) => {
                warn!("[PlaceResolver] Reverse geocoding failed for {}: {}", point, e);
                PlaceInfo::default()
            }
            Err(_) => {
                warn!("[PlaceResolver] Reverse geocoding timed out after {:?} for {}", self.timeout, point);
                PlaceInfo::default()
            }
        }
    }
}
