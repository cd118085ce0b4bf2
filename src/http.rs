//! HTTP clients for the public OpenStreetMap services.
//!
//! This module provides the production collaborators:
//! - [`NominatimClient`]: reverse geocoding (position to address) and
//!   forward search (free text to coordinates)
//! - [`OsrmClient`]: driving routes between two points
//!
//! Both share one pooled [`reqwest::Client`] carrying the identifying
//! User-Agent and the request timeout. Nominatim's usage policy allows one
//! request per second, so its requests are dispatched through a
//! [`DispatchSpacer`]. No client retries: callers fall back instead.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::config::TrackerConfig;
use crate::error::{Result, TrackerError};
use crate::place::{AddressFields, ForwardGeocoder, GeocodeMatch, ReverseGeocoder};
use crate::route::{RouteResponse, RoutingService};
use crate::GpsPoint;

/// Minimum spacing between two Nominatim request starts.
pub const NOMINATIM_DISPATCH_INTERVAL: Duration = Duration::from_millis(1000);

/// Build the shared client from the configuration.
pub fn build_client(config: &TrackerConfig) -> Result<Client> {
    Client::builder()
        .user_agent(config.user_agent.as_str())
        .timeout(config.request_timeout())
        .pool_idle_timeout(Duration::from_secs(60))
        .build()
        .map_err(|e| TrackerError::Config(format!("Failed to create HTTP client: {}", e)))
}

// ============================================================================
// Dispatch spacing
// ============================================================================

/// Spaces out when requests START. Each caller reserves the next free slot
/// and sleeps outside the lock until it arrives.
#[derive(Debug)]
pub struct DispatchSpacer {
    interval: Duration,
    next_dispatch: Mutex<Option<tokio::time::Instant>>,
}

impl DispatchSpacer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_dispatch: Mutex::new(None),
        }
    }

    /// Wait for our dispatch slot and return how long we waited.
    pub async fn wait_for_slot(&self) -> Duration {
        let wait = {
            let mut next = self.next_dispatch.lock().await;
            let now = tokio::time::Instant::now();
            let dispatch_at = match *next {
                Some(slot) if slot > now => slot,
                _ => now,
            };
            *next = Some(dispatch_at + self.interval);
            dispatch_at - now
        };

        if !wait.is_zero() {
            debug!("[DispatchSpacer] Waiting {:?} for slot", wait);
            tokio::time::sleep(wait).await;
        }
        wait
    }
}

/// GET `url` and decode the JSON body, logging a phase breakdown.
async fn get_json<T: DeserializeOwned>(client: &Client, label: &str, url: &str) -> Result<T> {
    let req_start = Instant::now();

    // Phase 1: send request, receive headers
    let resp = client
        .get(url)
        .send()
        .await
        .map_err(|e| TrackerError::NetworkFailure(format!("{} request error: {}", label, e)))?;
    let headers_elapsed = req_start.elapsed();

    let status = resp.status();
    if !status.is_success() {
        warn!("[{}] HTTP {} after {:?}", label, status, headers_elapsed);
        return Err(TrackerError::NetworkFailure(format!("{} HTTP {}", label, status)));
    }

    // Phase 2: body download
    let body_start = Instant::now();
    let bytes = resp
        .bytes()
        .await
        .map_err(|e| TrackerError::NetworkFailure(format!("{} body download error: {}", label, e)))?;
    let body_elapsed = body_start.elapsed();

    // Phase 3: JSON decoding
    let json_start = Instant::now();
    let data = serde_json::from_slice(&bytes)
        .map_err(|e| TrackerError::NetworkFailure(format!("{} JSON parse error: {}", label, e)))?;

    debug!(
        "[{}] headers={:?} body={:?}({:.1}KB) json={:?} total={:?}",
        label,
        headers_elapsed,
        body_elapsed,
        bytes.len() as f64 / 1024.0,
        json_start.elapsed(),
        req_start.elapsed()
    );
    Ok(data)
}

// ============================================================================
// Nominatim
// ============================================================================

/// `/reverse` response. Unknown positions come back with an `error` field
/// and no `address`.
#[derive(Debug, Deserialize)]
struct ReverseResponse {
    #[serde(default)]
    address: Option<AddressFields>,
    #[serde(default)]
    error: Option<String>,
}

/// One `/search` result. Nominatim sends coordinates as strings.
#[derive(Debug, Deserialize)]
struct SearchResult {
    lat: String,
    lon: String,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    address: AddressFields,
}

impl SearchResult {
    fn into_match(self) -> Result<GeocodeMatch> {
        let parse = |field: &str, value: &str| {
            value.trim().parse::<f64>().map_err(|_| {
                TrackerError::NetworkFailure(format!("Nominatim returned non-numeric {} '{}'", field, value))
            })
        };
        let point = GpsPoint::new(parse("lat", &self.lat)?, parse("lon", &self.lon)?);
        if !point.is_valid() {
            return Err(TrackerError::NetworkFailure(format!(
                "Nominatim returned out-of-range position {}",
                point
            )));
        }
        Ok(GeocodeMatch {
            point,
            display_name: self.display_name,
            address: self.address,
        })
    }
}

/// Nominatim geocoding client.
pub struct NominatimClient {
    client: Client,
    base_url: String,
    spacer: DispatchSpacer,
}

impl NominatimClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            spacer: DispatchSpacer::new(NOMINATIM_DISPATCH_INTERVAL),
        }
    }

    pub fn from_config(config: &TrackerConfig) -> Result<Self> {
        Ok(Self::new(build_client(config)?, config.nominatim_base_url.clone()))
    }

    fn reverse_url(&self, point: GpsPoint) -> String {
        format!(
            "{}/reverse?format=json&lat={}&lon={}&zoom=18&addressdetails=1&namedetails=1",
            self.base_url, point.latitude, point.longitude
        )
    }

    fn search_url(&self, query: &str) -> String {
        format!(
            "{}/search?format=json&q={}&limit=1&addressdetails=1",
            self.base_url,
            urlencoding::encode(query)
        )
    }
}

#[async_trait]
impl ReverseGeocoder for NominatimClient {
    async fn reverse(&self, point: GpsPoint) -> Result<Option<AddressFields>> {
        self.spacer.wait_for_slot().await;
        let response: ReverseResponse = get_json(&self.client, "Nominatim", &self.reverse_url(point)).await?;
        if let Some(error) = &response.error {
            debug!("[Nominatim] No address for {}: {}", point, error);
        }
        Ok(response.address)
    }
}

#[async_trait]
impl ForwardGeocoder for NominatimClient {
    async fn search(&self, query: &str) -> Result<Option<GeocodeMatch>> {
        self.spacer.wait_for_slot().await;
        let results: Vec<SearchResult> = get_json(&self.client, "Nominatim", &self.search_url(query)).await?;
        match results.into_iter().next() {
            Some(first) => {
                let found = first.into_match()?;
                info!("[Nominatim] '{}' -> {} ({})", query, found.point, found.display_name);
                Ok(Some(found))
            }
            None => {
                info!("[Nominatim] '{}' not found", query);
                Ok(None)
            }
        }
    }
}

// ============================================================================
// OSRM
// ============================================================================

/// OSRM driving-route client.
pub struct OsrmClient {
    client: Client,
    base_url: String,
}

impl OsrmClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &TrackerConfig) -> Result<Self> {
        Ok(Self::new(build_client(config)?, config.osrm_base_url.clone()))
    }

    /// OSRM takes `lng,lat` pairs.
    fn route_url(&self, origin: GpsPoint, destination: GpsPoint) -> String {
        format!(
            "{}/route/v1/driving/{},{};{},{}?overview=full&geometries=geojson",
            self.base_url, origin.longitude, origin.latitude, destination.longitude, destination.latitude
        )
    }
}

#[async_trait]
impl RoutingService for OsrmClient {
    async fn driving_route(&self, origin: GpsPoint, destination: GpsPoint) -> Result<RouteResponse> {
        get_json(&self.client, "OSRM", &self.route_url(origin, destination)).await
    }
}
