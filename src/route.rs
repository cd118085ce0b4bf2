//! Route resolution between the current position and the next destination.
//!
//! The road route comes from the [`RoutingService`] collaborator (OSRM in
//! production). Any failure (transport error, non-`Ok` code, empty route list,
//! timeout) is turned into [`RouteOutcome::Fallback`]; the caller then draws a
//! dashed straight segment with its great-circle distance instead.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::geo_utils::haversine_distance;
use crate::{GpsPoint, RouteResult};

/// Default bound on a single routing request.
pub const DEFAULT_ROUTE_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// Wire format
// ============================================================================

/// OSRM `route` service response.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RouteResponse {
    pub code: String,
    #[serde(default)]
    pub routes: Vec<WireRoute>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireRoute {
    pub geometry: WireGeometry,
    /// Meters
    pub distance: f64,
    /// Seconds
    #[serde(default)]
    pub duration: f64,
}

/// GeoJSON line geometry; coordinates are `[lng, lat]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireGeometry {
    pub coordinates: Vec<[f64; 2]>,
}

/// Driving route lookup.
#[async_trait]
pub trait RoutingService: Send + Sync {
    async fn driving_route(&self, origin: GpsPoint, destination: GpsPoint) -> Result<RouteResponse>;
}

// ============================================================================
// Resolution
// ============================================================================

/// Outcome of a route lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    /// Road path found
    Road(RouteResult),
    /// Routing unavailable; use the straight line
    Fallback,
}

/// What the map should draw toward the destination.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteDisplay {
    /// Solid road polyline
    Road(RouteResult),
    /// Dashed straight segment with great-circle distance
    Straight {
        from: GpsPoint,
        to: GpsPoint,
        distance_meters: f64,
    },
}

impl RouteOutcome {
    /// Convert into something drawable, computing the straight-line distance
    /// for a fallback.
    pub fn into_display(self, origin: GpsPoint, destination: GpsPoint) -> RouteDisplay {
        match self {
            RouteOutcome::Road(route) => RouteDisplay::Road(route),
            RouteOutcome::Fallback => RouteDisplay::Straight {
                from: origin,
                to: destination,
                distance_meters: haversine_distance(&origin, &destination),
            },
        }
    }
}

impl RouteDisplay {
    pub fn distance_meters(&self) -> f64 {
        match self {
            RouteDisplay::Road(route) => route.distance_meters,
            RouteDisplay::Straight { distance_meters, .. } => *distance_meters,
        }
    }

    /// Points to draw, in (lat, lng) order.
    pub fn path(&self) -> Vec<GpsPoint> {
        match self {
            RouteDisplay::Road(route) => route.path.clone(),
            RouteDisplay::Straight { from, to, .. } => vec![*from, *to],
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, RouteDisplay::Straight { .. })
    }
}

/// Map a routing response to an outcome. Only an `Ok` code with a drawable
/// first route counts as a road route.
pub fn outcome_from_response(response: RouteResponse) -> RouteOutcome {
    if response.code != "Ok" {
        debug!("[RouteResolver] Routing code {}", response.code);
        return RouteOutcome::Fallback;
    }

    let Some(route) = response.routes.into_iter().next() else {
        debug!("[RouteResolver] No routes returned");
        return RouteOutcome::Fallback;
    };

    let path: Vec<GpsPoint> = route
        .geometry
        .coordinates
        .iter()
        .map(|c| GpsPoint::new(c[1], c[0]))
        .collect();

    if path.is_empty() {
        debug!("[RouteResolver] Route has no geometry");
        return RouteOutcome::Fallback;
    }

    RouteOutcome::Road(RouteResult {
        path,
        distance_meters: route.distance,
        duration_secs: route.duration,
    })
}

/// Stateless resolver: one request per call, no cache, no retry.
#[derive(Clone)]
pub struct RouteResolver {
    service: Arc<dyn RoutingService>,
    timeout: Duration,
}

impl RouteResolver {
    pub fn new(service: Arc<dyn RoutingService>) -> Self {
        Self::with_timeout(service, DEFAULT_ROUTE_TIMEOUT)
    }

    pub fn with_timeout(service: Arc<dyn RoutingService>, timeout: Duration) -> Self {
        Self { service, timeout }
    }

    pub async fn resolve(&self, origin: GpsPoint, destination: GpsPoint) -> RouteOutcome {
        match tokio::time::timeout(self.timeout, self.service.driving_route(origin, destination)).await {
            Ok(Ok(response)) => {
                let outcome = outcome_from_response(response);
                if let RouteOutcome::Road(route) = &outcome {
                    debug!(
                        "[RouteResolver] {} -> {}: {:.0}m, {} points",
                        origin,
                        destination,
                        route.distance_meters,
                        route.path.len()
                    );
                }
                outcome
            }
            Ok(Err(e)) => {
                warn!("[RouteResolver] Routing failed, using straight line: {}", e);
                RouteOutcome::Fallback
            }
            Err(_) => {
                warn!("[RouteResolver] Routing timed out after {:?}, using straight line", self.timeout);
                RouteOutcome::Fallback
            }
        }
    }

    /// Resolve and convert straight into a drawable route.
    pub async fn resolve_display(&self, origin: GpsPoint, destination: GpsPoint) -> RouteDisplay {
        self.resolve(origin, destination).await.into_display(origin, destination)
    }
}
