//! Publisher: the operator side that pushes position and destination.
//!
//! The publisher page is gated by a single shared PIN compared locally. That
//! gate keeps casual visitors out of the form; it is **not** a security
//! boundary (no per-user identity, no expiry, no transport secrecy). Real
//! write protection has to come from the store's own rules.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::sync::Mutex;

use crate::config::TrackerConfig;
use crate::error::{Result, TrackerError};
use crate::geo_utils::round_coordinate;
use crate::ingest::{ingest, RawPositionReport};
use crate::place::{ForwardGeocoder, GeocodeMatch, PlaceResolver};
use crate::store::{LocationStore, LocationUpdate};
use crate::ticker::PeriodicTask;
use crate::{Destination, GpsPoint, MovementState, PlaceInfo};

/// Source of the device's own GPS fix.
#[async_trait]
pub trait DeviceLocator: Send + Sync {
    async fn current_position(&self) -> Result<GpsPoint>;
}

/// The "next destination" form as filled in by the operator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DestinationForm {
    pub name: String,
    pub district: String,
    pub arrival_time: String,
    pub note: String,
    /// Coordinates picked from a search result, if any
    pub coordinates: Option<GpsPoint>,
}

impl DestinationForm {
    /// Pre-fill the form from a search match.
    pub fn from_match(found: &GeocodeMatch) -> Self {
        Self {
            name: found.display_name.clone(),
            district: found.district(),
            coordinates: Some(found.point),
            ..Default::default()
        }
    }
}

#[derive(Debug, Default)]
struct PublisherState {
    authenticated: bool,
    status: MovementState,
    last_fix: Option<GpsPoint>,
    place: PlaceInfo,
}

/// Operator-side session.
pub struct Publisher {
    store: Arc<dyn LocationStore>,
    places: PlaceResolver,
    search: Arc<dyn ForwardGeocoder>,
    locator: Arc<dyn DeviceLocator>,
    config: TrackerConfig,
    state: Mutex<PublisherState>,
    auto_publish: Mutex<Option<PeriodicTask>>,
}

impl Publisher {
    pub fn new(
        store: Arc<dyn LocationStore>,
        places: PlaceResolver,
        search: Arc<dyn ForwardGeocoder>,
        locator: Arc<dyn DeviceLocator>,
        config: TrackerConfig,
    ) -> Self {
        Self {
            store,
            places,
            search,
            locator,
            config,
            state: Mutex::new(PublisherState::default()),
            auto_publish: Mutex::new(None),
        }
    }

    // ------------------------------------------------------------------------
    // PIN gate
    // ------------------------------------------------------------------------

    /// Unlock the publisher with the shared PIN. A wrong PIN can be retried.
    pub async fn authenticate(&self, pin: &str) -> Result<()> {
        if pin != self.config.publisher_pin {
            warn!("[Publisher] Incorrect PIN entered");
            return Err(TrackerError::AuthFailure);
        }
        self.state.lock().await.authenticated = true;
        info!("[Publisher] Unlocked");
        Ok(())
    }

    pub async fn is_authenticated(&self) -> bool {
        self.state.lock().await.authenticated
    }

    async fn ensure_authenticated(&self) -> Result<()> {
        if self.is_authenticated().await {
            Ok(())
        } else {
            Err(TrackerError::AuthFailure)
        }
    }

    /// Lock the publisher again: stops auto-resend and forgets the last fix.
    pub async fn logout(&self) {
        if let Some(task) = self.auto_publish.lock().await.take() {
            task.stop().await;
        }
        *self.state.lock().await = PublisherState::default();
        info!("[Publisher] Locked");
    }

    // ------------------------------------------------------------------------
    // Location
    // ------------------------------------------------------------------------

    /// Operator-selected status sent with every publish.
    pub async fn set_status(&self, status: MovementState) {
        self.state.lock().await.status = status;
    }

    pub async fn status(&self) -> MovementState {
        self.state.lock().await.status
    }

    pub async fn last_fix(&self) -> Option<(GpsPoint, PlaceInfo)> {
        let state = self.state.lock().await;
        state.last_fix.map(|p| (p, state.place.clone()))
    }

    /// Take a fresh device fix, round it and look up its place.
    ///
    /// The rounded fix goes through the same [`ingest`] validation as a
    /// stored report, so a fix the viewer would drop is never published.
    pub async fn capture_fix(&self) -> Result<GpsPoint> {
        self.ensure_authenticated().await?;

        let raw = self.locator.current_position().await?;
        let decimals = self.config.coordinate_precision;
        let report = ingest(&RawPositionReport::from_coordinates(
            round_coordinate(raw.latitude, decimals),
            round_coordinate(raw.longitude, decimals),
        ))
        .map_err(|reason| TrackerError::InvalidInput(format!("Device fix rejected: {}", reason)))?;

        let point = report.point;
        let place = self
            .places
            .resolve(point, &report.place_name, &report.district)
            .await;
        debug!("[Publisher] Fix {} ({})", point, place.label(&point));

        let mut state = self.state.lock().await;
        state.last_fix = Some(point);
        state.place = place;
        Ok(point)
    }

    /// Write the last fix, its place and the operator status to the store.
    pub async fn publish(&self) -> Result<LocationUpdate> {
        self.ensure_authenticated().await?;

        let (point, mut place, status) = {
            let state = self.state.lock().await;
            let point = state
                .last_fix
                .ok_or_else(|| TrackerError::InvalidInput("No location available".to_string()))?;
            (point, state.place.clone(), state.status)
        };

        if place.place.is_empty() {
            place = self.places.lookup(point).await;
            self.state.lock().await.place = place.clone();
        }

        let update = LocationUpdate {
            point,
            place_name: place.place,
            district: place.district,
            status: Some(status),
        };

        self.store
            .write_current(&update)
            .await
            .map_err(into_persistence_failure)?;

        info!(
            "[Publisher] Location updated: {} '{}' {}",
            update.point, update.place_name, status
        );
        Ok(update)
    }

    /// Capture a fix and publish it.
    pub async fn locate_and_publish(&self) -> Result<LocationUpdate> {
        self.capture_fix().await?;
        self.publish().await
    }

    /// Re-send the device position now and then every `publisher_resend_secs`
    /// until [`Publisher::logout`].
    pub async fn start_auto_publish(self: &Arc<Self>) -> Result<()> {
        self.ensure_authenticated().await?;

        let weak: Weak<Self> = Arc::downgrade(self);
        let task = PeriodicTask::start("publisher-resend", self.config.publisher_resend_interval(), move || {
            let weak = weak.clone();
            async move {
                let Some(publisher) = weak.upgrade() else {
                    return;
                };
                if let Err(e) = publisher.locate_and_publish().await {
                    warn!("[Publisher] Auto-publish failed: {}", e);
                }
            }
        });

        if let Some(previous) = self.auto_publish.lock().await.replace(task) {
            previous.stop().await;
        }
        Ok(())
    }

    pub async fn is_auto_publishing(&self) -> bool {
        self.auto_publish
            .lock()
            .await
            .as_ref()
            .is_some_and(PeriodicTask::is_running)
    }

    // ------------------------------------------------------------------------
    // Destination
    // ------------------------------------------------------------------------

    /// Look a destination up by name.
    pub async fn search_destination(&self, query: &str) -> Result<Option<GeocodeMatch>> {
        self.ensure_authenticated().await?;

        let query = query.trim();
        if query.is_empty() {
            return Err(TrackerError::InvalidInput(
                "Please enter a destination to search".to_string(),
            ));
        }
        self.search.search(query).await
    }

    /// Save the next destination. Without coordinates the name is geocoded;
    /// if that fails the destination is saved without coordinates.
    pub async fn save_destination(&self, form: DestinationForm) -> Result<Destination> {
        self.ensure_authenticated().await?;

        let mut coordinates = form.coordinates;
        if coordinates.is_none() && !form.name.trim().is_empty() {
            match self.search.search(form.name.trim()).await {
                Ok(Some(found)) => coordinates = Some(found.point),
                Ok(None) => debug!("[Publisher] No coordinates found for '{}'", form.name),
                Err(e) => warn!("[Publisher] Could not geocode destination '{}': {}", form.name, e),
            }
        }

        let destination = Destination {
            name: form.name,
            district: form.district,
            arrival_time: form.arrival_time,
            note: form.note,
            lat: coordinates.map(|p| p.latitude),
            lng: coordinates.map(|p| p.longitude),
            last_updated: None,
        };

        self.store
            .write_next(&destination)
            .await
            .map_err(into_persistence_failure)?;

        info!("[Publisher] Next destination saved: '{}'", destination.name);
        Ok(destination)
    }
}

fn into_persistence_failure(err: TrackerError) -> TrackerError {
    match err {
        TrackerError::PersistenceFailure { .. } => err,
        other => TrackerError::persistence(other.to_string()),
    }
}
