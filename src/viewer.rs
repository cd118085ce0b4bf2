//! Viewer: the public page's polling loop.
//!
//! One poll reads both store documents, ingests the position, fills in the
//! place name, recomputes the route when its inputs changed, and applies the
//! result to the [`ViewerSession`] under its sequence number.

use std::sync::Arc;

use chrono::Utc;
use log::{debug, info, warn};
use tokio::sync::Mutex;

use crate::config::TrackerConfig;
use crate::ingest::ingest;
use crate::place::PlaceResolver;
use crate::publisher::DeviceLocator;
use crate::route::RouteResolver;
use crate::session::{PollSnapshot, PollState, RouteUpdate, ViewerSession};
use crate::store::LocationStore;
use crate::ticker::TaskScope;
use crate::{Destination, PlaceInfo};

/// Banner shown when the store cannot be read.
pub const FETCH_ERROR_MESSAGE: &str = "Failed to fetch location";

/// Public live-location viewer.
pub struct Viewer {
    store: Arc<dyn LocationStore>,
    places: PlaceResolver,
    routes: RouteResolver,
    locator: Option<Arc<dyn DeviceLocator>>,
    config: TrackerConfig,
    session: Arc<Mutex<ViewerSession>>,
}

impl Viewer {
    pub fn new(
        store: Arc<dyn LocationStore>,
        places: PlaceResolver,
        routes: RouteResolver,
        config: TrackerConfig,
    ) -> Self {
        let session = Arc::new(Mutex::new(ViewerSession::new(&config)));
        Self {
            store,
            places,
            routes,
            locator: None,
            config,
            session,
        }
    }

    /// Also track the viewing device's own position.
    pub fn with_locator(mut self, locator: Arc<dyn DeviceLocator>) -> Self {
        self.locator = Some(locator);
        self
    }

    /// Shared handle to the session state.
    pub fn session(&self) -> Arc<Mutex<ViewerSession>> {
        Arc::clone(&self.session)
    }

    /// Copy of the current session state for rendering.
    pub async fn snapshot(&self) -> ViewerSession {
        self.session.lock().await.clone()
    }

    /// Run one poll cycle and return the resulting state.
    pub async fn poll_once(&self) -> PollState {
        let (seq, previous_point) = {
            let mut session = self.session.lock().await;
            (session.begin_poll(), session.current_point())
        };

        let reads = futures::try_join!(self.store.read_current(), self.store.read_next());
        let (raw, destination) = match reads {
            Ok(docs) => docs,
            Err(e) => {
                warn!("[Viewer] Poll #{} failed: {}", seq, e);
                let mut session = self.session.lock().await;
                session.apply_failure(seq, FETCH_ERROR_MESSAGE);
                return session.poll_state();
            }
        };

        let report = match raw {
            None => {
                debug!("[Viewer] Poll #{}: no location published yet", seq);
                None
            }
            Some(raw) => match ingest(&raw) {
                Ok(report) => Some(report),
                Err(reason) => {
                    debug!("[Viewer] Poll #{}: report dropped ({})", seq, reason);
                    None
                }
            },
        };

        let place = match &report {
            Some(report) => {
                let resolved = self
                    .places
                    .resolve(report.point, &report.place_name, &report.district)
                    .await;
                merge_place(resolved, &report.place_name, &report.district)
            }
            None => PlaceInfo::default(),
        };

        let route = self
            .route_update(
                report.as_ref().map(|r| r.point).or(previous_point),
                destination.as_ref(),
            )
            .await;

        let mut session = self.session.lock().await;
        if session.apply_poll(
            seq,
            PollSnapshot {
                report,
                place,
                destination,
                route,
            },
        ) {
            debug!(
                "[Viewer] Poll #{} applied: {} trail={} route={}",
                seq,
                session.status(),
                session.trail().len(),
                session.route().map_or("none", |r| if r.is_fallback() { "straight" } else { "road" })
            );
        }
        session.poll_state()
    }

    async fn route_update(
        &self,
        origin: Option<crate::GpsPoint>,
        destination: Option<&Destination>,
    ) -> RouteUpdate {
        let (Some(origin), Some(destination)) = (origin, destination.and_then(Destination::coordinates)) else {
            return RouteUpdate::Clear;
        };

        if !self.session.lock().await.route_needs_refresh(origin, destination) {
            return RouteUpdate::Keep;
        }

        RouteUpdate::Set {
            origin,
            destination,
            display: self.routes.resolve_display(origin, destination).await,
        }
    }

    /// Refresh the "last updated ... ago" text.
    pub async fn tick_elapsed(&self) -> String {
        let mut session = self.session.lock().await;
        session.refresh_elapsed(Utc::now());
        session.elapsed_label()
    }

    /// Update the viewing device's own position, if a locator is attached.
    pub async fn refresh_self_location(&self) {
        let Some(locator) = &self.locator else {
            return;
        };
        match locator.current_position().await {
            Ok(point) => self.session.lock().await.set_viewer_position(point),
            Err(e) => debug!("[Viewer] Self-location unavailable: {}", e),
        }
    }

    /// Start the periodic tasks of an open view. Shut the returned scope down
    /// (or drop it) when the view closes.
    pub fn start(self: &Arc<Self>) -> TaskScope {
        let mut scope = TaskScope::new();

        let viewer = Arc::clone(self);
        scope.spawn("position-poll", self.config.position_poll_interval(), move || {
            let viewer = Arc::clone(&viewer);
            async move {
                viewer.poll_once().await;
            }
        });

        let viewer = Arc::clone(self);
        scope.spawn("elapsed-tick", self.config.elapsed_tick_interval(), move || {
            let viewer = Arc::clone(&viewer);
            async move {
                viewer.tick_elapsed().await;
            }
        });

        if self.locator.is_some() {
            let viewer = Arc::clone(self);
            scope.spawn("self-location", self.config.self_location_interval(), move || {
                let viewer = Arc::clone(&viewer);
                async move {
                    viewer.refresh_self_location().await;
                }
            });
        }

        info!("[Viewer] Started {} periodic tasks", scope.len());
        scope
    }
}

/// Prefer looked-up names, falling back to whatever the document carried.
fn merge_place(resolved: PlaceInfo, stored_place: &str, stored_district: &str) -> PlaceInfo {
    PlaceInfo {
        place: if resolved.place.is_empty() {
            stored_place.to_string()
        } else {
            resolved.place
        },
        district: if resolved.district.is_empty() {
            stored_district.to_string()
        } else {
            resolved.district
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Result, TrackerError};
    use crate::ingest::RawPositionReport;
    use crate::place::{AddressFields, ReverseGeocoder};
    use crate::route::{RouteResponse, RoutingService};
    use crate::store::{InMemoryStore, LocationUpdate};
    use crate::{GpsPoint, MovementState};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::time::Duration;

    struct CountingReverse {
        calls: AtomicU32,
    }

    #[async_trait]
    impl ReverseGeocoder for CountingReverse {
        async fn reverse(&self, _point: GpsPoint) -> Result<Option<AddressFields>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some(AddressFields {
                village: Some("Kalady".to_string()),
                ..Default::default()
            }))
        }
    }

    struct CountingRouter {
        calls: AtomicU32,
        /// Number of leading calls that fail
        failures: u32,
    }

    #[async_trait]
    impl RoutingService for CountingRouter {
        async fn driving_route(&self, origin: GpsPoint, destination: GpsPoint) -> Result<RouteResponse> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(TrackerError::NetworkFailure("connection reset".to_string()));
            }
            Ok(serde_json::from_value(serde_json::json!({
                "code": "Ok",
                "routes": [{
                    "geometry": { "coordinates": [
                        [origin.longitude, origin.latitude],
                        [destination.longitude, destination.latitude]
                    ] },
                    "distance": 21000.0,
                    "duration": 1500.0
                }]
            }))
            .unwrap())
        }
    }

    /// Store whose reads can be switched off.
    struct FlakyStore {
        inner: InMemoryStore,
        down: AtomicBool,
    }

    #[async_trait]
    impl LocationStore for FlakyStore {
        async fn read_current(&self) -> Result<Option<RawPositionReport>> {
            if self.down.load(Ordering::SeqCst) {
                return Err(TrackerError::NetworkFailure("unavailable".to_string()));
            }
            self.inner.read_current().await
        }
        async fn write_current(&self, update: &LocationUpdate) -> Result<()> {
            self.inner.write_current(update).await
        }
        async fn read_next(&self) -> Result<Option<Destination>> {
            self.inner.read_next().await
        }
        async fn write_next(&self, destination: &Destination) -> Result<()> {
            self.inner.write_next(destination).await
        }
    }

    struct Harness {
        viewer: Arc<Viewer>,
        store: Arc<FlakyStore>,
        reverse: Arc<CountingReverse>,
        router: Arc<CountingRouter>,
    }

    fn harness(router_failures: u32) -> Harness {
        let store = Arc::new(FlakyStore {
            inner: InMemoryStore::new(),
            down: AtomicBool::new(false),
        });
        let reverse = Arc::new(CountingReverse { calls: AtomicU32::new(0) });
        let router = Arc::new(CountingRouter {
            calls: AtomicU32::new(0),
            failures: router_failures,
        });
        let viewer = Arc::new(Viewer::new(
            store.clone(),
            PlaceResolver::new(reverse.clone()),
            RouteResolver::new(router.clone()),
            TrackerConfig::default(),
        ));
        Harness {
            viewer,
            store,
            reverse,
            router,
        }
    }

    async fn publish_raw(store: &FlakyStore, lat: f64, lng: f64) {
        store
            .inner
            .put_raw_current(RawPositionReport::from_coordinates(lat, lng))
            .await;
    }

    fn destination(lat: f64, lng: f64) -> Destination {
        Destination {
            name: "Aluva".to_string(),
            lat: Some(lat),
            lng: Some(lng),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_empty_store_is_not_an_error_banner() {
        let h = harness(0);
        assert_eq!(h.viewer.poll_once().await, PollState::Error);
        assert!(h.viewer.snapshot().await.error().is_none());
    }

    #[tokio::test]
    async fn test_poll_renders_and_classifies() {
        let h = harness(0);
        publish_raw(&h.store, 10.0, 76.0).await;
        assert_eq!(h.viewer.poll_once().await, PollState::Rendered);

        publish_raw(&h.store, 10.00005, 76.00005).await;
        h.viewer.poll_once().await;

        let session = h.viewer.snapshot().await;
        assert_eq!(session.status(), MovementState::Halted);
        assert_eq!(session.trail().len(), 2);
        assert_eq!(session.location().unwrap().place.place, "Kalady");
    }

    #[tokio::test]
    async fn test_stored_place_name_avoids_geocoding() {
        let h = harness(0);
        let mut update = LocationUpdate::new(GpsPoint::new(10.0, 76.0));
        update.place_name = "Angamaly".to_string();
        update.district = "Ernakulam".to_string();
        h.store.write_current(&update).await.unwrap();

        h.viewer.poll_once().await;

        assert_eq!(h.reverse.calls.load(Ordering::SeqCst), 0);
        let session = h.viewer.snapshot().await;
        assert_eq!(session.location().unwrap().place.place, "Angamaly");
        assert_eq!(session.location().unwrap().place.district, "Ernakulam");
    }

    #[tokio::test]
    async fn test_rejected_report_keeps_previous_location() {
        let h = harness(0);
        publish_raw(&h.store, 10.0, 76.0).await;
        h.viewer.poll_once().await;

        h.store
            .inner
            .put_raw_current(
                serde_json::from_value(serde_json::json!({ "lat": "abc", "lng": 76.0 })).unwrap(),
            )
            .await;
        assert_eq!(h.viewer.poll_once().await, PollState::Error);

        let session = h.viewer.snapshot().await;
        assert_eq!(session.current_point(), Some(GpsPoint::new(10.0, 76.0)));
        assert_eq!(session.trail().len(), 1);
        assert!(session.error().is_none());
    }

    #[tokio::test]
    async fn test_read_failure_shows_banner_and_keeps_map() {
        let h = harness(0);
        publish_raw(&h.store, 10.0, 76.0).await;
        h.viewer.poll_once().await;

        h.store.down.store(true, Ordering::SeqCst);
        assert_eq!(h.viewer.poll_once().await, PollState::Error);
        let session = h.viewer.snapshot().await;
        assert_eq!(session.error(), Some(FETCH_ERROR_MESSAGE));
        assert_eq!(session.current_point(), Some(GpsPoint::new(10.0, 76.0)));

        h.store.down.store(false, Ordering::SeqCst);
        assert_eq!(h.viewer.poll_once().await, PollState::Rendered);
        assert!(h.viewer.snapshot().await.error().is_none());
    }

    #[tokio::test]
    async fn test_route_resolved_only_when_inputs_change() {
        let h = harness(0);
        publish_raw(&h.store, 10.0, 76.3).await;
        h.store.write_next(&destination(10.1, 76.35)).await.unwrap();

        h.viewer.poll_once().await;
        h.viewer.poll_once().await;
        assert_eq!(h.router.calls.load(Ordering::SeqCst), 1);
        let session = h.viewer.snapshot().await;
        assert!(!session.route().unwrap().is_fallback());
        assert_eq!(session.route().unwrap().distance_meters(), 21000.0);

        publish_raw(&h.store, 10.01, 76.3).await;
        h.viewer.poll_once().await;
        assert_eq!(h.router.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_route_fallback_and_clear() {
        let h = harness(u32::MAX);
        publish_raw(&h.store, 9.9, 76.1).await;
        h.store.write_next(&destination(10.0, 76.2)).await.unwrap();

        h.viewer.poll_once().await;
        let session = h.viewer.snapshot().await;
        let route = session.route().unwrap();
        assert!(route.is_fallback());
        assert!((route.distance_meters() - 15_600.0).abs() < 300.0);

        // Destination without coordinates: no route at all
        h.store
            .write_next(&Destination {
                name: "Somewhere".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        h.viewer.poll_once().await;
        assert!(h.viewer.snapshot().await.route().is_none());
    }

    #[tokio::test]
    async fn test_road_route_retried_after_transient_failure() {
        let h = harness(1);
        publish_raw(&h.store, 9.9, 76.1).await;
        h.store.write_next(&destination(10.0, 76.2)).await.unwrap();

        h.viewer.poll_once().await;
        assert!(h.viewer.snapshot().await.route().unwrap().is_fallback());

        // Same inputs: the straight line is not kept as a final answer
        h.viewer.poll_once().await;
        assert_eq!(h.router.calls.load(Ordering::SeqCst), 2);
        let session = h.viewer.snapshot().await;
        assert!(!session.route().unwrap().is_fallback());
        assert_eq!(session.route().unwrap().distance_meters(), 21000.0);

        // Once the road route is in, it is kept
        for _ in 0..3 {
            h.viewer.poll_once().await;
        }
        assert_eq!(h.router.calls.load(Ordering::SeqCst), 2);
    }

    /// Locator whose first fix fails.
    struct FlakyLocator {
        calls: AtomicU32,
    }

    #[async_trait]
    impl DeviceLocator for FlakyLocator {
        async fn current_position(&self) -> Result<GpsPoint> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(TrackerError::InvalidInput("User denied Geolocation".to_string()));
            }
            Ok(GpsPoint::new(10.05, 76.32))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_self_location_tracked_until_shutdown() {
        let h = harness(0);
        let locator = Arc::new(FlakyLocator { calls: AtomicU32::new(0) });
        let viewer = Arc::new(
            Viewer::new(
                h.store.clone(),
                PlaceResolver::new(h.reverse.clone()),
                RouteResolver::new(h.router.clone()),
                TrackerConfig::default(),
            )
            .with_locator(locator.clone()),
        );

        let scope = viewer.start();
        assert!(scope.task_names().contains(&"self-location"));

        // First fix fails and is absorbed
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(locator.calls.load(Ordering::SeqCst), 1);
        assert!(viewer.snapshot().await.viewer_position().is_none());

        tokio::time::sleep(Duration::from_secs(44)).await;
        assert_eq!(locator.calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            viewer.snapshot().await.viewer_position(),
            Some(GpsPoint::new(10.05, 76.32))
        );

        scope.shutdown().await;
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(locator.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_started_view_polls_until_shutdown() {
        let h = harness(0);
        publish_raw(&h.store, 10.0, 76.0).await;

        let scope = h.viewer.start();
        assert_eq!(scope.task_names(), vec!["position-poll", "elapsed-tick"]);

        tokio::time::sleep(Duration::from_secs(30)).await;
        scope.shutdown().await;

        // Polls at 0s, 12s and 24s, all of the same point
        let session = h.viewer.snapshot().await;
        assert_eq!(session.trail().len(), 3);
        assert_eq!(session.status(), MovementState::Halted);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(h.viewer.snapshot().await.trail().len(), 3);
    }

    #[test]
    fn test_merge_place_prefers_resolved() {
        let merged = merge_place(PlaceInfo::new("", "Ernakulam"), "Old", "Old District");
        assert_eq!(merged, PlaceInfo::new("Old", "Ernakulam"));
    }
}
