//! Publisher and viewer wired together over an in-memory store.
//!
//! A scripted device walks from Aluva towards Angamaly with a halt in the
//! middle; the viewer polls and prints what the public map would show.
//!
//! ```text
//! RUST_LOG=yatra_live=debug cargo run --example live_viewer [config.json]
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use yatra_live::geo_utils::format_distance;
use yatra_live::{
    DestinationForm, DeviceLocator, GpsPoint, InMemoryStore, NominatimClient, OsrmClient, PlaceResolver,
    Publisher, RouteResolver, TrackerConfig, Viewer,
};

/// Replays a fixed list of fixes, repeating the last one.
struct ScriptedDevice {
    fixes: Vec<GpsPoint>,
    next: AtomicUsize,
}

#[async_trait]
impl DeviceLocator for ScriptedDevice {
    async fn current_position(&self) -> yatra_live::Result<GpsPoint> {
        let i = self.next.fetch_add(1, Ordering::SeqCst).min(self.fixes.len() - 1);
        Ok(self.fixes[i])
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut config = match std::env::args().nth(1) {
        Some(path) => TrackerConfig::from_json_file(path)?,
        None => TrackerConfig::default(),
    }
    .with_env_overrides();
    // Compress the timeline so the demo finishes quickly
    config.position_poll_secs = 3;
    config.publisher_resend_secs = 4;

    let store = Arc::new(InMemoryStore::new());
    let nominatim = Arc::new(NominatimClient::from_config(&config)?);
    let places = PlaceResolver::with_timeout(nominatim.clone(), config.request_timeout());
    let routes = RouteResolver::with_timeout(Arc::new(OsrmClient::from_config(&config)?), config.request_timeout());

    let device = Arc::new(ScriptedDevice {
        fixes: vec![
            GpsPoint::new(10.1076, 76.3516),
            GpsPoint::new(10.1350, 76.3600),
            GpsPoint::new(10.1351, 76.3601),
            GpsPoint::new(10.1700, 76.3720),
            GpsPoint::new(10.1960, 76.3860),
        ],
        next: AtomicUsize::new(0),
    });

    let publisher = Arc::new(Publisher::new(
        store.clone(),
        places.clone(),
        nominatim,
        device,
        config.clone(),
    ));
    publisher.authenticate(&config.publisher_pin).await?;
    publisher
        .save_destination(DestinationForm {
            name: "Angamaly".to_string(),
            district: "Ernakulam".to_string(),
            arrival_time: "around 6 PM".to_string(),
            ..Default::default()
        })
        .await?;
    publisher.start_auto_publish().await?;

    let viewer = Arc::new(Viewer::new(store, places, routes, config));
    let scope = viewer.start();

    for _ in 0..8 {
        tokio::time::sleep(Duration::from_secs(3)).await;
        let session = viewer.snapshot().await;
        let Some(location) = session.location() else {
            println!("Waiting for first location... ({:?})", session.poll_state());
            continue;
        };
        let route = session
            .route()
            .map(|r| {
                let kind = if r.is_fallback() { "straight" } else { "road" };
                format!("{} ({})", format_distance(r.distance_meters()), kind)
            })
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{} | {} | trail {} pts, {} | to {}: {} | updated {}",
            session.status(),
            location.place.label(&location.point),
            session.trail().len(),
            format_distance(session.trail().length_meters()),
            session.destination().map_or("-", |d| d.name.as_str()),
            route,
            session.elapsed_label()
        );
    }

    scope.shutdown().await;
    publisher.logout().await;
    Ok(())
}
