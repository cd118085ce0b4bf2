//! Resolve the road route between two points and print it.
//!
//! ```text
//! cargo run --example route_preview -- 9.9312 76.2673 10.5276 76.2144
//! RUST_LOG=debug cargo run --example route_preview -- <lat> <lng> <lat> <lng>
//! ```

use std::sync::Arc;

use yatra_live::geo_utils::format_distance;
use yatra_live::{GpsPoint, NominatimClient, OsrmClient, PlaceResolver, RouteDisplay, RouteResolver, TrackerConfig};

fn parse_args() -> Option<(GpsPoint, GpsPoint)> {
    let values: Vec<f64> = std::env::args()
        .skip(1)
        .map(|a| a.parse::<f64>())
        .collect::<Result<_, _>>()
        .ok()?;
    match values.as_slice() {
        [lat1, lng1, lat2, lng2] => Some((GpsPoint::new(*lat1, *lng1), GpsPoint::new(*lat2, *lng2))),
        _ => None,
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let (origin, destination) = parse_args().unwrap_or((
        GpsPoint::new(9.9312, 76.2673),
        GpsPoint::new(10.5276, 76.2144),
    ));

    let config = TrackerConfig::default().with_env_overrides();
    let routes = RouteResolver::with_timeout(Arc::new(OsrmClient::from_config(&config)?), config.request_timeout());
    let places = PlaceResolver::with_timeout(Arc::new(NominatimClient::from_config(&config)?), config.request_timeout());

    let from = places.lookup(origin).await;
    let to = places.lookup(destination).await;
    println!("From: {} ({})", from.label(&origin), from.district);
    println!("To:   {} ({})", to.label(&destination), to.district);

    match routes.resolve_display(origin, destination).await {
        RouteDisplay::Road(route) => {
            println!(
                "Road route: {} in about {} min, {} points",
                format_distance(route.distance_meters),
                (route.duration_secs / 60.0).round(),
                route.path.len()
            );
        }
        straight @ RouteDisplay::Straight { .. } => {
            println!(
                "No road route; straight line: {}",
                format_distance(straight.distance_meters())
            );
        }
    }
    Ok(())
}
