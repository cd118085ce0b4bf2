//! Position ingest: validate and normalize raw position documents.
//!
//! The store document is loosely typed: coordinates may arrive as JSON
//! numbers or numeric strings, names may be missing, and the status may be
//! absent. [`ingest`] turns that into a [`PositionReport`] or a [`Rejected`]
//! reason. Rejections are not errors for the rest of the pipeline; callers
//! simply skip the report.

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::{GpsPoint, MovementState, PositionReport};

/// Raw `liveLocation/current` document as read from the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPositionReport {
    #[serde(default)]
    pub lat: Option<Value>,
    #[serde(default)]
    pub lng: Option<Value>,
    #[serde(default)]
    pub place_name: Option<String>,
    #[serde(default)]
    pub district: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    /// Server-assigned write time
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

impl RawPositionReport {
    /// A bare report with numeric coordinates and nothing else.
    pub fn from_coordinates(lat: f64, lng: f64) -> Self {
        Self {
            lat: Some(Value::from(lat)),
            lng: Some(Value::from(lng)),
            ..Default::default()
        }
    }
}

/// Why a raw report was not accepted.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Rejected {
    #[error("missing coordinate `{0}`")]
    MissingCoordinate(&'static str),
    #[error("coordinate `{0}` is not a finite number")]
    NonNumeric(&'static str),
    #[error("coordinates out of range: {lat}, {lng}")]
    OutOfRange { lat: f64, lng: f64 },
}

/// Validate and normalize a raw report, stamping it with the document's
/// `lastUpdated` or the current time.
pub fn ingest(raw: &RawPositionReport) -> Result<PositionReport, Rejected> {
    ingest_at(raw, Utc::now())
}

/// Same as [`ingest`], with an explicit fallback observation time.
pub fn ingest_at(raw: &RawPositionReport, received_at: DateTime<Utc>) -> Result<PositionReport, Rejected> {
    let lat = coerce_coordinate(raw.lat.as_ref(), "lat")?;
    let lng = coerce_coordinate(raw.lng.as_ref(), "lng")?;

    let point = GpsPoint::new(lat, lng);
    if !point.is_valid() {
        debug!("[PositionIngest] Rejected out-of-range report {}, {}", lat, lng);
        return Err(Rejected::OutOfRange { lat, lng });
    }

    let status = raw.status.as_deref().and_then(|s| match s.parse::<MovementState>() {
        Ok(state) => Some(state),
        Err(e) => {
            debug!("[PositionIngest] Ignoring status: {}", e);
            None
        }
    });

    Ok(PositionReport {
        point,
        place_name: raw.place_name.clone().unwrap_or_default(),
        district: raw.district.clone().unwrap_or_default(),
        status,
        observed_at: raw.last_updated.unwrap_or(received_at),
    })
}

fn coerce_coordinate(value: Option<&Value>, field: &'static str) -> Result<f64, Rejected> {
    let parsed = match value {
        None | Some(Value::Null) => return Err(Rejected::MissingCoordinate(field)),
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
    };

    match parsed {
        Some(v) if v.is_finite() => Ok(v),
        _ => {
            debug!("[PositionIngest] Rejected non-numeric `{}`: {:?}", field, value);
            Err(Rejected::NonNumeric(field))
        }
    }
}
