//! Runtime configuration for the viewer and publisher.

use std::fs;
use std::path::Path;
use std::time::Duration;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackerError};

/// Environment variable that overrides the publisher PIN.
pub const PIN_ENV_VAR: &str = "YATRA_PUBLISHER_PIN";

/// Configuration for the tracking pipeline.
///
/// Every field has a default, so a partial JSON file only needs to name the
/// values it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Base URL of the Nominatim geocoding service
    pub nominatim_base_url: String,
    /// Base URL of the OSRM routing service
    pub osrm_base_url: String,
    /// Identifying client header sent to the public services
    pub user_agent: String,
    /// Upper bound on any single geocoding/routing request (seconds).
    /// Default: 10
    pub request_timeout_secs: u64,

    /// Viewer position + destination poll period (seconds). Default: 12
    pub position_poll_secs: u64,
    /// Viewer device self-location period (seconds). Default: 30
    pub self_location_poll_secs: u64,
    /// Publisher auto-resend period (seconds). Default: 60
    pub publisher_resend_secs: u64,
    /// "Last updated ... ago" refresh period (seconds). Default: 1
    pub elapsed_tick_secs: u64,

    /// Below this distance between consecutive reports the procession is halted.
    /// Default: 20.0 meters (GPS jitter floor)
    pub halt_threshold_meters: f64,
    /// Maximum number of trail points kept for the path. Default: 50
    pub trail_capacity: usize,
    /// Decimal places kept when the publisher sends coordinates. Default: 4 (~11 m)
    pub coordinate_precision: u32,

    /// Shared publisher PIN. This is a convenience gate, not a security boundary.
    pub publisher_pin: String,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            nominatim_base_url: "https://nominatim.openstreetmap.org".to_string(),
            osrm_base_url: "https://router.project-osrm.org".to_string(),
            user_agent: "YatraTracker/1.0".to_string(),
            request_timeout_secs: 10,
            position_poll_secs: 12,
            self_location_poll_secs: 30,
            publisher_resend_secs: 60,
            elapsed_tick_secs: 1,
            halt_threshold_meters: 20.0,
            trail_capacity: 50,
            coordinate_precision: 4,
            publisher_pin: "1234".to_string(),
        }
    }
}

impl TrackerConfig {
    /// Load a configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .map_err(|e| TrackerError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        let config = Self::from_json_str(&raw)?;
        info!("[TrackerConfig] Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parse a configuration from a JSON string.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| TrackerError::Config(e.to_string()))
    }

    /// Apply environment overrides (currently only the publisher PIN).
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(pin) = std::env::var(PIN_ENV_VAR) {
            if !pin.is_empty() {
                debug!("[TrackerConfig] Publisher PIN overridden from {}", PIN_ENV_VAR);
                self.publisher_pin = pin;
            }
        }
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn position_poll_interval(&self) -> Duration {
        Duration::from_secs(self.position_poll_secs)
    }

    pub fn self_location_interval(&self) -> Duration {
        Duration::from_secs(self.self_location_poll_secs)
    }

    pub fn publisher_resend_interval(&self) -> Duration {
        Duration::from_secs(self.publisher_resend_secs)
    }

    pub fn elapsed_tick_interval(&self) -> Duration {
        Duration::from_secs(self.elapsed_tick_secs)
    }
}
