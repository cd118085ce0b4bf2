//! Hosted document store contract.
//!
//! The store keeps exactly two singleton documents:
//!
//! | Document | Contents |
//! |----------|----------|
//! | `liveLocation/current` | `lat`, `lng`, `placeName`, `district`, `status`, `lastUpdated` |
//! | `yatraSchedule/next` | `destination`, `district`, `arrivalTime`, `note`, `lat?`, `lng?`, `lastUpdated` |
//!
//! Writes replace the whole document and the store assigns `lastUpdated`.
//! There is no version check: the last writer wins.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use log::debug;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::{Result, TrackerError};
use crate::ingest::RawPositionReport;
use crate::{Destination, GpsPoint, MovementState};

/// Document path of the current location.
pub const CURRENT_LOCATION_DOC: &str = "liveLocation/current";
/// Document path of the next destination.
pub const NEXT_DESTINATION_DOC: &str = "yatraSchedule/next";

/// A publisher write to `liveLocation/current`.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationUpdate {
    pub point: GpsPoint,
    pub place_name: String,
    pub district: String,
    pub status: Option<MovementState>,
}

impl LocationUpdate {
    pub fn new(point: GpsPoint) -> Self {
        Self {
            point,
            place_name: String::new(),
            district: String::new(),
            status: None,
        }
    }

    /// The stored document, with a missing status defaulted to MOVING.
    pub fn to_document(&self) -> RawPositionReport {
        RawPositionReport {
            lat: Some(Value::from(self.point.latitude)),
            lng: Some(Value::from(self.point.longitude)),
            place_name: Some(self.place_name.clone()),
            district: Some(self.district.clone()),
            status: Some(self.status.unwrap_or_default().as_str().to_string()),
            last_updated: Some(Utc::now()),
        }
    }
}

/// Reads and writes of the two singleton documents.
#[async_trait]
pub trait LocationStore: Send + Sync {
    /// `Ok(None)` when the document does not exist yet.
    async fn read_current(&self) -> Result<Option<RawPositionReport>>;
    async fn write_current(&self, update: &LocationUpdate) -> Result<()>;
    /// `Ok(None)` when no destination was ever saved.
    async fn read_next(&self) -> Result<Option<Destination>>;
    async fn write_next(&self, destination: &Destination) -> Result<()>;
}

/// Process-local store, used for tests, demos and single-host deployments.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    current: RwLock<Option<RawPositionReport>>,
    next: RwLock<Option<Destination>>,
    deny_writes: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every write with a permission error, as a store with
    /// undeployed security rules would.
    pub fn set_deny_writes(&self, deny: bool) {
        self.deny_writes.store(deny, Ordering::SeqCst);
    }

    /// Put a raw document in place, bypassing write defaults.
    pub async fn put_raw_current(&self, raw: RawPositionReport) {
        *self.current.write().await = Some(raw);
    }

    fn check_writable(&self, doc: &str) -> Result<()> {
        if self.deny_writes.load(Ordering::SeqCst) {
            return Err(TrackerError::persistence(format!(
                "Missing or insufficient permissions to write {}",
                doc
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl LocationStore for InMemoryStore {
    async fn read_current(&self) -> Result<Option<RawPositionReport>> {
        Ok(self.current.read().await.clone())
    }

    async fn write_current(&self, update: &LocationUpdate) -> Result<()> {
        self.check_writable(CURRENT_LOCATION_DOC)?;
        let doc = update.to_document();
        debug!("[InMemoryStore] {} <- {}", CURRENT_LOCATION_DOC, update.point);
        *self.current.write().await = Some(doc);
        Ok(())
    }

    async fn read_next(&self) -> Result<Option<Destination>> {
        Ok(self.next.read().await.clone())
    }

    async fn write_next(&self, destination: &Destination) -> Result<()> {
        self.check_writable(NEXT_DESTINATION_DOC)?;
        let mut doc = destination.clone();
        doc.last_updated = Some(Utc::now());
        debug!("[InMemoryStore] {} <- '{}'", NEXT_DESTINATION_DOC, doc.name);
        *self.next.write().await = Some(doc);
        Ok(())
    }
}
