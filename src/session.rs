//! Viewer session state.
//!
//! Everything the public page shows lives in one [`ViewerSession`], rebuilt
//! from scratch for each viewing session and never persisted. The viewer
//! fills it from poll results; the session owns the trail, the movement
//! status, the route and the out-of-order guard.
//!
//! ## Poll state machine
//!
//! ```text
//! Idle --tick--> Fetching --report applied--> Rendered
//!                    |
//!                    +--read failed / report rejected--> Error
//! ```
//!
//! `Error` never stops the timer; the next tick simply polls again. A failed
//! read sets the error banner but keeps the last good location, trail, status
//! and route on screen.

use chrono::{DateTime, Utc};
use log::debug;

use crate::config::TrackerConfig;
use crate::geo_utils::compute_bounds;
use crate::movement::MovementClassifier;
use crate::route::RouteDisplay;
use crate::trail::TrailBuffer;
use crate::{Bounds, Destination, GpsPoint, MovementState, PlaceInfo, PositionReport};

/// Viewer poll lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PollState {
    #[default]
    Idle,
    Fetching,
    Rendered,
    Error,
}

/// The position currently shown on the map.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveLocation {
    pub point: GpsPoint,
    pub place: PlaceInfo,
}

/// What to do with the displayed route after a poll.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteUpdate {
    /// Inputs unchanged, keep the current route
    Keep,
    /// Position or destination coordinates unavailable
    Clear,
    /// Newly resolved route for these inputs
    Set {
        origin: GpsPoint,
        destination: GpsPoint,
        display: RouteDisplay,
    },
}

/// Result of one successful round of store reads.
#[derive(Debug, Clone, PartialEq)]
pub struct PollSnapshot {
    /// `None` when the document is missing or was rejected by ingest
    pub report: Option<PositionReport>,
    pub place: PlaceInfo,
    pub destination: Option<Destination>,
    pub route: RouteUpdate,
}

/// Explicit state of one viewing session.
#[derive(Debug, Clone)]
pub struct ViewerSession {
    trail: TrailBuffer,
    classifier: MovementClassifier,
    status: MovementState,
    location: Option<LiveLocation>,
    destination: Option<Destination>,
    route: Option<RouteDisplay>,
    route_inputs: Option<(GpsPoint, GpsPoint)>,
    last_updated: Option<DateTime<Utc>>,
    seconds_ago: i64,
    error: Option<String>,
    poll_state: PollState,
    viewer_position: Option<GpsPoint>,
    next_seq: u64,
    last_applied_seq: u64,
}

impl Default for ViewerSession {
    fn default() -> Self {
        Self::new(&TrackerConfig::default())
    }
}

impl ViewerSession {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            trail: TrailBuffer::with_capacity(config.trail_capacity),
            classifier: MovementClassifier::new(config.halt_threshold_meters),
            status: MovementState::Moving,
            location: None,
            destination: None,
            route: None,
            route_inputs: None,
            last_updated: None,
            seconds_ago: 0,
            error: None,
            poll_state: PollState::Idle,
            viewer_position: None,
            next_seq: 0,
            last_applied_seq: 0,
        }
    }

    // ------------------------------------------------------------------------
    // Polling
    // ------------------------------------------------------------------------

    /// Start a poll and return its sequence number.
    pub fn begin_poll(&mut self) -> u64 {
        self.next_seq += 1;
        self.poll_state = PollState::Fetching;
        self.next_seq
    }

    /// True when a newer poll has already been applied.
    pub fn is_stale(&self, seq: u64) -> bool {
        seq <= self.last_applied_seq
    }

    /// Apply a poll result. Returns `false` when it arrived after a newer one
    /// and was discarded.
    pub fn apply_poll(&mut self, seq: u64, snapshot: PollSnapshot) -> bool {
        if self.is_stale(seq) {
            debug!(
                "[ViewerSession] Discarding poll #{} (already applied #{})",
                seq, self.last_applied_seq
            );
            return false;
        }
        self.last_applied_seq = seq;

        self.destination = snapshot.destination;

        match snapshot.route {
            RouteUpdate::Keep => {}
            RouteUpdate::Clear => {
                self.route = None;
                self.route_inputs = None;
            }
            RouteUpdate::Set {
                origin,
                destination,
                display,
            } => {
                // A straight-line fallback stays on screen but is retried next poll
                self.route_inputs = (!display.is_fallback()).then_some((origin, destination));
                self.route = Some(display);
            }
        }

        match snapshot.report {
            Some(report) => {
                self.record_report(report, snapshot.place);
                self.error = None;
                self.poll_state = PollState::Rendered;
            }
            None => {
                self.poll_state = PollState::Error;
            }
        }
        true
    }

    /// Record a failed poll. The banner changes; the map does not.
    pub fn apply_failure(&mut self, seq: u64, message: impl Into<String>) -> bool {
        if self.is_stale(seq) {
            return false;
        }
        self.last_applied_seq = seq;
        self.error = Some(message.into());
        self.poll_state = PollState::Error;
        true
    }

    /// Classify against the previous tail, then append to the trail.
    pub fn record_report(&mut self, report: PositionReport, place: PlaceInfo) -> MovementState {
        self.status = self.classifier.classify(self.trail.tail(), &report);
        self.trail.append(report.point);
        self.last_updated = Some(report.observed_at);
        self.location = Some(LiveLocation {
            point: report.point,
            place,
        });
        self.status
    }

    /// Whether the route must be resolved again for these inputs.
    pub fn route_needs_refresh(&self, origin: GpsPoint, destination: GpsPoint) -> bool {
        self.route_inputs != Some((origin, destination))
    }

    // ------------------------------------------------------------------------
    // Elapsed time
    // ------------------------------------------------------------------------

    /// Recompute the seconds since the last update.
    pub fn refresh_elapsed(&mut self, now: DateTime<Utc>) -> i64 {
        if let Some(last) = self.last_updated {
            self.seconds_ago = (now - last).num_seconds().max(0);
        }
        self.seconds_ago
    }

    /// "Last updated" text: `--` before the first update.
    pub fn elapsed_label(&self) -> String {
        match self.last_updated {
            Some(_) => format_time_ago(self.seconds_ago),
            None => "--".to_string(),
        }
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn status(&self) -> MovementState {
        self.status
    }

    pub fn trail(&self) -> &TrailBuffer {
        &self.trail
    }

    pub fn location(&self) -> Option<&LiveLocation> {
        self.location.as_ref()
    }

    pub fn current_point(&self) -> Option<GpsPoint> {
        self.location.as_ref().map(|l| l.point)
    }

    pub fn destination(&self) -> Option<&Destination> {
        self.destination.as_ref()
    }

    pub fn route(&self) -> Option<&RouteDisplay> {
        self.route.as_ref()
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn poll_state(&self) -> PollState {
        self.poll_state
    }

    pub fn viewer_position(&self) -> Option<GpsPoint> {
        self.viewer_position
    }

    pub fn set_viewer_position(&mut self, point: GpsPoint) {
        self.viewer_position = Some(point);
    }

    /// Box enclosing the trail, the current marker, the destination and the route.
    pub fn map_bounds(&self) -> Option<Bounds> {
        let mut points = self.trail.points();
        points.extend(self.current_point());
        points.extend(self.destination.as_ref().and_then(Destination::coordinates));
        if let Some(route) = &self.route {
            points.extend(route.path());
        }
        compute_bounds(&points)
    }

    /// Where the map centres: the middle of [`map_bounds`](Self::map_bounds).
    pub fn map_center(&self) -> Option<GpsPoint> {
        self.map_bounds().map(|b| b.center())
    }
}

/// Relative time text for the "last updated" strip.
pub fn format_time_ago(seconds: i64) -> String {
    if seconds < 60 {
        format!("{}s ago", seconds)
    } else if seconds < 3600 {
        format!("{}m ago", seconds / 60)
    } else {
        format!("{}h ago", seconds / 3600)
    }
}
