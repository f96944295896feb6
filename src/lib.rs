//! # PathFinder
//!
//! GPS route recording core for walking/running apps.
//!
//! This library provides:
//! - A route-tracking state machine (start, pause, resume, stop, save)
//! - Position-stream filtering that drops fixes within 2 m of the last point
//! - Durable route and reminder stores over a pluggable key-value backend
//! - Distance/duration utilities and display formatting
//!
//! ## Features
//!
//! - **`persistence`** - Enable the SQLite key-value backend
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use pathfinder::{
//!     Coordinate, ManualClock, MemoryStorage, RouteStore, ScriptedPositionSource, Tracker,
//! };
//!
//! let source = ScriptedPositionSource::new();
//! source.set_current(Coordinate::new(0.0, 0.0, 0));
//!
//! let clock = Arc::new(ManualClock::new(0));
//! let mut tracker = Tracker::with_clock(source.clone(), clock.clone());
//! let mut routes = RouteStore::open(Arc::new(MemoryStorage::new()), "routes").unwrap();
//!
//! tracker.request_current_position();
//! tracker.start().unwrap();
//!
//! source.emit(Coordinate::new(0.0, 0.0001, 1_000));
//! tracker.pump();
//! tracker.stop();
//!
//! let route = tracker.save("Morning walk", &mut routes).unwrap().unwrap();
//! assert_eq!(route.coordinates.len(), 2);
//! assert_eq!(routes.list_routes().len(), 1);
//! ```

use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{OptionExt, PositionError, Result, TrackerError};

// Geographic utilities (distance, bounds, center calculations)
pub mod geo_utils;
pub use geo_utils::{haversine_distance, path_distance, EARTH_RADIUS_METERS};

// Time source for start times and created-at stamps
pub mod clock;
pub use clock::{Clock, ManualClock, SystemClock};

// Host-loadable configuration
pub mod config;
pub use config::{AppConfig, PositionOptions};

// Device position sources and subscriptions
pub mod position;
pub use position::{
    Geolocation, PositionEvent, PositionSource, ScriptedPositionSource, Subscription,
    WatchSender,
};

// Durable key-value backends
pub mod storage;
#[cfg(feature = "persistence")]
pub use storage::SqliteStorage;
pub use storage::{FileStorage, KeyValueStore, MemoryStorage};

// Tracking session, filtering policy and live stats
pub mod session;
pub use session::{TrackingSession, TrackingState, TrackingStats, MIN_POINT_SPACING_METERS};

// Saved routes and their store
pub mod routes;
pub use routes::{RouteStore, SavedRoute, MIN_ROUTE_POINTS};

// Tracking state machine
pub mod tracker;
pub use tracker::{TrackingControls, Tracker};

// Proximity reminders
pub mod reminders;
pub use reminders::{
    NewReminder, Reminder, ReminderCategory, ReminderLocation, ReminderStore, ReminderUpdate,
};

// Input snapshot for the map renderer
pub mod view;
pub use view::{MapView, DEFAULT_MAP_CENTER};

// Display formatting
pub mod format;
pub use format::{format_distance, format_duration};

/// Initialize logging for Android.
#[cfg(target_os = "android")]
pub fn init_logging() {
    use android_logger::Config;
    use log::LevelFilter;

    android_logger::init_once(
        Config::default()
            .with_max_level(LevelFilter::Debug)
            .with_tag("PathFinderRust"),
    );
}

/// Host applications install their own `log` backend on other platforms.
#[cfg(not(target_os = "android"))]
pub fn init_logging() {}

// ============================================================================
// Core Types
// ============================================================================

/// A sampled device fix: position in degrees plus a millisecond epoch timestamp.
///
/// Serialized as `{ "lat": .., "lng": .., "timestamp": .. }`.
///
/// # Example
/// ```
/// use pathfinder::Coordinate;
/// let fix = Coordinate::new(51.5074, -0.1278, 1_700_000_000_000); // London
/// assert!(fix.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    #[serde(rename = "lat")]
    pub latitude: f64,
    #[serde(rename = "lng")]
    pub longitude: f64,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

impl Coordinate {
    /// Create a new fix.
    pub fn new(latitude: f64, longitude: f64, timestamp: i64) -> Self {
        Self {
            latitude,
            longitude,
            timestamp,
        }
    }

    /// Check if the fix has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }

    /// Distance to another fix in meters.
    pub fn distance_to(&self, other: &Coordinate) -> f64 {
        haversine_distance(self, other)
    }
}

/// Bounding box for a path.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Create bounds from fixes.
    pub fn from_points(points: &[Coordinate]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        let mut min_lat = f64::MAX;
        let mut max_lat = f64::MIN;
        let mut min_lng = f64::MAX;
        let mut max_lng = f64::MIN;

        for p in points {
            min_lat = min_lat.min(p.latitude);
            max_lat = max_lat.max(p.latitude);
            min_lng = min_lng.min(p.longitude);
            max_lng = max_lng.max(p.longitude);
        }

        Some(Self {
            min_lat,
            max_lat,
            min_lng,
            max_lng,
        })
    }

    /// Smallest bounds containing both.
    pub fn union(&self, other: &Bounds) -> Bounds {
        Bounds {
            min_lat: self.min_lat.min(other.min_lat),
            max_lat: self.max_lat.max(other.max_lat),
            min_lng: self.min_lng.min(other.min_lng),
            max_lng: self.max_lng.max(other.max_lng),
        }
    }

    /// Get the center of the bounds as `(lat, lng)`.
    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
