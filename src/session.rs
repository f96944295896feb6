//! In-memory tracking session and the position filtering policy.
//!
//! The session is plain data. Only [`crate::Tracker`] mutates it, through the
//! crate-private methods below; everyone else gets read access.

use serde::Serialize;

use crate::geo_utils::{haversine_distance, path_distance};
use crate::Coordinate;

/// Fixes closer than this to the last recorded point are dropped as GPS jitter.
pub const MIN_POINT_SPACING_METERS: f64 = 2.0;

/// Where the tracking state machine currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TrackingState {
    /// No path, not tracking
    Idle,
    /// Recording fixes
    Active,
    /// Tracking but ignoring fixes
    Paused,
    /// Path frozen, awaiting save or discard
    Stopped,
}

/// Decide whether `candidate` should be appended after `last`.
pub fn should_append(last: Option<&Coordinate>, candidate: &Coordinate) -> bool {
    match last {
        Some(last) => haversine_distance(last, candidate) >= MIN_POINT_SPACING_METERS,
        None => true,
    }
}

/// One start-to-stop tracking attempt, not yet persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingSession {
    is_tracking: bool,
    is_paused: bool,
    current_path: Vec<Coordinate>,
    start_time: Option<i64>,
}

impl TrackingSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_tracking(&self) -> bool {
        self.is_tracking
    }

    /// Only meaningful while tracking.
    pub fn is_paused(&self) -> bool {
        self.is_tracking && self.is_paused
    }

    /// True while fixes are being recorded.
    pub fn is_recording(&self) -> bool {
        self.is_tracking && !self.is_paused
    }

    pub fn current_path(&self) -> &[Coordinate] {
        &self.current_path
    }

    pub fn start_time(&self) -> Option<i64> {
        self.start_time
    }

    pub fn state(&self) -> TrackingState {
        match (self.is_tracking, self.is_paused) {
            (true, false) => TrackingState::Active,
            (true, true) => TrackingState::Paused,
            (false, _) if self.current_path.is_empty() => TrackingState::Idle,
            (false, _) => TrackingState::Stopped,
        }
    }

    pub(crate) fn begin(&mut self, first_fix: Coordinate, start_time: i64) {
        self.is_tracking = true;
        self.is_paused = false;
        self.current_path = vec![first_fix];
        self.start_time = Some(start_time);
    }

    /// Apply the filtering policy. Returns true when the fix was appended.
    pub(crate) fn offer(&mut self, fix: Coordinate) -> bool {
        if !should_append(self.current_path.last(), &fix) {
            return false;
        }
        self.current_path.push(fix);
        true
    }

    pub(crate) fn set_paused(&mut self, paused: bool) {
        self.is_paused = paused;
    }

    pub(crate) fn end(&mut self) {
        self.is_tracking = false;
        self.is_paused = false;
    }

    pub(crate) fn clear(&mut self) {
        *self = Self::default();
    }

    /// Live statistics as of `now_millis`.
    pub fn stats(&self, now_millis: i64) -> TrackingStats {
        TrackingStats::compute(&self.current_path, self.start_time, now_millis)
    }
}

/// Distance, elapsed time and point count of an in-progress path.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrackingStats {
    /// Meters along the path
    pub distance: f64,
    /// Milliseconds since the session started
    pub duration: i64,
    pub points: usize,
}

impl TrackingStats {
    /// Paths shorter than two points report zero distance and zero duration.
    pub fn compute(path: &[Coordinate], start_time: Option<i64>, now_millis: i64) -> Self {
        if path.len() < 2 {
            return Self {
                distance: 0.0,
                duration: 0,
                points: path.len(),
            };
        }
        Self {
            distance: path_distance(path),
            duration: start_time.map(|t| now_millis - t).unwrap_or(0),
            points: path.len(),
        }
    }
}
