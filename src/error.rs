//! Unified error handling for the pathfinder library.
//!
//! Two error types live here:
//! - [`PositionError`]: failure reasons reported by a position source. Their
//!   `Display` text is the advisory message shown to the user.
//! - [`TrackerError`]: everything else (state machine preconditions, storage).

use thiserror::Error;

/// Failure reported by a position source, for one-shot requests and watches alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PositionError {
    #[error("Location permission denied. Please enable GPS.")]
    PermissionDenied,
    #[error("Location unavailable. Check your GPS signal.")]
    PositionUnavailable,
    #[error("Location request timed out. Try again.")]
    Timeout,
    #[error("Geolocation not supported")]
    Unsupported,
}

/// Unified error type for pathfinder operations.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// No current fix is known yet; request one and retry
    #[error("Waiting for GPS signal...")]
    PositionUnavailable,

    /// The position source failed
    #[error(transparent)]
    Position(#[from] PositionError),

    /// Path has too few points to become a route
    #[error("Route has {point_count} points, minimum {minimum_required} required")]
    InsufficientPoints {
        point_count: usize,
        minimum_required: usize,
    },

    /// Name or title was empty after trimming
    #[error("Name must not be empty")]
    EmptyName,

    /// A persisted collection could not be parsed
    #[error("Stored data under '{key}' is corrupt: {message}")]
    StorageCorrupt { key: String, message: String },

    /// The durable store could not be read or written
    #[error("Storage error: {message}")]
    Storage { message: String },

    /// Serialization of a collection failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl From<std::io::Error> for TrackerError {
    fn from(err: std::io::Error) -> Self {
        TrackerError::Storage {
            message: err.to_string(),
        }
    }
}

#[cfg(feature = "persistence")]
impl From<rusqlite::Error> for TrackerError {
    fn from(err: rusqlite::Error) -> Self {
        TrackerError::Storage {
            message: err.to_string(),
        }
    }
}

/// Result type alias for pathfinder operations.
pub type Result<T> = std::result::Result<T, TrackerError>;

/// Extension trait for converting Option to TrackerError.
pub trait OptionExt<T> {
    /// Convert Option to Result with insufficient points error.
    fn ok_or_insufficient_points(self, point_count: usize, minimum: usize) -> Result<T>;

    /// Convert Option to Result with generic internal error.
    fn ok_or_internal(self, message: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_insufficient_points(self, point_count: usize, minimum: usize) -> Result<T> {
        self.ok_or(TrackerError::InsufficientPoints {
            point_count,
            minimum_required: minimum,
        })
    }

    fn ok_or_internal(self, message: &str) -> Result<T> {
        self.ok_or_else(|| TrackerError::Internal {
            message: message.to_string(),
        })
    }
}
