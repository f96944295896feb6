//! Configuration for position requests and storage.
//!
//! Everything has a sensible default; hosts can override any subset from JSON.
//! The filtering threshold and minimum route length are fixed constants
//! (see [`crate::MIN_POINT_SPACING_METERS`] and [`crate::MIN_ROUTE_POINTS`]),
//! not configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::Result;

/// Fix policy handed to the position source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PositionOptions {
    /// Ask the device for its most accurate fix (GPS over network location).
    /// Default: true
    pub enable_high_accuracy: bool,

    /// Give up on a fix after this long.
    /// Default: 10000 ms
    pub timeout_ms: u32,

    /// Accept a cached fix no older than this.
    /// Default: 0 ms for one-shot requests, 1000 ms for watches
    pub maximum_age_ms: u32,
}

impl PositionOptions {
    /// Policy for a one-shot "where am I" request.
    pub fn one_shot() -> Self {
        Self {
            enable_high_accuracy: true,
            timeout_ms: 10_000,
            maximum_age_ms: 0,
        }
    }

    /// Policy for the continuous watch while recording.
    pub fn watch() -> Self {
        Self {
            maximum_age_ms: 1_000,
            ..Self::one_shot()
        }
    }
}

impl Default for PositionOptions {
    fn default() -> Self {
        Self::one_shot()
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Storage key of the saved-routes collection.
    /// Default: "pathfinder-routes"
    pub routes_key: String,

    /// Storage key of the reminders collection.
    /// Default: "pathfinder_reminders"
    pub reminders_key: String,

    /// Directory for [`crate::FileStorage`]. `None` means the host picks a backend.
    /// Default: None
    pub storage_dir: Option<PathBuf>,

    /// Fix policy for one-shot requests.
    pub current_position: PositionOptions,

    /// Fix policy for the continuous watch.
    pub watch_position: PositionOptions,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            routes_key: "pathfinder-routes".to_string(),
            reminders_key: "pathfinder_reminders".to_string(),
            storage_dir: None,
            current_position: PositionOptions::one_shot(),
            watch_position: PositionOptions::watch(),
        }
    }
}

impl AppConfig {
    /// Parse a JSON document; missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_json(&contents)?;
        log::info!("[Config] Loaded {}", path.as_ref().display());
        Ok(config)
    }
}
