//! Read-only snapshot handed to the map renderer.

use serde::Serialize;

use crate::geo_utils::compute_bounds;
use crate::{Bounds, Coordinate};

/// Map center used before any position is known (central London).
pub const DEFAULT_MAP_CENTER: (f64, f64) = (51.505, -0.09);

/// What the map should draw: the live path, an optional saved path for
/// comparison, and the live position marker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapView {
    /// `(lat, lng)` to center on: the live position, else [`DEFAULT_MAP_CENTER`]
    pub center: (f64, f64),
    pub current_path: Vec<Coordinate>,
    pub saved_path: Option<Vec<Coordinate>>,
    pub live_position: Option<Coordinate>,
    /// Covers both paths; `None` when neither has points
    pub bounds: Option<Bounds>,
}

impl MapView {
    pub fn new(
        current_path: &[Coordinate],
        saved_path: Option<&[Coordinate]>,
        live_position: Option<Coordinate>,
    ) -> Self {
        let center = live_position
            .map(|p| (p.latitude, p.longitude))
            .unwrap_or(DEFAULT_MAP_CENTER);
        let bounds = compute_bounds(std::iter::once(current_path).chain(saved_path));

        Self {
            center,
            current_path: current_path.to_vec(),
            saved_path: saved_path.map(|p| p.to_vec()),
            live_position,
            bounds,
        }
    }
}
