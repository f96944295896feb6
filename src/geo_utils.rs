//! Geographic utilities: haversine distance, path length, bounds and center.
//!
//! The haversine formula here uses a spherical Earth of radius
//! [`EARTH_RADIUS_METERS`]. Route distances are the sum of the haversine
//! distances between consecutive fixes, so every distance total in the crate
//! goes through [`haversine_distance`].

use crate::{Bounds, Coordinate};

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Great-circle distance between two coordinates in meters.
///
/// # Example
/// ```
/// use pathfinder::Coordinate;
/// use pathfinder::geo_utils::haversine_distance;
///
/// let london = Coordinate::new(51.5074, -0.1278, 0);
/// let paris = Coordinate::new(48.8566, 2.3522, 0);
/// let km = haversine_distance(&london, &paris) / 1000.0;
/// assert!(km > 340.0 && km < 350.0);
/// ```
pub fn haversine_distance(a: &Coordinate, b: &Coordinate) -> f64 {
    haversine_lat_lng(a.latitude, a.longitude, b.latitude, b.longitude)
}

/// Haversine distance on raw degree values.
pub fn haversine_lat_lng(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let delta_phi = (lat2 - lat1).to_radians();
    let delta_lambda = (lng2 - lng1).to_radians();

    let a = (delta_phi / 2.0).sin() * (delta_phi / 2.0).sin()
        + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin() * (delta_lambda / 2.0).sin();
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_METERS * c
}

/// Total length of a path in meters (sum over consecutive pairs).
///
/// Returns 0 for paths with fewer than 2 points.
pub fn path_distance(path: &[Coordinate]) -> f64 {
    if path.len() < 2 {
        return 0.0;
    }
    path.windows(2)
        .map(|pair| haversine_distance(&pair[0], &pair[1]))
        .sum()
}

/// Bounding box over any number of paths. `None` when all are empty.
pub fn compute_bounds<'a, I>(paths: I) -> Option<Bounds>
where
    I: IntoIterator<Item = &'a [Coordinate]>,
{
    paths
        .into_iter()
        .filter_map(Bounds::from_points)
        .reduce(|acc, b| acc.union(&b))
}

/// Arithmetic center of a set of coordinates (fine for walking-scale paths).
pub fn compute_center(points: &[Coordinate]) -> Option<(f64, f64)> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    let lat = points.iter().map(|p| p.latitude).sum::<f64>() / n;
    let lng = points.iter().map(|p| p.longitude).sum::<f64>() / n;
    Some((lat, lng))
}
