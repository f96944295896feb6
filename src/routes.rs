//! # Route Store
//!
//! Durable collection of saved routes, newest first.
//!
//! The whole collection lives in memory after a one-time load. Every mutation
//! serializes the updated collection and writes it to the backing
//! [`KeyValueStore`] before the in-memory copy changes, so a failed write leaves
//! both sides as they were. A blob that fails to parse on load is logged and
//! treated as an empty collection.

use std::sync::Arc;

use log::{debug, info, warn};
use rstar::{RTree, RTreeObject, AABB};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo_utils::path_distance;
use crate::{Bounds, Coordinate, KeyValueStore, OptionExt, Result, TrackerError};

/// A path needs at least this many points to be saved.
pub const MIN_ROUTE_POINTS: usize = 2;

/// A named, persisted recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedRoute {
    pub id: String,
    pub name: String,
    pub coordinates: Vec<Coordinate>,
    /// Save time, milliseconds since the Unix epoch
    pub created_at: i64,
    /// Meters, summed over consecutive fixes
    pub distance: f64,
    /// Milliseconds from session start to the last fix. Not clamped, so a bad
    /// clock can make it negative.
    pub duration: i64,
}

impl SavedRoute {
    pub fn bounds(&self) -> Option<Bounds> {
        Bounds::from_points(&self.coordinates)
    }

    /// Duration when it is meaningful; `None` for negative values.
    pub fn checked_duration(&self) -> Option<i64> {
        (self.duration >= 0).then_some(self.duration)
    }
}

/// Route bounds entry for R-tree spatial indexing.
#[derive(Debug, Clone)]
struct RouteBoundsEntry {
    route_id: String,
    bounds: Bounds,
}

impl RTreeObject for RouteBoundsEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(
            [self.bounds.min_lng, self.bounds.min_lat],
            [self.bounds.max_lng, self.bounds.max_lat],
        )
    }
}

/// Saved routes over a key-value backend.
pub struct RouteStore {
    storage: Arc<dyn KeyValueStore>,
    key: String,
    routes: Vec<SavedRoute>,
    spatial_index: RTree<RouteBoundsEntry>,
}

impl RouteStore {
    /// Load the collection stored under `key`.
    ///
    /// Backend read failures are returned; unparsable contents are not.
    pub fn open(storage: Arc<dyn KeyValueStore>, key: &str) -> Result<Self> {
        let routes = match storage.get(key)? {
            Some(blob) => match serde_json::from_str::<Vec<SavedRoute>>(&blob) {
                Ok(routes) => routes,
                Err(e) => {
                    let err = TrackerError::StorageCorrupt {
                        key: key.to_string(),
                        message: e.to_string(),
                    };
                    warn!("[RouteStore] {}; starting empty", err);
                    Vec::new()
                }
            },
            None => Vec::new(),
        };
        info!("[RouteStore] Loaded {} routes from '{}'", routes.len(), key);

        let mut store = Self {
            storage,
            key: key.to_string(),
            routes,
            spatial_index: RTree::new(),
        };
        store.rebuild_spatial_index();
        Ok(store)
    }

    /// Persist a new route at the head of the collection.
    ///
    /// `name` is trimmed and must not end up empty. `start_time` is the
    /// session start; `duration` is the last fix's timestamp minus it,
    /// unclamped.
    pub fn save_route(
        &mut self,
        name: &str,
        coordinates: Vec<Coordinate>,
        start_time: i64,
        created_at: i64,
    ) -> Result<SavedRoute> {
        let name = name.trim();
        if name.is_empty() {
            return Err(TrackerError::EmptyName);
        }

        let last = coordinates
            .last()
            .filter(|_| coordinates.len() >= MIN_ROUTE_POINTS)
            .ok_or_insufficient_points(coordinates.len(), MIN_ROUTE_POINTS)?;

        let duration = last.timestamp - start_time;
        if duration < 0 {
            warn!(
                "[RouteStore] Route '{}' has negative duration {} ms (start {}, last fix {})",
                name, duration, start_time, last.timestamp
            );
        }

        let route = SavedRoute {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            distance: path_distance(&coordinates),
            duration,
            coordinates,
            created_at,
        };

        let mut updated = Vec::with_capacity(self.routes.len() + 1);
        updated.push(route.clone());
        updated.extend(self.routes.iter().cloned());
        self.commit(updated)?;

        info!(
            "[RouteStore] Saved route '{}' ({} points, {:.1} m)",
            route.name,
            route.coordinates.len(),
            route.distance
        );
        Ok(route)
    }

    /// Remove a route. Unknown ids are a no-op.
    pub fn delete_route(&mut self, id: &str) -> Result<()> {
        if !self.routes.iter().any(|r| r.id == id) {
            debug!("[RouteStore] Delete of unknown route {}", id);
            return Ok(());
        }
        let updated: Vec<SavedRoute> = self.routes.iter().filter(|r| r.id != id).cloned().collect();
        self.commit(updated)?;
        info!("[RouteStore] Deleted route {}", id);
        Ok(())
    }

    pub fn get_route(&self, id: &str) -> Option<&SavedRoute> {
        self.routes.iter().find(|r| r.id == id)
    }

    /// All routes, newest first.
    pub fn list_routes(&self) -> &[SavedRoute] {
        &self.routes
    }

    /// Up to `limit` routes ordered by `created_at`, latest first.
    pub fn recent_routes(&self, limit: usize) -> Vec<&SavedRoute> {
        let mut routes: Vec<&SavedRoute> = self.routes.iter().collect();
        routes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        routes.truncate(limit);
        routes
    }

    /// Ids of routes whose bounding box intersects the viewport.
    pub fn query_viewport(&self, viewport: &Bounds) -> Vec<String> {
        let envelope = AABB::from_corners(
            [viewport.min_lng, viewport.min_lat],
            [viewport.max_lng, viewport.max_lat],
        );
        self.spatial_index
            .locate_in_envelope_intersecting(&envelope)
            .map(|entry| entry.route_id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Write `updated` through to storage, then adopt it.
    fn commit(&mut self, updated: Vec<SavedRoute>) -> Result<()> {
        let blob = serde_json::to_string(&updated)?;
        self.storage.set(&self.key, &blob)?;
        self.routes = updated;
        self.rebuild_spatial_index();
        Ok(())
    }

    fn rebuild_spatial_index(&mut self) {
        let entries: Vec<RouteBoundsEntry> = self
            .routes
            .iter()
            .filter_map(|r| {
                r.bounds().map(|bounds| RouteBoundsEntry {
                    route_id: r.id.clone(),
                    bounds,
                })
            })
            .collect();
        self.spatial_index = RTree::bulk_load(entries);
    }
}
