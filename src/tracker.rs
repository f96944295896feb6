//! # Tracker
//!
//! The route-tracking state machine.
//!
//! ```text
//!            start                 pause
//!   Idle ───────────▶ Active ◀──────────────▶ Paused
//!    ▲  ▲               │          resume        │
//!    │  │               │ stop                   │ stop
//!    │  │ save/discard  ▼                        │
//!    │  └──────────── Stopped ◀──────────────────┘
//!    │                  │ start (new session)
//!    └──────────────────┘
//! ```
//!
//! Invalid transitions are silent no-ops, so redundant UI calls (double-tapping
//! pause) are harmless. The tracker owns at most one position watch: it exists
//! exactly while the state is `Active`, and is cancelled on pause, stop, save,
//! discard and drop. Fixes are re-checked against the state when they are
//! pumped, not when they were produced, so a fix queued just before `pause()`
//! is never recorded.
//!
//! Position-source and storage failures never escape as panics; they are kept
//! as an advisory message readable through [`Tracker::error`].

use std::sync::Arc;

use log::{debug, info, warn};
use serde::Serialize;

use crate::position::{Geolocation, PositionSource, Subscription};
use crate::routes::{RouteStore, SavedRoute, MIN_ROUTE_POINTS};
use crate::session::{TrackingSession, TrackingState, TrackingStats};
use crate::view::MapView;
use crate::{AppConfig, Clock, Coordinate, OptionExt, Result, SystemClock, TrackerError};

/// Which controls the UI should offer in the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TrackingControls {
    /// Start a session (labelled "New" once a stopped path is waiting)
    pub can_start: bool,
    pub can_pause: bool,
    pub can_resume: bool,
    pub can_stop: bool,
    pub can_save: bool,
}

/// Owns the tracking session, the position watch and the saved-route selection.
pub struct Tracker<S: PositionSource> {
    geo: Geolocation<S>,
    session: TrackingSession,
    subscription: Option<Subscription>,
    clock: Arc<dyn Clock>,
    selected_route: Option<String>,
    error: Option<String>,
}

impl<S: PositionSource> Tracker<S> {
    /// Create a tracker on the system clock with default fix policies.
    pub fn new(source: S) -> Self {
        Self::with_clock(source, Arc::new(SystemClock))
    }

    pub fn with_clock(source: S, clock: Arc<dyn Clock>) -> Self {
        Self::from_parts(Geolocation::new(source), clock)
    }

    /// Create a tracker using the fix policies from `config`.
    pub fn from_config(source: S, config: &AppConfig, clock: Arc<dyn Clock>) -> Self {
        let geo =
            Geolocation::with_options(source, config.current_position, config.watch_position);
        Self::from_parts(geo, clock)
    }

    fn from_parts(geo: Geolocation<S>, clock: Arc<dyn Clock>) -> Self {
        Self {
            geo,
            session: TrackingSession::new(),
            subscription: None,
            clock,
            selected_route: None,
            error: None,
        }
    }

    // ========================================================================
    // Position
    // ========================================================================

    /// Ask the source for a fresh fix. Failures become the advisory error.
    pub fn request_current_position(&mut self) -> Option<Coordinate> {
        let fix = self.geo.request_current_position();
        self.error = self.geo.error().map(|e| e.to_string());
        fix
    }

    /// Last known device position (one-shot or watch).
    pub fn current_position(&self) -> Option<Coordinate> {
        self.geo.current_position()
    }

    pub fn geolocation(&self) -> &Geolocation<S> {
        &self.geo
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    /// Begin a new session at the current known position.
    ///
    /// Valid from `Idle` and `Stopped` (a stopped, unsaved path is discarded).
    /// Without a known position this fails with
    /// [`TrackerError::PositionUnavailable`] and requests a fix, so a retry can
    /// succeed.
    pub fn start(&mut self) -> Result<()> {
        if self.session.is_tracking() {
            debug!("[Tracker] start ignored in {:?}", self.state());
            return Ok(());
        }

        let Some(first_fix) = self.geo.current_position() else {
            info!("[Tracker] No position yet; requesting one");
            self.request_current_position();
            let err = TrackerError::PositionUnavailable;
            self.error = Some(err.to_string());
            return Err(err);
        };

        let now = self.clock.now_millis();
        self.selected_route = None;
        self.error = None;
        self.session.begin(first_fix, now);
        self.sync_subscription();
        info!("[Tracker] Tracking started at {}", now);
        Ok(())
    }

    /// Offer a fix to the session. Returns true when it was appended.
    ///
    /// Only accepted while `Active`; the filtering policy drops fixes within
    /// [`crate::MIN_POINT_SPACING_METERS`] of the last recorded point.
    pub fn position_update(&mut self, fix: Coordinate) -> bool {
        if self.state() != TrackingState::Active {
            return false;
        }
        let appended = self.session.offer(fix);
        if !appended {
            debug!("[Tracker] Dropped fix at t={} (too close)", fix.timestamp);
        }
        appended
    }

    /// Feed all pending watch events through [`Self::position_update`].
    ///
    /// Returns the number of points appended.
    pub fn pump(&mut self) -> usize {
        let events = match &self.subscription {
            Some(subscription) => subscription.drain(),
            None => return 0,
        };

        let mut appended = 0;
        for event in events {
            match event {
                Ok(fix) => {
                    self.geo.note_fix(fix);
                    self.error = None;
                    if self.position_update(fix) {
                        appended += 1;
                    }
                }
                Err(e) => {
                    warn!("[Tracker] Watch error: {}", e);
                    self.geo.note_error(e);
                    self.error = Some(e.to_string());
                }
            }
        }
        appended
    }

    pub fn pause(&mut self) {
        if self.state() != TrackingState::Active {
            return;
        }
        self.session.set_paused(true);
        self.sync_subscription();
        info!("[Tracker] Tracking paused");
    }

    pub fn resume(&mut self) {
        if self.state() != TrackingState::Paused {
            return;
        }
        self.session.set_paused(false);
        self.sync_subscription();
        info!("[Tracker] Tracking resumed");
    }

    /// Freeze the path. Further fixes are ignored until the next `start`.
    pub fn stop(&mut self) {
        if !self.session.is_tracking() {
            return;
        }
        self.session.end();
        self.sync_subscription();
        let points = self.session.current_path().len();
        if points >= MIN_ROUTE_POINTS {
            info!("[Tracker] Route recorded ({} points), awaiting save", points);
        } else {
            info!("[Tracker] Tracking stopped with {} point(s)", points);
        }
    }

    /// Persist the stopped path as a route named `name` (trimmed).
    ///
    /// - `Active`/`Paused`: no-op, `Ok(None)`
    /// - fewer than [`MIN_ROUTE_POINTS`] points: [`TrackerError::InsufficientPoints`]
    /// - blank name: [`TrackerError::EmptyName`]
    ///
    /// On success the session is cleared and the state returns to `Idle`. If the
    /// store cannot be written the session stays `Stopped` so the user can retry.
    pub fn save(&mut self, name: &str, routes: &mut RouteStore) -> Result<Option<SavedRoute>> {
        if self.session.is_tracking() {
            debug!("[Tracker] save ignored in {:?}", self.state());
            return Ok(None);
        }

        let path = self.session.current_path();
        if path.len() < MIN_ROUTE_POINTS {
            return Err(TrackerError::InsufficientPoints {
                point_count: path.len(),
                minimum_required: MIN_ROUTE_POINTS,
            });
        }

        let name = name.trim();
        if name.is_empty() {
            return Err(TrackerError::EmptyName);
        }

        let start_time = self
            .session
            .start_time()
            .ok_or_internal("stopped session has no start time")?;
        let created_at = self.clock.now_millis();

        match routes.save_route(name, path.to_vec(), start_time, created_at) {
            Ok(route) => {
                self.session.clear();
                self.error = None;
                Ok(Some(route))
            }
            Err(e) => {
                warn!("[Tracker] Failed to save route '{}': {}", name, e);
                self.error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Drop the current session without persisting it.
    pub fn discard(&mut self) {
        if self.state() == TrackingState::Idle {
            return;
        }
        self.session.clear();
        self.sync_subscription();
        info!("[Tracker] Session discarded");
    }

    // ========================================================================
    // Saved-route selection
    // ========================================================================

    /// View a saved route. Discards any in-progress session.
    pub fn select_route(&mut self, route: &SavedRoute) {
        self.discard();
        self.selected_route = Some(route.id.clone());
        info!("[Tracker] Viewing '{}'", route.name);
    }

    pub fn clear_selected_route(&mut self) {
        self.selected_route = None;
    }

    pub fn selected_route_id(&self) -> Option<&str> {
        self.selected_route.as_deref()
    }

    /// Delete a saved route, clearing the selection if it was being viewed.
    pub fn delete_route(&mut self, id: &str, routes: &mut RouteStore) -> Result<()> {
        if let Err(e) = routes.delete_route(id) {
            self.error = Some(e.to_string());
            return Err(e);
        }
        if self.selected_route.as_deref() == Some(id) {
            self.selected_route = None;
        }
        Ok(())
    }

    // ========================================================================
    // Read access
    // ========================================================================

    pub fn state(&self) -> TrackingState {
        self.session.state()
    }

    pub fn session(&self) -> &TrackingSession {
        &self.session
    }

    pub fn current_path(&self) -> &[Coordinate] {
        self.session.current_path()
    }

    /// True while a position watch is open.
    pub fn is_watching(&self) -> bool {
        self.subscription.is_some()
    }

    /// Latest advisory message, if any.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    /// Live distance, elapsed time and point count.
    pub fn stats(&self) -> TrackingStats {
        self.session.stats(self.clock.now_millis())
    }

    pub fn controls(&self) -> TrackingControls {
        let state = self.state();
        TrackingControls {
            can_start: !self.session.is_tracking(),
            can_pause: state == TrackingState::Active,
            can_resume: state == TrackingState::Paused,
            can_stop: self.session.is_tracking(),
            can_save: state == TrackingState::Stopped
                && self.session.current_path().len() >= MIN_ROUTE_POINTS,
        }
    }

    /// Snapshot for the map renderer.
    pub fn map_view(&self, routes: &RouteStore) -> MapView {
        let saved_path = self
            .selected_route
            .as_deref()
            .and_then(|id| routes.get_route(id))
            .map(|r| r.coordinates.as_slice());
        MapView::new(
            self.session.current_path(),
            saved_path,
            self.geo.current_position(),
        )
    }

    /// Open or close the watch so that one exists exactly while recording.
    fn sync_subscription(&mut self) {
        if self.session.is_recording() {
            if self.subscription.is_none() {
                match self.geo.watch() {
                    Ok(subscription) => {
                        debug!("[Tracker] Watch {} opened", subscription.id());
                        self.subscription = Some(subscription);
                    }
                    Err(e) => {
                        warn!("[Tracker] Could not watch position: {}", e);
                        self.error = Some(e.to_string());
                    }
                }
            }
        } else if let Some(subscription) = self.subscription.take() {
            subscription.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo_utils::{haversine_distance, path_distance};
    use crate::storage::FailingStorage;
    use crate::{ManualClock, MemoryStorage, PositionError, ScriptedPositionSource};

    fn fix(lat: f64, lng: f64, t: i64) -> Coordinate {
        Coordinate::new(lat, lng, t)
    }

    fn setup() -> (Tracker<ScriptedPositionSource>, ScriptedPositionSource, Arc<ManualClock>) {
        let source = ScriptedPositionSource::new();
        let clock = Arc::new(ManualClock::new(0));
        let tracker = Tracker::with_clock(source.clone(), clock.clone());
        (tracker, source, clock)
    }

    fn started() -> (Tracker<ScriptedPositionSource>, ScriptedPositionSource, Arc<ManualClock>) {
        let (mut tracker, source, clock) = setup();
        source.set_current(fix(0.0, 0.0, 0));
        tracker.request_current_position();
        tracker.start().unwrap();
        (tracker, source, clock)
    }

    fn route_store() -> RouteStore {
        RouteStore::open(Arc::new(MemoryStorage::new()), "routes").unwrap()
    }

    #[test]
    fn test_start_without_position() {
        let (mut tracker, source, _) = setup();
        let result = tracker.start();
        assert!(matches!(result, Err(TrackerError::PositionUnavailable)));
        assert_eq!(tracker.state(), TrackingState::Idle);
        assert!(!tracker.is_watching());
        assert!(tracker.error().is_some());

        // The failed start asked for a fix; once one arrives a retry works
        source.set_current(fix(0.0, 0.0, 0));
        tracker.request_current_position();
        tracker.start().unwrap();
        assert_eq!(tracker.state(), TrackingState::Active);
        assert!(tracker.error().is_none());
    }

    #[test]
    fn test_start_seeds_path_and_watch() {
        let (tracker, source, _) = started();
        assert_eq!(tracker.current_path(), &[fix(0.0, 0.0, 0)]);
        assert_eq!(tracker.session().start_time(), Some(0));
        assert!(tracker.is_watching());
        assert_eq!(source.active_watch_count(), 1);
        assert_eq!(source.last_options().unwrap().maximum_age_ms, 1_000);
    }

    #[test]
    fn test_close_fix_is_filtered() {
        let (mut tracker, _, _) = started();
        let p1 = fix(0.0, 0.00001, 1000);
        assert!(haversine_distance(&tracker.current_path()[0], &p1) < 2.0);
        assert!(!tracker.position_update(p1));
        assert_eq!(tracker.current_path(), &[fix(0.0, 0.0, 0)]);
    }

    #[test]
    fn test_pump_appends_far_fixes() {
        let (mut tracker, source, _) = started();
        source.replay(&[
            fix(0.0, 0.0001, 1000),
            fix(0.0, 0.00011, 1500), // ~1.1 m from previous
            fix(0.0, 0.00015, 2000),
        ]);
        assert_eq!(tracker.pump(), 2);
        assert_eq!(tracker.current_path().len(), 3);
        assert_eq!(tracker.current_position().unwrap().timestamp, 2000);
    }

    #[test]
    fn test_pause_ignores_fixes_and_drops_watch() {
        let (mut tracker, source, _) = started();
        tracker.pause();
        assert_eq!(tracker.state(), TrackingState::Paused);
        assert!(!tracker.is_watching());
        assert_eq!(source.active_watch_count(), 0);

        assert!(!tracker.position_update(fix(0.0, 0.001, 1000)));
        assert_eq!(tracker.current_path().len(), 1);

        tracker.resume();
        assert_eq!(tracker.state(), TrackingState::Active);
        assert_eq!(source.active_watch_count(), 1);
        assert!(tracker.position_update(fix(0.0, 0.001, 2000)));
        assert_eq!(tracker.current_path().len(), 2);
    }

    #[test]
    fn test_fix_queued_before_pause_is_ignored() {
        let (mut tracker, source, _) = started();
        source.emit(fix(0.0, 0.001, 1000));
        tracker.pause();
        tracker.resume();
        assert_eq!(tracker.pump(), 0);
        assert_eq!(tracker.current_path().len(), 1);
    }

    #[test]
    fn test_redundant_calls_are_noops() {
        let (mut tracker, _, _) = setup();
        tracker.pause();
        tracker.resume();
        tracker.stop();
        tracker.discard();
        assert_eq!(tracker.state(), TrackingState::Idle);

        let (mut tracker, _, _) = started();
        tracker.pause();
        tracker.pause();
        assert_eq!(tracker.state(), TrackingState::Paused);
        tracker.start().unwrap();
        assert_eq!(tracker.state(), TrackingState::Paused);
    }

    #[test]
    fn test_stop_freezes_path() {
        let (mut tracker, source, _) = started();
        tracker.position_update(fix(0.0, 0.001, 1000));
        tracker.stop();
        assert_eq!(tracker.state(), TrackingState::Stopped);
        assert_eq!(source.active_watch_count(), 0);

        assert!(!tracker.position_update(fix(0.0, 0.002, 2000)));
        assert_eq!(tracker.current_path().len(), 2);
        assert_eq!(tracker.pump(), 0);
    }

    #[test]
    fn test_save_insufficient_points() {
        let (mut tracker, _, _) = started();
        tracker.stop();
        let mut routes = route_store();
        let result = tracker.save("Walk", &mut routes);
        assert!(matches!(
            result,
            Err(TrackerError::InsufficientPoints { point_count: 1, .. })
        ));
        assert_eq!(tracker.state(), TrackingState::Stopped);
        assert!(routes.is_empty());
    }

    #[test]
    fn test_save_while_tracking_is_noop() {
        let (mut tracker, _, _) = started();
        tracker.position_update(fix(0.0, 0.001, 1000));
        let mut routes = route_store();
        assert!(tracker.save("Walk", &mut routes).unwrap().is_none());
        assert_eq!(tracker.state(), TrackingState::Active);
        assert!(routes.is_empty());
    }

    #[test]
    fn test_save_requires_name() {
        let (mut tracker, _, _) = started();
        tracker.position_update(fix(0.0, 0.001, 1000));
        tracker.stop();
        let mut routes = route_store();
        assert!(matches!(
            tracker.save("   ", &mut routes),
            Err(TrackerError::EmptyName)
        ));
        assert_eq!(tracker.state(), TrackingState::Stopped);
    }

    #[test]
    fn test_save_persists_and_clears() {
        let (mut tracker, _, clock) = started();
        tracker.position_update(fix(0.0, 0.001, 1000));
        tracker.position_update(fix(0.0, 0.002, 2500));
        tracker.stop();
        clock.set(9_000);

        let path = tracker.current_path().to_vec();
        let mut routes = route_store();
        let route = tracker.save("  Lunch loop ", &mut routes).unwrap().unwrap();

        assert_eq!(route.name, "Lunch loop");
        assert_eq!(route.coordinates, path);
        assert_eq!(route.duration, 2_500);
        assert_eq!(route.created_at, 9_000);
        assert!((route.distance - path_distance(&path)).abs() < 1e-9);

        assert_eq!(tracker.state(), TrackingState::Idle);
        assert!(tracker.current_path().is_empty());
        assert_eq!(routes.get_route(&route.id).unwrap().coordinates, path);
    }

    #[test]
    fn test_failed_save_keeps_stopped_session() {
        let storage = FailingStorage::new();
        let mut routes = RouteStore::open(Arc::new(storage.clone()), "routes").unwrap();
        storage.fail_writes();

        let (mut tracker, _, _) = started();
        tracker.position_update(fix(0.0, 0.001, 1000));
        tracker.stop();
        let path = tracker.current_path().to_vec();

        let result = tracker.save("Walk", &mut routes);
        assert!(matches!(result, Err(TrackerError::Storage { .. })));
        assert_eq!(tracker.state(), TrackingState::Stopped);
        assert_eq!(tracker.current_path(), path.as_slice());
        assert_eq!(tracker.error(), Some("Storage error: disk full"));
        assert!(tracker.controls().can_save);
        assert!(routes.is_empty());
        assert!(routes.list_routes().is_empty());
    }

    #[test]
    fn test_save_retry_after_failure() {
        let storage = FailingStorage::new();
        let mut failing = RouteStore::open(Arc::new(storage.clone()), "routes").unwrap();
        storage.fail_writes();

        let (mut tracker, _, _) = started();
        tracker.position_update(fix(0.0, 0.001, 1000));
        tracker.stop();
        assert!(tracker.save("Walk", &mut failing).is_err());

        let mut routes = route_store();
        let route = tracker.save("Walk", &mut routes).unwrap().unwrap();
        assert_eq!(route.coordinates.len(), 2);
        assert!(tracker.error().is_none());
        assert_eq!(tracker.state(), TrackingState::Idle);
    }

    #[test]
    fn test_restart_from_stopped_discards_path() {
        let (mut tracker, source, clock) = started();
        tracker.position_update(fix(0.0, 0.001, 1000));
        tracker.stop();

        source.set_current(fix(1.0, 1.0, 5000));
        tracker.request_current_position();
        clock.set(5000);
        tracker.start().unwrap();
        assert_eq!(tracker.current_path(), &[fix(1.0, 1.0, 5000)]);
        assert_eq!(tracker.session().start_time(), Some(5000));
        assert_eq!(source.active_watch_count(), 1);
    }

    #[test]
    fn test_watch_errors_are_advisory() {
        let (mut tracker, source, _) = started();
        source.emit_error(PositionError::Timeout);
        assert_eq!(tracker.pump(), 0);
        assert_eq!(tracker.state(), TrackingState::Active);
        assert_eq!(
            tracker.error(),
            Some("Location request timed out. Try again.")
        );

        source.emit(fix(0.0, 0.001, 1000));
        assert_eq!(tracker.pump(), 1);
        assert!(tracker.error().is_none());
    }

    #[test]
    fn test_unsupported_watch_is_advisory() {
        let source = ScriptedPositionSource::unsupported();
        let mut tracker = Tracker::with_clock(source, Arc::new(ManualClock::new(0)));
        assert!(tracker.start().is_err());
        assert_eq!(tracker.error(), Some("Waiting for GPS signal..."));
        assert_eq!(
            tracker.geolocation().error(),
            Some(PositionError::Unsupported)
        );
        assert_eq!(tracker.state(), TrackingState::Idle);
    }

    #[test]
    fn test_select_route_discards_session() {
        let mut routes = route_store();
        let saved = routes
            .save_route(
                "Saved",
                vec![fix(0.0, 0.0, 0), fix(0.0, 0.001, 1000)],
                0,
                0,
            )
            .unwrap();

        let (mut tracker, source, _) = started();
        tracker.select_route(&saved);
        assert_eq!(tracker.state(), TrackingState::Idle);
        assert_eq!(source.active_watch_count(), 0);
        assert_eq!(tracker.selected_route_id(), Some(saved.id.as_str()));

        let view = tracker.map_view(&routes);
        assert_eq!(view.saved_path.as_ref().unwrap().len(), 2);

        tracker.delete_route(&saved.id, &mut routes).unwrap();
        assert!(tracker.selected_route_id().is_none());
        assert!(routes.is_empty());
    }

    #[test]
    fn test_start_clears_selection() {
        let mut routes = route_store();
        let saved = routes
            .save_route("Saved", vec![fix(0.0, 0.0, 0), fix(0.0, 0.001, 1)], 0, 0)
            .unwrap();
        let (mut tracker, source, _) = setup();
        tracker.select_route(&saved);
        source.set_current(fix(0.0, 0.0, 0));
        tracker.request_current_position();
        tracker.start().unwrap();
        assert!(tracker.selected_route_id().is_none());
    }

    #[test]
    fn test_controls() {
        let (mut tracker, _, _) = started();
        let c = tracker.controls();
        assert!(c.can_pause && c.can_stop && !c.can_start && !c.can_save && !c.can_resume);

        tracker.pause();
        let c = tracker.controls();
        assert!(c.can_resume && c.can_stop && !c.can_pause);

        tracker.stop();
        let c = tracker.controls();
        assert!(c.can_start && !c.can_save);

        let (mut tracker, _, _) = started();
        tracker.position_update(fix(0.0, 0.001, 1000));
        tracker.stop();
        let c = tracker.controls();
        assert!(c.can_start && c.can_save && !c.can_stop);
    }

    #[test]
    fn test_stats_use_clock() {
        let (mut tracker, _, clock) = started();
        tracker.position_update(fix(0.0, 0.0001, 1000));
        clock.set(60_000);
        let stats = tracker.stats();
        assert_eq!(stats.points, 2);
        assert_eq!(stats.duration, 60_000);
        assert!(stats.distance > 11.0 && stats.distance < 11.2);
    }

    #[test]
    fn test_drop_cancels_watch() {
        let (tracker, source, _) = started();
        assert_eq!(source.active_watch_count(), 1);
        drop(tracker);
        assert_eq!(source.active_watch_count(), 0);
    }
}
