use std::sync::{Arc, Mutex, MutexGuard};

use crate::{Coordinate, PositionError, PositionOptions};

use super::{watch_channel, PositionEvent, PositionSource, Subscription, WatchSender};

#[derive(Debug)]
struct ScriptedState {
    supported: bool,
    current: PositionEvent,
    watchers: Vec<WatchSender>,
    last_options: Option<PositionOptions>,
}

/// A position source driven by hand, for tests, demos and replaying recorded tracks.
///
/// Clones share state, so a test can keep one handle while the tracker owns another.
#[derive(Debug, Clone)]
pub struct ScriptedPositionSource {
    state: Arc<Mutex<ScriptedState>>,
}

impl Default for ScriptedPositionSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedPositionSource {
    /// A source with no fix yet.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ScriptedState {
                supported: true,
                current: Err(PositionError::PositionUnavailable),
                watchers: Vec::new(),
                last_options: None,
            })),
        }
    }

    /// A device without a location API.
    pub fn unsupported() -> Self {
        let source = Self::new();
        {
            let mut state = source.lock();
            state.supported = false;
            state.current = Err(PositionError::Unsupported);
        }
        source
    }

    fn lock(&self) -> MutexGuard<'_, ScriptedState> {
        // A panic while holding the lock leaves plain data behind; keep going
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Set the answer to the next one-shot requests.
    pub fn set_current(&self, fix: Coordinate) {
        self.lock().current = Ok(fix);
    }

    pub fn set_current_error(&self, error: PositionError) {
        self.lock().current = Err(error);
    }

    /// Deliver a fix to every live watch.
    pub fn emit(&self, fix: Coordinate) {
        self.broadcast(Ok(fix));
    }

    /// Deliver a failure to every live watch.
    pub fn emit_error(&self, error: PositionError) {
        self.broadcast(Err(error));
    }

    /// Deliver a sequence of fixes in order.
    pub fn replay(&self, fixes: &[Coordinate]) {
        for fix in fixes {
            self.emit(*fix);
        }
    }

    fn broadcast(&self, event: PositionEvent) {
        self.lock().watchers.retain(|w| w.send(event));
    }

    /// Number of watches that have not been cancelled.
    pub fn active_watch_count(&self) -> usize {
        let mut state = self.lock();
        state.watchers.retain(|w| !w.is_cancelled());
        state.watchers.len()
    }

    /// Options passed with the most recent request or watch.
    pub fn last_options(&self) -> Option<PositionOptions> {
        self.lock().last_options
    }
}

impl PositionSource for ScriptedPositionSource {
    fn current_position(&mut self, options: &PositionOptions) -> PositionEvent {
        let mut state = self.lock();
        state.last_options = Some(*options);
        state.current
    }

    fn watch_position(
        &mut self,
        options: &PositionOptions,
    ) -> std::result::Result<Subscription, PositionError> {
        let mut state = self.lock();
        state.last_options = Some(*options);
        if !state.supported {
            return Err(PositionError::Unsupported);
        }
        let (sender, subscription) = watch_channel();
        state.watchers.push(sender);
        Ok(subscription)
    }
}
