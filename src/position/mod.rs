//! # Position Sources
//!
//! Wraps the device's one-shot and continuous location APIs.
//!
//! A continuous watch is a [`Subscription`]: the receiving half of a channel plus
//! a shared cancel flag. The source keeps the [`WatchSender`] half and stops
//! delivering once the subscription is cancelled or dropped. Delivery is polled
//! (`try_recv`/`drain`) by the owner, so all state changes happen on the owner's
//! thread, one event at a time.

mod scripted;

pub use scripted::ScriptedPositionSource;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;

use log::{debug, info};

use crate::{Coordinate, PositionError, PositionOptions};

/// A fix or a failure, as delivered by a watch.
pub type PositionEvent = std::result::Result<Coordinate, PositionError>;

/// Device location API.
pub trait PositionSource {
    /// One-shot request for the current fix.
    fn current_position(&mut self, options: &PositionOptions) -> PositionEvent;

    /// Start a continuous watch. Fails with [`PositionError::Unsupported`] when the
    /// device has no location API.
    fn watch_position(
        &mut self,
        options: &PositionOptions,
    ) -> std::result::Result<Subscription, PositionError>;
}

static NEXT_WATCH_ID: AtomicU64 = AtomicU64::new(1);

/// Create a connected sender/subscription pair.
pub fn watch_channel() -> (WatchSender, Subscription) {
    let (sender, receiver) = mpsc::channel();
    let cancelled = Arc::new(AtomicBool::new(false));
    let id = NEXT_WATCH_ID.fetch_add(1, Ordering::Relaxed);
    (
        WatchSender {
            id,
            sender,
            cancelled: Arc::clone(&cancelled),
        },
        Subscription {
            id,
            receiver,
            cancelled,
        },
    )
}

/// Source-side half of a watch.
#[derive(Debug, Clone)]
pub struct WatchSender {
    id: u64,
    sender: mpsc::Sender<PositionEvent>,
    cancelled: Arc<AtomicBool>,
}

impl WatchSender {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Deliver an event. Returns false once the watch is gone, so the source can
    /// forget this sender.
    pub fn send(&self, event: PositionEvent) -> bool {
        if self.is_cancelled() {
            return false;
        }
        self.sender.send(event).is_ok()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Owner-side half of a watch. Cancels itself on drop.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    receiver: mpsc::Receiver<PositionEvent>,
    cancelled: Arc<AtomicBool>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next pending event, if any (non-blocking).
    pub fn try_recv(&self) -> Option<PositionEvent> {
        if self.is_cancelled() {
            return None;
        }
        self.receiver.try_recv().ok()
    }

    /// All pending events in delivery order (non-blocking).
    pub fn drain(&self) -> Vec<PositionEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    /// Stop delivery. Events already queued are discarded.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            debug!("[Geolocation] Watch {} cancelled", self.id);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

// ============================================================================
// Geolocation state
// ============================================================================

/// Last known device position plus the advisory error from the last request.
///
/// Starts out loading; the first answer from the source (a fix or a failure,
/// one-shot or watch) ends it.
pub struct Geolocation<S: PositionSource> {
    source: S,
    current_options: PositionOptions,
    watch_options: PositionOptions,
    current_position: Option<Coordinate>,
    error: Option<PositionError>,
    is_loading: bool,
}

impl<S: PositionSource> Geolocation<S> {
    /// Wrap a source with the default fix policies.
    pub fn new(source: S) -> Self {
        Self::with_options(source, PositionOptions::one_shot(), PositionOptions::watch())
    }

    pub fn with_options(
        source: S,
        current_options: PositionOptions,
        watch_options: PositionOptions,
    ) -> Self {
        Self {
            source,
            current_options,
            watch_options,
            current_position: None,
            error: None,
            is_loading: true,
        }
    }

    /// Request a fresh one-shot fix.
    ///
    /// On failure the previous fix (if any) is kept and the reason is recorded
    /// as the advisory error.
    pub fn request_current_position(&mut self) -> Option<Coordinate> {
        let result = self.source.current_position(&self.current_options);
        self.is_loading = false;

        match result {
            Ok(fix) => {
                self.current_position = Some(fix);
                self.error = None;
            }
            Err(e) => {
                info!("[Geolocation] Position request failed: {}", e);
                self.error = Some(e);
            }
        }
        self.current_position
    }

    /// Start a continuous watch with the watch fix policy.
    pub fn watch(&mut self) -> std::result::Result<Subscription, PositionError> {
        let result = self.source.watch_position(&self.watch_options);
        if let Err(e) = &result {
            info!("[Geolocation] Watch failed to start: {}", e);
            self.error = Some(*e);
            self.is_loading = false;
        }
        result
    }

    /// Record a fix delivered by a watch as the latest known position.
    pub fn note_fix(&mut self, fix: Coordinate) {
        self.current_position = Some(fix);
        self.error = None;
        self.is_loading = false;
    }

    /// Record a failure delivered by a watch.
    pub fn note_error(&mut self, error: PositionError) {
        self.error = Some(error);
        self.is_loading = false;
    }

    pub fn current_position(&self) -> Option<Coordinate> {
        self.current_position
    }

    pub fn error(&self) -> Option<PositionError> {
        self.error
    }

    /// True until the source has answered once.
    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }
}
