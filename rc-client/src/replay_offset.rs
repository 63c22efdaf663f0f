//! Session time to replay time mapping
//!
//! The offset between the live session clock and the recorded replay
//! timeline is found by an external correlator, which stores it here. The
//! mapping is dropped whenever it can no longer be valid: on a new
//! connection and on a session change.

use rc_core::{Event, EventListener, Publisher};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

/// No mapping from session time to replay time is known yet
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Replay offset unavailable")]
pub struct ReplayOffsetUnavailable;

/// Lookup used by the contact detector
pub trait ReplayTimeLookup: Send + Sync {
    /// Replay time (ms) of the given session time (ms)
    fn replay_time(&self, session_time_ms: i32) -> Result<i32, ReplayOffsetUnavailable>;
}

/// Shared, settable replay offset. Clones share the same value.
#[derive(Debug, Clone, Default)]
pub struct ReplayOffset {
    offset_ms: Arc<RwLock<Option<i32>>>,
}

impl ReplayOffset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `replay time - session time`
    pub fn set(&self, offset_ms: i32) {
        *self.offset_ms.write().unwrap_or_else(PoisonError::into_inner) = Some(offset_ms);
    }

    pub fn clear(&self) {
        *self.offset_ms.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn get(&self) -> Option<i32> {
        *self.offset_ms.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ReplayTimeLookup for ReplayOffset {
    fn replay_time(&self, session_time_ms: i32) -> Result<i32, ReplayOffsetUnavailable> {
        self.get()
            .map(|offset| session_time_ms.saturating_add(offset))
            .ok_or(ReplayOffsetUnavailable)
    }
}

impl EventListener for ReplayOffset {
    fn on_event(&mut self, event: &Event, _publisher: &mut Publisher) {
        match event {
            Event::ConnectionOpened { .. }
            | Event::SessionChanged {
                initialisation: false,
                ..
            } => {
                if self.get().is_some() {
                    debug!(event = event.name(), "Dropping replay offset");
                }
                self.clear();
            }
            _ => {}
        }
    }
}
