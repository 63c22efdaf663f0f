//! Process-wide publish/subscribe dispatcher
//!
//! Delivery is synchronous: `publish` returns once every registered
//! listener has handled the event, in registration order. All dispatch runs
//! under one bus-wide lock, so two publishes never interleave their
//! callbacks and handlers must stay short.
//!
//! Handlers must not call back into the bus. A handler that needs to emit a
//! follow-up event pushes it into the [`Publisher`] it is handed; queued
//! events are delivered after the current event reached every listener,
//! before the outer `publish` returns.

use crate::event::Event;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::trace;

/// Trait for event bus listeners
pub trait EventListener: Send {
    /// Handle one event
    fn on_event(&mut self, event: &Event, publisher: &mut Publisher);
}

/// Collects follow-up events emitted from inside a handler
#[derive(Debug, Default)]
pub struct Publisher {
    pending: VecDeque<Event>,
}

impl Publisher {
    pub fn publish(&mut self, event: Event) {
        self.pending.push_back(event);
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Take the queued events, e.g. to inspect them in tests
    pub fn drain(&mut self) -> Vec<Event> {
        self.pending.drain(..).collect()
    }
}

/// Adapter turning a closure into a listener
pub struct FnListener<F>(F);

impl<F> EventListener for FnListener<F>
where
    F: FnMut(&Event, &mut Publisher) + Send,
{
    fn on_event(&mut self, event: &Event, publisher: &mut Publisher) {
        (self.0)(event, publisher)
    }
}

/// Wrap a closure as an [`EventListener`]
pub fn listener_fn<F>(f: F) -> FnListener<F>
where
    F: FnMut(&Event, &mut Publisher) + Send,
{
    FnListener(f)
}

/// Handle returned by [`EventBus::register`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct BusInner {
    listeners: Vec<(ListenerId, Box<dyn EventListener>)>,
    next_id: u64,
}

/// Shared event bus. Clones refer to the same bus.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Mutex<BusInner>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(BusInner {
                listeners: Vec::new(),
                next_id: 0,
            })),
        }
    }

    // A panicking listener must not take the bus down with it
    fn lock(&self) -> MutexGuard<'_, BusInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a listener at the end of the delivery order
    pub fn register<L>(&self, listener: L) -> ListenerId
    where
        L: EventListener + 'static,
    {
        let mut inner = self.lock();
        let id = ListenerId(inner.next_id);
        inner.next_id += 1;
        inner.listeners.push((id, Box::new(listener)));
        id
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn unregister(&self, id: ListenerId) -> bool {
        let mut inner = self.lock();
        let before = inner.listeners.len();
        inner.listeners.retain(|(listener_id, _)| *listener_id != id);
        inner.listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }

    /// Deliver `event` and any follow-ups to every listener
    pub fn publish(&self, event: Event) {
        let mut inner = self.lock();
        let mut queue = VecDeque::from([event]);
        let mut publisher = Publisher::default();

        while let Some(event) = queue.pop_front() {
            trace!(event = event.name(), "publishing");
            for (_, listener) in inner.listeners.iter_mut() {
                listener.on_event(&event, &mut publisher);
            }
            queue.extend(publisher.pending.drain(..));
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
