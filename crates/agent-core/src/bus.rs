//! Event Bus
//!
//! Per-exchange registry mapping an event kind to an ordered list of
//! callbacks. The transport redispatches every decoded frame through it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::TransportError;
use crate::frame::Payload;

/// Event kinds a transport dispatches
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    Message,
    Error,
    Close,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Message => write!(f, "message"),
            Self::Error => write!(f, "error"),
            Self::Close => write!(f, "close"),
        }
    }
}

/// An event delivered to listeners
#[derive(Debug)]
pub enum StreamEvent {
    /// One decoded data line
    Message(Payload),

    /// Transport failure, dispatched at most once per exchange
    Error(TransportError),

    /// The exchange shut down
    Close,
}

impl StreamEvent {
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Message(_) => EventKind::Message,
            Self::Error(_) => EventKind::Error,
            Self::Close => EventKind::Close,
        }
    }
}

/// Callback invoked for every dispatched event of the kind it registered for
pub type Listener = Arc<dyn Fn(&StreamEvent) + Send + Sync>;

/// Handle returned by [`EventBus::add_event_listener`], used for removal
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: HashMap<EventKind, Vec<(ListenerId, Listener)>>,
}

/// Shared, cloneable callback registry
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Mutex<Registry>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.lock();
        let mut map = f.debug_map();
        for (kind, listeners) in &registry.listeners {
            map.entry(kind, &listeners.len());
        }
        map.finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        // Listeners never run under the lock, so a poisoned registry is still consistent.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `listener` for `kind`; it runs after every listener registered before it
    pub fn add_event_listener<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&StreamEvent) + Send + Sync + 'static,
    {
        let mut registry = self.lock();
        registry.next_id += 1;
        let id = ListenerId(registry.next_id);
        registry
            .listeners
            .entry(kind)
            .or_default()
            .push((id, Arc::new(listener)));
        id
    }

    /// Remove one previously registered listener. Returns whether it was present.
    pub fn remove_event_listener(&self, kind: EventKind, id: ListenerId) -> bool {
        let mut registry = self.lock();
        let Some(listeners) = registry.listeners.get_mut(&kind) else {
            return false;
        };
        let before = listeners.len();
        listeners.retain(|(registered, _)| *registered != id);
        before != listeners.len()
    }

    /// Invoke every listener for the event's kind, in registration order.
    ///
    /// The listener list is captured before the first call, so listeners
    /// added while dispatching only see later events. Returns the number of
    /// listeners invoked.
    pub fn dispatch(&self, event: &StreamEvent) -> usize {
        let listeners: Vec<Listener> = self
            .lock()
            .listeners
            .get(&event.kind())
            .map(|l| l.iter().map(|(_, f)| Arc::clone(f)).collect())
            .unwrap_or_default();

        tracing::trace!(kind = %event.kind(), listeners = listeners.len(), "Dispatching event");
        for listener in &listeners {
            listener(event);
        }
        listeners.len()
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.lock().listeners.get(&kind).map_or(0, Vec::len)
    }

    /// Drop every listener
    pub fn clear(&self) {
        self.lock().listeners.clear();
    }
}
