//! State-change listeners notified whenever an event's enabled flag
//! changes on reconfigure.

use parking_lot::Mutex;

/// A registered `(event_id, enabled) -> ()` callback.
type Listener = Box<dyn Fn(u32, bool) + Send + 'static>;

/// Append-only registry of state-change listeners, guarded by its own
/// mutex (held for both registration and notification, never across I/O).
#[derive(Default)]
pub struct StateListeners {
    inner: Mutex<Vec<Listener>>,
}

impl StateListeners {
    /// An empty listener registry.
    pub fn new() -> Self {
        StateListeners { inner: Mutex::new(Vec::new()) }
    }

    /// Register a new listener. Registration never removes an existing
    /// one.
    pub fn register(&self, listener: impl Fn(u32, bool) + Send + 'static) {
        self.inner.lock().push(Box::new(listener));
    }

    /// Notify every registered listener that `event_id`'s enabled state is
    /// now `enabled`.
    pub fn notify(&self, event_id: u32, enabled: bool) {
        for listener in self.inner.lock().iter() {
            listener(event_id, enabled);
        }
    }
}
