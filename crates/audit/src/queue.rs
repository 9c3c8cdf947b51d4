//! The bounded producer/consumer queue between `put_event` callers and the
//! single consumer thread.
//!
//! One mutex serialises producers against the swap-and-drain the consumer
//! performs; the consumer always releases the lock before doing any I/O.
//! A condition variable wakes the consumer on every enqueue, and a bounded
//! wait on that same condition drives time-based rotation when nothing
//! arrives before the next rotation deadline.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::event::AuditEvent;

/// One item accepted by the queue: either a normal record, or a control
/// signal the consumer must act on inline while draining.
pub enum QueuedItem {
    /// A normal audit record to serialise to the log.
    Record(AuditEvent),
    /// Reload configuration from disk and re-emit a "configured" event.
    Reconfigure,
}

struct QueueState {
    fill: VecDeque<QueuedItem>,
    stop: bool,
}

/// Outcome of one consumer wake cycle.
pub struct Drained {
    /// Items moved out of the fill queue, in arrival order.
    pub items: Vec<QueuedItem>,
    /// Whether a shutdown has been requested.
    pub stop: bool,
    /// Whether the wait returned due to the rotation deadline rather than
    /// an enqueue.
    pub timed_out: bool,
}

/// The bounded FIFO plus its condition variable.
pub struct EventQueue {
    state: Mutex<QueueState>,
    condvar: Condvar,
    capacity: usize,
    dropped: AtomicU64,
}

impl EventQueue {
    /// A queue that drops events once `capacity` items are pending.
    pub fn new(capacity: usize) -> Self {
        EventQueue {
            state: Mutex::new(QueueState { fill: VecDeque::new(), stop: false }),
            condvar: Condvar::new(),
            capacity,
            dropped: AtomicU64::new(0),
        }
    }

    /// Enqueue an item; if the queue is at capacity the item is dropped
    /// and the drop counter incremented instead.
    pub fn enqueue(&self, item: QueuedItem) {
        let mut guard = self.state.lock();
        if guard.fill.len() >= self.capacity {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }
        guard.fill.push_back(item);
        self.condvar.notify_one();
    }

    /// Number of events dropped for queue overflow since construction.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Request shutdown: the next drain will report `stop = true` after
    /// whatever was already enqueued (including a "shutting down" record
    /// pushed immediately before this call) has been handed to the
    /// consumer.
    pub fn signal_stop(&self) {
        let mut guard = self.state.lock();
        guard.stop = true;
        self.condvar.notify_one();
    }

    /// Wait up to `timeout` for an enqueue, then atomically swap the fill
    /// queue out for an empty one and return what was collected.
    pub fn wait_and_swap(&self, timeout: Duration) -> Drained {
        let mut guard = self.state.lock();
        let mut timed_out = false;
        if guard.fill.is_empty() && !guard.stop {
            let result = self.condvar.wait_for(&mut guard, timeout);
            timed_out = result.timed_out();
        }
        let items: Vec<QueuedItem> = guard.fill.drain(..).collect();
        Drained { items, stop: guard.stop, timed_out }
    }
}
