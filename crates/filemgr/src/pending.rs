//! Retry queue for partition files that could not be unlinked immediately.
//!
//! A transient failure (permission race, file still mapped on some
//! platforms, NFS staleness) pushes the path here instead of propagating;
//! a periodic background task drains the queue, same shape as the
//! teacher's TTL cleanup thread: an atomic shutdown flag and a sleep loop.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, warn};

/// Attempt to unlink `path`. A missing file counts as success ("does not
/// exist" is the one failure mode that is never worth retrying); any other
/// failure pushes `path` onto `queue` instead of returning an error.
pub fn unlink_with_retry(path: &Path, queue: &PendingDeletionQueue) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            warn!(path = %path.display(), error = %e, "deferring file deletion to pending queue");
            queue.push(path.to_path_buf());
        }
    }
}

/// The queue itself: a plain mutex-guarded deque, drained by
/// [`PendingDeletionQueue::drain_once`] or the background task started by
/// [`PendingDeletionQueue::spawn_periodic_task`].
pub struct PendingDeletionQueue {
    inner: Mutex<VecDeque<PathBuf>>,
}

impl PendingDeletionQueue {
    /// An empty queue.
    pub fn new() -> Arc<Self> {
        Arc::new(PendingDeletionQueue { inner: Mutex::new(VecDeque::new()) })
    }

    /// Queue a path for a later retry.
    pub fn push(&self, path: PathBuf) {
        self.inner.lock().push_back(path);
    }

    /// Number of paths currently queued.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether the queue is currently empty.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Try to unlink every currently-queued path once; paths that still
    /// fail (other than "does not exist") go back on the queue for the
    /// next pass.
    pub fn drain_once(&self) {
        let batch: Vec<PathBuf> = self.inner.lock().drain(..).collect();
        for path in batch {
            match fs::remove_file(&path) {
                Ok(()) => debug!(path = %path.display(), "pending deletion completed"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "pending deletion still failing, requeued");
                    self.inner.lock().push_back(path);
                }
            }
        }
    }

    /// Start a background thread that calls [`Self::drain_once`] every
    /// `interval` until [`PendingTaskHandle::shutdown`] is called.
    pub fn spawn_periodic_task(self: &Arc<Self>, interval: Duration) -> PendingTaskHandle {
        let queue = Arc::clone(self);
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_for_thread = Arc::clone(&shutdown);

        let join = thread::spawn(move || {
            let tick = Duration::from_millis(100).min(interval);
            while !shutdown_for_thread.load(Ordering::Relaxed) {
                let mut elapsed = Duration::ZERO;
                while elapsed < interval {
                    if shutdown_for_thread.load(Ordering::Relaxed) {
                        return;
                    }
                    thread::sleep(tick);
                    elapsed += tick;
                }
                queue.drain_once();
            }
        });

        PendingTaskHandle { join: Some(join), shutdown }
    }
}

impl Default for PendingDeletionQueue {
    fn default() -> Self {
        PendingDeletionQueue { inner: Mutex::new(VecDeque::new()) }
    }
}

/// Handle to the background pending-deletion task; dropping it leaves the
/// thread running, call [`Self::shutdown`] to stop it deterministically.
pub struct PendingTaskHandle {
    join: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl PendingTaskHandle {
    /// Signal the background task to stop and wait for it to exit.
    pub fn shutdown(mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}
