//! The scan-id table: a dedicated lock held only for pointer-copy
//! operations, never across scan I/O.
//!
//! Each registered handle is reached through its own `Mutex`, so `lookup`
//! only needs the registry lock long enough to clone an `Arc`; the actual
//! scan then locks just that one handle, never the whole table.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use vbstore_file::Handle;

/// A scan's open, read-only file handle, reached through its own lock.
pub type ScanHandle = Arc<Mutex<Handle>>;

/// Maps `scan_id -> file handle`, guarded by a single dedicated lock.
pub struct ScanRegistry {
    inner: Mutex<HashMap<u64, ScanHandle>>,
    next_id: AtomicU64,
}

impl ScanRegistry {
    /// An empty registry with its scan-id counter starting at zero.
    pub fn new() -> Self {
        ScanRegistry { inner: Mutex::new(HashMap::new()), next_id: AtomicU64::new(0) }
    }

    /// Register a newly opened scan handle, returning its freshly
    /// assigned id and a pointer to the handle.
    pub fn insert(&self, handle: Handle) -> (u64, ScanHandle) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let wrapped = Arc::new(Mutex::new(handle));
        self.inner.lock().insert(id, Arc::clone(&wrapped));
        (id, wrapped)
    }

    /// Clone out the handle registered under `scan_id`, if any.
    pub fn lookup(&self, scan_id: u64) -> Option<ScanHandle> {
        self.inner.lock().get(&scan_id).cloned()
    }

    /// Remove and return the handle registered under `scan_id`.
    pub fn remove(&self, scan_id: u64) -> Option<ScanHandle> {
        self.inner.lock().remove(&scan_id)
    }
}

impl Default for ScanRegistry {
    fn default() -> Self {
        ScanRegistry::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use vbstore_core::PartitionId;
    use vbstore_file::OpenFlags;

    #[test]
    fn insert_then_lookup_then_remove() {
        let dir = tempdir().unwrap();
        let handle = Handle::create(&dir.path().join("0.couch.1"), PartitionId(0), 1, [0u8; 16], OpenFlags::default()).unwrap();
        let registry = ScanRegistry::new();
        let (id, _) = registry.insert(handle);
        assert!(registry.lookup(id).is_some());
        assert!(registry.remove(id).is_some());
        assert!(registry.lookup(id).is_none());
    }

    #[test]
    fn ids_are_assigned_monotonically() {
        let dir = tempdir().unwrap();
        let registry = ScanRegistry::new();
        let mut ids = Vec::new();
        for i in 0..3 {
            let handle = Handle::create(&dir.path().join(format!("{i}.couch.1")), PartitionId(i), 1, [0u8; 16], OpenFlags::default()).unwrap();
            ids.push(registry.insert(handle).0);
        }
        assert_eq!(ids, vec![0, 1, 2]);
    }
}
