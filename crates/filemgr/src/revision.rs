//! The dense per-partition revision map and its reader/writer lock
//! ordering.
//!
//! Readers hold the lock's read side across "read current revision → open
//! file" as one unit; installers hold the write side across "install new
//! revision". This ordering means a concurrent revision install can never
//! unlink the file out from under an opener: the installer cannot take the
//! write lock until every in-flight opener has released its read lock, and
//! by the time it does, the opener already has its file handle.

use std::collections::HashMap;

use parking_lot::RwLock;
use vbstore_core::{Error, PartitionId, Result, Revision};

/// The current revision for every partition that has ever been written.
pub struct RevisionMap {
    inner: RwLock<HashMap<PartitionId, Revision>>,
}

impl RevisionMap {
    /// An empty map, as at first startup with no partitions yet discovered.
    pub fn new() -> Self {
        RevisionMap { inner: RwLock::new(HashMap::new()) }
    }

    /// Build a map directly from discovered `(partition, revision)` pairs,
    /// as produced by [`crate::naming::populate_from_disk`].
    pub fn from_pairs(pairs: impl IntoIterator<Item = (PartitionId, Revision)>) -> Self {
        RevisionMap { inner: RwLock::new(pairs.into_iter().collect()) }
    }

    /// Read the current revision for `partition`, and open its file while
    /// still holding the read lock, so a concurrent `install_revision`
    /// cannot unlink the file this call is about to return a handle to.
    pub fn with_current<T>(&self, partition: PartitionId, open: impl FnOnce(Option<Revision>) -> Result<T>) -> Result<T> {
        let guard = self.inner.read();
        open(guard.get(&partition).copied())
    }

    /// The current revision for `partition`, or `None` if it has never
    /// been written.
    pub fn current_revision(&self, partition: PartitionId) -> Option<Revision> {
        self.inner.read().get(&partition).copied()
    }

    /// The revision that would follow the current one (or the first
    /// revision, if none exists yet), without installing anything.
    pub fn increment_revision(&self, partition: PartitionId) -> Revision {
        match self.current_revision(partition) {
            Some(rev) => rev.next(),
            None => Revision::INITIAL,
        }
    }

    /// Install `revision` as current for `partition`. Fails if the
    /// partition's existing revision is not exactly `revision`'s
    /// predecessor (data model invariant 4): a compaction can only install
    /// `rev+1` if the file it compacted was still at `rev` when the
    /// install runs.
    pub fn install_revision(&self, partition: PartitionId, revision: Revision) -> Result<()> {
        let mut guard = self.inner.write();
        let expected_predecessor = guard.get(&partition).copied();
        let ok = match expected_predecessor {
            Some(current) => revision.0 == current.0 + 1,
            None => revision == Revision::INITIAL,
        };
        if !ok {
            return Err(Error::Invariant(format!(
                "cannot install revision {revision:?} for partition {partition:?}: current is {expected_predecessor:?}"
            )));
        }
        guard.insert(partition, revision);
        Ok(())
    }
}

impl Default for RevisionMap {
    fn default() -> Self {
        RevisionMap::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_requires_exact_predecessor() {
        let map = RevisionMap::new();
        map.install_revision(PartitionId(0), Revision::INITIAL).unwrap();
        assert!(map.install_revision(PartitionId(0), Revision(3)).is_err());
        map.install_revision(PartitionId(0), Revision(2)).unwrap();
        assert_eq!(map.current_revision(PartitionId(0)), Some(Revision(2)));
    }

    #[test]
    fn with_current_sees_installed_revision() {
        let map = RevisionMap::new();
        map.install_revision(PartitionId(1), Revision::INITIAL).unwrap();
        let seen = map.with_current(PartitionId(1), |rev| Ok(rev)).unwrap();
        assert_eq!(seen, Some(Revision::INITIAL));
    }

    #[test]
    fn unknown_partition_has_no_current_revision() {
        let map = RevisionMap::new();
        assert_eq!(map.current_revision(PartitionId(9)), None);
        assert_eq!(map.increment_revision(PartitionId(9)), Revision::INITIAL);
    }
}
