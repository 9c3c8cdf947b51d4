//! The top-level facade: one [`Store`] per bucket, wiring the revision
//! map, file adapter, scan registry, pending-deletion queue, and stats
//! counters into the operations the rest of the engine exposes.

use std::path::PathBuf;
use std::sync::Arc;

use vbstore_core::{Error, PartitionId, Result, ScanOutcome, SeqNo};
use vbstore_file::{FileAdapter, FileInfo, Handle};
use vbstore_filemgr::{naming, unlink_with_retry, PendingDeletionQueue, RevisionMap};
use vbstore_format::VBucketStateDoc;

use crate::compaction::{self, CompactionContext};
use crate::config::Config;
use crate::read_path::{self, GetResult, Item};
use crate::rollback::{self, RollbackOutcome};
use crate::scan::{self, CacheLookup, ItemResult, ScanContext, ScanItem, ValueFilter};
use crate::scan_registry::ScanRegistry;
use crate::stats::Stats;
use crate::write_path::{self, Transaction};

/// One bucket's persistence engine: every partition's file lives under
/// `config.db_dir`, named per [`naming::file_name`].
pub struct Store {
    config: Config,
    adapter: FileAdapter,
    revisions: RevisionMap,
    scan_registry: ScanRegistry,
    pending: Arc<PendingDeletionQueue>,
    stats: Stats,
    database_uuid: [u8; 16],
}

impl Store {
    /// Discover every partition file already under `config.db_dir`,
    /// queue stale revisions for removal, and mint a fresh database uuid
    /// for any file this instance creates from here on.
    pub fn open(config: Config) -> Result<Self> {
        std::fs::create_dir_all(&config.db_dir)?;
        let discovered = naming::populate_from_disk(&config.db_dir)?;
        let revisions = RevisionMap::from_pairs(discovered.current);
        let pending = PendingDeletionQueue::new();
        for stale in discovered.stale {
            unlink_with_retry(&stale, &pending);
        }

        Ok(Store {
            config,
            adapter: FileAdapter,
            revisions,
            scan_registry: ScanRegistry::new(),
            pending,
            stats: Stats::new(),
            database_uuid: *uuid::Uuid::new_v4().as_bytes(),
        })
    }

    /// The configuration this instance was opened with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The pending-deletion queue backing stale-file reclamation; exposed
    /// so a caller's task framework can spawn the periodic drain.
    pub fn pending_deletions(&self) -> &Arc<PendingDeletionQueue> {
        &self.pending
    }

    fn path_for(&self, partition: PartitionId, revision: vbstore_core::Revision) -> PathBuf {
        naming::file_name(&self.config.db_dir, partition, revision)
    }

    /// Open the current revision of `partition` read-only, holding the
    /// revision map's reader side across the open so a concurrent
    /// compaction install cannot unlink the file out from under it.
    fn open_for_read(&self, partition: PartitionId) -> Result<Handle> {
        self.revisions.with_current(partition, |current| {
            let revision = current.ok_or(Error::NotFound)?;
            let path = self.path_for(partition, revision);
            self.adapter.open(&path, partition, revision.0, self.database_uuid, self.config.read_open_flags())
        })
    }

    /// Open (creating on first use) the current revision of `partition`
    /// for writing. The single-writer invariant is the caller's
    /// responsibility, same as every other mutating operation here.
    fn open_for_write(&self, partition: PartitionId) -> Result<Handle> {
        let revision = match self.revisions.current_revision(partition) {
            Some(revision) => revision,
            None => {
                self.revisions.install_revision(partition, vbstore_core::Revision::INITIAL)?;
                vbstore_core::Revision::INITIAL
            }
        };
        let path = self.path_for(partition, revision);
        self.adapter.open(&path, partition, revision.0, self.database_uuid, self.config.write_open_flags())
    }

    /// Fetch one document by key.
    pub fn get(&self, partition: PartitionId, key: &[u8], meta_only: bool) -> Result<Item> {
        let mut handle = self.open_for_read(partition)?;
        read_path::point_get(&self.adapter, &mut handle, key, meta_only, &self.stats)
    }

    /// Fetch several documents by key. If the partition's file cannot be
    /// opened at all, every key maps to [`GetResult::Failed`] with the
    /// open error.
    pub fn multi_get(&self, partition: PartitionId, keys: &[Vec<u8>], meta_only: bool) -> Vec<(Vec<u8>, GetResult)> {
        let mut handle = match self.open_for_read(partition) {
            Ok(handle) => handle,
            Err(e) => return keys.iter().map(|k| (k.clone(), GetResult::Failed(read_path::clone_error(&e)))).collect(),
        };
        read_path::multi_get(&self.adapter, &mut handle, keys, meta_only, &self.stats)
    }

    /// Collect every live key from `start_key` onward, in key order.
    ///
    /// `restore_namespace` overrides [`Config::persist_doc_namespace`] for
    /// this call; pass `None` to use the configured policy.
    pub fn get_all_keys(&self, partition: PartitionId, start_key: &[u8], restore_namespace: Option<bool>) -> Result<Vec<Vec<u8>>> {
        let mut handle = self.open_for_read(partition)?;
        let restore_namespace = restore_namespace.unwrap_or(self.config.persist_doc_namespace);
        read_path::get_all_keys(&self.adapter, &mut handle, start_key, restore_namespace)
    }

    /// Commit a transaction: open the current revision for write, run the
    /// full §4.D commit protocol, and deliver every mutation's callback.
    pub fn commit(
        &self,
        partition: PartitionId,
        txn: Transaction,
        vbstate: &VBucketStateDoc,
        collections_manifest: Option<&[u8]>,
        compress: bool,
    ) -> Result<FileInfo> {
        let mut handle = self.open_for_write(partition)?;
        write_path::commit_batch(&self.adapter, &mut handle, txn, vbstate, collections_manifest, compress, &self.stats)
    }

    /// Open a fresh, resumable scan cursor over `partition` starting
    /// after `start`.
    pub fn init_scan_context(&self, partition: PartitionId, start: SeqNo, value_filter: ValueFilter) -> Result<ScanContext> {
        let handle = self.open_for_read(partition)?;
        Ok(scan::init_scan_context(&self.scan_registry, &self.adapter, handle, start, value_filter))
    }

    /// Drive one scan pass; see [`scan::scan`] for the exact contract.
    pub fn scan<D, L, V>(&self, ctx: &mut ScanContext, doc_filter: D, cache_lookup: L, item_callback: V) -> Result<ScanOutcome>
    where
        D: FnMut(&vbstore_format::DocInfo) -> bool,
        L: FnMut(&[u8]) -> CacheLookup,
        V: FnMut(ScanItem) -> ItemResult,
    {
        scan::scan(ctx, &self.adapter, doc_filter, cache_lookup, item_callback)
    }

    /// Close a scan context and release its file handle.
    pub fn destroy_scan_context(&self, ctx: ScanContext) {
        scan::destroy_scan_context(&self.scan_registry, ctx)
    }

    /// Run one compaction pass over `partition`.
    pub fn compact(&self, ctx: CompactionContext<'_>) -> Result<FileInfo> {
        compaction::compact(&self.adapter, &self.config.db_dir, &self.revisions, &self.pending, self.database_uuid, self.config.read_open_flags(), ctx, &self.stats)
    }

    /// Rewind `partition` to the latest header at or before `target_seq`.
    pub fn rollback<F>(&self, partition: PartitionId, target_seq: SeqNo, on_discarded_key: F) -> Result<RollbackOutcome>
    where
        F: FnMut(&[u8]),
    {
        let revision = self.revisions.current_revision(partition).ok_or(Error::NotFound)?;
        let path = self.path_for(partition, revision);
        rollback::rollback(&self.adapter, &self.scan_registry, &path, partition, target_seq, on_discarded_key)
    }

    /// Look up one of the documented stat counters by name.
    pub fn get_stat(&self, name: &str) -> Option<u64> {
        self.stats.get_stat(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use vbstore_core::{Cas, Datatype, HlcEpochSeqno};
    use vbstore_format::DocInfo;

    fn doc(key: &[u8], seq: u64, deleted: bool) -> DocInfo {
        DocInfo {
            key: key.to_vec(),
            cas: Cas(1),
            rev_seqno: 1,
            by_seqno: SeqNo(seq),
            expiry: 0,
            flags: 0,
            datatype: Datatype::default(),
            hlc_cas_epoch_seqno: HlcEpochSeqno::UNSET,
            might_contain_xattrs: false,
            deleted,
        }
    }

    #[test]
    fn basic_round_trip_through_store() {
        let dir = tempdir().unwrap();
        let store = Store::open(Config { db_dir: dir.path().to_path_buf(), ..Default::default() }).unwrap();

        let mut txn = Transaction::begin();
        txn.set(doc(b"a", 1, false), b"1".to_vec(), |_| {});
        txn.set(doc(b"b", 2, false), b"2".to_vec(), |_| {});
        let info = store.commit(PartitionId(0), txn, &VBucketStateDoc::default(), None, false).unwrap();
        assert_eq!(info.doc_count, 2);

        let item = store.get(PartitionId(0), b"a", false).unwrap();
        assert_eq!(item.body, Some(b"1".to_vec()));
        let item = store.get(PartitionId(0), b"b", false).unwrap();
        assert_eq!(item.body, Some(b"2".to_vec()));
    }

    #[test]
    fn reopening_store_discovers_existing_partitions() {
        let dir = tempdir().unwrap();
        {
            let store = Store::open(Config { db_dir: dir.path().to_path_buf(), ..Default::default() }).unwrap();
            let mut txn = Transaction::begin();
            txn.set(doc(b"a", 1, false), b"1".to_vec(), |_| {});
            store.commit(PartitionId(0), txn, &VBucketStateDoc::default(), None, false).unwrap();
        }

        let store = Store::open(Config { db_dir: dir.path().to_path_buf(), ..Default::default() }).unwrap();
        let item = store.get(PartitionId(0), b"a", false).unwrap();
        assert_eq!(item.body, Some(b"1".to_vec()));
    }

    #[test]
    fn rollback_through_store_replays_discarded_keys() {
        // Keep the discarded fraction under half of the file's total
        // history, or the engine prefers a full reset instead.
        let dir = tempdir().unwrap();
        let store = Store::open(Config { db_dir: dir.path().to_path_buf(), ..Default::default() }).unwrap();

        let mut txn = Transaction::begin();
        txn.set(doc(b"a", 1, false), b"1".to_vec(), |_| {});
        txn.set(doc(b"b", 2, false), b"2".to_vec(), |_| {});
        txn.set(doc(b"c", 3, false), b"3".to_vec(), |_| {});
        store.commit(PartitionId(0), txn, &VBucketStateDoc::default(), None, false).unwrap();
        let target = store.get(PartitionId(0), b"c", true).unwrap().info.by_seqno;

        let mut txn = Transaction::begin();
        txn.set(doc(b"d", 4, false), b"4".to_vec(), |_| {});
        store.commit(PartitionId(0), txn, &VBucketStateDoc::default(), None, false).unwrap();

        let mut discarded = Vec::new();
        let outcome = store.rollback(PartitionId(0), target, |key| discarded.push(key.to_vec())).unwrap();
        match outcome {
            RollbackOutcome::Success { high_seqno, .. } => assert_eq!(high_seqno, target),
            RollbackOutcome::Reset => panic!("expected success"),
        }
        assert_eq!(discarded, vec![b"d".to_vec()]);
    }

    #[test]
    fn compaction_through_store_collapses_history_so_further_rollback_resets() {
        let dir = tempdir().unwrap();
        let store = Store::open(Config { db_dir: dir.path().to_path_buf(), ..Default::default() }).unwrap();

        let mut txn = Transaction::begin();
        txn.set(doc(b"a", 1, false), b"1".to_vec(), |_| {});
        store.commit(PartitionId(0), txn, &VBucketStateDoc::default(), None, false).unwrap();

        let mut txn = Transaction::begin();
        txn.set(doc(b"b", 2, false), b"2".to_vec(), |_| {});
        store.commit(PartitionId(0), txn, &VBucketStateDoc::default(), None, false).unwrap();

        let ctx = CompactionContext {
            partition: PartitionId(0),
            purge_before_seq: SeqNo(0),
            purge_before_ts: 0,
            drop_deletes: false,
            now: 0,
            collections_eraser: None,
            expiry_callback: None,
            bloom_filter_callback: None,
        };
        let post = store.compact(ctx).unwrap();
        assert_eq!(post.doc_count, 2);

        // Compaction folds every live record into a single new header, so
        // there is nothing earlier left to rewind to.
        let outcome = store.rollback(PartitionId(0), SeqNo(1), |_| {}).unwrap();
        assert_eq!(outcome, RollbackOutcome::Reset);
    }
}
