//! Copy-forward compaction: stream every live record from the current
//! revision into a shadow file through the `time_purge` hook, then
//! atomically install the result as the next revision.

use std::cell::Cell;
use std::path::Path;

use tracing::{error, info};
use vbstore_core::{Error, PartitionId, Result, SeqNo};
use vbstore_file::{CompactFlags, FileAdapter, FileInfo, HookDecision, OpenFlags};
use vbstore_format::DocInfo;
use vbstore_filemgr::{naming, unlink_with_retry, PendingDeletionQueue, RevisionMap};

use crate::stats::Stats;

/// What the collection-erasure check should do with a record's key.
pub type CollectionsEraser<'a> = dyn FnMut(&[u8]) -> bool + 'a;
/// Notified once per live record dropped because its expiry has passed.
pub type ExpiryCallback<'a> = dyn FnMut(&DocInfo, &[u8]) + 'a;
/// Notified once per record compaction decided the fate of, to let the
/// caller rebuild a key-presence filter.
pub type BloomFilterCallback<'a> = dyn FnMut(PartitionId, &[u8], bool) + 'a;

/// Parameters governing one compaction pass over a partition.
pub struct CompactionContext<'a> {
    /// The partition being compacted.
    pub partition: PartitionId,
    /// Tombstones at or below this by-seqno are eligible for the
    /// expiry-based drop rule below. `0` disables the seqno bound (only
    /// the timestamp bound applies).
    pub purge_before_seq: SeqNo,
    /// Tombstones whose expiry precedes this timestamp (seconds since
    /// epoch) are eligible for drop.
    pub purge_before_ts: u32,
    /// When true, every tombstone not at the file's last record is
    /// dropped outright, ignoring the timestamp/seqno bounds.
    pub drop_deletes: bool,
    /// `now`, seconds since epoch, used to decide whether a live
    /// document's expiry has passed.
    pub now: u32,
    /// Optional collection-erasure predicate; returning `true` drops the
    /// record regardless of the tombstone/expiry rules.
    pub collections_eraser: Option<Box<CollectionsEraser<'a>>>,
    /// Optional notification for every live document dropped due to
    /// expiry.
    pub expiry_callback: Option<Box<ExpiryCallback<'a>>>,
    /// Optional notification for every record compaction keeps or drops.
    pub bloom_filter_callback: Option<Box<BloomFilterCallback<'a>>>,
}

/// Run one compaction pass for `partition`: open the current revision,
/// stream it through `time_purge` into a shadow file, then install the
/// shadow as the next revision and queue the old one for deletion.
///
/// Returns the post-compaction [`FileInfo`] of the newly installed file.
pub fn compact(
    adapter: &FileAdapter,
    dir: &Path,
    revisions: &RevisionMap,
    pending: &PendingDeletionQueue,
    database_uuid: [u8; 16],
    read_flags: OpenFlags,
    mut ctx: CompactionContext<'_>,
    stats: &Stats,
) -> Result<FileInfo> {
    let current_rev = revisions.current_revision(ctx.partition).ok_or(Error::NotFound)?;
    let src_path = naming::file_name(dir, ctx.partition, current_rev);
    let mut src = adapter.open(&src_path, ctx.partition, current_rev.0, database_uuid, OpenFlags { read_only: true, ..read_flags })?;

    let pre_info = adapter.info(&src);
    stats.add_compaction_read_bytes(pre_info.file_size);
    let last_seq = pre_info.last_seq;

    let dst_path = naming::compact_file_name(dir, ctx.partition, current_rev.next());

    let max_purged = Cell::new(SeqNo(0));
    let partition = ctx.partition;
    let purge_before_seq = ctx.purge_before_seq;
    let purge_before_ts = ctx.purge_before_ts;
    let drop_deletes = ctx.drop_deletes;
    let now = ctx.now;
    let mut collections_eraser = ctx.collections_eraser.take();
    let mut expiry_callback = ctx.expiry_callback.take();
    let mut bloom_filter_callback = ctx.bloom_filter_callback.take();

    let doc_hook = |info: &DocInfo, body: Option<&[u8]>| -> Result<HookDecision> {
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            time_purge(
                info,
                body,
                last_seq,
                purge_before_seq,
                purge_before_ts,
                drop_deletes,
                now,
                collections_eraser.as_deref_mut(),
                expiry_callback.as_deref_mut(),
            )
        }));
        let decision = match outcome {
            Ok(Ok(decision)) => decision,
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                error!(key = ?info.key, "compaction hook panicked; retaining record");
                HookDecision::Keep
            }
        };
        if decision != HookDecision::NeedBody {
            if decision == HookDecision::Drop && info.deleted {
                max_purged.set(std::cmp::max(max_purged.get(), info.by_seqno));
            }
            if let Some(cb) = bloom_filter_callback.as_deref_mut() {
                cb(partition, &info.key, decision == HookDecision::Drop);
            }
        }
        Ok(decision)
    };

    let finish_hook = || -> Result<Option<SeqNo>> { Ok(Some(max_purged.get())) };

    let compacted = adapter.compact(&mut src, &dst_path, database_uuid, CompactFlags { upgrade_db: true }, doc_hook, finish_hook);
    let mut compacted = match compacted {
        Ok(handle) => handle,
        Err(e) => {
            stats.record_failure_compaction();
            return Err(e);
        }
    };

    let final_path = naming::file_name(dir, ctx.partition, current_rev.next());
    drop(compacted);
    if let Err(e) = std::fs::rename(&dst_path, &final_path) {
        stats.record_failure_compaction();
        return Err(Error::from(e));
    }

    compacted = match adapter.open(&final_path, ctx.partition, current_rev.next().0, database_uuid, read_flags) {
        Ok(handle) => handle,
        Err(e) => {
            let _ = std::fs::remove_file(&final_path);
            stats.record_failure_compaction();
            return Err(e);
        }
    };
    let post_info = adapter.info(&compacted);
    stats.add_compaction_write_bytes(post_info.file_size);

    revisions.install_revision(ctx.partition, current_rev.next())?;

    unlink_with_retry(&src_path, pending);

    info!(
        partition = partition.0,
        revision = current_rev.next().0,
        docs_kept = post_info.doc_count,
        tombstones_kept = post_info.deleted_count,
        purged_up_to = post_info.purge_seq.0,
        "compaction pass complete",
    );

    Ok(post_info)
}

#[allow(clippy::too_many_arguments)]
fn time_purge(
    info: &DocInfo,
    body: Option<&[u8]>,
    last_seq: SeqNo,
    purge_before_seq: SeqNo,
    purge_before_ts: u32,
    drop_deletes: bool,
    now: u32,
    collections_eraser: Option<&mut CollectionsEraser<'_>>,
    expiry_callback: Option<&mut ExpiryCallback<'_>>,
) -> Result<HookDecision> {
    if let Some(eraser) = collections_eraser {
        if eraser(&info.key) {
            return Ok(HookDecision::Drop);
        }
    }

    if info.deleted {
        if info.by_seqno == last_seq {
            return Ok(HookDecision::Keep);
        }
        if drop_deletes {
            return Ok(HookDecision::Drop);
        }
        let seq_eligible = purge_before_seq == SeqNo(0) || info.by_seqno <= purge_before_seq;
        if info.expiry < purge_before_ts && seq_eligible {
            return Ok(HookDecision::Drop);
        }
        return Ok(HookDecision::Keep);
    }

    if info.expiry != 0 && info.expiry < now {
        match body {
            None => {
                if info.might_contain_xattrs {
                    return Ok(HookDecision::NeedBody);
                }
                if let Some(cb) = expiry_callback {
                    cb(info, &[]);
                }
                return Ok(HookDecision::Drop);
            }
            Some(body) => {
                if let Some(cb) = expiry_callback {
                    if info.datatype.is_compressed() {
                        let inflated = vbstore_file::compression::inflate(body)?;
                        let mut notified_info = info.clone();
                        notified_info.datatype = notified_info.datatype.without_compression();
                        cb(&notified_info, &inflated);
                    } else {
                        cb(info, body);
                    }
                }
                return Ok(HookDecision::Drop);
            }
        }
    }

    Ok(HookDecision::Keep)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::tempdir;
    use vbstore_core::{Cas, Datatype, HlcEpochSeqno, Revision};

    fn doc(key: &[u8], seq: u64, deleted: bool, expiry: u32) -> DocInfo {
        DocInfo {
            key: key.to_vec(),
            cas: Cas(1),
            rev_seqno: 1,
            by_seqno: SeqNo(seq),
            expiry,
            flags: 0,
            datatype: Datatype::default(),
            hlc_cas_epoch_seqno: HlcEpochSeqno::UNSET,
            might_contain_xattrs: false,
            deleted,
        }
    }

    #[test]
    fn drop_deletes_removes_tombstone_not_at_last_record() {
        let dir = tempdir().unwrap();
        let adapter = FileAdapter;
        let revisions = RevisionMap::new();
        let pending = PendingDeletionQueue::new();
        revisions.install_revision(PartitionId(0), Revision::INITIAL).unwrap();

        let path = naming::file_name(dir.path(), PartitionId(0), Revision::INITIAL);
        let mut handle = adapter.open(&path, PartitionId(0), 1, [0u8; 16], OpenFlags { create: true, ..Default::default() }).unwrap();
        adapter.save_documents(&mut handle, &[(doc(b"x", 1, false, 0), b"v".to_vec())], false).unwrap();
        adapter.commit(&mut handle).unwrap();
        adapter.save_documents(&mut handle, &[(doc(b"x", 2, true, 0), Vec::new())], false).unwrap();
        adapter.commit(&mut handle).unwrap();
        drop(handle);

        let stats = Stats::new();
        let ctx = CompactionContext {
            partition: PartitionId(0),
            purge_before_seq: SeqNo(0),
            purge_before_ts: 0,
            drop_deletes: true,
            now: 0,
            collections_eraser: None,
            expiry_callback: None,
            bloom_filter_callback: None,
        };
        let info = compact(&adapter, dir.path(), &revisions, &pending, [0u8; 16], OpenFlags::default(), ctx, &stats).unwrap();
        assert_eq!(info.deleted_count, 0);
        assert!(info.purge_seq >= SeqNo(2));
    }

    #[test]
    fn expired_live_document_is_dropped_and_notified() {
        let dir = tempdir().unwrap();
        let adapter = FileAdapter;
        let revisions = RevisionMap::new();
        let pending = PendingDeletionQueue::new();
        revisions.install_revision(PartitionId(0), Revision::INITIAL).unwrap();

        let path = naming::file_name(dir.path(), PartitionId(0), Revision::INITIAL);
        let mut handle = adapter.open(&path, PartitionId(0), 1, [0u8; 16], OpenFlags { create: true, ..Default::default() }).unwrap();
        adapter.save_documents(&mut handle, &[(doc(b"y", 1, false, 100), b"v".to_vec())], false).unwrap();
        adapter.commit(&mut handle).unwrap();
        drop(handle);

        let notified = Arc::new(AtomicUsize::new(0));
        let notified_clone = Arc::clone(&notified);
        let stats = Stats::new();
        let ctx = CompactionContext {
            partition: PartitionId(0),
            purge_before_seq: SeqNo(0),
            purge_before_ts: 0,
            drop_deletes: false,
            now: 101,
            collections_eraser: None,
            expiry_callback: Some(Box::new(move |_info, _body| {
                notified_clone.fetch_add(1, Ordering::Relaxed);
            })),
            bloom_filter_callback: None,
        };
        let info = compact(&adapter, dir.path(), &revisions, &pending, [0u8; 16], OpenFlags::default(), ctx, &stats).unwrap();
        assert_eq!(info.doc_count, 0);
        assert_eq!(notified.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn no_op_compaction_preserves_counts() {
        let dir = tempdir().unwrap();
        let adapter = FileAdapter;
        let revisions = RevisionMap::new();
        let pending = PendingDeletionQueue::new();
        revisions.install_revision(PartitionId(0), Revision::INITIAL).unwrap();

        let path = naming::file_name(dir.path(), PartitionId(0), Revision::INITIAL);
        let mut handle = adapter.open(&path, PartitionId(0), 1, [0u8; 16], OpenFlags { create: true, ..Default::default() }).unwrap();
        adapter.save_documents(&mut handle, &[(doc(b"a", 1, false, 0), b"v".to_vec())], false).unwrap();
        adapter.commit(&mut handle).unwrap();
        let pre = adapter.info(&handle);
        drop(handle);

        let stats = Stats::new();
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
        let post = compact(&adapter, dir.path(), &revisions, &pending, [0u8; 16], OpenFlags::default(), ctx, &stats).unwrap();
        assert_eq!(post.doc_count, pre.doc_count);
        assert_eq!(post.deleted_count, pre.deleted_count);
    }
}
