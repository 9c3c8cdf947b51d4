//! Ordered scan: a resumable cursor over a partition's by-seqno index,
//! driven by `changes_since` and a cache-lookup/value-callback pair the
//! caller supplies.

use vbstore_core::{Result, ScanControl, ScanOutcome, SeqNo};
use vbstore_file::FileAdapter;
use vbstore_format::DocInfo;

use crate::scan_registry::{ScanHandle, ScanRegistry};

/// Whether a scan should inflate bodies, and if so, how.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueFilter {
    /// Only deliver keys and metadata; never touch the body.
    KeysOnly,
    /// Deliver bodies, always decompressed.
    Values,
    /// Deliver bodies as stored; a compressed body stays compressed and
    /// its datatype keeps the compressed bit set so the consumer knows.
    ValuesNoDecompress,
}

/// What the caller's presence check found for one key, before the scan
/// does any I/O for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheLookup {
    /// The caller has no record of this key; fetch and deliver it.
    NotPresent,
    /// The caller already has this key cached; skip it, but still
    /// advance the cursor past it.
    AlreadyPresent,
    /// The caller is out of memory; cancel the scan.
    OutOfMemory,
}

/// What the caller's per-item callback decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemResult {
    /// Keep scanning.
    Ok,
    /// The caller is out of memory; cancel the scan.
    OutOfMemory,
}

/// One record delivered by a scan.
#[derive(Debug, Clone)]
pub struct ScanItem {
    /// Full per-document metadata (datatype reflects whether the body
    /// handed back is still compressed).
    pub info: DocInfo,
    /// `None` for a `KeysOnly` scan; otherwise the body per `ValueFilter`.
    pub body: Option<Vec<u8>>,
}

/// A resumable cursor over one partition file's by-seqno index.
pub struct ScanContext {
    scan_id: u64,
    handle: ScanHandle,
    start: SeqNo,
    last_read: Option<SeqNo>,
    last_seq: SeqNo,
    purge_seq: SeqNo,
    /// Total live records in `(start, last_seq]`, computed once at
    /// creation time, used by callers to report scan progress.
    pub changes_count: u64,
    value_filter: ValueFilter,
}

impl ScanContext {
    /// The id this context was registered under.
    pub fn scan_id(&self) -> u64 {
        self.scan_id
    }

    /// Highest by-seqno durably present in the file when this scan began.
    pub fn last_seq(&self) -> SeqNo {
        self.last_seq
    }

    /// Highest by-seqno purged by compaction when this scan began.
    pub fn purge_seq(&self) -> SeqNo {
        self.purge_seq
    }

    /// The by-seqno up through which this context has delivered records,
    /// `None` if nothing has been delivered yet.
    pub fn last_read_seq(&self) -> Option<SeqNo> {
        self.last_read
    }

    /// The underlying handle this scan reads through, for callers (like
    /// rollback) that need to keep driving the same in-memory handle
    /// after the scan finishes.
    pub fn handle(&self) -> &ScanHandle {
        &self.handle
    }
}

/// Open a read-only handle on `path`, record its file info, register it
/// in `registry`, and return a fresh scan context starting after `start`.
pub fn init_scan_context(
    registry: &ScanRegistry,
    adapter: &FileAdapter,
    handle: vbstore_file::Handle,
    start: SeqNo,
    value_filter: ValueFilter,
) -> ScanContext {
    let info = adapter.info(&handle);
    let changes_count = adapter.changes_count(&handle, start, info.last_seq);
    let (scan_id, wrapped) = registry.insert(handle);
    ScanContext {
        scan_id,
        handle: wrapped,
        start,
        last_read: None,
        last_seq: info.last_seq,
        purge_seq: info.purge_seq,
        changes_count,
        value_filter,
    }
}

/// Drive one scan pass: deliver every record with `by_seqno` in
/// `(max(ctx.start, ctx.last_read+1), ctx.last_seq]` that survives
/// `doc_filter` and the cache lookup, in increasing `by_seqno` order.
///
/// Returns `ScanOutcome::Success` once every record in range has been
/// delivered, or `ScanOutcome::Again` if the cache lookup or item
/// callback cancelled — in which case `ctx.last_read_seq()` marks where
/// a subsequent call resumes from.
pub fn scan<D, L, V>(ctx: &mut ScanContext, adapter: &FileAdapter, mut doc_filter: D, mut cache_lookup: L, mut item_callback: V) -> Result<ScanOutcome>
where
    D: FnMut(&DocInfo) -> bool,
    L: FnMut(&[u8]) -> CacheLookup,
    V: FnMut(ScanItem) -> ItemResult,
{
    let effective_start = match ctx.last_read {
        None => ctx.start,
        Some(last) => std::cmp::max(ctx.start, SeqNo(last.0 + 1)),
    };

    let mut handle = ctx.handle.lock();
    let mut advanced_to = ctx.last_read;
    let mut cancelled_on_lookup = false;

    // First pass: decide, for every record in range, whether it is
    // filtered, already cached, or a candidate for delivery. This pass
    // never needs the body, so it never needs `handle` borrowed a second
    // time — `changes_since` already holds the only mutable borrow.
    let mut candidates: Vec<DocInfo> = Vec::new();
    let lookup_outcome = adapter.changes_since(&mut handle, effective_start, |info| {
        if !doc_filter(info) {
            advanced_to = Some(info.by_seqno);
            return Ok(ScanControl::Continue);
        }
        match cache_lookup(&info.key) {
            CacheLookup::AlreadyPresent => {
                advanced_to = Some(info.by_seqno);
                Ok(ScanControl::Continue)
            }
            CacheLookup::OutOfMemory => {
                cancelled_on_lookup = true;
                Ok(ScanControl::Cancel)
            }
            CacheLookup::NotPresent => {
                candidates.push(info.clone());
                Ok(ScanControl::Continue)
            }
        }
    })?;

    if cancelled_on_lookup {
        if let Some(seq) = advanced_to {
            ctx.last_read = Some(seq);
        }
        return Ok(ScanOutcome::Again);
    }
    debug_assert_eq!(lookup_outcome, ScanOutcome::Success);

    // Second pass: fetch bodies and deliver candidates in order, now that
    // the first pass's borrow of `handle` has ended.
    let mut outcome = ScanOutcome::Success;
    for info in &candidates {
        let body = match ctx.value_filter {
            ValueFilter::KeysOnly => None,
            ValueFilter::Values => Some(adapter.read_doc(&mut handle, info, true)?),
            ValueFilter::ValuesNoDecompress => Some(adapter.read_doc(&mut handle, info, false)?),
        };

        let mut delivered_info = info.clone();
        if matches!(ctx.value_filter, ValueFilter::ValuesNoDecompress) && info.datatype.is_compressed() {
            delivered_info.datatype = delivered_info.datatype.with_compression();
        } else if matches!(ctx.value_filter, ValueFilter::Values) {
            delivered_info.datatype = delivered_info.datatype.without_compression();
        }

        match item_callback(ScanItem { info: delivered_info, body }) {
            ItemResult::Ok => {
                advanced_to = Some(info.by_seqno);
            }
            ItemResult::OutOfMemory => {
                outcome = ScanOutcome::Again;
                break;
            }
        }
    }

    if let Some(seq) = advanced_to {
        ctx.last_read = Some(seq);
    }

    Ok(outcome)
}

/// Remove `ctx` from the registry. The handle is dropped (and closed)
/// once every `Arc` referencing it is gone.
pub fn destroy_scan_context(registry: &ScanRegistry, ctx: ScanContext) {
    registry.remove(ctx.scan_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use vbstore_core::{Cas, Datatype, HlcEpochSeqno, PartitionId};
    use vbstore_file::OpenFlags;

    fn doc(key: &[u8], seq: u64) -> DocInfo {
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
            deleted: false,
        }
    }

    fn seeded(dir: &std::path::Path, n: u64) -> vbstore_file::Handle {
        let adapter = FileAdapter;
        let mut handle = adapter.open(&dir.join("0.couch.1"), PartitionId(0), 1, [0u8; 16], OpenFlags { create: true, ..Default::default() }).unwrap();
        for i in 1..=n {
            adapter.save_documents(&mut handle, &[(doc(format!("k{i}").as_bytes(), i), b"v".to_vec())], false).unwrap();
        }
        adapter.commit(&mut handle).unwrap();
        handle
    }

    #[test]
    fn scan_delivers_records_in_increasing_order_and_resumes() {
        let dir = tempdir().unwrap();
        let handle = seeded(dir.path(), 20);
        let adapter = FileAdapter;
        let registry = ScanRegistry::new();
        let mut ctx = init_scan_context(&registry, &adapter, handle, SeqNo(0), ValueFilter::KeysOnly);
        assert_eq!(ctx.changes_count, 20);

        let mut seen = Vec::new();
        let mut count = 0usize;
        let outcome = scan(
            &mut ctx,
            &adapter,
            |_| true,
            |_| CacheLookup::NotPresent,
            |item| {
                seen.push(item.info.by_seqno.0);
                count += 1;
                if count == 10 {
                    ItemResult::OutOfMemory
                } else {
                    ItemResult::Ok
                }
            },
        )
        .unwrap();

        assert_eq!(outcome, ScanOutcome::Again);
        assert_eq!(seen, (1..=10).collect::<Vec<_>>());
        assert_eq!(ctx.last_read_seq(), Some(SeqNo(10)));

        let mut resumed = Vec::new();
        let outcome2 = scan(&mut ctx, &adapter, |_| true, |_| CacheLookup::NotPresent, |item| {
            resumed.push(item.info.by_seqno.0);
            ItemResult::Ok
        })
        .unwrap();
        assert_eq!(outcome2, ScanOutcome::Success);
        assert_eq!(resumed, (11..=20).collect::<Vec<_>>());
    }

    #[test]
    fn scan_at_last_sequence_produces_zero_records() {
        let dir = tempdir().unwrap();
        let handle = seeded(dir.path(), 5);
        let adapter = FileAdapter;
        let registry = ScanRegistry::new();
        let mut ctx = init_scan_context(&registry, &adapter, handle, SeqNo(5), ValueFilter::KeysOnly);

        let mut count = 0;
        let outcome = scan(&mut ctx, &adapter, |_| true, |_| CacheLookup::NotPresent, |_| {
            count += 1;
            ItemResult::Ok
        })
        .unwrap();
        assert_eq!(outcome, ScanOutcome::Success);
        assert_eq!(count, 0);
    }

    #[test]
    fn already_present_keys_are_skipped_but_still_advance() {
        let dir = tempdir().unwrap();
        let handle = seeded(dir.path(), 5);
        let adapter = FileAdapter;
        let registry = ScanRegistry::new();
        let mut ctx = init_scan_context(&registry, &adapter, handle, SeqNo(0), ValueFilter::KeysOnly);

        let mut delivered = 0;
        let outcome = scan(
            &mut ctx,
            &adapter,
            |_| true,
            |_| CacheLookup::AlreadyPresent,
            |_| {
                delivered += 1;
                ItemResult::Ok
            },
        )
        .unwrap();
        assert_eq!(outcome, ScanOutcome::Success);
        assert_eq!(delivered, 0);
        assert_eq!(ctx.last_read_seq(), Some(SeqNo(5)));
    }
}
