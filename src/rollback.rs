//! Rewind a partition file to an earlier durable header and replay the
//! discarded key range to the caller so it can reconcile its in-memory
//! view.

use tracing::info;
use vbstore_core::{PartitionId, Result, SeqNo};
use vbstore_file::{FileAdapter, Handle, OpenFlags};
use vbstore_format::VBucketStateDoc;

use crate::scan::{self, CacheLookup, ItemResult, ValueFilter};
use crate::scan_registry::ScanRegistry;

/// Outcome of a rollback attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackOutcome {
    /// The file was rewound; `high_seqno`/`snap_start`/`snap_end` describe
    /// the header now current.
    Success { high_seqno: SeqNo, snap_start: u64, snap_end: u64 },
    /// Rewinding would discard at least half the file's history, or a
    /// rewind step failed; the caller should discard the partition and
    /// rebuild it from scratch instead.
    Reset,
}

/// Rewind `path` to the latest header with `last_sequence <= target_seq`,
/// delivering every key discarded in the process to `on_discarded_key`.
///
/// Opens a fresh read-write handle (the single-writer invariant is the
/// caller's responsibility, same as every other mutating operation here).
pub fn rollback<F>(
    adapter: &FileAdapter,
    registry: &ScanRegistry,
    path: &std::path::Path,
    partition: PartitionId,
    target_seq: SeqNo,
    mut on_discarded_key: F,
) -> Result<RollbackOutcome>
where
    F: FnMut(&[u8]),
{
    let probe = adapter.open(path, partition, 0, [0u8; 16], OpenFlags { read_only: true, ..Default::default() })?;
    let latest = adapter.info(&probe).last_seq;
    let total = adapter.changes_count(&probe, SeqNo(0), latest);
    drop(probe);

    let mut handle = adapter.open(path, partition, 0, [0u8; 16], OpenFlags { read_only: false, ..Default::default() })?;
    let mut info = adapter.info(&handle);

    while info.last_seq > target_seq {
        if adapter.rewind_header(&mut handle).is_err() {
            return Ok(RollbackOutcome::Reset);
        }
        info = adapter.info(&handle);
    }

    let rolled_back_count = adapter.changes_count(&handle, info.last_seq, latest);
    if total > 0 && rolled_back_count * 2 >= total {
        info!(partition = partition.0, rolled_back_count, total, "rollback would discard too much history, resetting partition instead");
        return Ok(RollbackOutcome::Reset);
    }

    // Scan the same in-memory handle we just rewound, not a fresh open —
    // the rewind hasn't been committed to disk yet, so a fresh open would
    // still see the discarded records.
    let rewound_last_seq = info.last_seq;
    let mut ctx = scan::init_scan_context(registry, adapter, handle, rewound_last_seq, ValueFilter::KeysOnly);
    loop {
        let outcome = scan::scan(
            &mut ctx,
            adapter,
            |_| true,
            |_| CacheLookup::NotPresent,
            |item| {
                on_discarded_key(&item.info.key);
                ItemResult::Ok
            },
        )?;
        if outcome == vbstore_core::ScanOutcome::Success {
            break;
        }
    }
    let handle_arc = std::sync::Arc::clone(ctx.handle());
    scan::destroy_scan_context(registry, ctx);

    let mut handle = handle_arc.lock();
    let vbstate_bytes = adapter.local_doc_read(&mut handle, vbstore_format::VBSTATE_KEY)?;
    let vbstate = VBucketStateDoc::from_json_bytes(&vbstate_bytes).map_err(|e| vbstore_core::Error::FileCorrupt(e.to_string()))?;

    adapter.commit(&mut handle)?;

    info!(
        partition = partition.0,
        high_seqno = rewound_last_seq.0,
        discarded_records = rolled_back_count,
        "rollback complete, headers rewound",
    );

    Ok(RollbackOutcome::Success { high_seqno: rewound_last_seq, snap_start: vbstate.snap_start, snap_end: vbstate.snap_end })
}
