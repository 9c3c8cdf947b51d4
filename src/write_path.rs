//! Single-writer transaction: buffer mutations, emit one durable commit
//! containing the document batch, the per-partition state doc, and an
//! optional collections manifest.

use vbstore_core::{PartitionId, Result, SeqNo};
use vbstore_file::{FileAdapter, Handle};
use vbstore_format::{DocInfo, VBucketStateDoc, COLLECTIONS_MANIFEST_KEY, VBSTATE_KEY};

use crate::stats::Stats;

/// Final disposition of one buffered mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationStatus {
    /// The record was written and is now durable.
    Success,
    /// A delete was requested for a key the file had no record of.
    DocNotFound,
    /// The commit aborted; nothing in this batch became durable.
    Failed,
}

/// What a mutation's callback receives once the enclosing commit resolves.
#[derive(Debug, Clone, Copy)]
pub struct MutationOutcome {
    /// What happened to this specific record.
    pub status: MutationStatus,
    /// Whether this mutation created a key the file had no prior record
    /// of (as opposed to overwriting or tombstoning an existing one).
    pub was_insert: bool,
    /// For deletes, whether the key existed (live or already a tombstone)
    /// before this commit. Meaningless for non-delete mutations.
    pub existed_before: bool,
}

/// One buffered `set` or `delete`, carrying the metadata/body to write and
/// the callback to run once the enclosing commit resolves.
pub struct Mutation {
    info: DocInfo,
    body: Vec<u8>,
    callback: Box<dyn FnOnce(MutationOutcome) + Send>,
}

/// A single-writer transaction: every mutation in a batch is committed
/// against one partition's handle, supplied by the caller at commit time
/// ([`crate::store::Store::commit`] opens exactly one handle per call).
pub struct Transaction {
    mutations: Vec<Mutation>,
}

impl Transaction {
    /// Begin an empty transaction.
    pub fn begin() -> Self {
        Transaction { mutations: Vec::new() }
    }

    /// Number of mutations buffered so far.
    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    /// Whether no mutations have been buffered yet.
    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    /// Buffer a set (insert or overwrite) of `info`/`body`. `info.deleted`
    /// must be `false`.
    pub fn set(&mut self, info: DocInfo, body: Vec<u8>, callback: impl FnOnce(MutationOutcome) + Send + 'static) {
        self.mutations.push(Mutation { info, body, callback: Box::new(callback) });
    }

    /// Buffer a delete (tombstone). `info.deleted` must be `true`.
    pub fn delete(&mut self, info: DocInfo, body: Vec<u8>, callback: impl FnOnce(MutationOutcome) + Send + 'static) {
        self.mutations.push(Mutation { info, body, callback: Box::new(callback) });
    }
}

/// Run the full §4.D commit protocol against an already-open, writable
/// handle: look up prior existence for every batched key, write the
/// batch, rewrite `_local/vbstate` (and the collections manifest, if
/// supplied), commit, and deliver one callback per mutation.
///
/// On any storage error after the document batch has started writing,
/// every buffered callback receives `MutationStatus::Failed` and the
/// error is returned; no partial result is ever reported as success.
pub fn commit_batch(
    adapter: &FileAdapter,
    handle: &mut Handle,
    txn: Transaction,
    vbstate: &VBucketStateDoc,
    collections_manifest: Option<&[u8]>,
    compress: bool,
    stats: &Stats,
) -> Result<vbstore_file::FileInfo> {
    let Transaction { mutations, .. } = txn;
    if mutations.is_empty() && collections_manifest.is_none() {
        // A commit of zero documents and no manifest is still legal: it
        // just installs a header with no new content, via `commit_nosync`.
        adapter.commit_nosync(handle)?;
        return Ok(adapter.info(handle));
    }

    let keys: Vec<Vec<u8>> = mutations.iter().map(|m| m.info.key.clone()).collect();
    let mut existed_before = std::collections::HashMap::new();
    adapter.docinfos_by_ids(handle, &keys, |key, info| {
        existed_before.insert(key.to_vec(), info.is_some());
        Ok(vbstore_core::ScanControl::Continue)
    })?;

    let docs: Vec<(DocInfo, Vec<u8>)> = mutations.iter().map(|m| (m.info.clone(), m.body.clone())).collect();
    let write_result = adapter.save_documents(handle, &docs, compress);
    if let Err(e) = write_result {
        for mutation in mutations {
            (mutation.callback)(MutationOutcome { status: MutationStatus::Failed, was_insert: false, existed_before: false });
        }
        return Err(e);
    }
    let written_bytes: u64 = docs.iter().map(|(_, body)| body.len() as u64).sum();
    stats.add_write_bytes(written_bytes);

    let vbstate_bytes = vbstate.to_json_bytes();
    if let Err(e) = adapter.local_doc_save(handle, VBSTATE_KEY, &vbstate_bytes) {
        for mutation in mutations {
            (mutation.callback)(MutationOutcome { status: MutationStatus::Failed, was_insert: false, existed_before: false });
        }
        return Err(e);
    }

    if let Some(manifest) = collections_manifest {
        if let Err(e) = adapter.local_doc_save(handle, COLLECTIONS_MANIFEST_KEY, manifest) {
            for mutation in mutations {
                (mutation.callback)(MutationOutcome { status: MutationStatus::Failed, was_insert: false, existed_before: false });
            }
            return Err(e);
        }
    }

    if let Err(e) = adapter.commit_nosync(handle) {
        for mutation in mutations {
            (mutation.callback)(MutationOutcome { status: MutationStatus::Failed, was_insert: false, existed_before: false });
        }
        return Err(e);
    }

    let info = adapter.info(handle);

    for mutation in mutations {
        let existed = existed_before.get(&mutation.info.key).copied().unwrap_or(false);
        let status = if mutation.info.deleted && !existed {
            MutationStatus::DocNotFound
        } else {
            MutationStatus::Success
        };
        let outcome = MutationOutcome { status, was_insert: !existed, existed_before: existed };
        (mutation.callback)(outcome);
    }

    Ok(info)
}

/// Re-exported so callers can reference a fully-resolved by-seqno without
/// importing `vbstore_core` themselves.
pub type CommittedSeq = SeqNo;
