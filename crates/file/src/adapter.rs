//! The typed file-format adapter surface: the only boundary between the
//! rest of the engine and concrete on-disk bytes.
//!
//! Everything here maps 1:1 to a named operation: `open`, `close` (simply
//! dropping a [`Handle`]), `read_doc`, `docinfo_by_id`, `docinfos_by_ids`,
//! `changes_since`, `changes_count`, `all_docs`, `save_documents`,
//! `commit`/`commit_nosync`, `rewind_header`, `local_doc_read`/`save`,
//! `compact`, and `info`. Every error returned by any of these already
//! belongs to [`vbstore_core::Error`] — there is no second, format-specific
//! error type for higher layers to translate.

use std::path::Path;

use tracing::warn;
use vbstore_core::{Error, ErrorKind, PartitionId, Result, ScanControl, ScanOutcome, SeqNo};
use vbstore_format::DocInfo;

use crate::handle::{FileInfo, Handle, OpenFlags};

/// Log an io-transient/io-fatal error once, at the point it was first
/// observed, so callers up the stack (write path, compaction, rollback)
/// don't each re-log the same failure.
fn warn_on_io_error(op: &str, partition: PartitionId, revision: u64, err: &Error) {
    match err.kind() {
        ErrorKind::IoTransient | ErrorKind::IoFatal => {
            warn!(op, partition = partition.0, revision, reason = err.os_reason().unwrap_or(""), "{err}");
        }
        _ => {}
    }
}

/// What a compaction document hook wants done with the record it was
/// shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookDecision {
    /// Carry the record forward into the compacted file.
    Keep,
    /// Drop the record; it will not appear in the compacted file.
    Drop,
    /// The hook needs the document body to decide; the adapter will fetch
    /// it and call the hook again with `Some(body)`.
    NeedBody,
}

/// Flags recognised by [`FileAdapter::compact`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CompactFlags {
    /// Rewrite any V0 metadata blob encountered as V1 during the copy.
    pub upgrade_db: bool,
}

/// The document hook invoked once (twice if it asks for the body) per live
/// record streamed during compaction.
pub trait DocHook: FnMut(&DocInfo, Option<&[u8]>) -> Result<HookDecision> {}
impl<F: FnMut(&DocInfo, Option<&[u8]>) -> Result<HookDecision>> DocHook for F {}

/// The stateless façade over [`Handle`] exposing the operations named in
/// the file-format adapter surface. Most operations simply forward to the
/// corresponding `Handle` method; `compact` is the one non-trivial
/// orchestration this type owns.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileAdapter;

impl FileAdapter {
    /// Open an existing partition file, or create one if `flags.create` is
    /// set and it does not exist.
    pub fn open(&self, path: &Path, partition: PartitionId, revision: u64, database_uuid: [u8; 16], flags: OpenFlags) -> Result<Handle> {
        let result = if flags.create && !path.exists() {
            Handle::create(path, partition, revision, database_uuid, flags)
        } else {
            Handle::open(path, partition, flags)
        };
        if let Err(e) = &result {
            warn_on_io_error("open", partition, revision, e);
        }
        result
    }

    /// Close a handle. Dropping it is sufficient; this exists so callers
    /// have an explicit operation to call, matching the named surface.
    pub fn close(&self, _handle: Handle) {}

    /// Fetch a document's metadata by key.
    pub fn docinfo_by_id(&self, handle: &mut Handle, key: &[u8]) -> Result<DocInfo> {
        match handle.docinfo_by_id(key) {
            Ok(info) => info.ok_or(Error::NotFound),
            Err(e) => {
                warn_on_io_error("docinfo_by_id", handle.partition(), handle.revision(), &e);
                Err(e)
            }
        }
    }

    /// Fetch several documents' metadata by key, invoking `visit` for each
    /// found one (keys not found are simply skipped; it is the caller's
    /// responsibility to notice which requested keys never arrived).
    pub fn docinfos_by_ids<F>(&self, handle: &mut Handle, keys: &[Vec<u8>], mut visit: F) -> Result<ScanOutcome>
    where
        F: FnMut(&[u8], Option<&DocInfo>) -> Result<ScanControl>,
    {
        for key in keys {
            let info = handle.docinfo_by_id(key)?;
            if visit(key, info.as_ref())?.is_cancel() {
                return Ok(ScanOutcome::Again);
            }
        }
        Ok(ScanOutcome::Success)
    }

    /// Fetch a document's body, given its metadata, inflating it if
    /// `inflate` is set and it was stored compressed.
    pub fn read_doc(&self, handle: &mut Handle, info: &DocInfo, inflate: bool) -> Result<Vec<u8>> {
        match handle.read_doc(info, inflate) {
            Ok(body) => Ok(body),
            Err(e) => {
                warn_on_io_error("read_doc", handle.partition(), handle.revision(), &e);
                Err(e)
            }
        }
    }

    /// Stream every live record with `by_seqno > start`, in increasing
    /// order.
    pub fn changes_since<F>(&self, handle: &mut Handle, start: SeqNo, visit: F) -> Result<ScanOutcome>
    where
        F: FnMut(&DocInfo) -> Result<ScanControl>,
    {
        handle.changes_since(start, visit)
    }

    /// Count live records in `(lo, hi]`.
    pub fn changes_count(&self, handle: &Handle, lo: SeqNo, hi: SeqNo) -> u64 {
        handle.changes_count(lo, hi)
    }

    /// Stream every live key at or after `start_key`, in key order.
    pub fn all_docs<F>(&self, handle: &mut Handle, start_key: &[u8], visit: F) -> Result<ScanOutcome>
    where
        F: FnMut(&DocInfo) -> Result<ScanControl>,
    {
        handle.all_docs(start_key, visit)
    }

    /// Buffer a batch of documents for the next `commit`. When `compress`
    /// is set, non-empty bodies are compressed and the datatype's
    /// compressed bit is set to match.
    pub fn save_documents(&self, handle: &mut Handle, docs: &[(DocInfo, Vec<u8>)], compress: bool) -> Result<()> {
        for (info, body) in docs {
            let result = if compress && !body.is_empty() {
                let mut info = info.clone();
                crate::compression::deflate(body).and_then(|compressed| {
                    info.datatype = info.datatype.with_compression();
                    handle.save_document(&info, &compressed)
                })
            } else {
                handle.save_document(info, body)
            };
            if let Err(e) = &result {
                warn_on_io_error("save_documents", handle.partition(), handle.revision(), e);
            }
            result?;
        }
        Ok(())
    }

    /// Commit buffered writes durably (fsync).
    pub fn commit(&self, handle: &mut Handle) -> Result<()> {
        let result = handle.commit(true);
        if let Err(e) = &result {
            warn_on_io_error("commit", handle.partition(), handle.revision(), e);
        }
        result
    }

    /// Commit buffered writes without forcing an fsync; periodic sync (if
    /// configured) may still have flushed some of it already.
    pub fn commit_nosync(&self, handle: &mut Handle) -> Result<()> {
        let result = handle.commit(false);
        if let Err(e) = &result {
            warn_on_io_error("commit_nosync", handle.partition(), handle.revision(), e);
        }
        result
    }

    /// Move the handle's notion of "current header" back by one.
    pub fn rewind_header(&self, handle: &mut Handle) -> Result<()> {
        let result = handle.rewind_header();
        if let Err(e) = &result {
            warn_on_io_error("rewind_header", handle.partition(), handle.revision(), e);
        }
        result
    }

    /// Read a local doc by key.
    pub fn local_doc_read(&self, handle: &mut Handle, key: &str) -> Result<Vec<u8>> {
        match handle.local_doc_read(key) {
            Ok(value) => Ok(value),
            Err(e) => {
                warn_on_io_error("local_doc_read", handle.partition(), handle.revision(), &e);
                Err(e)
            }
        }
    }

    /// Buffer a local-doc write for the next `commit`.
    pub fn local_doc_save(&self, handle: &mut Handle, key: &str, value: &[u8]) -> Result<()> {
        let result = handle.local_doc_save(key, value);
        if let Err(e) = &result {
            warn_on_io_error("local_doc_save", handle.partition(), handle.revision(), e);
        }
        result
    }

    /// Current aggregate statistics.
    pub fn info(&self, handle: &Handle) -> FileInfo {
        handle.info()
    }

    /// Stream every live record from `src` into a brand-new file at
    /// `dst_path`, running `doc_hook` over each one and `finish_hook` once
    /// at the end (mirroring the source's "called with a null doc when
    /// compaction has finished" contract, used to let the caller compute
    /// the new purge sequence).
    pub fn compact<H, G>(
        &self,
        src: &mut Handle,
        dst_path: &Path,
        database_uuid: [u8; 16],
        flags: CompactFlags,
        mut doc_hook: H,
        mut finish_hook: G,
    ) -> Result<Handle>
    where
        H: FnMut(&DocInfo, Option<&[u8]>) -> Result<HookDecision>,
        G: FnMut() -> Result<Option<SeqNo>>,
    {
        let next_revision = src.revision() + 1;
        let mut dst = Handle::create(dst_path, src.partition(), next_revision, database_uuid, OpenFlags::default()).map_err(|e| {
            warn_on_io_error("compact_create", src.partition(), next_revision, &e);
            e
        })?;

        let offsets: Vec<u64> = src.index().by_seqno.values().copied().collect();
        for offset in offsets {
            let record = src.physical_mut().read_at(offset).map_err(|e| {
                warn_on_io_error("compact_read", src.partition(), src.revision(), &e);
                e
            })?;
            let decoded = crate::payload::decode_document(&record.payload)?;
            let mut info = decoded.info;
            let body = decoded.body;

            let mut decision = doc_hook(&info, None)?;
            if decision == HookDecision::NeedBody {
                decision = doc_hook(&info, Some(&body))?;
            }
            if decision == HookDecision::Drop {
                continue;
            }

            if flags.upgrade_db {
                info = vbstore_format::upgrade(info, &body);
            }
            dst.save_document(&info, &body)?;
        }

        for key in src.index().local_docs.keys().cloned().collect::<Vec<_>>() {
            let value = src.local_doc_read(&key)?;
            dst.local_doc_save(&key, &value)?;
        }

        if let Some(purge_seqno) = finish_hook()? {
            dst.set_purge_seqno_override(purge_seqno);
        }

        dst.commit(true)?;
        Ok(dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use vbstore_core::{Cas, Datatype, HlcEpochSeqno};

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
    fn basic_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("0.couch.1");
        let adapter = FileAdapter;
        let mut handle = adapter.open(&path, PartitionId(0), 1, [0u8; 16], OpenFlags { create: true, ..Default::default() }).unwrap();

        adapter.save_documents(&mut handle, &[(doc(b"a", 1, false), b"1".to_vec()), (doc(b"b", 2, false), b"2".to_vec())], false).unwrap();
        adapter.commit(&mut handle).unwrap();

        let info_a = adapter.docinfo_by_id(&mut handle, b"a").unwrap();
        let body_a = adapter.read_doc(&mut handle, &info_a, true).unwrap();
        assert_eq!(body_a, b"1");
        assert_eq!(adapter.info(&handle).doc_count, 2);
    }

    #[test]
    fn compact_drops_tombstones_when_requested() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("0.couch.1");
        let adapter = FileAdapter;
        let mut handle = adapter.open(&path, PartitionId(0), 1, [0u8; 16], OpenFlags { create: true, ..Default::default() }).unwrap();
        adapter.save_documents(&mut handle, &[(doc(b"x", 1, false), b"v".to_vec())], false).unwrap();
        adapter.commit(&mut handle).unwrap();
        adapter.save_documents(&mut handle, &[(doc(b"x", 2, true), Vec::new())], false).unwrap();
        adapter.commit(&mut handle).unwrap();

        let dst_path = dir.path().join("0.couch.1.compact");
        let mut compacted = adapter
            .compact(
                &mut handle,
                &dst_path,
                [0u8; 16],
                CompactFlags::default(),
                |info, _body| Ok(if info.deleted { HookDecision::Drop } else { HookDecision::Keep }),
                || Ok(Some(SeqNo(2))),
            )
            .unwrap();

        assert!(adapter.docinfo_by_id(&mut compacted, b"x").is_err());
        assert_eq!(adapter.info(&compacted).purge_seq, SeqNo(2));
    }
}
