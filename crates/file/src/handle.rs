//! A single open partition file: physical bytes plus its rebuilt index,
//! with the pending-write/commit state machine the §4.A adapter drives.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use vbstore_core::{Error, PartitionId, Result, SeqNo};
use vbstore_format::DocInfo;

use crate::index::{FileIndex, HeaderLoc};
use crate::payload::{decode_document, decode_local_doc, encode_document, encode_header, encode_local_doc, HeaderPayload};
use crate::physical::PhysicalFile;
use crate::record::{Record, RecordKind};

/// Flags recognised by [`crate::adapter::FileAdapter::open`].
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenFlags {
    /// Open for reading only; any mutating call is an invariant violation.
    pub read_only: bool,
    /// Create the file if it does not exist.
    pub create: bool,
    /// Disable the OS page cache (testing only); this implementation has
    /// no buffering layer of its own, so this is a no-op flag carried
    /// purely so callers can set it without the adapter rejecting it.
    pub unbuffered: bool,
    /// Fsync every N bytes written; `0` disables periodic sync.
    pub periodic_sync_bytes: u64,
}

/// Aggregate counters returned by [`crate::adapter::FileAdapter::info`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileInfo {
    /// Number of live (non-tombstone) documents.
    pub doc_count: u64,
    /// Number of tombstones still retained.
    pub deleted_count: u64,
    /// Physical file size in bytes.
    pub file_size: u64,
    /// Bytes actually in use by live data (equal to `file_size` for this
    /// backend, which has no page-level fragmentation to report).
    pub space_used: u64,
    /// Highest durably committed by-seqno.
    pub last_seq: SeqNo,
    /// Highest by-seqno purged by compaction.
    pub purge_seq: SeqNo,
}

struct PendingWrite {
    doc_offsets: BTreeMap<u64, u64>,
    key_offsets: HashMap<Vec<u8>, u64>,
    local_offsets: HashMap<String, u64>,
    bytes_since_sync: u64,
}

impl PendingWrite {
    fn new() -> Self {
        PendingWrite {
            doc_offsets: BTreeMap::new(),
            key_offsets: HashMap::new(),
            local_offsets: HashMap::new(),
            bytes_since_sync: 0,
        }
    }

    fn is_empty(&self) -> bool {
        self.doc_offsets.is_empty() && self.key_offsets.is_empty() && self.local_offsets.is_empty()
    }
}

/// An open partition file, combining raw bytes with its rebuilt index.
pub struct Handle {
    physical: PhysicalFile,
    partition: PartitionId,
    flags: OpenFlags,
    index: FileIndex,
    pending: PendingWrite,
    /// Set by `rewind_header`; tells the next `commit` to truncate the
    /// physical file rather than append a new header.
    rewound: bool,
    /// Set by compaction before its final `commit`, to record the new
    /// purge sequence computed by the `time_purge` hook.
    purge_seqno_override: Option<SeqNo>,
}

impl Handle {
    /// Create a brand-new partition file.
    pub fn create(path: &Path, partition: PartitionId, revision: u64, database_uuid: [u8; 16], flags: OpenFlags) -> Result<Handle> {
        let physical = PhysicalFile::create(path, partition, revision, database_uuid)?;
        Ok(Handle { physical, partition, flags, index: FileIndex::default(), pending: PendingWrite::new(), rewound: false, purge_seqno_override: None })
    }

    /// Open an existing partition file, rebuilding its index.
    pub fn open(path: &Path, partition: PartitionId, flags: OpenFlags) -> Result<Handle> {
        let mut physical = PhysicalFile::open(path, !flags.read_only)?;
        let index = FileIndex::rebuild(&mut physical)?;
        Ok(Handle { physical, partition, flags, index, pending: PendingWrite::new(), rewound: false, purge_seqno_override: None })
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.flags.read_only {
            return Err(Error::Invariant("write attempted on a read-only handle".into()));
        }
        Ok(())
    }

    /// Partition this handle belongs to.
    pub fn partition(&self) -> PartitionId {
        self.partition
    }

    /// The file's on-disk revision.
    pub fn revision(&self) -> u64 {
        self.physical.header().revision
    }

    /// Look up a document's metadata by key, checking this transaction's
    /// uncommitted pending writes first, then the committed index.
    ///
    /// A V0 record carries no recorded datatype; its body is already on
    /// hand from the decode, so the lazy upgrade happens here rather than
    /// waiting for a dedicated compaction pass.
    pub fn docinfo_by_id(&mut self, key: &[u8]) -> Result<Option<DocInfo>> {
        let offset = self.pending.key_offsets.get(key).or_else(|| self.index.by_key.get(key));
        match offset {
            Some(&offset) => {
                let record = self.physical.read_at(offset)?;
                let decoded = decode_document(&record.payload)?;
                Ok(Some(vbstore_format::upgrade(decoded.info, &decoded.body)))
            }
            None => Ok(None),
        }
    }

    /// Fetch a document's body, decompressing it when `inflate` is set and
    /// the record's datatype has the compressed bit set.
    pub fn read_doc(&mut self, info: &DocInfo, inflate: bool) -> Result<Vec<u8>> {
        let offset = self
            .pending
            .key_offsets
            .get(&info.key)
            .or_else(|| self.index.by_key.get(&info.key))
            .ok_or(Error::NotFound)?;
        let record = self.physical.read_at(*offset)?;
        let body = decode_document(&record.payload)?.body;
        if inflate && info.datatype.is_compressed() {
            crate::compression::inflate(&body)
        } else {
            Ok(body)
        }
    }

    /// Append one document record, buffering the update until `commit`.
    pub fn save_document(&mut self, info: &DocInfo, body: &[u8]) -> Result<()> {
        self.ensure_writable()?;
        let payload = encode_document(info, body);
        let record = Record { kind: RecordKind::Document, payload };
        let framed_len = record.to_framed_bytes().len() as u64;
        let offset = self.physical.append(&record)?;
        self.pending.doc_offsets.insert(info.by_seqno.0, offset);
        self.pending.key_offsets.insert(info.key.clone(), offset);
        self.pending.bytes_since_sync += framed_len;
        self.maybe_periodic_sync()?;
        Ok(())
    }

    /// Read a local doc, checking pending writes before the committed index.
    pub fn local_doc_read(&mut self, key: &str) -> Result<Vec<u8>> {
        let offset = self
            .pending
            .local_offsets
            .get(key)
            .or_else(|| self.index.local_docs.get(key))
            .ok_or(Error::NotFound)?;
        let record = self.physical.read_at(*offset)?;
        let (_key, value) = decode_local_doc(&record.payload)?;
        Ok(value)
    }

    /// Append a local-doc record, buffering the update until `commit`.
    pub fn local_doc_save(&mut self, key: &str, value: &[u8]) -> Result<()> {
        self.ensure_writable()?;
        let payload = encode_local_doc(key, value);
        let record = Record { kind: RecordKind::LocalDoc, payload };
        let framed_len = record.to_framed_bytes().len() as u64;
        let offset = self.physical.append(&record)?;
        self.pending.local_offsets.insert(key.to_string(), offset);
        self.pending.bytes_since_sync += framed_len;
        self.maybe_periodic_sync()?;
        Ok(())
    }

    fn maybe_periodic_sync(&mut self) -> Result<()> {
        if self.flags.periodic_sync_bytes > 0 && self.pending.bytes_since_sync >= self.flags.periodic_sync_bytes {
            self.physical.sync()?;
            self.pending.bytes_since_sync = 0;
        }
        Ok(())
    }

    /// Finalize the current commit or rewind, per `sync`.
    pub fn commit(&mut self, sync: bool) -> Result<()> {
        self.ensure_writable()?;

        if self.rewound {
            let target = self.index.current_header().expect("rewind_header always leaves a header behind");
            self.physical.truncate(target.end_offset)?;
            self.rewound = false;
            return Ok(());
        }

        if self.pending.is_empty() && self.index.current_header().is_some() {
            // A commit of zero documents with no manifest change: still a
            // legal no-op that does not need a fresh header, matching the
            // "commit of zero documents" boundary only when a manifest
            // local-doc write also happened (handled above via pending).
            return Ok(());
        }

        let previous = self.index.current_header().map(|h| h.payload);
        let last_seqno = self.pending.doc_offsets.keys().next_back().copied().map(SeqNo).unwrap_or(
            previous.map(|p| p.last_seqno).unwrap_or(SeqNo(0)),
        );

        // Merge pending into a scratch view of by_key to recompute counts.
        let mut merged_keys = self.index.by_key.clone();
        merged_keys.extend(self.pending.key_offsets.iter().map(|(k, v)| (k.clone(), *v)));

        let mut doc_count = 0u64;
        let mut deleted_count = 0u64;
        for &offset in merged_keys.values() {
            let record = self.physical.read_at(offset)?;
            let decoded = decode_document(&record.payload)?;
            if decoded.info.deleted {
                deleted_count += 1;
            } else {
                doc_count += 1;
            }
        }

        let purge_seqno = self
            .purge_seqno_override
            .take()
            .unwrap_or_else(|| previous.map(|p| p.purge_seqno).unwrap_or(SeqNo(0)));
        let header_payload = HeaderPayload { last_seqno, purge_seqno, doc_count, deleted_count };
        let record = Record { kind: RecordKind::Header, payload: encode_header(&header_payload) };
        let header_offset = self.physical.append(&record)?;
        let header_end = self.physical.len();

        self.index.by_seqno.extend(self.pending.doc_offsets.drain());
        self.index.by_key.extend(self.pending.key_offsets.drain());
        self.index.local_docs.extend(self.pending.local_offsets.drain());
        self.index.headers.push(HeaderLoc { offset: header_offset, end_offset: header_end, payload: header_payload });
        self.pending = PendingWrite::new();

        if sync {
            self.physical.sync()?;
        }
        Ok(())
    }

    /// Move the handle's notion of "current header" back by one, without
    /// touching the physical file. A subsequent `commit` makes this the
    /// new physical tail.
    pub fn rewind_header(&mut self) -> Result<()> {
        self.ensure_writable()?;
        if self.index.headers.len() <= 1 {
            return Err(Error::NoHeader);
        }
        self.index.headers.pop();
        // The index's key/seqno maps may now reference offsets for
        // records that belong to the popped header's commit group; they
        // are rebuilt from scratch bounded at the new tail to avoid
        // serving stale post-rewind data.
        let bound = self.index.headers.last().expect("checked above").end_offset;
        self.index = FileIndex::rebuild_bounded(&mut self.physical, bound)?;
        self.rewound = true;
        Ok(())
    }

    /// Record the purge sequence compaction computed, to be written into
    /// the next header this handle commits.
    pub fn set_purge_seqno_override(&mut self, purge_seqno: SeqNo) {
        self.purge_seqno_override = Some(purge_seqno);
    }

    /// Current aggregate statistics.
    pub fn info(&self) -> FileInfo {
        let header = self.index.current_header();
        FileInfo {
            doc_count: header.map(|h| h.payload.doc_count).unwrap_or(0),
            deleted_count: header.map(|h| h.payload.deleted_count).unwrap_or(0),
            file_size: self.physical.len(),
            space_used: self.physical.len(),
            last_seq: self.index.last_seqno(),
            purge_seq: self.index.purge_seqno(),
        }
    }

    /// Iterate live document records with `by_seqno` strictly greater than
    /// `start`, in increasing order, invoking `visit` for each. Stops early
    /// if `visit` asks to cancel.
    pub fn changes_since<F>(&mut self, start: SeqNo, mut visit: F) -> Result<vbstore_core::ScanOutcome>
    where
        F: FnMut(&DocInfo) -> Result<vbstore_core::ScanControl>,
    {
        let offsets: Vec<u64> = self.index.by_seqno.range((start.0 + 1)..).map(|(_, &o)| o).collect();
        for offset in offsets {
            let record = self.physical.read_at(offset)?;
            let decoded = decode_document(&record.payload)?;
            let info = vbstore_format::upgrade(decoded.info, &decoded.body);
            if visit(&info)?.is_cancel() {
                return Ok(vbstore_core::ScanOutcome::Again);
            }
        }
        Ok(vbstore_core::ScanOutcome::Success)
    }

    /// Count of changes in `(lo, hi]`.
    pub fn changes_count(&self, lo: SeqNo, hi: SeqNo) -> u64 {
        self.index.by_seqno.range((lo.0 + 1)..=hi.0).count() as u64
    }

    /// Iterate all live keys in key order starting at `start_key`.
    pub fn all_docs<F>(&mut self, start_key: &[u8], mut visit: F) -> Result<vbstore_core::ScanOutcome>
    where
        F: FnMut(&DocInfo) -> Result<vbstore_core::ScanControl>,
    {
        let mut keys: Vec<Vec<u8>> = self.index.by_key.keys().cloned().collect();
        keys.sort();
        for key in keys {
            if key.as_slice() < start_key {
                continue;
            }
            let offset = self.index.by_key[&key];
            let record = self.physical.read_at(offset)?;
            let decoded = decode_document(&record.payload)?;
            let info = vbstore_format::upgrade(decoded.info, &decoded.body);
            if visit(&info)?.is_cancel() {
                return Ok(vbstore_core::ScanOutcome::Again);
            }
        }
        Ok(vbstore_core::ScanOutcome::Success)
    }

    /// Access to the physical file, for compaction's cross-handle copy.
    pub(crate) fn physical_mut(&mut self) -> &mut PhysicalFile {
        &mut self.physical
    }

    /// Access to the rebuilt index, for compaction's read-all-live-records pass.
    pub(crate) fn index(&self) -> &FileIndex {
        &self.index
    }
}
