//! In-memory index rebuilt by linear scan every time a partition file is
//! opened. There is no separate on-disk B-tree: the index exists only in
//! RAM and is derived, never itself a source of truth — the framed record
//! log is.
//!
//! Index updates are only ever committed as of a `Header` record boundary,
//! which is what gives a crash mid-write the couchstore property that the
//! file is readable up to its latest header "regardless of crash timing"
//! (data model invariant 2): a scan that reaches a truncated or corrupt
//! tail past the last header simply stops, discarding whatever dangling
//! document/local-doc records came after it.

use std::collections::{BTreeMap, HashMap};

use vbstore_core::{Result, SeqNo};

use crate::payload::{decode_document, decode_header, decode_local_doc, HeaderPayload};
use crate::physical::PhysicalFile;
use crate::record::{RecordKind, FILE_HEADER_SIZE};

/// Where a durable header sits in the file, and what it says.
#[derive(Debug, Clone, Copy)]
pub struct HeaderLoc {
    /// Byte offset the header record itself starts at.
    pub offset: u64,
    /// Byte offset immediately after the header record; truncating here
    /// makes this header the file's new physical tail.
    pub end_offset: u64,
    /// The header's own payload.
    pub payload: HeaderPayload,
}

/// The rebuilt view of a partition file as of its latest durable header.
#[derive(Debug, Default, Clone)]
pub struct FileIndex {
    /// by_seqno -> record offset, for every live document record committed
    /// as of the current header.
    pub by_seqno: BTreeMap<u64, u64>,
    /// key -> offset of the latest record for that key (tombstone or not).
    pub by_key: HashMap<Vec<u8>, u64>,
    /// local doc key -> offset of the latest record for that key.
    pub local_docs: HashMap<String, u64>,
    /// Every durable header seen, oldest first.
    pub headers: Vec<HeaderLoc>,
}

impl FileIndex {
    /// Rebuild the index by scanning the whole file from the first record
    /// after the file header, committing pending document/local-doc
    /// updates only when a `Header` record is reached.
    pub fn rebuild(physical: &mut PhysicalFile) -> Result<FileIndex> {
        Self::rebuild_bounded(physical, u64::MAX)
    }

    /// Like [`FileIndex::rebuild`], but never reads past `end_offset`
    /// (exclusive). Used by rollback to derive the index as it existed as
    /// of an earlier header without physically truncating the file yet.
    pub fn rebuild_bounded(physical: &mut PhysicalFile, end_offset: u64) -> Result<FileIndex> {
        let mut index = FileIndex::default();
        let mut pending_by_seqno: BTreeMap<u64, u64> = BTreeMap::new();
        let mut pending_by_key: HashMap<Vec<u8>, u64> = HashMap::new();
        let mut pending_locals: HashMap<String, u64> = HashMap::new();

        physical.scan_from(FILE_HEADER_SIZE as u64, |offset, record| {
            if offset >= end_offset {
                return Ok(());
            }
            match record.kind {
                RecordKind::Document => {
                    let decoded = decode_document(&record.payload)?;
                    pending_by_seqno.insert(decoded.info.by_seqno.0, offset);
                    pending_by_key.insert(decoded.info.key.clone(), offset);
                }
                RecordKind::LocalDoc => {
                    let (key, _value) = decode_local_doc(&record.payload)?;
                    pending_locals.insert(key, offset);
                }
                RecordKind::Header => {
                    let payload = decode_header(&record.payload);
                    index.by_seqno.extend(pending_by_seqno.drain(..));
                    index.by_key.extend(pending_by_key.drain());
                    index.local_docs.extend(pending_locals.drain());
                    index.headers.push(HeaderLoc {
                        offset,
                        end_offset: offset + record.to_framed_bytes_len(),
                        payload,
                    });
                }
            }
            Ok(())
        })?;

        Ok(index)
    }

    /// The header this index currently reflects, if any commit has ever
    /// happened.
    pub fn current_header(&self) -> Option<&HeaderLoc> {
        self.headers.last()
    }

    /// Highest durably committed by-seqno, or zero if no header exists yet.
    pub fn last_seqno(&self) -> SeqNo {
        self.current_header().map(|h| h.payload.last_seqno).unwrap_or(SeqNo(0))
    }

    /// Highest by-seqno purged by compaction, or zero.
    pub fn purge_seqno(&self) -> SeqNo {
        self.current_header().map(|h| h.payload.purge_seqno).unwrap_or(SeqNo(0))
    }
}

trait RecordLen {
    fn to_framed_bytes_len(&self) -> u64;
}

impl RecordLen for crate::record::Record {
    fn to_framed_bytes_len(&self) -> u64 {
        (5 + self.payload.len() + 4) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{encode_document, encode_header, encode_local_doc};
    use crate::record::Record;
    use tempfile::tempdir;
    use vbstore_core::{Cas, Datatype, HlcEpochSeqno, PartitionId};
    use vbstore_format::DocInfo;

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

    #[test]
    fn uncommitted_tail_is_not_indexed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("0.couch.1");
        let mut physical = PhysicalFile::create(&path, PartitionId(0), 1, [0u8; 16]).unwrap();

        let d1 = doc(b"a", 1);
        physical.append(&Record { kind: RecordKind::Document, payload: encode_document(&d1, b"1") }).unwrap();
        physical
            .append(&Record {
                kind: RecordKind::Header,
                payload: encode_header(&HeaderPayload {
                    last_seqno: SeqNo(1),
                    purge_seqno: SeqNo(0),
                    doc_count: 1,
                    deleted_count: 0,
                }),
            })
            .unwrap();

        // Dangling record after the last header: must not be indexed.
        let d2 = doc(b"b", 2);
        physical.append(&Record { kind: RecordKind::Document, payload: encode_document(&d2, b"2") }).unwrap();

        let index = FileIndex::rebuild(&mut physical).unwrap();
        assert!(index.by_key.contains_key(b"a".as_slice()));
        assert!(!index.by_key.contains_key(b"b".as_slice()));
        assert_eq!(index.last_seqno(), SeqNo(1));
    }

    #[test]
    fn local_docs_are_indexed_after_their_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("0.couch.1");
        let mut physical = PhysicalFile::create(&path, PartitionId(0), 1, [0u8; 16]).unwrap();

        physical
            .append(&Record { kind: RecordKind::LocalDoc, payload: encode_local_doc("_local/vbstate", b"{}") })
            .unwrap();
        physical
            .append(&Record {
                kind: RecordKind::Header,
                payload: encode_header(&HeaderPayload {
                    last_seqno: SeqNo(0),
                    purge_seqno: SeqNo(0),
                    doc_count: 0,
                    deleted_count: 0,
                }),
            })
            .unwrap();

        let index = FileIndex::rebuild(&mut physical).unwrap();
        assert!(index.local_docs.contains_key("_local/vbstate"));
    }
}
