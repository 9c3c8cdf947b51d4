//! The per-document metadata record carried alongside every key/body pair.

use vbstore_core::{Cas, Datatype, HlcEpochSeqno, SeqNo};

/// Per-document metadata, independent of where the key/body bytes live.
///
/// This is the typed surface the write path, read paths, and compaction
/// hooks all exchange; the file adapter is the only place that knows how
/// it is packed on disk (see [`crate::codec`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocInfo {
    /// The document's key, including any namespace prefix.
    pub key: Vec<u8>,
    /// Compare-and-swap value.
    pub cas: Cas,
    /// Revision sequence number: increments on every mutation of this key,
    /// independent of `by_seqno`.
    pub rev_seqno: u64,
    /// Durable sequence number assigned at commit time.
    pub by_seqno: SeqNo,
    /// Expiry, seconds since epoch; `0` means never.
    pub expiry: u32,
    /// Opaque flags, caller-defined.
    pub flags: u32,
    /// Body encoding bitmask.
    pub datatype: Datatype,
    /// HLC epoch this document's CAS was generated under.
    pub hlc_cas_epoch_seqno: HlcEpochSeqno,
    /// Whether the body is known to carry extended attributes, independent
    /// of the `XATTR` datatype bit (used to skip an xattr parse when this
    /// is false).
    pub might_contain_xattrs: bool,
    /// Tombstone flag. A deleted record retains its metadata and may
    /// retain its body until purged by compaction.
    pub deleted: bool,
}

impl DocInfo {
    /// The on-disk metadata version this docinfo would encode as.
    pub fn meta_version(&self) -> vbstore_core::MetaVersion {
        vbstore_core::MetaVersion::V1
    }
}
