//! On-disk record framing for a partition file.
//!
//! A partition file is a sequence of length-prefixed, checksummed records
//! following a fixed file header, mirroring the segment/record split used
//! elsewhere in this workspace for the write-ahead log: a small fixed
//! header identifies the file, and every record after it carries its own
//! length and CRC32 so a torn write at the tail is detectable rather than
//! silently corrupting the next record.
//!
//! ```text
//! ┌───────────────────────────────────┐
//! │ File header (32 bytes)            │
//! ├───────────────────────────────────┤
//! │ Record 1: len(4) kind(1) body(len) crc32(4) │
//! ├───────────────────────────────────┤
//! │ Record 2: ...                      │
//! └───────────────────────────────────┘
//! ```
//!
//! Three record kinds share this framing: [`RecordKind::Document`],
//! [`RecordKind::LocalDoc`], and [`RecordKind::Header`]. A `Header` record
//! is the durable commit marker; everything between two header records
//! belongs to the commit that the later header finalises.

use byteorder::{ByteOrder, LittleEndian};
use crc32fast::Hasher;
use vbstore_core::{Error, PartitionId, Result};

/// Magic bytes identifying a partition file: "VBCF".
pub const FILE_MAGIC: [u8; 4] = *b"VBCF";

/// Current on-disk file format version.
pub const FILE_FORMAT_VERSION: u32 = 1;

/// Size in bytes of the fixed file header.
pub const FILE_HEADER_SIZE: usize = 32;

/// Fixed header written once at the start of every partition file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    /// Partition this file belongs to.
    pub partition: PartitionId,
    /// Revision embedded in the file's name.
    pub revision: u64,
    /// Database-wide UUID, carried for cross-file integrity checks.
    pub database_uuid: [u8; 16],
}

impl FileHeader {
    /// Serialise to the fixed 32-byte on-disk layout.
    pub fn to_bytes(self) -> [u8; FILE_HEADER_SIZE] {
        let mut buf = [0u8; FILE_HEADER_SIZE];
        buf[0..4].copy_from_slice(&FILE_MAGIC);
        LittleEndian::write_u32(&mut buf[4..8], FILE_FORMAT_VERSION);
        LittleEndian::write_u16(&mut buf[8..10], self.partition.0);
        LittleEndian::write_u64(&mut buf[16..24], self.revision);
        buf[24..32].copy_from_slice(&self.database_uuid[..8]);
        buf
    }

    /// Parse from the fixed 32-byte on-disk layout.
    pub fn from_bytes(buf: &[u8; FILE_HEADER_SIZE]) -> Result<FileHeader> {
        if buf[0..4] != FILE_MAGIC {
            return Err(Error::FileCorrupt("bad file magic".into()));
        }
        let version = LittleEndian::read_u32(&buf[4..8]);
        if version != FILE_FORMAT_VERSION {
            return Err(Error::FileCorrupt(format!("unsupported file version {version}")));
        }
        let partition = PartitionId(LittleEndian::read_u16(&buf[8..10]));
        let revision = LittleEndian::read_u64(&buf[16..24]);
        let mut database_uuid = [0u8; 16];
        database_uuid[..8].copy_from_slice(&buf[24..32]);
        Ok(FileHeader { partition, revision, database_uuid })
    }
}

/// The kind of a framed record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// A document body + packed metadata blob.
    Document,
    /// A local doc (key/value, not part of the by-seqno index).
    LocalDoc,
    /// A durable commit marker.
    Header,
}

impl RecordKind {
    fn tag(self) -> u8 {
        match self {
            RecordKind::Document => 0,
            RecordKind::LocalDoc => 1,
            RecordKind::Header => 2,
        }
    }

    fn from_tag(tag: u8) -> Result<RecordKind> {
        match tag {
            0 => Ok(RecordKind::Document),
            1 => Ok(RecordKind::LocalDoc),
            2 => Ok(RecordKind::Header),
            other => Err(Error::FileCorrupt(format!("unknown record kind tag {other}"))),
        }
    }
}

/// A framed record as it exists on disk, independent of its payload's
/// internal structure.
#[derive(Debug, Clone)]
pub struct Record {
    /// What this record is.
    pub kind: RecordKind,
    /// Raw payload bytes; interpretation depends on `kind`.
    pub payload: Vec<u8>,
}

impl Record {
    /// Frame this record for appending: `len(4) kind(1) payload(len) crc32(4)`.
    pub fn to_framed_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(5 + self.payload.len() + 4);
        let mut len_and_kind = [0u8; 5];
        LittleEndian::write_u32(&mut len_and_kind[0..4], self.payload.len() as u32);
        len_and_kind[4] = self.kind.tag();
        out.extend_from_slice(&len_and_kind);
        out.extend_from_slice(&self.payload);

        let mut hasher = Hasher::new();
        hasher.update(&len_and_kind);
        hasher.update(&self.payload);
        let mut crc = [0u8; 4];
        LittleEndian::write_u32(&mut crc, hasher.finalize());
        out.extend_from_slice(&crc);
        out
    }

    /// Parse one framed record out of `buf`, returning it and the number of
    /// bytes consumed. Returns `Ok(None)` if `buf` holds a truncated tail
    /// (fewer bytes than the frame declares) — the caller treats this as
    /// "end of valid data", not corruption, since a torn write at the tail
    /// is expected after a crash.
    pub fn parse_framed(buf: &[u8]) -> Result<Option<(Record, usize)>> {
        if buf.len() < 5 {
            return Ok(None);
        }
        let len = LittleEndian::read_u32(&buf[0..4]) as usize;
        let kind = RecordKind::from_tag(buf[4])?;
        let total = 5 + len + 4;
        if buf.len() < total {
            return Ok(None);
        }
        let payload = &buf[5..5 + len];
        let stored_crc = LittleEndian::read_u32(&buf[5 + len..total]);

        let mut hasher = Hasher::new();
        hasher.update(&buf[0..5]);
        hasher.update(payload);
        if hasher.finalize() != stored_crc {
            return Err(Error::FileCorrupt("record checksum mismatch".into()));
        }

        Ok(Some((Record { kind, payload: payload.to_vec() }, total)))
    }
}
