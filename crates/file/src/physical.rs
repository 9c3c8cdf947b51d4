//! Raw byte-level access to a partition file: header, append, and linear
//! scan. Everything that understands record *semantics* (what a document
//! looks like, where the index lives) is built on top in [`crate::handle`].

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{ByteOrder, LittleEndian};
use vbstore_core::{Error, PartitionId, Result};

use crate::record::{FileHeader, Record, FILE_HEADER_SIZE};

/// An open partition file positioned for append, with its header already
/// validated.
pub struct PhysicalFile {
    file: File,
    path: PathBuf,
    header: FileHeader,
    len: u64,
}

impl PhysicalFile {
    /// Create a brand new partition file, writing its fixed header.
    pub fn create(path: &Path, partition: PartitionId, revision: u64, database_uuid: [u8; 16]) -> Result<PhysicalFile> {
        let mut file = OpenOptions::new()
            .create_new(true)
            .read(true)
            .write(true)
            .open(path)
            .map_err(Error::open_failed)?;
        let header = FileHeader { partition, revision, database_uuid };
        file.write_all(&header.to_bytes()).map_err(Error::write_failed)?;
        file.sync_all().map_err(Error::write_failed)?;
        Ok(PhysicalFile { file, path: path.to_path_buf(), header, len: FILE_HEADER_SIZE as u64 })
    }

    /// Open an existing partition file for read (and, if `writable`, append).
    pub fn open(path: &Path, writable: bool) -> Result<PhysicalFile> {
        if !path.exists() {
            return Err(Error::NoSuchFile(path.display().to_string()));
        }
        let mut file = OpenOptions::new()
            .read(true)
            .write(writable)
            .open(path)
            .map_err(Error::open_failed)?;

        let mut header_bytes = [0u8; FILE_HEADER_SIZE];
        file.read_exact(&mut header_bytes).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                Error::FileCorrupt("file shorter than header".into())
            } else {
                Error::read_failed(e)
            }
        })?;
        let header = FileHeader::from_bytes(&header_bytes)?;

        let len = file.seek(SeekFrom::End(0)).map_err(Error::read_failed)?;
        Ok(PhysicalFile { file, path: path.to_path_buf(), header, len })
    }

    /// The file's parsed header.
    pub fn header(&self) -> FileHeader {
        self.header
    }

    /// Path this file was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current physical length in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Append a record, returning the offset it was written at.
    pub fn append(&mut self, record: &Record) -> Result<u64> {
        let offset = self.len;
        self.file.seek(SeekFrom::Start(offset)).map_err(Error::write_failed)?;
        let framed = record.to_framed_bytes();
        self.file.write_all(&framed).map_err(Error::write_failed)?;
        self.len = offset + framed.len() as u64;
        Ok(offset)
    }

    /// Read the record starting at `offset`.
    pub fn read_at(&mut self, offset: u64) -> Result<Record> {
        self.file.seek(SeekFrom::Start(offset)).map_err(Error::read_failed)?;
        // Read the length prefix first to know how much more to pull.
        let mut prefix = [0u8; 5];
        self.file.read_exact(&mut prefix).map_err(Error::read_failed)?;
        let len = byteorder::LittleEndian::read_u32(&prefix[0..4]) as usize;
        let mut rest = vec![0u8; len + 4];
        self.file.read_exact(&mut rest).map_err(Error::read_failed)?;
        let mut whole = Vec::with_capacity(5 + rest.len());
        whole.extend_from_slice(&prefix);
        whole.extend_from_slice(&rest);
        match Record::parse_framed(&whole)? {
            Some((record, _)) => Ok(record),
            None => Err(Error::FileCorrupt(format!("truncated record at offset {offset}"))),
        }
    }

    /// Scan every well-formed record from `start_offset` to the current
    /// physical end of file, invoking `visit(offset, record)` for each.
    /// Stops silently (not an error) on the first truncated tail, since
    /// that represents a torn write after an unclean shutdown.
    pub fn scan_from<F: FnMut(u64, Record) -> Result<()>>(&mut self, start_offset: u64, mut visit: F) -> Result<()> {
        self.file.seek(SeekFrom::Start(start_offset)).map_err(Error::read_failed)?;
        let mut buf = Vec::new();
        self.file.read_to_end(&mut buf).map_err(Error::read_failed)?;

        let mut pos = 0usize;
        let mut offset = start_offset;
        while pos < buf.len() {
            match Record::parse_framed(&buf[pos..])? {
                Some((record, consumed)) => {
                    visit(offset, record)?;
                    pos += consumed;
                    offset += consumed as u64;
                }
                None => break,
            }
        }
        Ok(())
    }

    /// Flush and fsync.
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all().map_err(Error::write_failed)
    }

    /// Truncate the physical file to `len` bytes, used by rollback to make
    /// a rewound header the new physical tail.
    pub fn truncate(&mut self, len: u64) -> Result<()> {
        self.file.set_len(len).map_err(Error::write_failed)?;
        self.len = len;
        self.sync()
    }
}
