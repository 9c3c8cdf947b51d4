//! Unified error taxonomy for the per-partition persistence engine.
//!
//! Every error surfaced by the file-format adapter is mapped, once, to the
//! variants of [`Error`] below. Higher layers (write path, read paths,
//! compaction, rollback) only ever see this type; none of them inspect
//! whatever raw code the underlying storage returned. If a new on-disk
//! failure mode is added, extend this table rather than growing a second
//! one somewhere else.

use std::io;
use thiserror::Error;

/// Result alias used throughout the engine.
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy for the persistence engine.
///
/// Each variant corresponds to one row of the error-handling policy table:
/// `not-found` is never logged at warning, `io-*` carry an operating-system
/// reason string when available, `invariant` is a caller bug and is only
/// ever raised by code paths that are unreachable under correct use.
#[derive(Debug, Error)]
pub enum Error {
    /// The requested document, local doc, or header does not exist.
    #[error("not found")]
    NotFound,

    /// A partition file has no durable header (freshly created, or header
    /// corruption truncated it back to nothing).
    #[error("no header")]
    NoHeader,

    /// The named partition file does not exist on disk.
    #[error("no such file: {0}")]
    NoSuchFile(String),

    /// `open` failed at the OS level.
    #[error("open failed: {reason}")]
    OpenFailed {
        /// Operating-system reason string, when the cause was a syscall.
        reason: String,
    },

    /// A read syscall failed or returned corrupt data at the I/O boundary.
    #[error("read failed: {reason}")]
    ReadFailed {
        /// Operating-system reason string.
        reason: String,
    },

    /// A write syscall failed.
    #[error("write failed: {reason}")]
    WriteFailed {
        /// Operating-system reason string.
        reason: String,
    },

    /// `close` failed at the OS level.
    #[error("close failed: {reason}")]
    CloseFailed {
        /// Operating-system reason string.
        reason: String,
    },

    /// Memory could not be allocated for an in-flight operation (e.g. an
    /// expiry notification body, or a compaction buffer).
    #[error("allocation failed")]
    AllocFailed,

    /// The file's framing is structurally invalid (bad magic, bad length,
    /// checksum mismatch).
    #[error("file corrupt: {0}")]
    FileCorrupt(String),

    /// A caller callback requested cancellation; distinct from failure so
    /// callers can tell "stopped on purpose" from "stopped on error".
    #[error("cancelled")]
    Cancelled,

    /// A conflict such as a CAS mismatch on a local-doc save.
    #[error("conflict: {0}")]
    Conflict(String),

    /// API misuse: writing through a read-only handle, mixing partitions
    /// in one write batch, and similar programmer errors. These are never
    /// expected to occur given correct callers and should be treated as
    /// fatal to the operation.
    #[error("invariant violated: {0}")]
    Invariant(String),

    /// Catch-all for conditions that don't merit their own variant.
    #[error("other: {0}")]
    Other(String),
}

impl Error {
    /// Wrap a [`std::io::Error`] as a `ReadFailed`, carrying the OS reason.
    pub fn read_failed(err: io::Error) -> Self {
        Error::ReadFailed { reason: err.to_string() }
    }

    /// Wrap a [`std::io::Error`] as a `WriteFailed`, carrying the OS reason.
    pub fn write_failed(err: io::Error) -> Self {
        Error::WriteFailed { reason: err.to_string() }
    }

    /// Wrap a [`std::io::Error`] as an `OpenFailed`, carrying the OS reason.
    pub fn open_failed(err: io::Error) -> Self {
        Error::OpenFailed { reason: err.to_string() }
    }

    /// Wrap a [`std::io::Error`] as a `CloseFailed`, carrying the OS reason.
    pub fn close_failed(err: io::Error) -> Self {
        Error::CloseFailed { reason: err.to_string() }
    }

    /// Classify this error per the §7 error-handling policy, for logging
    /// and for callers that need to decide whether a retry is sensible.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound | Error::NoSuchFile(_) => ErrorKind::NotFound,
            Error::Conflict(_) => ErrorKind::Conflict,
            Error::OpenFailed { .. } | Error::ReadFailed { .. } | Error::WriteFailed { .. }
            | Error::CloseFailed { .. } => ErrorKind::IoTransient,
            Error::NoHeader | Error::FileCorrupt(_) => ErrorKind::IoFatal,
            Error::AllocFailed => ErrorKind::Alloc,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Invariant(_) => ErrorKind::Invariant,
            Error::Other(_) => ErrorKind::IoTransient,
        }
    }

    /// Whether this error carries an operating-system reason string.
    pub fn os_reason(&self) -> Option<&str> {
        match self {
            Error::OpenFailed { reason }
            | Error::ReadFailed { reason }
            | Error::WriteFailed { reason }
            | Error::CloseFailed { reason } => Some(reason),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Error::NoSuchFile(err.to_string()),
            _ => Error::Other(err.to_string()),
        }
    }
}

/// Coarse classification used by the §7 error-handling policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing local doc, missing partition file: return as distinct
    /// status, never logged at warning.
    NotFound,
    /// Wrong CAS on local doc save, or similar: surfaced to caller.
    Conflict,
    /// Read/write/close failure: surfaced with an op-level diagnostic,
    /// caller may retry.
    IoTransient,
    /// File corrupt, no header: caller typically rebuilds the partition.
    IoFatal,
    /// Out of memory: propagated upward.
    Alloc,
    /// Callback requested cancel: never user-visible.
    Cancelled,
    /// API misuse: fatal to the operation, caller bug.
    Invariant,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_carry_os_reason() {
        let err = Error::read_failed(io::Error::new(io::ErrorKind::Other, "disk wobble"));
        assert!(err.os_reason().unwrap().contains("disk wobble"));
        assert_eq!(err.kind(), ErrorKind::IoTransient);
    }

    #[test]
    fn not_found_never_carries_os_reason() {
        assert!(Error::NotFound.os_reason().is_none());
        assert_eq!(Error::NotFound.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn missing_file_maps_from_io_error() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "vanished");
        let err: Error = io_err.into();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
