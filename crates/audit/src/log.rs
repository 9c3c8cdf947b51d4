//! The rotated JSON-lines audit log file.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use vbstore_core::{Error, Result};

use crate::event::AuditEvent;

/// An open `audit.log`, plus enough state to decide when to rotate.
pub struct AuditLog {
    dir: PathBuf,
    file: File,
    opened_at: Instant,
}

impl AuditLog {
    /// Open (creating if necessary) `<dir>/audit.log` for appending.
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir).map_err(|e| Error::OpenFailed { reason: e.to_string() })?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("audit.log"))
            .map_err(|e| Error::OpenFailed { reason: e.to_string() })?;
        Ok(AuditLog { dir: dir.to_path_buf(), file, opened_at: Instant::now() })
    }

    /// Append one event as a single JSON line.
    pub fn write_event(&mut self, event: &AuditEvent) -> Result<()> {
        let line = event.to_json_line().map_err(|e| Error::WriteFailed { reason: e.to_string() })?;
        writeln!(self.file, "{line}").map_err(Error::write_failed)
    }

    /// Flush buffered writes to the OS.
    pub fn flush(&mut self) -> Result<()> {
        self.file.flush().map_err(Error::write_failed)
    }

    /// Time since this handle was opened (since the last rotation).
    pub fn age(&self) -> std::time::Duration {
        self.opened_at.elapsed()
    }

    /// Rename the current log aside with a timestamp suffix and reopen a
    /// fresh `audit.log` in its place.
    pub fn rotate(&mut self) -> Result<()> {
        self.flush()?;
        let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%.fZ");
        let rotated_path = self.dir.join(format!("audit.log.{stamp}"));
        let active_path = self.dir.join("audit.log");
        fs::rename(&active_path, &rotated_path).map_err(|e| Error::WriteFailed { reason: e.to_string() })?;
        *self = AuditLog::open(&self.dir)?;
        Ok(())
    }
}
