//! Process-wide counters read back through `get_stat(name) -> u64`.

use std::sync::atomic::{AtomicU64, Ordering};

/// The fixed set of stat counters this engine exposes.
#[derive(Debug, Default)]
pub struct Stats {
    failure_compaction: AtomicU64,
    failure_get: AtomicU64,
    io_total_read_bytes: AtomicU64,
    io_total_write_bytes: AtomicU64,
    io_compaction_read_bytes: AtomicU64,
    io_compaction_write_bytes: AtomicU64,
    io_bg_fetch_read_count: AtomicU64,
}

impl Stats {
    /// All counters start at zero.
    pub fn new() -> Self {
        Stats::default()
    }

    /// Look up a stat by its documented name; `None` for an unrecognised
    /// name.
    pub fn get_stat(&self, name: &str) -> Option<u64> {
        let value = match name {
            "failure_compaction" => &self.failure_compaction,
            "failure_get" => &self.failure_get,
            "io_total_read_bytes" => &self.io_total_read_bytes,
            "io_total_write_bytes" => &self.io_total_write_bytes,
            "io_compaction_read_bytes" => &self.io_compaction_read_bytes,
            "io_compaction_write_bytes" => &self.io_compaction_write_bytes,
            "io_bg_fetch_read_count" => &self.io_bg_fetch_read_count,
            _ => return None,
        };
        Some(value.load(Ordering::Relaxed))
    }

    pub(crate) fn record_failure_compaction(&self) {
        self.failure_compaction.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure_get(&self) {
        self.failure_get.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_read_bytes(&self, bytes: u64) {
        self.io_total_read_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn add_write_bytes(&self, bytes: u64) {
        self.io_total_write_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn add_compaction_read_bytes(&self, bytes: u64) {
        self.io_compaction_read_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn add_compaction_write_bytes(&self, bytes: u64) {
        self.io_compaction_write_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_bg_fetch(&self) {
        self.io_bg_fetch_read_count.fetch_add(1, Ordering::Relaxed);
    }
}
