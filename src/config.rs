//! Immutable configuration surface, read once at construction and again
//! on each reconfigure. No global mutable settings exist outside this
//! struct.

use std::path::PathBuf;

use vbstore_file::OpenFlags;

/// Which on-disk file-format implementation backs the store.
///
/// Only one backend exists today; the field is still typed (rather than
/// hard-coded) so a future backend swap is a config change, not an API
/// break.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    /// The append-only, checksummed record log implemented in
    /// `vbstore-file`.
    #[default]
    AppendOnlyLog,
}

/// Immutable, typed configuration for one store instance.
#[derive(Debug, Clone)]
pub struct Config {
    /// Number of partitions (vBuckets) this store is sized for; bounds
    /// the dense per-partition maps kept by the file manager.
    pub max_vbuckets: u16,
    /// Number of independent writer groups a caller may shard partitions
    /// across. The engine itself does not enforce sharding; this is
    /// advisory sizing information for the caller's dispatch layer.
    pub max_shards: u16,
    /// Root directory under which every partition file lives.
    pub db_dir: PathBuf,
    /// Which file-format adapter implementation to use.
    pub backend: Backend,
    /// Enables the adapter's page-cache layer. Disabling it is only
    /// meaningful for tests that want to force every read through to
    /// disk; this backend has no caching layer of its own, so the flag
    /// only controls whether `unbuffered` is passed to `open`.
    pub buffered: bool,
    /// Non-zero: the adapter fsyncs every N bytes written. Zero disables
    /// periodic sync (the adapter still syncs on every `commit`).
    pub periodic_sync_bytes: u64,
    /// When true, every on-disk key is expected to carry a 1-byte
    /// namespace prefix ahead of the caller's logical key. The engine
    /// itself treats keys as opaque bytes either way; this flag only
    /// documents the convention callers should follow when constructing
    /// `DocInfo::key`.
    pub persist_doc_namespace: bool,
    /// Memory-pressure gate under which expiry notifications may run
    /// during compaction; above the threshold, compaction retains
    /// expired-but-not-yet-purged documents rather than allocate for the
    /// notification.
    pub compaction_exp_mem_threshold: u64,
    /// Upper bound on the number of documents a compaction pass buffers
    /// before consulting the caller's write-queue backpressure signal.
    pub compaction_write_queue_cap: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_vbuckets: 1024,
            max_shards: 4,
            db_dir: PathBuf::from("."),
            backend: Backend::default(),
            buffered: true,
            periodic_sync_bytes: 0,
            persist_doc_namespace: false,
            compaction_exp_mem_threshold: u64::MAX,
            compaction_write_queue_cap: 1024,
        }
    }
}

impl Config {
    /// Build the [`OpenFlags`] a read-write handle should be opened with,
    /// per this configuration.
    pub fn write_open_flags(&self) -> OpenFlags {
        OpenFlags { read_only: false, create: true, unbuffered: !self.buffered, periodic_sync_bytes: self.periodic_sync_bytes }
    }

    /// Build the [`OpenFlags`] a read-only handle should be opened with.
    pub fn read_open_flags(&self) -> OpenFlags {
        OpenFlags { read_only: true, create: false, unbuffered: !self.buffered, periodic_sync_bytes: 0 }
    }
}
