#![warn(missing_docs)]
//! Per-partition persistence engine for a key-value database bucket: a
//! durable, append-only document store with batched commits, point and
//! multi-key reads, ordered scans, compaction, and rollback.
//!
//! [`Store`] is the top-level facade; everything else is reachable
//! through it, but each stage (write path, read paths, scan, compaction,
//! rollback) is also exposed as its own module for callers that want to
//! drive an already-open handle directly.

pub mod compaction;
pub mod config;
pub mod read_path;
pub mod rollback;
pub mod scan;
pub mod scan_registry;
pub mod stats;
pub mod store;
pub mod write_path;

#[cfg(test)]
mod scenarios;

pub use compaction::{compact, BloomFilterCallback, CollectionsEraser, CompactionContext, ExpiryCallback};
pub use config::{Backend, Config};
pub use read_path::{get_all_keys, multi_get, point_get, GetResult, Item};
pub use rollback::{rollback, RollbackOutcome};
pub use scan::{destroy_scan_context, init_scan_context, scan, CacheLookup, ItemResult, ScanContext, ScanItem, ValueFilter};
pub use scan_registry::ScanRegistry;
pub use stats::Stats;
pub use store::Store;
pub use write_path::{commit_batch, MutationOutcome, MutationStatus, Transaction};

pub use vbstore_audit::{AuditConfig, AuditEvent, AuditPipeline};
pub use vbstore_core::{Cas, Datatype, Error, HlcEpochSeqno, PartitionId, Result, Revision, ScanControl, ScanOutcome, SeqNo};
pub use vbstore_file::{CompactFlags, FileAdapter, FileInfo, Handle, HookDecision, OpenFlags};
pub use vbstore_filemgr::{naming, unlink_with_retry, PendingDeletionQueue, RevisionMap};
pub use vbstore_format::{DocInfo, VBucketStateDoc, COLLECTIONS_MANIFEST_KEY, VBSTATE_KEY};
