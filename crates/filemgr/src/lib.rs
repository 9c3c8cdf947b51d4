#![warn(missing_docs)]
//! Per-partition file lifecycle: which revision is current for a
//! partition, how revision files are named and discovered on disk, and
//! how superseded revisions get unlinked without blocking foreground
//! opens.

pub mod naming;
pub mod pending;
pub mod revision;

pub use naming::{compact_file_name, discover, file_name, populate_from_disk, remove_compact_file, DiscoveredState};
pub use pending::{unlink_with_retry, PendingDeletionQueue, PendingTaskHandle};
pub use revision::RevisionMap;
