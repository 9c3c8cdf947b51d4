//! Shared types for the per-partition persistence engine.
//!
//! This crate has no I/O of its own; it defines the vocabulary used by
//! every other crate in the workspace:
//! - [`error`]: the unified error taxonomy and its §7 policy classification
//! - [`ids`]: newtypes for partition, revision, sequence number, CAS, HLC epoch
//! - [`meta`]: the datatype bitmask, vBucket lifecycle state, metadata version
//! - [`key`]: document key / namespace-prefix helpers

#![warn(missing_docs)]

pub mod control;
pub mod error;
pub mod ids;
pub mod key;
pub mod meta;

pub use control::{ScanControl, ScanOutcome};
pub use error::{Error, ErrorKind, Result};
pub use ids::{Cas, HlcEpochSeqno, PartitionId, Revision, SeqNo, MAX_CAS_SENTINEL};
pub use key::DocKey;
pub use meta::{Datatype, MetaVersion, VBucketState};
