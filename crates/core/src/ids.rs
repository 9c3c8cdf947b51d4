//! Identifiers used across the persistence engine.
//!
//! Partitions, revisions, sequence numbers and CAS values are all plain
//! `u64`s on the wire, but mixing them up is a classic source of bugs
//! (passing a `by_seqno` where a `revision` was expected compiles fine if
//! both are bare integers). Newtype wrappers catch that at compile time.

use std::fmt;

/// A partition (vBucket) identifier. Partitions are numbered densely from
/// zero up to `max_vbuckets - 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PartitionId(pub u16);

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A file revision: the monotonically increasing integer embedded in a
/// partition file's name (`<partition>.couch.<revision>`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Revision(pub u64);

impl Revision {
    /// The first revision ever assigned to a newly created partition file.
    pub const INITIAL: Revision = Revision(1);

    /// The revision that follows this one (used by compaction installs).
    pub fn next(self) -> Revision {
        Revision(self.0 + 1)
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A durably-assigned sequence number, monotonically increasing per
/// partition across all durable commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SeqNo(pub u64);

impl fmt::Display for SeqNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A compare-and-swap value. `0` means "no CAS check"; real CAS values are
/// assigned by the caller (the bucket's in-memory layer), not by this
/// crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Cas(pub u64);

/// Sentinel written for `max_cas` when the field has never been set.
/// `2^64 - 1` on read is normalized to `Cas(0)`, per the `_local/vbstate`
/// wire contract.
pub const MAX_CAS_SENTINEL: u64 = u64::MAX;

impl Cas {
    /// Normalize the sentinel value read back from `_local/vbstate` to
    /// zero, per the documented wire contract.
    pub fn from_wire(raw: u64) -> Cas {
        if raw == MAX_CAS_SENTINEL {
            Cas(0)
        } else {
            Cas(raw)
        }
    }
}

/// Hybrid-logical-clock epoch sequence number: the `by_seqno` at which a
/// partition switched from legacy CAS generation to HLC-derived CAS
/// values. Negative/sentinel means "not yet initialised".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HlcEpochSeqno(pub i64);

impl HlcEpochSeqno {
    /// Sentinel for "this partition has not adopted HLC CAS yet".
    pub const UNSET: HlcEpochSeqno = HlcEpochSeqno(-1);

    /// Whether HLC CAS generation has been adopted for this partition.
    pub fn is_set(self) -> bool {
        self.0 >= 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revision_increments() {
        assert_eq!(Revision::INITIAL.next(), Revision(2));
    }

    #[test]
    fn cas_sentinel_normalizes_to_zero() {
        assert_eq!(Cas::from_wire(MAX_CAS_SENTINEL), Cas(0));
        assert_eq!(Cas::from_wire(42), Cas(42));
    }

    #[test]
    fn hlc_epoch_unset_is_not_set() {
        assert!(!HlcEpochSeqno::UNSET.is_set());
        assert!(HlcEpochSeqno(0).is_set());
    }
}
