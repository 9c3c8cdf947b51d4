//! Well-known local documents: `_local/vbstate` and the collections
//! manifest.
//!
//! Local docs are ordinary key/value records the file adapter happens to
//! index separately from the by-seqno document stream (§4.A
//! `local_doc_read`/`local_doc_save`). This module only defines the wire
//! schema for the two local docs the engine itself writes on every commit.

use serde::{Deserialize, Serialize};
use vbstore_core::{Cas, HlcEpochSeqno, VBucketState};

/// Key under which per-partition state is stored.
pub const VBSTATE_KEY: &str = "_local/vbstate";

/// Key under which the caller-supplied collections manifest is stored.
pub const COLLECTIONS_MANIFEST_KEY: &str = "_local/collections/manifest";

/// Per-partition state written on every durable commit.
///
/// Integers are serialised as decimal strings on the wire (see
/// [`VBucketStateWire`]) for forward compatibility with readers that lack
/// 64-bit JSON numbers; this type is the typed, in-process form.
#[derive(Debug, Clone, PartialEq)]
pub struct VBucketStateDoc {
    /// Lifecycle state.
    pub state: VBucketState,
    /// Checkpoint identifier.
    pub checkpoint_id: u64,
    /// Highest by-seqno of any tombstone seen so far.
    pub max_deleted_seqno: u64,
    /// Highest durably-committed by-seqno.
    pub high_seqno: u64,
    /// Highest by-seqno purged by compaction.
    pub purge_seqno: u64,
    /// Start of the current snapshot range.
    pub snap_start: u64,
    /// End of the current snapshot range.
    pub snap_end: u64,
    /// Highest CAS value observed.
    pub max_cas: Cas,
    /// HLC epoch sequence number for this partition.
    pub hlc_epoch: HlcEpochSeqno,
    /// Whether any document in this partition may carry xattrs.
    pub might_contain_xattrs: bool,
    /// Opaque failover table, passed through unexamined.
    pub failover_table: serde_json::Value,
}

impl Default for VBucketStateDoc {
    fn default() -> Self {
        VBucketStateDoc {
            state: VBucketState::Active,
            checkpoint_id: 0,
            max_deleted_seqno: 0,
            high_seqno: 0,
            purge_seqno: 0,
            snap_start: 0,
            snap_end: 0,
            max_cas: Cas(0),
            hlc_epoch: HlcEpochSeqno::UNSET,
            might_contain_xattrs: false,
            failover_table: serde_json::Value::Array(Vec::new()),
        }
    }
}

/// Wire form of [`VBucketStateDoc`]: the exact JSON object documented in
/// the external interfaces section, with 64-bit integers as decimal
/// strings.
#[derive(Debug, Serialize, Deserialize)]
struct VBucketStateWire {
    state: String,
    checkpoint_id: String,
    max_deleted_seqno: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    failover_table: Option<serde_json::Value>,
    snap_start: String,
    snap_end: String,
    max_cas: String,
    hlc_epoch: String,
    might_contain_xattrs: bool,
}

/// Errors encoding or decoding `_local/vbstate`.
#[derive(Debug, thiserror::Error)]
pub enum VBucketStateError {
    /// The JSON blob did not parse at all.
    #[error("malformed vbstate json: {0}")]
    Json(#[from] serde_json::Error),
    /// A field expected to be a decimal string was not.
    #[error("vbstate field {0} is not a decimal integer")]
    NotAnInteger(&'static str),
    /// The `state` field was not one of active/replica/pending/dead.
    #[error("vbstate has unrecognised state {0:?}")]
    UnknownState(String),
}

fn parse_u64(field: &'static str, s: &str) -> Result<u64, VBucketStateError> {
    s.parse().map_err(|_| VBucketStateError::NotAnInteger(field))
}

fn parse_i64(field: &'static str, s: &str) -> Result<i64, VBucketStateError> {
    s.parse().map_err(|_| VBucketStateError::NotAnInteger(field))
}

impl VBucketStateDoc {
    /// Serialize to the exact on-disk JSON object.
    pub fn to_json_bytes(&self) -> Vec<u8> {
        let wire = VBucketStateWire {
            state: self.state.to_string(),
            checkpoint_id: self.checkpoint_id.to_string(),
            max_deleted_seqno: self.max_deleted_seqno.to_string(),
            failover_table: if self.failover_table.is_null() {
                None
            } else {
                Some(self.failover_table.clone())
            },
            snap_start: self.snap_start.to_string(),
            snap_end: self.snap_end.to_string(),
            max_cas: self.max_cas.0.to_string(),
            hlc_epoch: self.hlc_epoch.0.to_string(),
            might_contain_xattrs: self.might_contain_xattrs,
        };
        // serde_json::to_vec on a hand-built struct cannot fail.
        serde_json::to_vec(&wire).expect("vbstate wire struct is always serialisable")
    }

    /// Parse from the on-disk JSON object, applying the `max_cas` sentinel
    /// normalisation documented in the wire contract.
    pub fn from_json_bytes(bytes: &[u8]) -> Result<VBucketStateDoc, VBucketStateError> {
        let wire: VBucketStateWire = serde_json::from_slice(bytes)?;
        let state = match wire.state.as_str() {
            "active" => VBucketState::Active,
            "replica" => VBucketState::Replica,
            "pending" => VBucketState::Pending,
            "dead" => VBucketState::Dead,
            other => return Err(VBucketStateError::UnknownState(other.to_string())),
        };
        Ok(VBucketStateDoc {
            state,
            checkpoint_id: parse_u64("checkpoint_id", &wire.checkpoint_id)?,
            max_deleted_seqno: parse_u64("max_deleted_seqno", &wire.max_deleted_seqno)?,
            high_seqno: 0, // not part of the wire schema; filled in by the caller from file info
            purge_seqno: 0,
            snap_start: parse_u64("snap_start", &wire.snap_start)?,
            snap_end: parse_u64("snap_end", &wire.snap_end)?,
            max_cas: Cas::from_wire(parse_u64("max_cas", &wire.max_cas)?),
            hlc_epoch: HlcEpochSeqno(parse_i64("hlc_epoch", &wire.hlc_epoch)?),
            might_contain_xattrs: wire.might_contain_xattrs,
            failover_table: wire.failover_table.unwrap_or(serde_json::Value::Array(Vec::new())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let mut doc = VBucketStateDoc {
            state: VBucketState::Active,
            checkpoint_id: 42,
            max_deleted_seqno: 7,
            high_seqno: 100,
            purge_seqno: 3,
            snap_start: 90,
            snap_end: 100,
            max_cas: Cas(555),
            hlc_epoch: HlcEpochSeqno(10),
            might_contain_xattrs: true,
            failover_table: serde_json::json!([{"uuid": 1, "seq": 0}]),
        };
        let bytes = doc.to_json_bytes();
        let parsed = VBucketStateDoc::from_json_bytes(&bytes).unwrap();
        // high_seqno/purge_seqno come from file info, not the wire schema.
        doc.high_seqno = 0;
        doc.purge_seqno = 0;
        assert_eq!(parsed, doc);
    }

    #[test]
    fn max_cas_sentinel_normalises_to_zero() {
        let bytes = br#"{"state":"active","checkpoint_id":"0","max_deleted_seqno":"0",
            "snap_start":"0","snap_end":"0","max_cas":"18446744073709551615",
            "hlc_epoch":"-1","might_contain_xattrs":false}"#;
        let parsed = VBucketStateDoc::from_json_bytes(bytes).unwrap();
        assert_eq!(parsed.max_cas, Cas(0));
    }

    #[test]
    fn integers_are_decimal_strings_on_the_wire() {
        let doc = VBucketStateDoc::default();
        let bytes = doc.to_json_bytes();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert!(value["checkpoint_id"].is_string());
        assert!(value["max_cas"].is_string());
    }
}
