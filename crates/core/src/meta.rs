//! Document metadata types shared between the document codec, the file
//! adapter, and the engine: the datatype bitmask, per-partition lifecycle
//! state, and the V0/V1 metadata version discriminator.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Datatype bitmask over a document's body encoding.
///
/// These bit values are part of the on-disk format and must not change:
/// - `JSON` = 0x01
/// - `COMPRESSED` = 0x02 (snappy)
/// - `XATTR` = 0x04 (body carries extended attributes)
///
/// The absence of any bit (`0x00`) means "raw"/opaque bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Datatype(pub u8);

impl Datatype {
    /// Opaque bytes, no JSON interpretation, not compressed.
    pub const RAW: u8 = 0x00;
    /// Body is well-formed JSON text.
    pub const JSON: u8 = 0x01;
    /// Body is snappy-compressed (semantics of the other bits apply to
    /// the decompressed body).
    pub const COMPRESSED: u8 = 0x02;
    /// Body carries extended attributes (xattrs) ahead of the value.
    pub const XATTR: u8 = 0x04;

    /// Construct from a raw bitmask.
    pub fn from_bits(bits: u8) -> Datatype {
        Datatype(bits)
    }

    /// The raw bitmask.
    pub fn bits(self) -> u8 {
        self.0
    }

    /// Whether the JSON bit is set.
    pub fn is_json(self) -> bool {
        self.0 & Self::JSON != 0
    }

    /// Whether the compressed (snappy) bit is set.
    pub fn is_compressed(self) -> bool {
        self.0 & Self::COMPRESSED != 0
    }

    /// Whether the xattr bit is set.
    pub fn has_xattrs(self) -> bool {
        self.0 & Self::XATTR != 0
    }

    /// Return this datatype with the compressed bit cleared (used after a
    /// caller has requested inflated values and the body was decompressed
    /// on their behalf).
    pub fn without_compression(self) -> Datatype {
        Datatype(self.0 & !Self::COMPRESSED)
    }

    /// Return this datatype with the compressed bit set (used by the scan
    /// path when a compressed body is handed back still compressed).
    pub fn with_compression(self) -> Datatype {
        Datatype(self.0 | Self::COMPRESSED)
    }
}

impl Default for Datatype {
    fn default() -> Self {
        Datatype(Self::RAW)
    }
}

impl fmt::Display for Datatype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if self.is_json() {
            parts.push("json");
        }
        if self.is_compressed() {
            parts.push("snappy");
        }
        if self.has_xattrs() {
            parts.push("xattr");
        }
        if parts.is_empty() {
            write!(f, "raw")
        } else {
            write!(f, "{}", parts.join("|"))
        }
    }
}

/// Lifecycle state of a partition, persisted in `_local/vbstate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VBucketState {
    /// Actively serving reads and writes for this partition.
    Active,
    /// Replica of another node's active partition.
    Replica,
    /// Awaiting ownership handoff.
    Pending,
    /// Not serving traffic.
    Dead,
}

impl fmt::Display for VBucketState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VBucketState::Active => "active",
            VBucketState::Replica => "replica",
            VBucketState::Pending => "pending",
            VBucketState::Dead => "dead",
        };
        write!(f, "{}", s)
    }
}

/// On-disk metadata version, discriminated by the encoded length of the
/// metadata blob rather than an explicit tag byte (matching the legacy
/// wire format this engine is compatible with).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaVersion {
    /// flags, expiry, cas, rev_seqno (24 bytes).
    V0,
    /// V0 plus flex-code and datatype (26 bytes).
    V1,
}

impl MetaVersion {
    /// Encoded length in bytes of this metadata version.
    pub fn encoded_len(self) -> usize {
        match self {
            MetaVersion::V0 => 24,
            MetaVersion::V1 => 26,
        }
    }

    /// Discriminate the version from an encoded length, per the documented
    /// on-disk contract ("version is discriminated by on-disk length").
    pub fn from_encoded_len(len: usize) -> Option<MetaVersion> {
        match len {
            24 => Some(MetaVersion::V0),
            26 => Some(MetaVersion::V1),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn datatype_display_lists_all_bits() {
        let dt = Datatype::from_bits(Datatype::JSON | Datatype::XATTR);
        assert_eq!(dt.to_string(), "json|xattr");
    }

    #[test]
    fn datatype_raw_display() {
        assert_eq!(Datatype::default().to_string(), "raw");
    }

    #[test]
    fn meta_version_round_trips_through_length() {
        assert_eq!(MetaVersion::from_encoded_len(24), Some(MetaVersion::V0));
        assert_eq!(MetaVersion::from_encoded_len(26), Some(MetaVersion::V1));
        assert_eq!(MetaVersion::from_encoded_len(25), None);
    }
}
