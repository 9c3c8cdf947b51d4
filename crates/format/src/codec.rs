//! Packs and unpacks the versioned document metadata blob.
//!
//! The on-disk layout is a stable little-endian encoding whose version is
//! discriminated by its encoded length, not an explicit tag byte:
//!
//! - V0 (24 bytes): `flags(4) expiry(4) cas(8) rev_seqno(8)`
//! - V1 (26 bytes): V0 + `flex_code(1) datatype(1)`
//!
//! `by_seqno`, `hlc_cas_epoch_seqno`, `might_contain_xattrs` and `deleted`
//! are carried in the file adapter's record envelope, not in this blob —
//! they are positional/lifecycle facts about the record, not attributes of
//! the value itself.

use byteorder::{ByteOrder, LittleEndian};
use vbstore_core::{Cas, Datatype, MetaVersion};

use crate::docinfo::DocInfo;

/// The flex-code byte written into every V1 metadata blob. Reserved for
/// future per-record flex-framing; currently always zero.
pub const FLEX_CODE: u8 = 0x00;

/// A decoded metadata blob, prior to being merged with envelope fields
/// into a full [`DocInfo`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedMeta {
    /// Caller-opaque flags.
    pub flags: u32,
    /// Expiry, seconds since epoch (0 = never).
    pub expiry: u32,
    /// Compare-and-swap value.
    pub cas: Cas,
    /// Revision sequence number.
    pub rev_seqno: u64,
    /// Datatype, if the blob was V1; `None` for V0 (not yet known).
    pub datatype: Option<Datatype>,
}

/// Encode the versioned metadata blob for a V0 record.
pub fn encode_v0(flags: u32, expiry: u32, cas: Cas, rev_seqno: u64) -> Vec<u8> {
    let mut buf = vec![0u8; MetaVersion::V0.encoded_len()];
    LittleEndian::write_u32(&mut buf[0..4], flags);
    LittleEndian::write_u32(&mut buf[4..8], expiry);
    LittleEndian::write_u64(&mut buf[8..16], cas.0);
    LittleEndian::write_u64(&mut buf[16..24], rev_seqno);
    buf
}

/// Encode the versioned metadata blob for a V1 record.
pub fn encode_v1(flags: u32, expiry: u32, cas: Cas, rev_seqno: u64, datatype: Datatype) -> Vec<u8> {
    let mut buf = vec![0u8; MetaVersion::V1.encoded_len()];
    LittleEndian::write_u32(&mut buf[0..4], flags);
    LittleEndian::write_u32(&mut buf[4..8], expiry);
    LittleEndian::write_u64(&mut buf[8..16], cas.0);
    LittleEndian::write_u64(&mut buf[16..24], rev_seqno);
    buf[24] = FLEX_CODE;
    buf[25] = datatype.bits();
    buf
}

/// Errors decoding a metadata blob.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The blob's length matches neither V0 nor V1.
    #[error("metadata blob has invalid length {0}")]
    BadLength(usize),
}

/// Decode a metadata blob, dispatching on its length per the documented
/// version-by-length contract.
pub fn decode(blob: &[u8]) -> Result<DecodedMeta, DecodeError> {
    let version =
        MetaVersion::from_encoded_len(blob.len()).ok_or(DecodeError::BadLength(blob.len()))?;
    let flags = LittleEndian::read_u32(&blob[0..4]);
    let expiry = LittleEndian::read_u32(&blob[4..8]);
    let cas = Cas(LittleEndian::read_u64(&blob[8..16]));
    let rev_seqno = LittleEndian::read_u64(&blob[16..24]);
    let datatype = match version {
        MetaVersion::V0 => None,
        MetaVersion::V1 => Some(Datatype::from_bits(blob[25])),
    };
    Ok(DecodedMeta { flags, expiry, cas, rev_seqno, datatype })
}

/// Determine whether `body` is well-formed JSON text.
///
/// Used both to classify freshly-written V0-free documents and to upgrade
/// legacy V0 records that never recorded a datatype.
pub fn determine_datatype(body: &[u8]) -> Datatype {
    if body.is_empty() {
        return Datatype::default();
    }
    match serde_json::from_slice::<serde_json::Value>(body) {
        Ok(_) => Datatype::from_bits(Datatype::JSON),
        Err(_) => Datatype::default(),
    }
}

/// Upgrade a V0 docinfo (no recorded datatype) to V1 by inspecting the
/// document body.
///
/// `body` must already be decompressed if the legacy record claimed
/// compression (V0 documents predate the compressed bit and are never
/// compressed in this engine's own write path, but an imported V0 blob
/// could be). The returned docinfo is a fully independent value; there is
/// no packed single-allocation representation to preserve since nothing
/// here takes string views into a shared buffer.
pub fn upgrade(mut docinfo: DocInfo, body: &[u8]) -> DocInfo {
    if docinfo.datatype.bits() == Datatype::RAW {
        docinfo.datatype = determine_datatype(body);
    }
    docinfo
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v0_round_trips() {
        let blob = encode_v0(7, 123, Cas(99), 5);
        assert_eq!(blob.len(), MetaVersion::V0.encoded_len());
        let decoded = decode(&blob).unwrap();
        assert_eq!(decoded.flags, 7);
        assert_eq!(decoded.expiry, 123);
        assert_eq!(decoded.cas, Cas(99));
        assert_eq!(decoded.rev_seqno, 5);
        assert!(decoded.datatype.is_none());
    }

    #[test]
    fn v1_round_trips_with_datatype() {
        let dt = Datatype::from_bits(Datatype::JSON | Datatype::XATTR);
        let blob = encode_v1(1, 0, Cas(1), 1, dt);
        assert_eq!(blob.len(), MetaVersion::V1.encoded_len());
        let decoded = decode(&blob).unwrap();
        assert_eq!(decoded.datatype, Some(dt));
    }

    #[test]
    fn bad_length_is_rejected() {
        assert!(matches!(decode(&[0u8; 10]), Err(DecodeError::BadLength(10))));
    }

    #[test]
    fn determine_datatype_recognises_json() {
        assert!(determine_datatype(br#"{"a":1}"#).is_json());
        assert!(!determine_datatype(b"not json").is_json());
        assert!(!determine_datatype(b"").is_json());
    }
}
