//! On-disk encodings shared by the file adapter: the document metadata
//! blob, the `DocInfo` type it hydrates, and the well-known local docs.
//!
//! This crate knows *how bytes are shaped*; it never touches a file
//! descriptor. [`vbstore_file`](../vbstore_file/index.html) is the crate
//! that reads and writes these shapes to disk.

#![warn(missing_docs)]

pub mod codec;
pub mod docinfo;
pub mod localdoc;

pub use codec::{decode, determine_datatype, encode_v0, encode_v1, upgrade, DecodeError, DecodedMeta, FLEX_CODE};
pub use docinfo::DocInfo;
pub use localdoc::{VBucketStateDoc, VBucketStateError, COLLECTIONS_MANIFEST_KEY, VBSTATE_KEY};
