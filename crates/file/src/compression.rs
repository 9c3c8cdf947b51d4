//! Body compression for the `COMPRESSED` datatype bit.
//!
//! The source compresses bodies with snappy; this workspace's dependency
//! stack carries zstd instead (the durability crate already uses it for
//! WAL segment payloads), so this backend compresses with zstd and tags
//! the result with the same `COMPRESSED` bit. The bit means "this body
//! needs inflating before use", not "this body is specifically snappy".

use vbstore_core::{Error, Result};

const COMPRESSION_LEVEL: i32 = 3;

/// Compress `body`, for storage with the `COMPRESSED` datatype bit set.
pub fn deflate(body: &[u8]) -> Result<Vec<u8>> {
    zstd::encode_all(body, COMPRESSION_LEVEL).map_err(Error::write_failed)
}

/// Decompress a body previously produced by [`deflate`].
pub fn inflate(body: &[u8]) -> Result<Vec<u8>> {
    zstd::decode_all(body).map_err(|e| Error::FileCorrupt(format!("failed to inflate body: {e}")))
}
