//! Document key helpers.
//!
//! Keys are opaque bytes as far as the file format is concerned. The one
//! piece of structure this crate imposes is the optional 1-byte collection
//! namespace prefix controlled by [`Config::persist_doc_namespace`] in the
//! engine crate; the helpers here are shared so the file adapter, the
//! write path, and `getAllKeys`-style callers all agree on the format.

/// A document key as it appears on disk: an optional leading namespace
/// byte followed by the caller's raw key bytes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocKey(Vec<u8>);

impl DocKey {
    /// Wrap raw bytes as a document key with no namespace prefix applied.
    pub fn from_raw(bytes: impl Into<Vec<u8>>) -> DocKey {
        DocKey(bytes.into())
    }

    /// Prefix `raw` with a single namespace byte.
    pub fn with_namespace(namespace: u8, raw: &[u8]) -> DocKey {
        let mut buf = Vec::with_capacity(raw.len() + 1);
        buf.push(namespace);
        buf.extend_from_slice(raw);
        DocKey(buf)
    }

    /// The bytes as stored on disk.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Strip a leading namespace byte, if `persist_doc_namespace` is in
    /// effect. Returns the raw caller key without it.
    pub fn strip_namespace(&self) -> &[u8] {
        if self.0.is_empty() {
            &self.0
        } else {
            &self.0[1..]
        }
    }

    /// Consume and return the owned on-disk bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl From<Vec<u8>> for DocKey {
    fn from(bytes: Vec<u8>) -> Self {
        DocKey(bytes)
    }
}

impl AsRef<[u8]> for DocKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
