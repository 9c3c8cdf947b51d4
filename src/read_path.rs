//! Point get and multi-get: both open the current revision read-only and
//! route every body fetch through `read_doc`, so every retrieval pays the
//! same decompression and stats accounting regardless of batch size.

use vbstore_core::{DocKey, Error, Result};
use vbstore_file::FileAdapter;
use vbstore_format::DocInfo;

use crate::stats::Stats;

/// A materialised document, ready to hand back to the caller.
#[derive(Debug, Clone)]
pub struct Item {
    /// Full per-document metadata.
    pub info: DocInfo,
    /// The body, or `None` when the caller asked for metadata only.
    pub body: Option<Vec<u8>>,
}

/// Fetch one document by key from an already-open, read-only handle.
///
/// When `meta_only` is set, the body fetch is skipped entirely — the
/// caller gets metadata without paying for a disk read of the value.
pub fn point_get(adapter: &FileAdapter, handle: &mut vbstore_file::Handle, key: &[u8], meta_only: bool, stats: &Stats) -> Result<Item> {
    let info = match adapter.docinfo_by_id(handle, key) {
        Ok(info) => info,
        Err(e) => {
            if !matches!(e, Error::NotFound) {
                stats.record_failure_get();
            }
            return Err(e);
        }
    };

    if meta_only {
        return Ok(Item { info, body: None });
    }

    match adapter.read_doc(handle, &info, true) {
        Ok(body) => {
            stats.add_read_bytes(body.len() as u64);
            stats.record_bg_fetch();
            Ok(Item { info, body: Some(body) })
        }
        Err(e) => {
            stats.record_failure_get();
            Err(e)
        }
    }
}

/// Outcome of one key in a [`multi_get`] batch.
pub enum GetResult {
    /// The key resolved to a document (body present unless `meta_only`).
    Found(Item),
    /// No record exists for this key.
    NotFound,
    /// The open or fetch for this key failed for a reason other than
    /// "not found" (the file itself could not be read).
    Failed(Error),
}

/// Fetch several keys from an already-open, read-only handle.
///
/// Implemented in two passes because `docinfos_by_ids`'s per-key callback
/// only ever sees `&DocInfo`, not a mutable borrow of `handle` — a body
/// fetch inside that callback would need `handle` borrowed twice at once.
/// The first pass collects each key's docinfo (or absence); the second
/// pass, run after the first has returned its borrow of `handle`, fetches
/// bodies one key at a time.
pub fn multi_get(adapter: &FileAdapter, handle: &mut vbstore_file::Handle, keys: &[Vec<u8>], meta_only: bool, stats: &Stats) -> Vec<(Vec<u8>, GetResult)> {
    let mut found: Vec<(Vec<u8>, Option<DocInfo>)> = keys.iter().map(|k| (k.clone(), None)).collect();
    let lookup = adapter.docinfos_by_ids(handle, keys, |key, info| {
        if let Some(slot) = found.iter_mut().find(|(k, _)| k == key) {
            slot.1 = info.cloned();
        }
        Ok(vbstore_core::ScanControl::Continue)
    });

    if let Err(e) = lookup {
        return keys.iter().map(|k| (k.clone(), GetResult::Failed(clone_error(&e)))).collect();
    }

    let mut results = Vec::with_capacity(found.len());
    for (key, info) in found {
        let Some(info) = info else {
            results.push((key, GetResult::NotFound));
            continue;
        };
        if meta_only {
            results.push((key, GetResult::Found(Item { info, body: None })));
            continue;
        }
        match adapter.read_doc(handle, &info, true) {
            Ok(body) => {
                stats.add_read_bytes(body.len() as u64);
                stats.record_bg_fetch();
                results.push((key, GetResult::Found(Item { info, body: Some(body) })));
            }
            Err(e) => {
                stats.record_failure_get();
                results.push((key, GetResult::Failed(e)));
            }
        }
    }
    results
}

/// Collect every live key from `start_key` onward.
///
/// When `restore_namespace` is true, a leading 1-byte namespace prefix is
/// stripped from each key before it's returned, matching
/// [`Config::persist_doc_namespace`](crate::config::Config::persist_doc_namespace).
/// The source this engine is modeled on always strips unconditionally,
/// regardless of whether namespaces are actually persisted; callers here
/// get the documented, configured policy instead of that hard-coded
/// behaviour.
pub fn get_all_keys(adapter: &FileAdapter, handle: &mut vbstore_file::Handle, start_key: &[u8], restore_namespace: bool) -> Result<Vec<Vec<u8>>> {
    let mut keys = Vec::new();
    adapter.all_docs(handle, start_key, |info| {
        let on_disk = DocKey::from_raw(info.key.clone());
        let key = if restore_namespace { on_disk.strip_namespace().to_vec() } else { on_disk.into_bytes() };
        keys.push(key);
        Ok(vbstore_core::ScanControl::Continue)
    })?;
    Ok(keys)
}

/// `Error` carries no `Clone` impl (it wraps OS reason strings built once
/// at the error site); multi-get's all-keys-failed path needs one copy
/// per key, so this rebuilds an equivalent error from its display text.
pub(crate) fn clone_error(e: &Error) -> Error {
    match e {
        Error::NotFound => Error::NotFound,
        Error::NoHeader => Error::NoHeader,
        Error::NoSuchFile(s) => Error::NoSuchFile(s.clone()),
        Error::OpenFailed { reason } => Error::OpenFailed { reason: reason.clone() },
        Error::ReadFailed { reason } => Error::ReadFailed { reason: reason.clone() },
        Error::WriteFailed { reason } => Error::WriteFailed { reason: reason.clone() },
        Error::CloseFailed { reason } => Error::CloseFailed { reason: reason.clone() },
        Error::AllocFailed => Error::AllocFailed,
        Error::FileCorrupt(s) => Error::FileCorrupt(s.clone()),
        Error::Cancelled => Error::Cancelled,
        Error::Conflict(s) => Error::Conflict(s.clone()),
        Error::Invariant(s) => Error::Invariant(s.clone()),
        Error::Other(s) => Error::Other(s.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use vbstore_core::{Cas, Datatype, HlcEpochSeqno, PartitionId, SeqNo};
    use vbstore_file::OpenFlags;

    fn doc(key: &[u8], seq: u64) -> DocInfo {
        DocInfo {
            key: key.to_vec(),
            cas: Cas(1),
            rev_seqno: 1,
            by_seqno: SeqNo(seq),
            expiry: 0,
            flags: 0,
            datatype: Datatype::default(),
            hlc_cas_epoch_seqno: HlcEpochSeqno::UNSET,
            might_contain_xattrs: false,
            deleted: false,
        }
    }

    #[test]
    fn point_get_round_trips_body() {
        let dir = tempdir().unwrap();
        let adapter = FileAdapter;
        let mut handle =
            adapter.open(&dir.path().join("0.couch.1"), PartitionId(0), 1, [0u8; 16], OpenFlags { create: true, ..Default::default() }).unwrap();
        adapter.save_documents(&mut handle, &[(doc(b"a", 1), b"hello".to_vec())], false).unwrap();
        adapter.commit(&mut handle).unwrap();

        let stats = Stats::new();
        let item = point_get(&adapter, &mut handle, b"a", false, &stats).unwrap();
        assert_eq!(item.body, Some(b"hello".to_vec()));
    }

    #[test]
    fn point_get_meta_only_skips_body_fetch() {
        let dir = tempdir().unwrap();
        let adapter = FileAdapter;
        let mut handle =
            adapter.open(&dir.path().join("0.couch.1"), PartitionId(0), 1, [0u8; 16], OpenFlags { create: true, ..Default::default() }).unwrap();
        adapter.save_documents(&mut handle, &[(doc(b"a", 1), b"hello".to_vec())], false).unwrap();
        adapter.commit(&mut handle).unwrap();

        let stats = Stats::new();
        let item = point_get(&adapter, &mut handle, b"a", true, &stats).unwrap();
        assert_eq!(item.body, None);
    }

    #[test]
    fn point_get_missing_key_records_not_found_without_failure_stat() {
        let dir = tempdir().unwrap();
        let adapter = FileAdapter;
        let mut handle =
            adapter.open(&dir.path().join("0.couch.1"), PartitionId(0), 1, [0u8; 16], OpenFlags { create: true, ..Default::default() }).unwrap();

        let stats = Stats::new();
        let err = point_get(&adapter, &mut handle, b"ghost", false, &stats).unwrap_err();
        assert!(matches!(err, Error::NotFound));
        assert_eq!(stats.get_stat("failure_get"), Some(0));
    }

    #[test]
    fn get_all_keys_restores_namespace_only_when_asked() {
        let dir = tempdir().unwrap();
        let adapter = FileAdapter;
        let mut handle =
            adapter.open(&dir.path().join("0.couch.1"), PartitionId(0), 1, [0u8; 16], OpenFlags { create: true, ..Default::default() }).unwrap();
        // A 1-byte namespace prefix (`\x00`) ahead of the logical key, as
        // `persist_doc_namespace` documents.
        adapter.save_documents(&mut handle, &[(doc(b"\x00a", 1), b"1".to_vec()), (doc(b"\x00b", 2), b"2".to_vec())], false).unwrap();
        adapter.commit(&mut handle).unwrap();

        let raw = get_all_keys(&adapter, &mut handle, b"", false).unwrap();
        assert_eq!(raw, vec![b"\x00a".to_vec(), b"\x00b".to_vec()]);

        let restored = get_all_keys(&adapter, &mut handle, b"", true).unwrap();
        assert_eq!(restored, vec![b"a".to_vec(), b"b".to_vec()]);
    }

    #[test]
    fn multi_get_mixes_found_and_not_found() {
        let dir = tempdir().unwrap();
        let adapter = FileAdapter;
        let mut handle =
            adapter.open(&dir.path().join("0.couch.1"), PartitionId(0), 1, [0u8; 16], OpenFlags { create: true, ..Default::default() }).unwrap();
        adapter.save_documents(&mut handle, &[(doc(b"a", 1), b"1".to_vec())], false).unwrap();
        adapter.commit(&mut handle).unwrap();

        let stats = Stats::new();
        let results = multi_get(&adapter, &mut handle, &[b"a".to_vec(), b"missing".to_vec()], false, &stats);
        assert_eq!(results.len(), 2);
        assert!(matches!(results[0].1, GetResult::Found(_)));
        assert!(matches!(results[1].1, GetResult::NotFound));
    }
}
