//! Partition file naming and disk discovery.
//!
//! `<dir>/<partition>.couch.<revision>`; a compaction shadow carries a
//! `.compact` suffix and is never treated as a candidate current revision.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;
use vbstore_core::{PartitionId, Revision};

/// Build the on-disk file name for a partition's revision.
pub fn file_name(dir: &Path, partition: PartitionId, revision: Revision) -> PathBuf {
    dir.join(format!("{}.couch.{}", partition.0, revision.0))
}

/// Build the compaction shadow path for a partition's target revision.
pub fn compact_file_name(dir: &Path, partition: PartitionId, revision: Revision) -> PathBuf {
    dir.join(format!("{}.couch.{}.compact", partition.0, revision.0))
}

/// Parse a file name of the form `<partition>.couch.<revision>` (optionally
/// with a trailing `.compact`), returning `None` for anything else —
/// including names whose partition component is not numeric, per the
/// documented "ignore non-numeric partition" rule.
fn parse_name(name: &str) -> Option<(PartitionId, Revision, bool)> {
    let is_compact = name.ends_with(".compact");
    let base = name.strip_suffix(".compact").unwrap_or(name);
    let mut parts = base.splitn(3, '.');
    let partition_str = parts.next()?;
    let literal_couch = parts.next()?;
    let revision_str = parts.next()?;
    if literal_couch != "couch" {
        return None;
    }
    let partition: u16 = partition_str.parse().ok()?;
    let revision: u64 = revision_str.parse().ok()?;
    Some((PartitionId(partition), Revision(revision), is_compact))
}

/// List every non-`.compact` partition file under `dir`.
pub fn discover(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        match parse_name(&name) {
            Some((_, _, is_compact)) if !is_compact => found.push(entry.path()),
            _ => {}
        }
    }
    Ok(found)
}

/// Result of scanning a directory at startup: the current revision for
/// each partition discovered, plus every stale (non-current) revision file
/// that should be queued for deletion.
pub struct DiscoveredState {
    /// `(partition, current revision)` pairs, one per discovered partition.
    pub current: Vec<(PartitionId, Revision)>,
    /// Paths of older revisions superseded by a higher one for the same
    /// partition; these are safe to unlink once discovery completes.
    pub stale: Vec<PathBuf>,
}

/// Select the max revision per partition from every `.couch` file under
/// `dir`; everything else for that partition is queued in `stale`. Files
/// whose name does not match `<digits>.couch.<digits>` are silently
/// ignored, matching the documented naming contract.
pub fn populate_from_disk(dir: &Path) -> std::io::Result<DiscoveredState> {
    let mut by_partition: HashMap<PartitionId, Vec<(Revision, PathBuf)>> = HashMap::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        match parse_name(&name) {
            Some((partition, revision, is_compact)) if !is_compact => {
                by_partition.entry(partition).or_default().push((revision, entry.path()));
            }
            Some(_) => {
                // A leftover `.compact` shadow from a crash mid-compaction;
                // not a candidate current revision, and not this
                // function's job to clean up (see `remove_compact_file`).
            }
            None => {
                warn!(file = %name, "ignoring file with non-conforming partition file name");
            }
        }
    }

    let mut current = Vec::new();
    let mut stale = Vec::new();
    for (partition, mut revisions) in by_partition {
        revisions.sort_by_key(|(rev, _)| rev.0);
        if let Some((max_rev, max_path)) = revisions.pop() {
            current.push((partition, max_rev));
            let _ = max_path;
        }
        stale.extend(revisions.into_iter().map(|(_, path)| path));
    }

    Ok(DiscoveredState { current, stale })
}

/// Remove a leftover `.compact` shadow file from a crashed compaction.
pub fn remove_compact_file(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn file_name_matches_documented_format() {
        let dir = Path::new("/data");
        let path = file_name(dir, PartitionId(3), Revision(7));
        assert_eq!(path, Path::new("/data/3.couch.7"));
    }

    #[test]
    fn non_numeric_partition_is_ignored() {
        assert!(parse_name("abc.couch.1").is_none());
        assert!(parse_name("3.couch.abc").is_none());
        assert!(parse_name("not_a_couch_file").is_none());
    }

    #[test]
    fn populate_from_disk_picks_max_revision_per_partition() {
        let dir = tempdir().unwrap();
        for name in ["0.couch.1", "0.couch.3", "0.couch.2", "1.couch.1", "0.couch.3.compact", "garbage.txt"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        let state = populate_from_disk(dir.path()).unwrap();
        let mut current = state.current;
        current.sort_by_key(|(p, _)| p.0);
        assert_eq!(current, vec![(PartitionId(0), Revision(3)), (PartitionId(1), Revision(1))]);
        assert_eq!(state.stale.len(), 2);
    }
}
