//! Event descriptors: the catalogue of known event ids, names and
//! descriptions, loaded from `<descriptors_path>/audit_events.json`.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use vbstore_core::{Error, Result};

/// One entry in the descriptor catalogue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDescriptor {
    /// Numeric event type id.
    pub id: u32,
    /// Short machine name, e.g. `document_read`.
    pub name: String,
    /// Human-readable description.
    pub description: String,
}

#[derive(Deserialize)]
struct DescriptorFile {
    events: Vec<EventDescriptor>,
}

/// Load `<descriptors_dir>/audit_events.json`.
pub fn load_descriptors(descriptors_dir: &Path) -> Result<Vec<EventDescriptor>> {
    let path = descriptors_dir.join("audit_events.json");
    let text = fs::read_to_string(&path).map_err(|e| Error::ReadFailed { reason: format!("{}: {e}", path.display()) })?;
    let parsed: DescriptorFile =
        serde_json::from_str(&text).map_err(|e| Error::FileCorrupt(format!("malformed descriptor file {}: {e}", path.display())))?;
    Ok(parsed.events)
}
