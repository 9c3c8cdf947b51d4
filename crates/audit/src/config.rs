//! The audit daemon's reloadable JSON configuration file.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use vbstore_core::{Error, Result};

/// Parsed form of the audit configuration file.
///
/// Recognised keys: `auditd_enabled`, `descriptors_path`, `log_path`,
/// `rotate_interval`, `version`, `uuid`, `sync`, `enabled`, `disabled`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Master on/off switch for the pipeline.
    pub auditd_enabled: bool,
    /// Directory containing `audit_events.json`.
    pub descriptors_path: PathBuf,
    /// Directory the rotated `audit.log` lives in.
    pub log_path: PathBuf,
    /// Seconds between time-based rotations.
    pub rotate_interval: u64,
    /// Config format version, echoed back in the "configured" event.
    pub version: u32,
    /// Opaque install identifier, echoed back in the "configured" event.
    pub uuid: String,
    /// Event ids that must be flushed synchronously after being written.
    #[serde(default)]
    pub sync: HashSet<u32>,
    /// Event ids explicitly enabled by this config.
    #[serde(default)]
    pub enabled: HashSet<u32>,
    /// Event ids explicitly disabled by this config.
    #[serde(default)]
    pub disabled: HashSet<u32>,
}

impl AuditConfig {
    /// Load and parse a configuration file from `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| Error::ReadFailed { reason: format!("{}: {e}", path.display()) })?;
        serde_json::from_str(&text).map_err(|e| Error::FileCorrupt(format!("malformed audit config {}: {e}", path.display())))
    }

    /// `rotate_interval` as a [`Duration`].
    pub fn rotate_interval(&self) -> Duration {
        Duration::from_secs(self.rotate_interval)
    }
}
