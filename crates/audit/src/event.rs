//! The audit event record and the real-user identity it carries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The real user on whose behalf an audited action ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Authentication domain (e.g. `local`, `external`).
    pub domain: String,
    /// User name within that domain.
    pub user: String,
}

/// One audit record: an id identifying the event type, a timestamp, the
/// identity the action ran as, and an event-specific JSON payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Numeric event type id, matched against an [`crate::descriptor::EventDescriptor`].
    pub event_id: u32,
    /// Time the event was raised.
    pub timestamp: DateTime<Utc>,
    /// The real user the audited action ran as.
    pub identity: Identity,
    /// Event-specific fields, serialised as one JSON line.
    pub payload: serde_json::Value,
}

impl AuditEvent {
    /// Build an event stamped with the current time.
    pub fn new(event_id: u32, identity: Identity, payload: serde_json::Value) -> Self {
        AuditEvent { event_id, timestamp: Utc::now(), identity, payload }
    }

    /// Render as a single JSON-lines record (no trailing newline).
    pub fn to_json_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Well-known event id for the "daemon is shutting down" record enqueued
/// immediately before the stop flag is set.
pub const EVENT_ID_SHUTTING_DOWN: u32 = 0x0000_0001;

/// Well-known event id for the "configuration applied" record re-emitted
/// after a successful reconfigure.
pub const EVENT_ID_CONFIGURED: u32 = 0x0000_0002;

/// The identity audit events raise internally on their own behalf (daemon
/// lifecycle events have no real user attached).
pub fn daemon_identity() -> Identity {
    Identity { domain: "internal".to_string(), user: "auditd".to_string() }
}
