#![warn(missing_docs)]
//! Security-relevant event pipeline: many producers, one consumer thread,
//! a durable rotated JSON-lines log.

pub mod config;
pub mod descriptor;
pub mod event;
pub mod listeners;
pub mod log;
pub mod pipeline;
pub mod queue;

pub use config::AuditConfig;
pub use descriptor::{load_descriptors, EventDescriptor};
pub use event::{daemon_identity, AuditEvent, Identity, EVENT_ID_CONFIGURED, EVENT_ID_SHUTTING_DOWN};
pub use listeners::StateListeners;
pub use log::AuditLog;
pub use pipeline::AuditPipeline;
pub use queue::{Drained, EventQueue, QueuedItem};
