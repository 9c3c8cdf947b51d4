//! The audit daemon: ties the queue, the log, configuration reload and
//! state listeners together behind a single producer-facing handle.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use serde_json::json;
use tracing::{error, info, warn};
use vbstore_core::Result;

use crate::config::AuditConfig;
use crate::event::{daemon_identity, AuditEvent, Identity, EVENT_ID_CONFIGURED, EVENT_ID_SHUTTING_DOWN};
use crate::listeners::StateListeners;
use crate::log::AuditLog;
use crate::queue::{EventQueue, QueuedItem};

/// An event type's current enabled/sync flags, as last set by a config
/// reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct EventState {
    enabled: bool,
    sync: bool,
}

/// The running audit pipeline: one queue, one consumer thread, one log
/// file.
pub struct AuditPipeline {
    queue: Arc<EventQueue>,
    config: Mutex<AuditConfig>,
    event_states: Arc<Mutex<HashMap<u32, EventState>>>,
    listeners: Arc<StateListeners>,
    consumer: Mutex<Option<JoinHandle<()>>>,
    shutdown_sent: AtomicBool,
}

impl AuditPipeline {
    /// Load `config_path`, spawn the consumer, and block until the
    /// consumer signals it is running before returning — so `put_event`
    /// is safe to call the instant this constructor returns.
    pub fn start(config_path: PathBuf, max_queue: usize) -> Result<Arc<Self>> {
        let config = AuditConfig::load(&config_path)?;
        let log = AuditLog::open(&config.log_path)?;

        let queue = Arc::new(EventQueue::new(max_queue));
        let event_states = Arc::new(Mutex::new(apply_config(&config, &HashMap::new(), &StateListeners::new())));
        let listeners = Arc::new(StateListeners::new());

        let pipeline = Arc::new(AuditPipeline {
            queue: Arc::clone(&queue),
            config: Mutex::new(config),
            event_states: Arc::clone(&event_states),
            listeners: Arc::clone(&listeners),
            consumer: Mutex::new(None),
            shutdown_sent: AtomicBool::new(false),
        });

        let running_signal = Arc::new((Mutex::new(false), Condvar::new()));
        let consumer_pipeline = Arc::clone(&pipeline);
        let consumer_running_signal = Arc::clone(&running_signal);
        let config_path_for_thread = config_path;

        let join = thread::Builder::new()
            .name("vbstore-audit-consumer".to_string())
            .spawn(move || consumer_loop(consumer_pipeline, log, config_path_for_thread, consumer_running_signal))
            .expect("failed to spawn audit consumer thread");
        *pipeline.consumer.lock() = Some(join);

        let (lock, cvar) = &*running_signal;
        let mut running = lock.lock();
        while !*running {
            cvar.wait(&mut running);
        }

        Ok(pipeline)
    }

    /// Raise an audit event if its event type is currently enabled.
    pub fn put_event(&self, event_id: u32, identity: Identity, payload: serde_json::Value) {
        if !self.is_enabled(event_id) {
            return;
        }
        self.queue.enqueue(QueuedItem::Record(AuditEvent::new(event_id, identity, payload)));
    }

    /// Whether `event_id` is currently enabled, per the last config load.
    pub fn is_enabled(&self, event_id: u32) -> bool {
        self.event_states.lock().get(&event_id).map(|s| s.enabled).unwrap_or(true)
    }

    /// Number of events dropped so far for queue overflow.
    pub fn dropped_count(&self) -> u64 {
        self.queue.dropped_count()
    }

    /// Register a state-change listener.
    pub fn add_listener(&self, listener: impl Fn(u32, bool) + Send + 'static) {
        self.listeners.register(listener);
    }

    /// Ask the consumer to reload configuration from disk on its next
    /// wake.
    pub fn reconfigure(&self) {
        self.queue.enqueue(QueuedItem::Reconfigure);
    }

    /// Enqueue the "shutting down" record, then set the stop flag and
    /// join the consumer.
    ///
    /// The ordering matters: the shutdown record must be enqueued before
    /// the stop flag is set, so the consumer's next drain still contains
    /// (and writes) it before the loop notices `stop`.
    pub fn shutdown(&self) {
        if self.shutdown_sent.swap(true, Ordering::SeqCst) {
            return;
        }
        self.queue.enqueue(QueuedItem::Record(AuditEvent::new(
            EVENT_ID_SHUTTING_DOWN,
            daemon_identity(),
            json!({"reason": "shutdown requested"}),
        )));
        self.queue.signal_stop();
        if let Some(join) = self.consumer.lock().take() {
            let _ = join.join();
        }
    }
}

/// Recompute every known event's enabled/sync state from `config`,
/// notifying `listeners` of anything that changed relative to `previous`.
fn apply_config(
    config: &AuditConfig,
    previous: &HashMap<u32, EventState>,
    listeners: &StateListeners,
) -> HashMap<u32, EventState> {
    let mut ids: std::collections::HashSet<u32> = previous.keys().copied().collect();
    ids.extend(config.enabled.iter().copied());
    ids.extend(config.disabled.iter().copied());
    ids.extend(config.sync.iter().copied());

    let mut next = HashMap::new();
    for id in ids {
        let enabled = if !config.auditd_enabled {
            false
        } else if config.disabled.contains(&id) {
            false
        } else if config.enabled.contains(&id) {
            true
        } else {
            previous.get(&id).map(|s| s.enabled).unwrap_or(true)
        };
        let sync = config.sync.contains(&id);
        let state = EventState { enabled, sync };
        if previous.get(&id).copied() != Some(state) {
            listeners.notify(id, enabled);
        }
        next.insert(id, state);
    }
    next
}

fn consumer_loop(
    pipeline: Arc<AuditPipeline>,
    mut log: AuditLog,
    config_path: PathBuf,
    running_signal: Arc<(Mutex<bool>, Condvar)>,
) {
    {
        let (lock, cvar) = &*running_signal;
        *lock.lock() = true;
        cvar.notify_one();
    }
    info!("audit consumer thread started");

    let rotate_interval = pipeline.config.lock().rotate_interval();
    let mut next_rotation = std::time::Instant::now() + rotate_interval;

    loop {
        let timeout = next_rotation.saturating_duration_since(std::time::Instant::now());
        let drained = pipeline.queue.wait_and_swap(timeout);

        for item in drained.items {
            match item {
                QueuedItem::Record(event) => {
                    if let Err(e) = log.write_event(&event) {
                        error!(error = %e, "failed to write audit event");
                    }
                }
                QueuedItem::Reconfigure => {
                    reload_and_reemit(&pipeline, &mut log, &config_path);
                }
            }
        }
        if let Err(e) = log.flush() {
            error!(error = %e, "failed to flush audit log");
        }

        if drained.timed_out && std::time::Instant::now() >= next_rotation {
            if let Err(e) = log.rotate() {
                warn!(error = %e, "audit log rotation failed");
            }
            next_rotation = std::time::Instant::now() + pipeline.config.lock().rotate_interval();
        }

        if drained.stop {
            break;
        }
    }
    let _ = log.flush();
    info!("audit consumer thread stopped");
}

fn reload_and_reemit(pipeline: &Arc<AuditPipeline>, log: &mut AuditLog, config_path: &PathBuf) {
    let new_config = match AuditConfig::load(config_path) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "audit config reload failed, keeping previous configuration");
            return;
        }
    };

    let rotate_needed = {
        let current = pipeline.config.lock();
        current.descriptors_path != new_config.descriptors_path || current.log_path != new_config.log_path
    };

    {
        let mut states = pipeline.event_states.lock();
        let updated = apply_config(&new_config, &states, &pipeline.listeners);
        *states = updated;
    }
    *pipeline.config.lock() = new_config;

    if rotate_needed {
        if let Err(e) = log.rotate() {
            warn!(error = %e, "audit log rotation on reconfigure failed");
        }
    }

    if let Err(e) = log.write_event(&AuditEvent::new(
        EVENT_ID_CONFIGURED,
        daemon_identity(),
        json!({"reason": "configuration reloaded"}),
    )) {
        error!(error = %e, "failed to write configured event");
    }
}
