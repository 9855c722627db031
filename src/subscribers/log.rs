//! # LogWriter: events to `tracing`
//!
//! Maps every [`Event`] to one structured `tracing` record. Install a
//! `tracing-subscriber` in the binary to see them.
//!
//! ## Example output (fmt layer)
//! ```text
//! INFO  worker started worker="registrar-0"
//! INFO  listener registered worker="registrar-0" view="view_4f0c..." sink="sink_91ab..."
//! WARN  registration failed worker="registrar-2" label="registration_create_view" reason="..."
//! INFO  listener torn down worker="consumer-1" view="view_4f0c..." sink="sink_91ab..."
//! INFO  target reached progress=10000/10012
//! ```

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let worker = e.worker.as_deref().unwrap_or("-");
        let view = e.view.as_deref().unwrap_or("-");
        let sink = e.sink.as_deref().unwrap_or("-");
        let label = e.label.unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("");

        match e.kind {
            EventKind::WorkerStarted => info!(worker, "worker started"),
            EventKind::WorkerStopped => info!(worker, reason, "worker stopped"),
            EventKind::ListenerRegistered => {
                info!(worker, view, sink, workflow_id = ?e.workflow_id, "listener registered")
            }
            EventKind::RegistrationFailed => {
                warn!(worker, view, sink, label, reason, "registration failed")
            }
            EventKind::OrphanDropped => {
                warn!(worker, view, sink, reason, "sink failed, view dropped")
            }
            EventKind::CompensationFailed => {
                error!(worker, view, sink, reason, "view orphaned")
            }
            EventKind::TargetReached => {
                let progress = e.progress.unwrap_or_default();
                info!(%progress, "target reached")
            }
            EventKind::TriggerReceived => {
                debug!(worker, view, sink, workflow_id = ?e.workflow_id, "trigger received")
            }
            EventKind::TriggerDecodeFailed => {
                warn!(worker, label, reason, "trigger skipped")
            }
            EventKind::ListenerTornDown => {
                info!(worker, view, sink, workflow_id = ?e.workflow_id, "listener torn down")
            }
            EventKind::DuplicateTrigger => {
                info!(worker, view, sink, "listener already torn down")
            }
            EventKind::TeardownFailed => {
                warn!(worker, view, sink, label, reason, "teardown failed")
            }
            EventKind::ChannelFailed => error!(worker, label, reason, "trigger channel failed"),
            EventKind::ShutdownRequested => info!(group = worker, "shutdown requested"),
            EventKind::AllStoppedWithin => info!(group = worker, "all workers stopped within grace"),
            EventKind::GraceExceeded => {
                error!(group = worker, grace_ms = ?e.timeout_ms, stuck = reason, "grace exceeded")
            }
            EventKind::SubscriberOverflow => {
                warn!(subscriber = worker, reason, "subscriber overflow")
            }
            EventKind::SubscriberPanicked => {
                error!(subscriber = worker, reason, "subscriber panicked")
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
