//! # Runtime events emitted by workers, the registrar, and the consumer.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Worker events**: worker started/stopped inside a worker group
//! - **Registration events**: listener registered, failures, compensation
//! - **Trigger events**: trigger received, decode failures, teardown outcomes
//! - **Shutdown events**: shutdown requested, stopped within grace, grace exceeded
//!
//! The [`Event`] struct carries additional metadata such as timestamps, worker
//! name, listener object names, reasons, and progress snapshots.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use listenvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::ListenerRegistered)
//!     .with_worker("registrar-3")
//!     .with_view("view_ab")
//!     .with_sink("sink_cd");
//!
//! assert_eq!(ev.kind, EventKind::ListenerRegistered);
//! assert_eq!(ev.view.as_deref(), Some("view_ab"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

use uuid::Uuid;

use crate::progress::Progress;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `worker`: subscriber name
    /// - `reason`: panic info/message
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `worker`: subscriber name
    /// - `reason`: reason string (e.g., "full", "closed")
    SubscriberOverflow,

    // === Shutdown events ===
    /// Shutdown requested (token cancelled).
    ///
    /// Sets:
    /// - `worker`: group name
    ShutdownRequested,

    /// All workers stopped within the configured grace period.
    ///
    /// Sets:
    /// - `worker`: group name
    AllStoppedWithin,

    /// Grace period exceeded; some workers did not stop in time.
    ///
    /// Sets:
    /// - `worker`: group name
    /// - `reason`: stuck worker names
    /// - `timeout_ms`: grace period
    GraceExceeded,

    // === Worker events ===
    /// Worker task started.
    ///
    /// Sets:
    /// - `worker`: worker name
    WorkerStarted,

    /// Worker task finished (work exhausted, target reached, or cancelled).
    ///
    /// Sets:
    /// - `worker`: worker name
    /// - `reason`: why it stopped (optional)
    WorkerStopped,

    // === Registration events ===
    /// View and sink were created.
    ///
    /// Sets:
    /// - `worker`, `view`, `sink`, `workflow_id`
    ListenerRegistered,

    /// Registration failed; nothing was left behind.
    ///
    /// Sets:
    /// - `worker`, `view`, `sink`, `label`, `reason`
    RegistrationFailed,

    /// Sink creation failed and the view was dropped again.
    ///
    /// Sets:
    /// - `worker`, `view`, `sink`, `reason`
    OrphanDropped,

    /// Sink creation failed and the view could not be dropped; it is orphaned.
    ///
    /// Sets:
    /// - `worker`, `view`, `sink`, `reason`
    CompensationFailed,

    /// The registration target was reached.
    ///
    /// Sets:
    /// - `progress`: final tally
    TargetReached,

    // === Trigger events ===
    /// A trigger message was received and decoded.
    ///
    /// Sets:
    /// - `worker`, `view`, `sink`, `workflow_id`
    TriggerReceived,

    /// A delivery could not be decoded and was skipped.
    ///
    /// Sets:
    /// - `worker`, `label`, `reason`
    TriggerDecodeFailed,

    /// View and sink were removed.
    ///
    /// Sets:
    /// - `worker`, `view`, `sink`, `workflow_id`
    ListenerTornDown,

    /// Both objects were already gone (duplicate delivery).
    ///
    /// Sets:
    /// - `worker`, `view`, `sink`, `workflow_id`
    DuplicateTrigger,

    /// Teardown failed; the listener stays in place.
    ///
    /// Sets:
    /// - `worker`, `view`, `sink`, `label`, `reason`
    TeardownFailed,

    /// The trigger channel failed; the worker stops reading.
    ///
    /// Sets:
    /// - `worker`, `label`, `reason`
    ChannelFailed,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Name of the worker (or group / subscriber), if applicable.
    pub worker: Option<Arc<str>>,
    /// Listener view name.
    pub view: Option<Arc<str>>,
    /// Listener sink name.
    pub sink: Option<Arc<str>>,
    /// Listener workflow id.
    pub workflow_id: Option<Uuid>,
    /// Stable error label (`as_label()` of the error).
    pub label: Option<&'static str>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
    /// Grace or timeout in milliseconds (compact).
    pub timeout_ms: Option<u32>,
    /// Progress snapshot.
    pub progress: Option<Progress>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            worker: None,
            view: None,
            sink: None,
            workflow_id: None,
            label: None,
            reason: None,
            timeout_ms: None,
            progress: None,
        }
    }

    /// Attaches a worker name.
    #[inline]
    pub fn with_worker(mut self, worker: impl Into<Arc<str>>) -> Self {
        self.worker = Some(worker.into());
        self
    }

    /// Attaches a view name.
    #[inline]
    pub fn with_view(mut self, view: impl AsRef<str>) -> Self {
        self.view = Some(Arc::from(view.as_ref()));
        self
    }

    /// Attaches a sink name.
    #[inline]
    pub fn with_sink(mut self, sink: impl AsRef<str>) -> Self {
        self.sink = Some(Arc::from(sink.as_ref()));
        self
    }

    /// Attaches a workflow id.
    #[inline]
    pub fn with_workflow(mut self, id: Uuid) -> Self {
        self.workflow_id = Some(id);
        self
    }

    /// Attaches an error label.
    #[inline]
    pub fn with_label(mut self, label: &'static str) -> Self {
        self.label = Some(label);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a timeout duration (stored as milliseconds).
    #[inline]
    pub fn with_timeout(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.timeout_ms = Some(ms);
        self
    }

    /// Attaches a progress snapshot.
    #[inline]
    pub fn with_progress(mut self, p: Progress) -> Self {
        self.progress = Some(p);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_worker(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_worker(subscriber)
            .with_reason(info)
    }

    #[inline]
    pub fn is_subscriber_overflow(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberOverflow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seq_is_monotonic() {
        let a = Event::new(EventKind::WorkerStarted);
        let b = Event::new(EventKind::WorkerStopped);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn test_timeout_is_clamped() {
        let ev = Event::new(EventKind::GraceExceeded).with_timeout(Duration::from_secs(u64::MAX));
        assert_eq!(ev.timeout_ms, Some(u32::MAX));
    }
}
