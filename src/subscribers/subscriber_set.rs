//! # Non-blocking event fan-out to multiple subscribers.
//!
//! Provides [`SubscriberSet`], which distributes events to multiple subscribers
//! concurrently without blocking the publisher.
//!
//! ## Architecture
//! ```text
//! Bus ──► listen() ──► emit(event)
//!                          │
//!                          ├──► [queue 1] ──► worker 1 ──► subscriber1.on_event()
//!                          │    (bounded)         └──────► panic → SubscriberPanicked
//!                          └──► [queue N] ──► worker N ──► subscriberN.on_event()
//!                               (bounded)
//! ```
//!
//! ## Rules
//! - **No cross-subscriber ordering**: subscriber A may process event N while B processes N+5
//! - **Overflow**: event dropped for that subscriber only, `SubscriberOverflow` published
//! - **Non-blocking**: `emit()` returns immediately (uses `try_send`)
//! - **Isolation**: slow/panicking subscriber doesn't affect others
//! - **Per-subscriber FIFO**: each subscriber sees events in order
//!
//! **Warning**: `AssertUnwindSafe` is used, which can leave shared state inconsistent
//! if a subscriber uses `Arc<Mutex<T>>` and panics while holding the lock.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;
use tokio::sync::broadcast::error::RecvError;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::events::{Bus, Event};
use crate::subscribers::Subscribe;

/// One subscriber's queue and its drop count.
struct SubscriberChannel {
    name: &'static str,
    sender: mpsc::Sender<Arc<Event>>,
    dropped: AtomicU64,
}

/// Fan-out coordinator for multiple event subscribers.
pub struct SubscriberSet {
    channels: Vec<SubscriberChannel>,
    workers: Vec<JoinHandle<()>>,
    bus: Bus,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Drives one subscriber until its queue closes; panics are reported, not propagated.
async fn drive(sub: Arc<dyn Subscribe>, mut rx: mpsc::Receiver<Arc<Event>>, bus: Bus) {
    while let Some(ev) = rx.recv().await {
        let handled = AssertUnwindSafe(sub.on_event(ev.as_ref()))
            .catch_unwind()
            .await;
        if let Err(payload) = handled {
            bus.publish(Event::subscriber_panicked(sub.name(), panic_message(&*payload)));
        }
    }
}

impl SubscriberSet {
    /// Creates a new set and spawns one worker task per subscriber.
    ///
    /// Each subscriber gets a bounded queue (capacity from
    /// [`Subscribe::queue_capacity`], minimum 1) and a dedicated worker that
    /// runs until the queue is closed.
    #[must_use]
    pub fn new(subs: Vec<Arc<dyn Subscribe>>, bus: Bus) -> Self {
        let (channels, workers) = subs
            .into_iter()
            .map(|sub| {
                let (sender, rx) = mpsc::channel(sub.queue_capacity().max(1));
                let channel = SubscriberChannel {
                    name: sub.name(),
                    sender,
                    dropped: AtomicU64::new(0),
                };
                (channel, tokio::spawn(drive(sub, rx, bus.clone())))
            })
            .unzip();
        Self {
            channels,
            workers,
            bus,
        }
    }

    /// Emits an event to all subscribers (clones the event).
    pub fn emit(&self, event: &Event) {
        self.emit_arc(Arc::new(event.clone()));
    }

    /// Emits a pre-allocated `Arc<Event>` to all subscribers.
    ///
    /// A full or closed queue drops the event for that subscriber only and
    /// publishes `SubscriberOverflow`, unless the dropped event was itself an
    /// overflow report.
    pub fn emit_arc(&self, event: Arc<Event>) {
        for channel in &self.channels {
            let reason = match channel.sender.try_send(Arc::clone(&event)) {
                Ok(()) => continue,
                Err(mpsc::error::TrySendError::Full(_)) => "full",
                Err(mpsc::error::TrySendError::Closed(_)) => "closed",
            };
            channel.dropped.fetch_add(1, Ordering::Relaxed);
            if !event.is_subscriber_overflow() {
                self.bus
                    .publish(Event::subscriber_overflow(channel.name, reason));
            }
        }
    }

    /// Events dropped so far for the subscriber called `name`.
    pub fn dropped(&self, name: &str) -> u64 {
        self.channels
            .iter()
            .filter(|c| c.name == name)
            .map(|c| c.dropped.load(Ordering::Relaxed))
            .sum()
    }

    /// Forwards bus events to this set until `stop` is cancelled.
    ///
    /// On stop, events already queued on the bus are still delivered, then
    /// the set is [`shutdown`](Self::shutdown). Await the returned handle to
    /// make sure subscribers have seen everything published before `stop`.
    ///
    /// If the bus overruns the listener, the oldest events are skipped for
    /// every subscriber and the gap is logged as a `tracing` warning.
    pub fn listen(self, bus: &Bus, stop: CancellationToken) -> JoinHandle<()> {
        let mut rx = bus.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    ev = rx.recv() => match ev {
                        Ok(ev) => self.emit(&ev),
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "event listener lagged behind the bus; events skipped");
                        }
                        Err(RecvError::Closed) => break,
                    },
                    _ = stop.cancelled() => {
                        while let Ok(ev) = rx.try_recv() {
                            self.emit(&ev);
                        }
                        break;
                    }
                }
            }
            self.shutdown().await;
        })
    }

    /// Closes every queue and waits for the subscriber workers to drain them.
    pub async fn shutdown(self) {
        drop(self.channels);
        for h in self.workers {
            let _ = h.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<EventKind>>);

    #[async_trait]
    impl Subscribe for Recorder {
        async fn on_event(&self, ev: &Event) {
            self.0.lock().unwrap().push(ev.kind);
        }
        fn name(&self) -> &'static str {
            "recorder"
        }
    }

    struct Panicker;

    #[async_trait]
    impl Subscribe for Panicker {
        async fn on_event(&self, ev: &Event) {
            if ev.kind == EventKind::WorkerStarted {
                panic!("boom");
            }
        }
        fn name(&self) -> &'static str {
            "panicker"
        }
    }

    #[tokio::test]
    async fn test_listen_delivers_everything_published_before_stop() {
        let bus = Bus::new(64);
        let rec = Arc::new(Recorder::default());
        let set = SubscriberSet::new(vec![rec.clone(), Arc::new(Panicker)], bus.clone());
        let stop = CancellationToken::new();
        let handle = set.listen(&bus, stop.clone());

        bus.publish(Event::new(EventKind::WorkerStarted));
        bus.publish(Event::new(EventKind::WorkerStopped));
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        stop.cancel();
        handle.await.unwrap();

        let seen = rec.0.lock().unwrap().clone();
        assert!(seen.starts_with(&[EventKind::WorkerStarted, EventKind::WorkerStopped]));
        assert!(seen.contains(&EventKind::SubscriberPanicked));
    }

    #[tokio::test]
    async fn test_lagging_listener_keeps_newest_events() {
        let bus = Bus::new(2);
        let rec = Arc::new(Recorder::default());
        let set = SubscriberSet::new(vec![rec.clone()], bus.clone());
        let stop = CancellationToken::new();
        let handle = set.listen(&bus, stop.clone());

        for _ in 0..4 {
            bus.publish(Event::new(EventKind::TriggerReceived));
        }
        bus.publish(Event::new(EventKind::ListenerTornDown));
        stop.cancel();
        handle.await.unwrap();

        let seen = rec.0.lock().unwrap().clone();
        assert_eq!(seen, vec![EventKind::TriggerReceived, EventKind::ListenerTornDown]);
    }

    struct Stalled;

    #[async_trait]
    impl Subscribe for Stalled {
        async fn on_event(&self, _ev: &Event) {
            std::future::pending::<()>().await;
        }
        fn name(&self) -> &'static str {
            "stalled"
        }
        fn queue_capacity(&self) -> usize {
            1
        }
    }

    #[tokio::test]
    async fn test_full_queue_drops_and_reports() {
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();
        let set = SubscriberSet::new(vec![Arc::new(Stalled)], bus.clone());
        for _ in 0..3 {
            set.emit(&Event::new(EventKind::TriggerReceived));
        }
        assert_eq!(set.dropped("stalled"), 2);
        assert_eq!(set.dropped("other"), 0);
        let ev = rx.try_recv().unwrap();
        assert!(ev.is_subscriber_overflow());
        assert_eq!(ev.worker.as_deref(), Some("stalled"));
    }
}
