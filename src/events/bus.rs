//! # Lifecycle event bus.
//!
//! Registrar workers, consumer workers and worker groups report what happens
//! to each listener on one [`Bus`]. The binaries attach a single
//! [`SubscriberSet`](crate::SubscriberSet) through
//! [`listen`](crate::SubscriberSet::listen); tests usually read the bus
//! directly with [`Bus::subscribe`].
//!
//! ```text
//! registrar-*  ─┐
//! consumer-*   ─┼─► Bus (ring of `capacity` events) ─► SubscriberSet ─► LogWriter
//! WorkerGroup  ─┘                                   └─► test receiver
//! ```
//!
//! Publishing never waits on readers. A reader that falls more than
//! `capacity` events behind loses the oldest ones: for the binaries that
//! means the `LogWriter` output has a gap, reported as a single warning with
//! the number of skipped events. Progress totals are kept by the pools'
//! counters, not derived from events, so a gap never changes `total created`
//! or `total torn down`.

use tokio::sync::broadcast;

use super::event::Event;

/// Shared sender for lifecycle events; clones publish to the same ring.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a new bus with the given channel capacity (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _rx) = broadcast::channel::<Event>(capacity);
        Self { tx }
    }

    /// Publishes `ev` to every current receiver; dropped when there are none.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// New receiver; sees events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl Default for Bus {
    /// Bus with capacity 1024.
    fn default() -> Self {
        Self::new(1024)
    }
}
