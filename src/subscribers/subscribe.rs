//! # Event subscriber seam.
//!
//! A [`Subscribe`] implementation receives every lifecycle event the
//! registrar and consumer pools publish: listeners registered, orphans left
//! behind, triggers received, teardowns that failed. [`LogWriter`](crate::LogWriter)
//! turns them into `tracing` records; a deployment can add its own, for
//! example to page on [`EventKind::CompensationFailed`](crate::EventKind).
//!
//! The [`SubscriberSet`](crate::subscribers::SubscriberSet) gives each
//! subscriber its own queue and task, so a slow one only delays itself. When
//! its queue is full its events are dropped and a `SubscriberOverflow` event
//! names it.
//!
//! ## Example
//! ```rust
//! use listenvisor::{Event, EventKind, Subscribe};
//! use std::sync::atomic::{AtomicU64, Ordering};
//!
//! #[derive(Default)]
//! struct Orphans(AtomicU64);
//!
//! #[async_trait::async_trait]
//! impl Subscribe for Orphans {
//!     async fn on_event(&self, ev: &Event) {
//!         if ev.kind == EventKind::CompensationFailed {
//!             self.0.fetch_add(1, Ordering::Relaxed);
//!         }
//!     }
//!     fn name(&self) -> &'static str { "orphans" }
//! }
//! ```

use crate::events::Event;
use async_trait::async_trait;

/// Receives lifecycle events on a task of its own.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Handles one event. Events arrive in publication order.
    async fn on_event(&self, event: &Event);

    /// Name used in overflow and panic events.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Capacity of this subscriber's queue.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
