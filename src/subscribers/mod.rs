//! # Event subscribers.
//!
//! ```text
//! Event flow:
//!   workers ── publish(Event) ──► Bus ──► SubscriberSet::listen ──► SubscriberSet
//!                                                                 ┌─────┴─────┐
//!                                                                 ▼           ▼
//!                                                             LogWriter    custom
//! ```
//!
//! - [`Subscribe`]: trait for event handlers.
//! - [`SubscriberSet`]: per-subscriber queues, panic isolation.
//! - [`LogWriter`]: maps events to `tracing` records.

mod log;
mod subscribe;
mod subscriber_set;

pub use log::LogWriter;
pub use subscribe::Subscribe;
pub use subscriber_set::SubscriberSet;
