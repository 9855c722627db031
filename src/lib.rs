//! # listenvisor
//!
//! **Listenvisor** provisions short-lived, filtered listeners on a streaming
//! SQL engine and tears each one down the moment it fires.
//!
//! A listener is a pair of engine objects: a filtered view over an event log
//! and a sink that publishes every row of that view to a trigger topic. When a
//! matching record is appended, the sink emits a trigger message naming its own
//! view and sink; a consumer reads it and drops both objects.
//!
//! ## Architecture
//! ```text
//!  SpecSource (SpecGenerator / SpecQueue)
//!        │ ListenerSpec { view_name, sink_name, predicate }
//!        ▼
//! ┌──────────────────────────────┐        ┌──────────────────────────────┐
//! │ RegistrarPool  (N workers)   │        │ TriggerConsumer (M workers)  │
//! │  reserve slot ─► Registrar   │        │  recv ─► decode ─► Teardown  │
//! │   create_view ─► create_sink │        │   drop_sink ─► drop_view     │
//! │   (compensating drop_view)   │        │   commit on success          │
//! └──────┬───────────────────────┘        └──────▲───────────────┬───────┘
//!        │ DDL                                   │ TriggerMessage│ DDL
//!        ▼                                       │               ▼
//! ┌──────────────────────────────────────────────┴───────────────────────┐
//! │ Engine (PgEngine / MemoryEngine)  view ─► sink ─► trigger channel    │
//! └──────────────────────────────────────────────────────────────────────┘
//!
//! Both pools publish Events ─► Bus ─► SubscriberSet ─► LogWriter / custom
//! ```
//!
//! ## Features
//! | Area           | Description                                                | Key types / traits                           |
//! |----------------|------------------------------------------------------------|----------------------------------------------|
//! | **Naming**     | Collision-free engine identifiers.                         | [`ObjectName`], [`NamePrefix`], [`new_name`] |
//! | **Listeners**  | Typed predicates and the trigger message format.           | [`ListenerSpec`], [`TriggerMessage`]         |
//! | **Engine**     | DDL seam with Postgres-wire and in-memory implementations. | [`Engine`], [`MemoryEngine`]                 |
//! | **Channel**    | Consumer-group trigger delivery.                           | [`TriggerChannel`], [`MemoryTopic`]          |
//! | **Pools**      | Bounded registration and consumption worker groups.        | [`RegistrarPool`], [`TriggerConsumer`]       |
//! | **One-shot**   | Sink-less listener that delivers at most one row.          | [`Registrar::listen_once`], [`FirstMatch`]   |
//! | **Events**     | Lifecycle events fanned out to subscribers.                | [`Event`], [`Subscribe`], [`LogWriter`]      |
//! | **Config**     | Runtime settings with documented defaults.                 | [`Config`]                                   |
//!
//! ## Optional features
//! - `postgres` _(default)_: [`PgEngine`] over `deadpool-postgres`.
//! - `kafka` _(default)_: [`KafkaChannel`] over `rdkafka`.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use listenvisor::{
//!     Bus, LogRecord, MemoryEngine, MemoryTopic, ObjectName, Registrar, RegistrarPool,
//!     SelectorPool, SinkTarget, SpecGenerator, TriggerConsumer,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let topic = MemoryTopic::new();
//!     let engine = Arc::new(MemoryEngine::default());
//!     engine.attach_topic("triggers", topic.clone());
//!
//!     let registrar = Registrar::new(
//!         engine.clone(),
//!         ObjectName::default_source(),
//!         SinkTarget { broker: "redpanda:29092".into(), topic: "triggers".into() },
//!     );
//!     let pool = RegistrarPool::new(registrar, Bus::default(), 4, Some(8));
//!     let created = pool
//!         .run(Arc::new(SpecGenerator::new(SelectorPool::default())), &CancellationToken::new())
//!         .await?;
//!     assert_eq!(created.succeeded, 8);
//!
//!     // Fire every listener that watches the first resource and lead.
//!     let pool = SelectorPool::default();
//!     for ty in ["tg_start", "tg_send_text"] {
//!         engine.append(LogRecord::inbound(pool.resources()[0], pool.leads()[0], ty, "hi", i64::MAX));
//!     }
//!     topic.close();
//!
//!     let consumer = TriggerConsumer::new(topic, engine.clone(), Bus::default(), 1);
//!     let torn_down = consumer.run(&CancellationToken::new()).await?;
//!     assert_eq!(engine.view_count() as u64, 8 - torn_down.succeeded);
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod consumer;
pub mod core;
pub mod engine;
mod error;
pub mod events;
pub mod listener;
mod naming;
mod progress;
pub mod registrar;
pub mod subscribers;
mod teardown;

// ---- Public re-exports ----

pub use channel::{Delivery, MemoryTopic, TriggerChannel, TriggerSource};
pub use consumer::{Handled, TriggerConsumer};
pub use self::core::{Config, ConsumerConfig, EngineConfig, RegistrarConfig, SinkConfig, WorkerGroup};
pub use engine::{Engine, EngineRef, MemoryEngine, SinkDefinition, SinkTarget, ViewDefinition};
pub use error::{
    ChannelError, DecodeError, EngineError, NameError, RegistrationError, RuntimeError, SpecError,
    TeardownError,
};
pub use events::{Bus, Event, EventKind};
pub use listener::{
    ListenerSpec, LogRecord, Predicate, RegisteredListener, SelectorPool, Selectors,
    TriggerMessage, TypeSet, build_spec,
};
pub use naming::{DEFAULT_SOURCE, MAX_IDENT_LEN, NamePrefix, ObjectName, new_name};
pub use progress::{MAX_PROGRESS, Progress, ProgressCounter, Reservation};
pub use registrar::{FirstMatch, Registrar, RegistrarPool, SpecGenerator, SpecQueue, SpecSource};
pub use subscribers::{LogWriter, Subscribe, SubscriberSet};
pub use teardown::{TeardownCoordinator, TeardownOutcome};

#[cfg(feature = "kafka")]
pub use channel::KafkaChannel;
#[cfg(feature = "postgres")]
pub use engine::PgEngine;
