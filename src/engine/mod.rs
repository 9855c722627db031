//! # Streaming SQL engine abstraction.
//!
//! The [`Engine`] trait is the seam between the listener lifecycle and the
//! continuous-query evaluator. It covers the four DDL operations a listener
//! needs, plus a blocking read for one-shot listeners:
//!
//! ```text
//! register:  create_view(ViewDefinition) ──► create_sink(SinkDefinition)
//!                     ▲                               │ (fails)
//!                     └──────── drop_view ◄───────────┘
//! teardown:  drop_sink ──► drop_view
//! one-shot:  create_view ──► tail_first(view) ──► drop_view
//! ```
//!
//! Implementations:
//! - [`PgEngine`] (feature `postgres`): Postgres-wire engine over a connection pool.
//! - [`MemoryEngine`]: in-process engine that evaluates views and publishes
//!   sink rows to a [`MemoryTopic`](crate::channel::MemoryTopic).
//!
//! Errors are classified so callers can tell "already gone" ([`EngineError::NotFound`])
//! apart from real failures.

pub mod ddl;
pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod sql;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::EngineError;
use crate::listener::TriggerMessage;
use crate::naming::ObjectName;

pub use ddl::{SinkDefinition, SinkTarget, ViewDefinition};
pub use memory::{MemoryEngine, Op};
#[cfg(feature = "postgres")]
pub use postgres::PgEngine;

/// # DDL operations a listener needs from the engine.
///
/// Every method is one engine round-trip. Implementations must be safe to call
/// from many tasks at once.
#[async_trait]
pub trait Engine: Send + Sync + 'static {
    /// Creates a filtered view. Fails with [`EngineError::AlreadyExists`] on a name clash.
    async fn create_view(&self, def: &ViewDefinition) -> Result<(), EngineError>;

    /// Creates a sink from an existing view.
    async fn create_sink(&self, def: &SinkDefinition) -> Result<(), EngineError>;

    /// Drops a view. Fails with [`EngineError::NotFound`] if absent.
    async fn drop_view(&self, name: &ObjectName) -> Result<(), EngineError>;

    /// Drops a sink. Fails with [`EngineError::NotFound`] if absent.
    async fn drop_sink(&self, name: &ObjectName) -> Result<(), EngineError>;

    /// Waits for the first row a view emits and returns it.
    ///
    /// Rows already in the view count. Fails with [`EngineError::NotFound`] if
    /// the view is absent or dropped while waiting.
    async fn tail_first(&self, view: &ObjectName) -> Result<TriggerMessage, EngineError>;

    /// Human-readable engine name (for logs).
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Shared handle to an engine.
pub type EngineRef = Arc<dyn Engine>;
