//! # Listener data model.
//!
//! - [`ListenerSpec`] / [`build_spec`]: what to create (names + predicate).
//! - [`RegisteredListener`]: a listener that exists in the engine.
//! - [`TriggerMessage`]: what a fired listener publishes.
//! - [`LogRecord`]: what the listener filters.
//! - [`SelectorPool`]: random listener requests for load generation.

mod predicate;
mod record;
mod selectors;
mod spec;
mod trigger;

use std::time::SystemTime;

use uuid::Uuid;

pub use predicate::{Field, Operand, Operator, Predicate, Term};
pub use record::LogRecord;
pub use selectors::SelectorPool;
pub use spec::{INBOUND, ListenerSpec, Selectors, TypeSet, build_spec};
pub use trigger::TriggerMessage;

/// A listener that exists in the engine, from registration until teardown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredListener {
    /// What was registered.
    pub spec: ListenerSpec,
    /// Workflow id projected into every trigger of this listener.
    pub workflow_id: Uuid,
    /// When registration completed.
    pub created_at: SystemTime,
}
