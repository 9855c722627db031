//! Engine-neutral descriptions of the objects a listener consists of.

use uuid::Uuid;

use crate::listener::{ListenerSpec, Predicate};
use crate::naming::ObjectName;

/// A filtered view over the event log that projects one trigger row per match.
///
/// The projection is fixed: `view_name`, `sink_name`, `workflow_id` (constants)
/// plus `body` and `timestamp` taken from the matching record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewDefinition {
    /// View name.
    pub name: ObjectName,
    /// Event log source the view reads from.
    pub source: ObjectName,
    /// Filter over log records.
    pub predicate: Predicate,
    /// Sink name projected into each row.
    pub sink_name: ObjectName,
    /// Workflow id projected into each row.
    pub workflow_id: Uuid,
}

impl ViewDefinition {
    /// View definition for a listener.
    pub fn for_listener(spec: &ListenerSpec, source: &ObjectName, workflow_id: Uuid) -> Self {
        Self {
            name: spec.view_name().clone(),
            source: source.clone(),
            predicate: spec.predicate().clone(),
            sink_name: spec.sink_name().clone(),
            workflow_id,
        }
    }
}

/// Where a sink publishes, as seen from the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkTarget {
    /// Broker address reachable from the engine.
    pub broker: String,
    /// Trigger topic.
    pub topic: String,
}

/// A sink that republishes new rows of a view as JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkDefinition {
    /// Sink name.
    pub name: ObjectName,
    /// View the sink reads from.
    pub from: ObjectName,
    /// Broker and topic.
    pub target: SinkTarget,
}

impl SinkDefinition {
    /// Sink definition for a listener.
    pub fn for_listener(spec: &ListenerSpec, target: &SinkTarget) -> Self {
        Self {
            name: spec.sink_name().clone(),
            from: spec.view_name().clone(),
            target: target.clone(),
        }
    }
}
