//! # Listener specifications and the predicate builder.
//!
//! [`build_spec`] turns listener [`Selectors`] into an immutable
//! [`ListenerSpec`]: a fresh, unique view/sink name pair plus the filter
//! predicate the view will evaluate.
//!
//! The predicate is always the same conjunction, in this order:
//!
//! ```text
//! direction = 'in'
//!   AND resource_id = R
//!   AND lead_id = L
//!   AND type IN (T1, T2, ...)
//!   AND timestamp >= since
//! ```
//!
//! `since` is usually "now minus a few seconds": it keeps the standing query
//! scoped to recent history and tolerates clock/ingest skew between the event
//! producer and the listener owner.

use std::collections::BTreeSet;

use uuid::Uuid;

use crate::error::SpecError;
use crate::listener::predicate::{Field, Predicate, Term};
use crate::naming::{NamePrefix, ObjectName, new_name};

/// Direction value of inbound events; listeners only watch inbound traffic.
pub const INBOUND: &str = "in";

/// Non-empty set of event types a listener fires on.
///
/// Iteration order is sorted, which keeps rendered filters deterministic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeSet(BTreeSet<String>);

impl TypeSet {
    /// Builds a type set, rejecting empty sets and blank types.
    ///
    /// # Example
    /// ```
    /// use listenvisor::TypeSet;
    ///
    /// let set = TypeSet::new(["tg_start", "tg_send_text", "tg_start"]).unwrap();
    /// assert_eq!(set.len(), 2);
    /// assert!(TypeSet::new(Vec::<String>::new()).is_err());
    /// ```
    pub fn new<I, S>(types: I) -> Result<Self, SpecError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = BTreeSet::new();
        for t in types {
            let t = t.into();
            if t.trim().is_empty() {
                return Err(SpecError::BlankType);
            }
            set.insert(t);
        }
        if set.is_empty() {
            return Err(SpecError::EmptyTypeSet);
        }
        Ok(Self(set))
    }

    /// Iterates over the types in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// True if `ty` is a member.
    pub fn contains(&self, ty: &str) -> bool {
        self.0.contains(ty)
    }

    /// Number of distinct types.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; kept for API symmetry with collections.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A listener request: what the listener should match on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selectors {
    /// Resource the event must belong to.
    pub resource_id: Uuid,
    /// Lead the event must belong to.
    pub lead_id: Uuid,
    /// Event types that fire the listener; must be non-empty.
    pub types: Vec<String>,
    /// Lower bound on the event timestamp (epoch seconds, inclusive).
    pub since: i64,
}

/// Immutable description of one listener, consumed once by the registrar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerSpec {
    view_name: ObjectName,
    sink_name: ObjectName,
    resource_id: Uuid,
    lead_id: Uuid,
    types: TypeSet,
    since: i64,
    predicate: Predicate,
}

impl ListenerSpec {
    /// Builds a spec with freshly generated names under the given prefixes.
    pub fn build(
        selectors: Selectors,
        view_prefix: &NamePrefix,
        sink_prefix: &NamePrefix,
    ) -> Result<Self, SpecError> {
        let types = TypeSet::new(selectors.types)?;
        Ok(Self::assemble(
            new_name(view_prefix),
            new_name(sink_prefix),
            selectors.resource_id,
            selectors.lead_id,
            types,
            selectors.since,
        ))
    }

    /// Builds a spec with caller-supplied names.
    ///
    /// The caller owns uniqueness; the only check is that the two names differ.
    pub fn with_names(
        selectors: Selectors,
        view_name: ObjectName,
        sink_name: ObjectName,
    ) -> Result<Self, SpecError> {
        if view_name == sink_name {
            return Err(SpecError::NameClash {
                name: view_name.into(),
            });
        }
        let types = TypeSet::new(selectors.types)?;
        Ok(Self::assemble(
            view_name,
            sink_name,
            selectors.resource_id,
            selectors.lead_id,
            types,
            selectors.since,
        ))
    }

    fn assemble(
        view_name: ObjectName,
        sink_name: ObjectName,
        resource_id: Uuid,
        lead_id: Uuid,
        types: TypeSet,
        since: i64,
    ) -> Self {
        let predicate = Predicate::new(vec![
            Term::eq_text(Field::Direction, INBOUND),
            Term::eq_uuid(Field::ResourceId, resource_id),
            Term::eq_uuid(Field::LeadId, lead_id),
            Term::in_set(Field::Type, types.iter().map(str::to_string)),
            Term::at_least(Field::Timestamp, since),
        ]);
        Self {
            view_name,
            sink_name,
            resource_id,
            lead_id,
            types,
            since,
            predicate,
        }
    }

    /// Name of the filtered view.
    pub fn view_name(&self) -> &ObjectName {
        &self.view_name
    }

    /// Name of the sink forwarding the view to the trigger channel.
    pub fn sink_name(&self) -> &ObjectName {
        &self.sink_name
    }

    /// Resource selector.
    pub fn resource_id(&self) -> Uuid {
        self.resource_id
    }

    /// Lead selector.
    pub fn lead_id(&self) -> Uuid {
        self.lead_id
    }

    /// Event types that fire the listener.
    pub fn types(&self) -> &TypeSet {
        &self.types
    }

    /// Inclusive lower bound on event timestamps.
    pub fn since(&self) -> i64 {
        self.since
    }

    /// Filter the view evaluates.
    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }
}

/// Builds a spec with default `view_` / `sink_` name prefixes.
///
/// # Example
/// ```
/// use listenvisor::{Selectors, build_spec};
/// use uuid::Uuid;
///
/// let spec = build_spec(Selectors {
///     resource_id: Uuid::new_v4(),
///     lead_id: Uuid::new_v4(),
///     types: vec!["tg_start".into()],
///     since: 1_700_000_000,
/// })
/// .unwrap();
/// assert_eq!(spec.predicate().len(), 5);
/// assert_ne!(spec.view_name(), spec.sink_name());
/// ```
pub fn build_spec(selectors: Selectors) -> Result<ListenerSpec, SpecError> {
    ListenerSpec::build(selectors, &NamePrefix::VIEW, &NamePrefix::SINK)
}
