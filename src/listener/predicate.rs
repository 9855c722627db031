//! # Engine-agnostic filter predicates over the event log.
//!
//! A [`Predicate`] is an ordered conjunction of [`Term`]s, each a
//! `(field, operator, operand)` triple. Fields are a closed set
//! ([`Field`]) so no caller-controlled text ever names a column, and operands
//! are typed ([`Operand`]) so rendering can quote each kind correctly.
//!
//! ```text
//! direction   =   'in'
//! resource_id =   <uuid>
//! lead_id     =   <uuid>
//! type        IN  {<type>, ...}
//! timestamp   >=  <epoch seconds>
//! ```

use std::fmt;

use uuid::Uuid;

/// Event log record fields a listener can filter on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    /// `direction` ("in" / "out").
    Direction,
    /// `resource_id` (UUID text).
    ResourceId,
    /// `lead_id` (UUID text).
    LeadId,
    /// `type` (event type string).
    Type,
    /// `timestamp` (integer epoch seconds).
    Timestamp,
}

impl Field {
    /// JSON key of the field in an event log record.
    pub fn key(self) -> &'static str {
        match self {
            Field::Direction => "direction",
            Field::ResourceId => "resource_id",
            Field::LeadId => "lead_id",
            Field::Type => "type",
            Field::Timestamp => "timestamp",
        }
    }

    /// True for fields compared as integers rather than text.
    pub fn is_integer(self) -> bool {
        matches!(self, Field::Timestamp)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Comparison operator of a term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// `field = operand`
    Eq,
    /// `field IN (operands...)`
    In,
    /// `field >= operand`
    GtEq,
}

/// Typed right-hand side of a term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    /// Free text.
    Text(String),
    /// UUID, compared in hyphenated lowercase form.
    Uuid(Uuid),
    /// Set of text values (for [`Operator::In`]).
    TextSet(Vec<String>),
    /// Signed integer.
    Int(i64),
}

/// One `(field, operator, operand)` predicate term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Term {
    /// Filtered field.
    pub field: Field,
    /// Comparison.
    pub op: Operator,
    /// Right-hand side.
    pub operand: Operand,
}

impl Term {
    /// `field = 'text'`
    pub fn eq_text(field: Field, text: impl Into<String>) -> Self {
        Self {
            field,
            op: Operator::Eq,
            operand: Operand::Text(text.into()),
        }
    }

    /// `field = 'uuid'`
    pub fn eq_uuid(field: Field, id: Uuid) -> Self {
        Self {
            field,
            op: Operator::Eq,
            operand: Operand::Uuid(id),
        }
    }

    /// `field IN ('a', 'b', ...)`
    pub fn in_set(field: Field, values: impl IntoIterator<Item = String>) -> Self {
        Self {
            field,
            op: Operator::In,
            operand: Operand::TextSet(values.into_iter().collect()),
        }
    }

    /// `field >= n`
    pub fn at_least(field: Field, n: i64) -> Self {
        Self {
            field,
            op: Operator::GtEq,
            operand: Operand::Int(n),
        }
    }
}

/// Ordered conjunction of [`Term`]s.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Predicate {
    terms: Vec<Term>,
}

impl Predicate {
    /// Creates a predicate from terms (kept in the given order).
    pub fn new(terms: Vec<Term>) -> Self {
        Self { terms }
    }

    /// Returns the terms in order.
    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    /// Returns the first term filtering on `field`, if any.
    pub fn term(&self, field: Field) -> Option<&Term> {
        self.terms.iter().find(|t| t.field == field)
    }

    /// Number of terms.
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    /// True if the predicate has no terms (matches everything).
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}
