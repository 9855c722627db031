//! Event log records as stored (JSON, UTF-8) in the engine's source.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::listener::predicate::{Field, Operand, Operator, Predicate, Term};

/// One append-only event log record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    /// `"in"` or `"out"`.
    pub direction: String,
    /// Resource the event belongs to.
    pub resource_id: Uuid,
    /// Lead the event belongs to.
    pub lead_id: Uuid,
    /// Event type.
    #[serde(rename = "type")]
    pub kind: String,
    /// Free-form payload.
    pub body: String,
    /// Epoch seconds.
    pub timestamp: i64,
}

impl LogRecord {
    /// Inbound record with the given selectors.
    pub fn inbound(
        resource_id: Uuid,
        lead_id: Uuid,
        kind: impl Into<String>,
        body: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        Self {
            direction: "in".into(),
            resource_id,
            lead_id,
            kind: kind.into(),
            body: body.into(),
            timestamp,
        }
    }

    /// Text value of `field` as the engine's `->>` operator would return it.
    pub fn text(&self, field: Field) -> String {
        match field {
            Field::Direction => self.direction.clone(),
            Field::ResourceId => self.resource_id.hyphenated().to_string(),
            Field::LeadId => self.lead_id.hyphenated().to_string(),
            Field::Type => self.kind.clone(),
            Field::Timestamp => self.timestamp.to_string(),
        }
    }

    /// Evaluates `predicate` against this record.
    pub fn matches(&self, predicate: &Predicate) -> bool {
        predicate.terms().iter().all(|t| self.matches_term(t))
    }

    fn matches_term(&self, term: &Term) -> bool {
        if term.field.is_integer() {
            let Operand::Int(n) = term.operand else {
                return false;
            };
            let v = self.timestamp;
            return match term.op {
                Operator::Eq => v == n,
                Operator::GtEq => v >= n,
                Operator::In => false,
            };
        }

        let value = self.text(term.field);
        match (&term.op, &term.operand) {
            (Operator::Eq, Operand::Text(t)) => value == *t,
            (Operator::Eq, Operand::Uuid(id)) => value == id.hyphenated().to_string(),
            (Operator::In, Operand::TextSet(set)) => set.iter().any(|t| *t == value),
            (Operator::GtEq, Operand::Text(t)) => value.as_str() >= t.as_str(),
            _ => false,
        }
    }
}
