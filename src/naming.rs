//! # Identifier generation for ephemeral engine objects.
//!
//! Every listener owns a view and a sink whose names must never collide with
//! another live listener. Names are derived from a fresh random UUID per call:
//!
//! ```text
//! prefix + hex(uuid_v4)      e.g. view_4f0c9e2a6d1b4c7f9a3e8b5d2c1f0a9e
//! ```
//!
//! The hex encoding keeps the result inside the unquoted identifier grammar
//! `[a-z_][a-z0-9_]*`, so names can be embedded in DDL without quoting.
//! Collision probability of 122 random bits is treated as negligible.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::NameError;

/// Longest identifier the engine accepts (Postgres `NAMEDATALEN - 1`).
pub const MAX_IDENT_LEN: usize = 63;

/// Default event log source name.
pub const DEFAULT_SOURCE: &str = "events_source";

/// Length of the hex-encoded random suffix.
const SUFFIX_LEN: usize = 32;

/// A validated engine object name (view, sink, or source).
///
/// Construction goes through [`ObjectName::parse`] or [`new_name`], so any
/// value of this type can be written into a statement as a bare identifier.
/// Deserialization validates too: a trigger message naming something outside
/// the grammar is rejected before it reaches teardown.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectName(String);

impl ObjectName {
    /// Validates `name` against the identifier grammar.
    ///
    /// # Example
    /// ```
    /// use listenvisor::ObjectName;
    ///
    /// assert!(ObjectName::parse("events_source").is_ok());
    /// assert!(ObjectName::parse("view_1; DROP TABLE x").is_err());
    /// assert!(ObjectName::parse("9lives").is_err());
    /// ```
    pub fn parse(name: impl Into<String>) -> Result<Self, NameError> {
        let name = name.into();
        check_ident(&name, MAX_IDENT_LEN)?;
        Ok(Self(name))
    }

    /// Name of the default event log source, `events_source`.
    pub fn default_source() -> Self {
        Self(DEFAULT_SOURCE.to_string())
    }

    /// Returns the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ObjectName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ObjectName {
    type Error = NameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<ObjectName> for String {
    fn from(value: ObjectName) -> Self {
        value.0
    }
}

/// Validated prefix for generated names.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NamePrefix(Cow<'static, str>);

impl NamePrefix {
    /// Default prefix for listener views.
    pub const VIEW: Self = Self(Cow::Borrowed("view_"));
    /// Default prefix for listener sinks.
    pub const SINK: Self = Self(Cow::Borrowed("sink_"));

    /// Validates a prefix.
    ///
    /// The prefix must be a non-empty identifier fragment short enough that
    /// `prefix + 32 hex chars` still fits [`MAX_IDENT_LEN`].
    pub fn new(prefix: impl Into<Cow<'static, str>>) -> Result<Self, NameError> {
        let prefix = prefix.into();
        check_ident(&prefix, MAX_IDENT_LEN - SUFFIX_LEN)?;
        Ok(Self(prefix))
    }

    /// Returns the prefix as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Returns `prefix` followed by the hex encoding of a fresh random UUID.
///
/// # Example
/// ```
/// use listenvisor::{NamePrefix, new_name};
///
/// let a = new_name(&NamePrefix::VIEW);
/// let b = new_name(&NamePrefix::VIEW);
/// assert!(a.as_str().starts_with("view_"));
/// assert_ne!(a, b);
/// ```
pub fn new_name(prefix: &NamePrefix) -> ObjectName {
    let suffix = Uuid::new_v4().simple();
    ObjectName(format!("{}{}", prefix.as_str(), suffix))
}

fn check_ident(name: &str, max: usize) -> Result<(), NameError> {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return Err(NameError::Empty);
    };
    if name.len() > max {
        return Err(NameError::TooLong {
            name: name.to_string(),
            max,
        });
    }
    let head_ok = first.is_ascii_lowercase() || first == '_';
    let tail_ok = chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if head_ok && tail_ok {
        Ok(())
    } else {
        Err(NameError::Invalid {
            name: name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generated_names_are_valid_identifiers() {
        let name = new_name(&NamePrefix::SINK);
        assert_eq!(name.as_str().len(), "sink_".len() + SUFFIX_LEN);
        assert!(ObjectName::parse(name.as_str()).is_ok());
    }

    #[test]
    fn test_no_collisions_in_ten_thousand_names() {
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            assert!(seen.insert(new_name(&NamePrefix::VIEW)));
        }
    }

    #[test]
    fn test_parse_rejects_non_identifiers() {
        assert_eq!(ObjectName::parse(""), Err(NameError::Empty));
        assert!(matches!(
            ObjectName::parse("View_A"),
            Err(NameError::Invalid { .. })
        ));
        assert!(matches!(
            ObjectName::parse("a-b"),
            Err(NameError::Invalid { .. })
        ));
        assert!(matches!(
            ObjectName::parse("x".repeat(64)),
            Err(NameError::TooLong { max: 63, .. })
        ));
    }

    #[test]
    fn test_prefix_must_leave_room_for_suffix() {
        assert!(NamePrefix::new("listener_").is_ok());
        assert!(NamePrefix::new("p".repeat(31)).is_ok());
        assert!(NamePrefix::new("p".repeat(32)).is_err());
        assert!(NamePrefix::new("").is_err());
        assert!(NamePrefix::new("1_").is_err());
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: Result<ObjectName, _> = serde_json::from_str("\"view_ab12\"");
        assert!(ok.is_ok());
        let bad: Result<ObjectName, _> = serde_json::from_str("\"view; drop\"");
        assert!(bad.is_err());
    }
}
