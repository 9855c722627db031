//! # Trigger messages and the sink envelope.
//!
//! A sink publishes every new view row wrapped in a change envelope:
//!
//! ```text
//! {"before": null, "after": {"row": {"view_name": "...", "sink_name": "...",
//!   "workflow_id": "...", "body": "...", "timestamp": 1700000000}}}
//! ```
//!
//! Only insert after-images (`after.row` present) are triggers; anything else
//! is a [`DecodeError`] and must not drive teardown.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DecodeError;
use crate::naming::ObjectName;

/// One fired listener, as projected by its view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerMessage {
    /// View that matched.
    pub view_name: ObjectName,
    /// Sink that forwarded the match.
    pub sink_name: ObjectName,
    /// Workflow the listener belongs to.
    pub workflow_id: Uuid,
    /// Body of the matching event.
    pub body: String,
    /// Timestamp of the matching event (epoch seconds).
    #[serde(rename = "timestamp")]
    pub match_timestamp: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    #[serde(default)]
    after: Option<After>,
}

#[derive(Debug, Serialize, Deserialize)]
struct After {
    #[serde(default)]
    row: Option<TriggerMessage>,
}

impl TriggerMessage {
    /// Decodes a sink payload.
    ///
    /// # Example
    /// ```
    /// use listenvisor::{DecodeError, TriggerMessage};
    ///
    /// let raw = br#"{"after":{"row":{"view_name":"view_a","sink_name":"sink_a",
    ///   "workflow_id":"6f1c1b9e-3a52-4d7e-9b40-2f6a1f0e8c11","body":"hi","timestamp":7}}}"#;
    /// let msg = TriggerMessage::decode(raw).unwrap();
    /// assert_eq!(msg.view_name.as_str(), "view_a");
    /// assert_eq!(msg.match_timestamp, 7);
    ///
    /// assert_eq!(TriggerMessage::decode(br#"{"after":null}"#), Err(DecodeError::MissingRow));
    /// ```
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let env: Envelope = serde_json::from_slice(payload)?;
        env.after
            .and_then(|a| a.row)
            .ok_or(DecodeError::MissingRow)
    }

    /// Wraps the message in the sink envelope and serializes it.
    pub fn encode(&self) -> Vec<u8> {
        let env = Envelope {
            after: Some(After {
                row: Some(self.clone()),
            }),
        };
        // Envelope holds only strings, integers and a UUID; serialization cannot fail.
        serde_json::to_vec(&env).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_rejects_missing_row() {
        for raw in [
            &br#"{}"#[..],
            br#"{"after":null}"#,
            br#"{"after":{}}"#,
            br#"{"before":{"row":null},"after":{"row":null}}"#,
        ] {
            assert_eq!(TriggerMessage::decode(raw), Err(DecodeError::MissingRow));
        }
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = TriggerMessage::decode(b"not json").unwrap_err();
        assert_eq!(err.as_label(), "decode_malformed");
    }

    #[test]
    fn test_decode_rejects_unsafe_names() {
        let raw = br#"{"after":{"row":{"view_name":"v; DROP SINK x","sink_name":"sink_a",
            "workflow_id":"6f1c1b9e-3a52-4d7e-9b40-2f6a1f0e8c11","body":"","timestamp":1}}}"#;
        assert!(matches!(
            TriggerMessage::decode(raw),
            Err(DecodeError::Malformed { .. })
        ));
    }

    #[test]
    fn test_encode_is_decodable() {
        let msg = TriggerMessage {
            view_name: ObjectName::parse("view_x").unwrap(),
            sink_name: ObjectName::parse("sink_x").unwrap(),
            workflow_id: Uuid::from_u128(9),
            body: "quote ' and \"".into(),
            match_timestamp: -3,
        };
        let raw = msg.encode();
        let text = String::from_utf8(raw.clone()).unwrap();
        assert!(text.contains("\"timestamp\":-3"));
        assert_eq!(TriggerMessage::decode(&raw).unwrap(), msg);
    }
}
