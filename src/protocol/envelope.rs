//! Message envelopes and outbound frames.
//!
//! An [`Envelope`] is the immutable unit of delivery: the decoded
//! [`Message`], the endpoint it arrived on, and a timestamp. Envelopes built
//! from transport frames and envelopes synthesized locally travel through the
//! same dispatch path.

// ============================================================================
// Imports
// ============================================================================

use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};

use crate::error::{Error, Result};
use crate::identifiers::Endpoint;

use super::message::{Message, kinds};

// ============================================================================
// Envelope
// ============================================================================

/// A delivered message.
///
/// # Format
///
/// ```json
/// { "type": "violation", "timestamp": "2024-05-01T10:00:00Z", ... }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    endpoint: Endpoint,
    message: Message,
    timestamp: DateTime<Utc>,
}

impl Envelope {
    /// Wraps a locally produced message, stamped with the current time.
    #[inline]
    #[must_use]
    pub fn new(endpoint: Endpoint, message: Message) -> Self {
        Self {
            endpoint,
            message,
            timestamp: Utc::now(),
        }
    }

    /// Decodes a text frame received on `endpoint`.
    ///
    /// The `timestamp` field is used when it parses as RFC 3339; otherwise the
    /// receive time is recorded. For typed messages, the fields of a nested
    /// `data` object are read as if they were top-level; top-level fields win.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if the frame is not valid JSON
    /// - [`Error::Protocol`] if the frame is not an object, lacks a string
    ///   `type`, or its fields do not fit the payload of that type
    pub fn decode(endpoint: &Endpoint, text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        let Value::Object(mut fields) = value else {
            return Err(Error::protocol("frame is not a JSON object"));
        };

        let kind = match fields.remove("type") {
            Some(Value::String(kind)) if !kind.is_empty() => kind,
            _ => return Err(Error::protocol("frame has no string `type` field")),
        };

        if kinds::has_payload(&kind) {
            lift_data(&mut fields);
        }

        let timestamp = fields
            .get("timestamp")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        Ok(Self {
            endpoint: endpoint.clone(),
            message: Message::from_fields(kind, fields)?,
            timestamp,
        })
    }

    /// Returns the endpoint the message was delivered on.
    #[inline]
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Returns the decoded message.
    #[inline]
    #[must_use]
    pub fn message(&self) -> &Message {
        &self.message
    }

    /// Returns the wire `type`.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> &str {
        self.message.kind()
    }

    /// Returns the message timestamp.
    #[inline]
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Merges the fields of a `data` object into `fields` without overriding.
fn lift_data(fields: &mut Map<String, Value>) {
    let Some(Value::Object(data)) = fields.remove("data") else {
        return;
    };
    for (key, value) in data {
        fields.entry(key).or_insert(value);
    }
}

// ============================================================================
// Outbound
// ============================================================================

/// A message from the caller to the server.
///
/// Object payload fields are merged next to `type`; any other payload is
/// carried under a `payload` key.
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    kind: String,
    payload: Value,
}

impl Outbound {
    /// Creates an outbound message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `kind` is empty or names a type
    /// that is only produced locally.
    pub fn new(kind: impl Into<String>, payload: Value) -> Result<Self> {
        let kind = kind.into();
        if kind.is_empty() {
            return Err(Error::invalid_argument("message type must not be empty"));
        }
        if kinds::is_local_only(&kind) {
            return Err(Error::invalid_argument(format!(
                "message type {kind:?} is reserved for local lifecycle events"
            )));
        }
        Ok(Self { kind, payload })
    }

    /// Creates a heartbeat message.
    #[must_use]
    pub fn heartbeat() -> Self {
        Self {
            kind: kinds::HEARTBEAT.to_string(),
            payload: json!({ "timestamp": Utc::now().to_rfc3339() }),
        }
    }

    /// Returns the message type.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Serializes the message to its wire text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails.
    pub fn to_text(&self) -> Result<String> {
        let mut object = match &self.payload {
            Value::Object(map) => map.clone(),
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("payload".to_string(), other.clone());
                map
            }
        };
        object.insert("type".to_string(), Value::String(self.kind.clone()));
        Ok(serde_json::to_string(&Value::Object(object))?)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::protocol::message::{Notification, NotificationPriority, NotificationType};

    fn endpoint() -> Endpoint {
        Endpoint::parse("notifications").expect("endpoint")
    }

    #[test]
    fn test_decode_uses_wire_timestamp() {
        let text = r#"{"type":"notification","title":"Exam starts","timestamp":"2024-05-01T10:00:00Z"}"#;
        let envelope = Envelope::decode(&endpoint(), text).expect("decode");

        assert_eq!(envelope.kind(), "notification");
        assert_eq!(envelope.timestamp().to_rfc3339(), "2024-05-01T10:00:00+00:00");
        match envelope.message() {
            Message::Notification(Notification { title, .. }) => assert_eq!(title, "Exam starts"),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_decode_unwraps_data_object() {
        let text = json!({
            "type": "notification",
            "data": {
                "id": 3,
                "title": "Exam started",
                "message": "Midterm is live",
                "notification_type": "exam_started",
                "priority": "high",
                "timestamp": "2024-05-01T09:00:00Z",
            },
            "timestamp": "2024-05-01T10:00:00Z",
        })
        .to_string();
        let envelope = Envelope::decode(&endpoint(), &text).expect("decode");

        assert_eq!(envelope.timestamp().to_rfc3339(), "2024-05-01T10:00:00+00:00");
        match envelope.message() {
            Message::Notification(n) => {
                assert_eq!(n.id, Some(3));
                assert_eq!(n.title, "Exam started");
                assert_eq!(n.notification_type, NotificationType::ExamStarted);
                assert_eq!(n.priority, NotificationPriority::High);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_top_level_fields_win_over_data() {
        let text = r#"{"type":"trust_score_update","score":40.0,"data":{"trust_score":85.0,"session_id":7}}"#;
        let envelope = Envelope::decode(&endpoint(), text).expect("decode");

        match envelope.message() {
            Message::TrustScoreUpdate(update) => {
                assert!((update.score - 40.0).abs() < f64::EPSILON);
                assert_eq!(update.session_id, Some(7));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_types_keep_data_nested() {
        let text = r#"{"type":"grade_posted","data":{"grade":"A"}}"#;
        let envelope = Envelope::decode(&endpoint(), text).expect("decode");

        match envelope.message() {
            Message::Unknown { fields, .. } => assert!(fields.contains_key("data")),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_decode_rejects_malformed_frames() {
        for text in ["not json", "[1,2]", r#"{"title":"x"}"#, r#"{"type":""}"#, r#"{"type":7}"#] {
            assert!(Envelope::decode(&endpoint(), text).is_err(), "{text}");
        }
    }

    #[test]
    fn test_outbound_merges_object_payload() {
        let outbound = Outbound::new("note_added", json!({ "note": "check lighting" }))
            .expect("outbound");
        let value: Value = serde_json::from_str(&outbound.to_text().expect("text")).expect("json");

        assert_eq!(value["type"], "note_added");
        assert_eq!(value["note"], "check lighting");
    }

    #[test]
    fn test_outbound_wraps_scalar_payload() {
        let outbound = Outbound::new("ping", json!(5)).expect("outbound");
        let value: Value = serde_json::from_str(&outbound.to_text().expect("text")).expect("json");

        assert_eq!(value["payload"], 5);
    }

    #[test]
    fn test_outbound_type_wins_over_payload_type() {
        let outbound = Outbound::new("flag_session", json!({ "type": "spoofed" })).expect("outbound");
        let value: Value = serde_json::from_str(&outbound.to_text().expect("text")).expect("json");

        assert_eq!(value["type"], "flag_session");
    }

    #[test]
    fn test_outbound_rejects_reserved_types() {
        assert!(Outbound::new("", Value::Null).is_err());
        assert!(Outbound::new("connection", Value::Null).is_err());
        assert!(Outbound::new("max_reconnect_attempts", Value::Null).is_err());
    }

    #[test]
    fn test_heartbeat() {
        let heartbeat = Outbound::heartbeat();
        assert_eq!(heartbeat.kind(), "heartbeat");
        assert!(heartbeat.to_text().expect("text").contains("timestamp"));
    }
}
