//! Typed message payloads.
//!
//! Every frame on the wire is a JSON object with a `type` field. The type
//! selects a [`Message`] variant; the remaining fields are decoded into that
//! variant's payload struct. Unknown fields are ignored and unknown types are
//! kept as [`Message::Unknown`].
//!
//! # Message Types
//!
//! | Type | Variant | Origin |
//! |------|---------|--------|
//! | `notification` | [`Message::Notification`] | wire |
//! | `violation` | [`Message::Violation`] | wire |
//! | `trust_score_update` | [`Message::TrustScoreUpdate`] | wire |
//! | `exam_update` | [`Message::ExamUpdate`] | wire |
//! | `student_feed` | [`Message::StudentFeed`] | wire |
//! | `system_metrics` | [`Message::SystemMetrics`] | wire |
//! | `heartbeat_ack` | [`Message::HeartbeatAck`] | wire |
//! | `ack` | [`Message::Ack`] | simulation loopback |
//! | `error` | [`Message::Error`] | wire or local |
//! | `connection` | [`Message::Connection`] | local only |
//! | `max_reconnect_attempts` | [`Message::MaxReconnectAttempts`] | local only |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::result::Result as StdResult;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

// ============================================================================
// Type Names
// ============================================================================

/// Wire values of the `type` field.
pub mod kinds {
    /// User-facing notification.
    pub const NOTIFICATION: &str = "notification";
    /// Proctoring violation.
    pub const VIOLATION: &str = "violation";
    /// Trust-score sample for a session.
    pub const TRUST_SCORE_UPDATE: &str = "trust_score_update";
    /// Exam status change.
    pub const EXAM_UPDATE: &str = "exam_update";
    /// Per-student live status.
    pub const STUDENT_FEED: &str = "student_feed";
    /// Platform health sample.
    pub const SYSTEM_METRICS: &str = "system_metrics";
    /// Outbound keepalive.
    pub const HEARTBEAT: &str = "heartbeat";
    /// Server reply to a heartbeat.
    pub const HEARTBEAT_ACK: &str = "heartbeat_ack";
    /// Simulated acknowledgement of an outbound message.
    pub const ACK: &str = "ack";
    /// Transport or server error.
    pub const ERROR: &str = "error";
    /// Connection lifecycle change (local).
    pub const CONNECTION: &str = "connection";
    /// Reconnection gave up (local).
    pub const MAX_RECONNECT_ATTEMPTS: &str = "max_reconnect_attempts";

    /// Returns `true` for wire types decoded into a dedicated payload.
    #[inline]
    #[must_use]
    pub fn has_payload(kind: &str) -> bool {
        matches!(
            kind,
            NOTIFICATION
                | VIOLATION
                | TRUST_SCORE_UPDATE
                | EXAM_UPDATE
                | STUDENT_FEED
                | SYSTEM_METRICS
                | HEARTBEAT_ACK
                | ACK
                | ERROR
        )
    }

    /// Returns `true` for types that are only ever produced locally.
    #[inline]
    #[must_use]
    pub fn is_local_only(kind: &str) -> bool {
        matches!(kind, CONNECTION | MAX_RECONNECT_ATTEMPTS)
    }
}

// ============================================================================
// Message
// ============================================================================

/// A decoded message, keyed by its wire `type`.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// User-facing notification.
    Notification(Notification),
    /// Proctoring violation.
    Violation(Violation),
    /// Trust-score sample.
    TrustScoreUpdate(TrustScoreUpdate),
    /// Exam status change.
    ExamUpdate(ExamUpdate),
    /// Per-student live status.
    StudentFeed(StudentFeed),
    /// Platform health sample.
    SystemMetrics(SystemMetrics),
    /// Heartbeat reply.
    HeartbeatAck(HeartbeatAck),
    /// Simulated acknowledgement.
    Ack(Ack),
    /// Transport or server error.
    Error(ErrorEvent),
    /// Connection lifecycle change.
    Connection(ConnectionEvent),
    /// Reconnection stopped after the configured attempt ceiling.
    MaxReconnectAttempts(MaxReconnectAttempts),
    /// Any type without a dedicated variant.
    Unknown {
        /// The wire `type` value.
        kind: String,
        /// Remaining fields.
        fields: Map<String, Value>,
    },
}

impl Message {
    /// Returns the wire `type` of this message.
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::Notification(_) => kinds::NOTIFICATION,
            Self::Violation(_) => kinds::VIOLATION,
            Self::TrustScoreUpdate(_) => kinds::TRUST_SCORE_UPDATE,
            Self::ExamUpdate(_) => kinds::EXAM_UPDATE,
            Self::StudentFeed(_) => kinds::STUDENT_FEED,
            Self::SystemMetrics(_) => kinds::SYSTEM_METRICS,
            Self::HeartbeatAck(_) => kinds::HEARTBEAT_ACK,
            Self::Ack(_) => kinds::ACK,
            Self::Error(_) => kinds::ERROR,
            Self::Connection(_) => kinds::CONNECTION,
            Self::MaxReconnectAttempts(_) => kinds::MAX_RECONNECT_ATTEMPTS,
            Self::Unknown { kind, .. } => kind,
        }
    }

    /// Returns `true` for lifecycle messages produced by this crate rather
    /// than received from a transport.
    #[inline]
    #[must_use]
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            Self::Connection(_)
                | Self::MaxReconnectAttempts(_)
                | Self::Error(ErrorEvent {
                    origin: ErrorOrigin::Transport,
                    ..
                })
        )
    }

    /// Decodes a message from its `type` and remaining fields.
    ///
    /// Local-only types arriving from a transport are kept as
    /// [`Message::Unknown`] so remote peers cannot forge lifecycle events.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the fields do not match the payload
    /// shape of a known type.
    pub fn from_fields(kind: String, fields: Map<String, Value>) -> Result<Self> {
        let message = match kind.as_str() {
            kinds::NOTIFICATION => Self::Notification(decode(&kind, fields)?),
            kinds::VIOLATION => Self::Violation(decode(&kind, fields)?),
            kinds::TRUST_SCORE_UPDATE => Self::TrustScoreUpdate(decode(&kind, fields)?),
            kinds::EXAM_UPDATE => Self::ExamUpdate(decode(&kind, fields)?),
            kinds::STUDENT_FEED => Self::StudentFeed(decode(&kind, fields)?),
            kinds::SYSTEM_METRICS => Self::SystemMetrics(decode(&kind, fields)?),
            kinds::HEARTBEAT_ACK => Self::HeartbeatAck(decode(&kind, fields)?),
            kinds::ACK => Self::Ack(decode(&kind, fields)?),
            kinds::ERROR => {
                let mut event: ErrorEvent = decode(&kind, fields)?;
                event.origin = ErrorOrigin::Server;
                Self::Error(event)
            }
            _ => Self::Unknown { kind, fields },
        };
        Ok(message)
    }

    /// Encodes the message as a wire object with its `type` field.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if a payload fails to serialize.
    pub fn to_wire(&self) -> Result<Value> {
        let payload = match self {
            Self::Notification(p) => serde_json::to_value(p)?,
            Self::Violation(p) => serde_json::to_value(p)?,
            Self::TrustScoreUpdate(p) => serde_json::to_value(p)?,
            Self::ExamUpdate(p) => serde_json::to_value(p)?,
            Self::StudentFeed(p) => serde_json::to_value(p)?,
            Self::SystemMetrics(p) => serde_json::to_value(p)?,
            Self::HeartbeatAck(p) => serde_json::to_value(p)?,
            Self::Ack(p) => serde_json::to_value(p)?,
            Self::Error(p) => serde_json::to_value(p)?,
            Self::Connection(p) => serde_json::to_value(p)?,
            Self::MaxReconnectAttempts(p) => serde_json::to_value(p)?,
            Self::Unknown { fields, .. } => Value::Object(fields.clone()),
        };

        let mut object = match payload {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        object.insert("type".to_string(), Value::String(self.kind().to_string()));
        Ok(Value::Object(object))
    }
}

/// Decodes a payload struct from the fields of a frame.
fn decode<T: DeserializeOwned>(kind: &str, fields: Map<String, Value>) -> Result<T> {
    serde_json::from_value(Value::Object(fields))
        .map_err(|e| Error::protocol(format!("invalid {kind} payload: {e}")))
}

// ============================================================================
// Notification
// ============================================================================

/// Notification category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    ExamCreated,
    ExamStarted,
    ExamCompleted,
    ViolationDetected,
    TrustScoreLow,
    ExamReminder,
    SystemAlert,
    GradePublished,
    ExamInvitation,
    AccountSecurity,
    #[default]
    #[serde(other)]
    Other,
}

/// Notification urgency.
///
/// Unrecognized names decode as [`NotificationPriority::Medium`]; a
/// non-string value is a decode error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl<'de> Deserialize<'de> for NotificationPriority {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> StdResult<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(match name.as_str() {
            "low" => Self::Low,
            "high" => Self::High,
            "urgent" => Self::Urgent,
            _ => Self::Medium,
        })
    }
}

/// A user-facing notification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Notification {
    /// Server-side notification ID.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    /// Short headline.
    pub title: String,
    /// Body text.
    pub message: String,
    /// Category.
    pub notification_type: NotificationType,
    /// Urgency.
    pub priority: NotificationPriority,
    /// Link the UI may offer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_url: Option<String>,
    /// Related exam.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exam_id: Option<u64>,
    /// Whether the recipient already read it.
    pub is_read: bool,
}

// ============================================================================
// Violation
// ============================================================================

/// Category of a proctoring violation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationType {
    FaceNotDetected,
    MultipleFaces,
    LookingAway,
    TabSwitch,
    WindowBlur,
    AudioDetected,
    PhoneDetected,
    SuspiciousMovement,
    CopyPaste,
    RightClick,
    FullscreenExit,
    BookDetected,
    LaptopDetected,
    UnauthorizedObject,
    #[default]
    #[serde(other)]
    Other,
}

impl ViolationType {
    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::FaceNotDetected => "face_not_detected",
            Self::MultipleFaces => "multiple_faces",
            Self::LookingAway => "looking_away",
            Self::TabSwitch => "tab_switch",
            Self::WindowBlur => "window_blur",
            Self::AudioDetected => "audio_detected",
            Self::PhoneDetected => "phone_detected",
            Self::SuspiciousMovement => "suspicious_movement",
            Self::CopyPaste => "copy_paste",
            Self::RightClick => "right_click",
            Self::FullscreenExit => "fullscreen_exit",
            Self::BookDetected => "book_detected",
            Self::LaptopDetected => "laptop_detected",
            Self::UnauthorizedObject => "unauthorized_object",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for ViolationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of a violation. Accepts both the `info/warning/critical` and the
/// `low/medium/high/critical` vocabularies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[serde(alias = "info")]
    Low,
    #[default]
    #[serde(alias = "warning")]
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Returns `true` for severities that should raise an alert.
    #[inline]
    #[must_use]
    pub const fn is_alert(&self) -> bool {
        matches!(self, Self::High | Self::Critical)
    }
}

/// A proctoring violation reported for an exam session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Violation {
    /// Alert ID assigned by the server.
    #[serde(skip_serializing_if = "Option::is_none", alias = "alert_id")]
    pub id: Option<u64>,
    /// Exam session.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<u64>,
    /// Student.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_id: Option<u64>,
    /// Student display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_name: Option<String>,
    /// Exam.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exam_id: Option<u64>,
    /// Category.
    pub violation_type: ViolationType,
    /// Severity.
    pub severity: Severity,
    /// Human-readable description.
    pub description: String,
    /// Detector confidence in `[0, 1]`.
    pub confidence: f64,
}

// ============================================================================
// Trust Score
// ============================================================================

/// A trust-score sample for an exam session, on a 0–100 scale.
///
/// `score` (or its alias `trust_score`) is required; a frame without one is
/// rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrustScoreUpdate {
    /// Exam session.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<u64>,
    /// Student.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_id: Option<u64>,
    /// Student display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_name: Option<String>,
    /// Current score.
    #[serde(alias = "trust_score")]
    pub score: f64,
    /// Score before this update.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_score: Option<f64>,
    /// Why the score changed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

// ============================================================================
// Exam / Student
// ============================================================================

/// Exam status change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExamUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exam_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_students: Option<u64>,
}

/// Live status of one student in an exam.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudentFeed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exam_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trust_score: Option<f64>,
}

// ============================================================================
// System Metrics
// ============================================================================

/// Platform health sample. Usage values are percentages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemMetrics {
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub active_sessions: u64,
    pub active_connections: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<f64>,
}

// ============================================================================
// Acknowledgements
// ============================================================================

/// Reply to an outbound heartbeat.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatAck {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_time: Option<String>,
}

/// Simulated acknowledgement of an outbound message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Ack {
    /// Type of the message being acknowledged.
    pub ack_type: String,
}

// ============================================================================
// Lifecycle Events
// ============================================================================

/// Where an [`ErrorEvent`] came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorOrigin {
    /// Raised locally by the transport.
    #[default]
    Transport,
    /// Sent by the server as an `error` frame.
    Server,
}

/// Transport or server error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorEvent {
    pub message: String,
    #[serde(skip)]
    pub origin: ErrorOrigin,
    /// Whether the failure is transient and eligible for reconnection.
    pub recoverable: bool,
}

/// Status carried by a `connection` event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    #[default]
    Connecting,
    Open,
    Closing,
    Closed,
    Failed,
    /// A retry has been scheduled.
    Reconnecting,
}

impl ConnectionStatus {
    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
            Self::Failed => "failed",
            Self::Reconnecting => "reconnecting",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection lifecycle change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionEvent {
    pub status: ConnectionStatus,
    /// Raw [`ConnectionId`](crate::identifiers::ConnectionId) value.
    pub connection_id: u64,
    /// Reconnection attempt number, for `reconnecting`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,
    /// Scheduled delay, for `reconnecting`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,
    /// Close code, for `closed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ConnectionEvent {
    /// Creates an event with only a status.
    #[inline]
    #[must_use]
    pub fn new(status: ConnectionStatus, connection_id: u64) -> Self {
        Self {
            status,
            connection_id,
            ..Default::default()
        }
    }
}

/// Terminal event: the endpoint stopped reconnecting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaxReconnectAttempts {
    /// Consecutive failures observed.
    pub attempts: u32,
    /// Configured ceiling.
    pub max_attempts: u32,
}

// ============================================================================
// Tests
// ============================================================================
