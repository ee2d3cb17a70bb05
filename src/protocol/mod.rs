//! Wire protocol message types.
//!
//! # Protocol Overview
//!
//! | Message | Direction | Purpose |
//! |---------|-----------|---------|
//! | [`Envelope`] | Transport → Listeners | Decoded inbound or lifecycle message |
//! | [`Outbound`] | Caller → Transport | `{type, ...fields}` sent by `send` |
//!
//! Every frame is a JSON object whose `type` field selects a [`Message`]
//! variant. See [`message`] for the recognized types.

// ============================================================================
// Submodules
// ============================================================================

/// Envelope and outbound frame types.
pub mod envelope;

/// Typed message payloads.
pub mod message;

// ============================================================================
// Re-exports
// ============================================================================

pub use envelope::{Envelope, Outbound};
pub use message::{
    Ack, ConnectionEvent, ConnectionStatus, ErrorEvent, ErrorOrigin, ExamUpdate, HeartbeatAck,
    MaxReconnectAttempts, Message, Notification, NotificationPriority, NotificationType, Severity,
    StudentFeed, SystemMetrics, TrustScoreUpdate, Violation, ViolationType, kinds,
};
