//! Synthetic traffic transport.
//!
//! [`SimulatedTransport`] opens sessions that produce plausible frames on a
//! random timer instead of talking to a server. Frames are JSON text and go
//! through the same decode and dispatch path as live traffic.
//!
//! # Catalog
//!
//! | Endpoint root | Types |
//! |---------------|-------|
//! | `notifications` | `notification` |
//! | `violations` | `violation` |
//! | `proctoring` | `violation`, `trust_score_update`, `student_feed` |
//! | `trust-scores` | `trust_score_update` |
//! | `metrics`, `system` | `system_metrics` |
//! | `exams` | `exam_update` |
//! | anything else | `notification` |

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use rand::seq::IndexedRandom;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep};
use tracing::{debug, trace, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::Endpoint;
use crate::protocol::{
    Ack, ExamUpdate, Message, Notification, NotificationPriority, NotificationType, Severity,
    StudentFeed, SystemMetrics, TrustScoreUpdate, Violation, ViolationType, kinds,
};

use super::{CLOSE_NORMAL, Outgoing, Transport, TransportEvent, TransportSession};

// ============================================================================
// Constants
// ============================================================================

/// Default lower bound of the emission interval.
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_secs(5);

/// Default upper bound of the emission interval.
pub const DEFAULT_MAX_INTERVAL: Duration = Duration::from_secs(30);

const STUDENT_NAMES: &[&str] = &[
    "Alice Johnson",
    "Bob Smith",
    "Carol Davis",
    "Daniel Lee",
    "Eva Martinez",
    "Farid Khan",
];

const NOTIFICATION_TEMPLATES: &[(NotificationType, NotificationPriority, &str, &str)] = &[
    (
        NotificationType::ExamStarted,
        NotificationPriority::Medium,
        "Exam started",
        "A scheduled exam is now in progress.",
    ),
    (
        NotificationType::ViolationDetected,
        NotificationPriority::High,
        "Violation detected",
        "A proctoring violation needs review.",
    ),
    (
        NotificationType::TrustScoreLow,
        NotificationPriority::High,
        "Low trust score",
        "A session dropped below the trust threshold.",
    ),
    (
        NotificationType::ExamReminder,
        NotificationPriority::Low,
        "Exam reminder",
        "An exam starts in 30 minutes.",
    ),
    (
        NotificationType::SystemAlert,
        NotificationPriority::Urgent,
        "System alert",
        "Proctoring latency is above normal.",
    ),
    (
        NotificationType::GradePublished,
        NotificationPriority::Low,
        "Grades published",
        "Results for a completed exam are available.",
    ),
];

const VIOLATION_TYPES: &[ViolationType] = &[
    ViolationType::FaceNotDetected,
    ViolationType::MultipleFaces,
    ViolationType::LookingAway,
    ViolationType::TabSwitch,
    ViolationType::WindowBlur,
    ViolationType::AudioDetected,
    ViolationType::PhoneDetected,
    ViolationType::CopyPaste,
    ViolationType::FullscreenExit,
    ViolationType::BookDetected,
];

const SEVERITIES: &[Severity] = &[
    Severity::Low,
    Severity::Medium,
    Severity::High,
    Severity::Critical,
];

const TRUST_REASONS: &[&str] = &[
    "looking away",
    "tab switch",
    "steady engagement",
    "audio detected",
    "face re-acquired",
];

const STUDENT_STATUSES: &[&str] = &["active", "idle", "flagged"];

const EXAM_STATUSES: &[&str] = &["scheduled", "in_progress", "completed"];

// ============================================================================
// SimulationOptions
// ============================================================================

/// Timing of simulated sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulationOptions {
    /// Shortest gap between two frames.
    pub min_interval: Duration,
    /// Longest gap between two frames.
    pub max_interval: Duration,
    /// Delay before an outbound message is acknowledged; `None` disables acks.
    pub ack_delay: Option<Duration>,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulationOptions {
    /// Creates the default timing (5–30 s, no acks).
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            min_interval: DEFAULT_MIN_INTERVAL,
            max_interval: DEFAULT_MAX_INTERVAL,
            ack_delay: None,
        }
    }

    /// Sets the interval bounds.
    #[inline]
    #[must_use]
    pub fn with_interval(mut self, min: Duration, max: Duration) -> Self {
        self.min_interval = min;
        self.max_interval = max;
        self
    }

    /// Enables acknowledgements after `delay`.
    #[inline]
    #[must_use]
    pub fn with_ack_delay(mut self, delay: Duration) -> Self {
        self.ack_delay = Some(delay);
        self
    }

    /// Validates the options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the minimum interval is zero or above
    /// the maximum.
    pub fn validate(&self) -> Result<()> {
        if self.min_interval.is_zero() {
            return Err(Error::config("simulation min_interval must be greater than zero"));
        }
        if self.min_interval > self.max_interval {
            return Err(Error::config(
                "simulation min_interval must not exceed max_interval",
            ));
        }
        Ok(())
    }

    fn next_interval(&self) -> Duration {
        let min = self.min_interval.as_millis() as u64;
        let max = (self.max_interval.as_millis() as u64).max(min);
        Duration::from_millis(rand::rng().random_range(min..=max))
    }
}

// ============================================================================
// Catalog
// ============================================================================

/// Message family produced for an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Catalog {
    Notifications,
    Violations,
    Proctoring,
    TrustScores,
    Metrics,
    Exams,
}

impl Catalog {
    /// Picks the catalog for `endpoint` by its first path segment.
    #[must_use]
    pub fn for_endpoint(endpoint: &Endpoint) -> Self {
        match endpoint.root() {
            "violations" => Self::Violations,
            "proctoring" => Self::Proctoring,
            "trust-scores" | "trust_scores" => Self::TrustScores,
            "metrics" | "system" => Self::Metrics,
            "exams" => Self::Exams,
            _ => Self::Notifications,
        }
    }

    /// Returns the message types this catalog emits.
    #[must_use]
    pub const fn kinds(&self) -> &'static [&'static str] {
        match self {
            Self::Notifications => &[kinds::NOTIFICATION],
            Self::Violations => &[kinds::VIOLATION],
            Self::Proctoring => &[
                kinds::VIOLATION,
                kinds::TRUST_SCORE_UPDATE,
                kinds::STUDENT_FEED,
            ],
            Self::TrustScores => &[kinds::TRUST_SCORE_UPDATE],
            Self::Metrics => &[kinds::SYSTEM_METRICS],
            Self::Exams => &[kinds::EXAM_UPDATE],
        }
    }

    /// Generates the `sequence`-th message for `endpoint`.
    pub fn generate<R: Rng>(&self, endpoint: &Endpoint, sequence: u64, rng: &mut R) -> Message {
        // `proctoring/<id>` pins the session id.
        let session_id = endpoint
            .as_str()
            .split('/')
            .nth(1)
            .and_then(|segment| segment.parse().ok())
            .unwrap_or_else(|| rng.random_range(1..=500));

        let kind = match self {
            Self::Proctoring => {
                let choices = self.kinds();
                choices[rng.random_range(0..choices.len())]
            }
            _ => self.kinds()[0],
        };

        match kind {
            kinds::VIOLATION => Message::Violation(violation(sequence, session_id, rng)),
            kinds::TRUST_SCORE_UPDATE => Message::TrustScoreUpdate(trust_score(session_id, rng)),
            kinds::STUDENT_FEED => Message::StudentFeed(student_feed(session_id, rng)),
            kinds::SYSTEM_METRICS => Message::SystemMetrics(system_metrics(rng)),
            kinds::EXAM_UPDATE => Message::ExamUpdate(exam_update(rng)),
            _ => Message::Notification(notification(sequence, rng)),
        }
    }
}

fn pick<'a, T, R: Rng>(items: &'a [T], rng: &mut R) -> &'a T {
    // Catalog tables are non-empty constants.
    items.choose(rng).unwrap_or(&items[0])
}

fn student_name<R: Rng>(rng: &mut R) -> String {
    (*pick(STUDENT_NAMES, rng)).to_string()
}

/// Rounds to one decimal place.
fn tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn notification<R: Rng>(sequence: u64, rng: &mut R) -> Notification {
    let (notification_type, priority, title, message) = *pick(NOTIFICATION_TEMPLATES, rng);
    Notification {
        id: Some(sequence),
        title: title.to_string(),
        message: message.to_string(),
        notification_type,
        priority,
        action_url: None,
        exam_id: Some(rng.random_range(1..=50)),
        is_read: false,
    }
}

fn violation<R: Rng>(sequence: u64, session_id: u64, rng: &mut R) -> Violation {
    let violation_type = *pick(VIOLATION_TYPES, rng);
    Violation {
        id: Some(sequence),
        session_id: Some(session_id),
        student_id: Some(rng.random_range(1..=1000)),
        student_name: Some(student_name(rng)),
        exam_id: Some(rng.random_range(1..=50)),
        violation_type,
        severity: *pick(SEVERITIES, rng),
        description: format!("Simulated {} event", violation_type.as_str().replace('_', " ")),
        confidence: tenth(rng.random_range(60.0..99.0)) / 100.0,
    }
}

fn trust_score<R: Rng>(session_id: u64, rng: &mut R) -> TrustScoreUpdate {
    let score = tenth(rng.random_range(30.0..100.0));
    let previous = tenth((score + rng.random_range(-10.0..10.0)).clamp(0.0, 100.0));
    TrustScoreUpdate {
        session_id: Some(session_id),
        student_id: Some(rng.random_range(1..=1000)),
        student_name: Some(student_name(rng)),
        score,
        previous_score: Some(previous),
        reason: Some((*pick(TRUST_REASONS, rng)).to_string()),
    }
}

fn student_feed<R: Rng>(session_id: u64, rng: &mut R) -> StudentFeed {
    StudentFeed {
        student_id: Some(rng.random_range(1..=1000)),
        student_name: Some(student_name(rng)),
        exam_id: Some(rng.random_range(1..=50)),
        session_id: Some(session_id),
        status: Some((*pick(STUDENT_STATUSES, rng)).to_string()),
        trust_score: Some(tenth(rng.random_range(30.0..100.0))),
    }
}

fn system_metrics<R: Rng>(rng: &mut R) -> SystemMetrics {
    let active_sessions = rng.random_range(0..=500);
    SystemMetrics {
        cpu_usage: tenth(rng.random_range(5.0..98.0)),
        memory_usage: tenth(rng.random_range(20.0..92.0)),
        active_sessions,
        active_connections: active_sessions + rng.random_range(0..=50),
        response_time_ms: Some(tenth(rng.random_range(15.0..400.0))),
    }
}

fn exam_update<R: Rng>(rng: &mut R) -> ExamUpdate {
    let exam_id = rng.random_range(1..=50);
    ExamUpdate {
        exam_id: Some(exam_id),
        title: Some(format!("Exam {exam_id}")),
        status: Some((*pick(EXAM_STATUSES, rng)).to_string()),
        active_students: Some(rng.random_range(0..=120)),
    }
}

/// Encodes a message as a wire text frame.
fn encode(message: &Message) -> Result<String> {
    Ok(serde_json::to_string(&message.to_wire()?)?)
}

// ============================================================================
// SimulatedTransport
// ============================================================================

/// Transport that synthesizes traffic locally.
///
/// Outbound frames are swallowed; with an ack delay configured, each one is
/// answered by an `ack` frame naming the sent type.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedTransport {
    options: SimulationOptions,
}

impl SimulatedTransport {
    /// Creates a simulated transport.
    #[inline]
    #[must_use]
    pub const fn new(options: SimulationOptions) -> Self {
        Self { options }
    }

    /// Returns the timing options.
    #[inline]
    #[must_use]
    pub const fn options(&self) -> &SimulationOptions {
        &self.options
    }
}

#[async_trait]
impl Transport for SimulatedTransport {
    async fn open(&self, endpoint: &Endpoint, _url: &Url) -> Result<TransportSession> {
        let (session, events, outgoing) = TransportSession::pair();
        tokio::spawn(synthesize(endpoint.clone(), self.options, events, outgoing));
        debug!(endpoint = %endpoint, catalog = ?Catalog::for_endpoint(endpoint), "Simulated session opened");
        Ok(session)
    }

    fn is_simulated(&self) -> bool {
        true
    }
}

/// Emits catalog frames until the connection goes away.
async fn synthesize(
    endpoint: Endpoint,
    options: SimulationOptions,
    events: mpsc::UnboundedSender<TransportEvent>,
    mut outgoing: mpsc::UnboundedReceiver<Outgoing>,
) {
    let catalog = Catalog::for_endpoint(&endpoint);
    let mut sequence = 0u64;

    let timer = sleep(options.next_interval());
    tokio::pin!(timer);

    loop {
        tokio::select! {
            () = &mut timer => {
                sequence += 1;
                let message = catalog.generate(&endpoint, sequence, &mut rand::rng());
                match encode(&message) {
                    Ok(text) => {
                        trace!(endpoint = %endpoint, kind = message.kind(), sequence, "Simulated frame");
                        if events.send(TransportEvent::Text(text)).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(endpoint = %endpoint, error = %e, "Failed to encode simulated frame"),
                }
                timer.as_mut().reset(Instant::now() + options.next_interval());
            }

            frame = outgoing.recv() => match frame {
                Some(Outgoing::Text(text)) => {
                    if let Some(delay) = options.ack_delay {
                        schedule_ack(&endpoint, &text, delay, events.clone());
                    }
                }
                Some(Outgoing::Close { .. }) => {
                    let _ = events.send(TransportEvent::Closed {
                        code: CLOSE_NORMAL,
                        reason: "simulation stopped".to_string(),
                    });
                    break;
                }
                None => break,
            },
        }
    }

    debug!(endpoint = %endpoint, frames = sequence, "Simulated session ended");
}

/// Loops an `ack` for the sent frame back after `delay`.
fn schedule_ack(
    endpoint: &Endpoint,
    sent: &str,
    delay: Duration,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    let ack_type = serde_json::from_str::<Value>(sent)
        .ok()
        .and_then(|value| value.get("type").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_default();

    let text = match encode(&Message::Ack(Ack { ack_type })) {
        Ok(text) => text,
        Err(e) => {
            warn!(endpoint = %endpoint, error = %e, "Failed to encode ack");
            return;
        }
    };

    tokio::spawn(async move {
        sleep(delay).await;
        let _ = events.send(TransportEvent::Text(text));
    });
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use crate::protocol::Envelope;

    fn endpoint(name: &str) -> Endpoint {
        Endpoint::parse(name).expect("endpoint")
    }

    #[test]
    fn test_catalog_selection() {
        assert_eq!(Catalog::for_endpoint(&endpoint("notifications")), Catalog::Notifications);
        assert_eq!(Catalog::for_endpoint(&endpoint("violations")), Catalog::Violations);
        assert_eq!(Catalog::for_endpoint(&endpoint("proctoring/42")), Catalog::Proctoring);
        assert_eq!(Catalog::for_endpoint(&endpoint("trust-scores")), Catalog::TrustScores);
        assert_eq!(Catalog::for_endpoint(&endpoint("metrics")), Catalog::Metrics);
        assert_eq!(Catalog::for_endpoint(&endpoint("system")), Catalog::Metrics);
        assert_eq!(Catalog::for_endpoint(&endpoint("exams")), Catalog::Exams);
        assert_eq!(Catalog::for_endpoint(&endpoint("lobby")), Catalog::Notifications);
    }

    #[test]
    fn test_generated_frames_decode_to_catalog_types() {
        let mut rng = StdRng::seed_from_u64(7);
        for name in [
            "notifications",
            "violations",
            "proctoring/42",
            "trust-scores",
            "metrics",
            "exams",
        ] {
            let ep = endpoint(name);
            let catalog = Catalog::for_endpoint(&ep);
            for sequence in 1..=25 {
                let message = catalog.generate(&ep, sequence, &mut rng);
                let text = encode(&message).expect("encode");
                let envelope = Envelope::decode(&ep, &text).expect("decode");
                assert!(catalog.kinds().contains(&envelope.kind()), "{name}: {}", envelope.kind());
            }
        }
    }

    #[test]
    fn test_proctoring_pins_session_id() {
        let mut rng = StdRng::seed_from_u64(3);
        let ep = endpoint("proctoring/42");
        for sequence in 1..=20 {
            match Catalog::Proctoring.generate(&ep, sequence, &mut rng) {
                Message::Violation(v) => assert_eq!(v.session_id, Some(42)),
                Message::TrustScoreUpdate(t) => assert_eq!(t.session_id, Some(42)),
                Message::StudentFeed(s) => assert_eq!(s.session_id, Some(42)),
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn test_options_validation() {
        assert!(SimulationOptions::new().validate().is_ok());
        assert!(
            SimulationOptions::new()
                .with_interval(Duration::from_secs(10), Duration::from_secs(1))
                .validate()
                .is_err()
        );
        assert!(
            SimulationOptions::new()
                .with_interval(Duration::ZERO, Duration::from_secs(1))
                .validate()
                .is_err()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_emits_within_interval() {
        let transport = SimulatedTransport::new(SimulationOptions::new());
        let ep = endpoint("violations");
        let url = Url::parse("ws://localhost/ws/violations").expect("url");
        let mut session = transport.open(&ep, &url).await.expect("open");

        tokio::time::sleep(DEFAULT_MAX_INTERVAL + Duration::from_secs(1)).await;

        match session.events.try_recv() {
            Ok(TransportEvent::Text(text)) => assert!(text.contains("\"violation\"")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_ack_loopback() {
        let options = SimulationOptions::new()
            .with_interval(Duration::from_secs(3600), Duration::from_secs(3600))
            .with_ack_delay(Duration::from_millis(100));
        let transport = SimulatedTransport::new(options);
        let ep = endpoint("notifications");
        let url = Url::parse("ws://localhost/ws/notifications").expect("url");
        let mut session = transport.open(&ep, &url).await.expect("open");

        session
            .writer
            .send(Outgoing::Text(r#"{"type":"mark_read","id":4}"#.into()))
            .expect("write");

        match session.events.recv().await {
            Some(TransportEvent::Text(text)) => {
                let envelope = Envelope::decode(&ep, &text).expect("decode");
                assert_eq!(
                    envelope.message(),
                    &Message::Ack(Ack {
                        ack_type: "mark_read".into()
                    })
                );
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_is_clean() {
        let transport = SimulatedTransport::default();
        let ep = endpoint("metrics");
        let url = Url::parse("ws://localhost/ws/metrics").expect("url");
        let mut session = transport.open(&ep, &url).await.expect("open");

        session
            .writer
            .send(Outgoing::Close {
                code: CLOSE_NORMAL,
                reason: String::new(),
            })
            .expect("write");

        assert!(matches!(
            session.events.recv().await,
            Some(TransportEvent::Closed { code: CLOSE_NORMAL, .. })
        ));
    }
}
