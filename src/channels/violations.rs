//! Violation feed.
//!
//! Keeps the most recent violations and running counters since the last
//! clear. Counters are not affected by eviction.

// ============================================================================
// Imports
// ============================================================================

use rustc_hash::FxHashMap;

use crate::protocol::{Envelope, Message, Violation, ViolationType, kinds};

use super::Feed;
use super::buffer::{ChannelBuffer, Stamped};

// ============================================================================
// Constants
// ============================================================================

/// Default number of violations kept.
pub const DEFAULT_VIOLATION_CAP: usize = 100;

// ============================================================================
// ViolationFeed
// ============================================================================

/// Recent violations with alert and per-type counters.
#[derive(Debug, Clone, PartialEq)]
pub struct ViolationFeed {
    buffer: ChannelBuffer<Stamped<Violation>>,
    total: usize,
    alert_count: usize,
    by_type: FxHashMap<ViolationType, usize>,
}

impl Default for ViolationFeed {
    fn default() -> Self {
        Self::new(DEFAULT_VIOLATION_CAP)
    }
}

impl ViolationFeed {
    /// Creates a feed keeping at most `capacity` violations.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: ChannelBuffer::new(capacity),
            total: 0,
            alert_count: 0,
            by_type: FxHashMap::default(),
        }
    }

    /// Violations, newest first.
    pub fn recent(&self) -> impl Iterator<Item = &Stamped<Violation>> {
        self.buffer.recent()
    }

    /// Buffered high and critical violations, newest first.
    pub fn alerts(&self) -> impl Iterator<Item = &Stamped<Violation>> {
        self.buffer.recent().filter(|v| v.value.severity.is_alert())
    }

    /// Violations seen since the last clear.
    #[inline]
    #[must_use]
    pub fn total(&self) -> usize {
        self.total
    }

    /// High and critical violations seen since the last clear.
    #[inline]
    #[must_use]
    pub fn alert_count(&self) -> usize {
        self.alert_count
    }

    /// Violations of `violation_type` seen since the last clear.
    #[must_use]
    pub fn count_of(&self, violation_type: ViolationType) -> usize {
        self.by_type.get(&violation_type).copied().unwrap_or(0)
    }

    /// Per-type counts, most frequent first.
    #[must_use]
    pub fn counts_by_type(&self) -> Vec<(ViolationType, usize)> {
        let mut counts: Vec<_> = self.by_type.iter().map(|(t, n)| (*t, *n)).collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.as_str().cmp(b.0.as_str())));
        counts
    }

    /// Buffered violations for one exam session, newest first.
    pub fn for_session(&self, session_id: u64) -> impl Iterator<Item = &Stamped<Violation>> {
        self.buffer
            .recent()
            .filter(move |v| v.value.session_id == Some(session_id))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

impl Feed for ViolationFeed {
    const KIND: &'static str = kinds::VIOLATION;

    fn ingest(&mut self, envelope: &Envelope) {
        let Message::Violation(violation) = envelope.message() else {
            return;
        };

        self.total += 1;
        if violation.severity.is_alert() {
            self.alert_count += 1;
        }
        *self.by_type.entry(violation.violation_type).or_default() += 1;
        self.buffer
            .push(Stamped::from_envelope(envelope, violation.clone()));
    }

    fn clear(&mut self) {
        self.buffer.clear();
        self.total = 0;
        self.alert_count = 0;
        self.by_type.clear();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::identifiers::Endpoint;

    fn envelope(violation_type: &str, severity: &str, session_id: u64) -> Envelope {
        let endpoint = Endpoint::parse("violations").expect("endpoint");
        let text = json!({
            "type": "violation",
            "violation_type": violation_type,
            "severity": severity,
            "session_id": session_id,
        })
        .to_string();
        Envelope::decode(&endpoint, &text).expect("decode")
    }

    #[test]
    fn test_counters() {
        let mut feed = ViolationFeed::default();
        feed.ingest(&envelope("tab_switch", "low", 1));
        feed.ingest(&envelope("phone_detected", "critical", 1));
        feed.ingest(&envelope("tab_switch", "high", 2));
        feed.ingest(&envelope("looking_away", "warning", 2));

        assert_eq!(feed.total(), 4);
        assert_eq!(feed.alert_count(), 2);
        assert_eq!(feed.alerts().count(), 2);
        assert_eq!(feed.count_of(ViolationType::TabSwitch), 2);
        assert_eq!(feed.counts_by_type()[0], (ViolationType::TabSwitch, 2));
        assert_eq!(feed.for_session(1).count(), 2);
    }

    #[test]
    fn test_counters_survive_eviction_until_clear() {
        let mut feed = ViolationFeed::new(1);
        feed.ingest(&envelope("tab_switch", "critical", 1));
        feed.ingest(&envelope("window_blur", "low", 1));

        assert_eq!(feed.len(), 1);
        assert_eq!(feed.alert_count(), 1);
        assert_eq!(feed.alerts().count(), 0);

        feed.clear();
        assert_eq!(feed.total(), 0);
        assert_eq!(feed.alert_count(), 0);
        assert!(feed.counts_by_type().is_empty());
    }
}
