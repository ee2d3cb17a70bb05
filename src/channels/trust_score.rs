//! Trust-score feed.
//!
//! Samples below the threshold are additionally kept in a separate low-score
//! list with its own cap.

use crate::protocol::{Envelope, Message, TrustScoreUpdate, kinds};

use super::Feed;
use super::buffer::{ChannelBuffer, Stamped};

/// Default number of samples kept.
pub const DEFAULT_TRUST_SCORE_CAP: usize = 20;

/// Default number of low-score samples kept.
pub const DEFAULT_LOW_SCORE_CAP: usize = 10;

/// Scores strictly below this are low.
pub const DEFAULT_LOW_SCORE_THRESHOLD: f64 = 60.0;

/// Recent trust-score samples with a low-score sub-list.
#[derive(Debug, Clone, PartialEq)]
pub struct TrustScoreFeed {
    samples: ChannelBuffer<Stamped<TrustScoreUpdate>>,
    low: ChannelBuffer<Stamped<TrustScoreUpdate>>,
    threshold: f64,
}

impl Default for TrustScoreFeed {
    fn default() -> Self {
        Self::new(DEFAULT_TRUST_SCORE_CAP, DEFAULT_LOW_SCORE_CAP, DEFAULT_LOW_SCORE_THRESHOLD)
    }
}

impl TrustScoreFeed {
    /// Creates a feed.
    #[must_use]
    pub fn new(capacity: usize, low_capacity: usize, threshold: f64) -> Self {
        Self {
            samples: ChannelBuffer::new(capacity),
            low: ChannelBuffer::new(low_capacity),
            threshold,
        }
    }

    /// Returns the low-score threshold.
    #[inline]
    #[must_use]
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Samples, newest first.
    pub fn recent(&self) -> impl Iterator<Item = &Stamped<TrustScoreUpdate>> {
        self.samples.recent()
    }

    /// Low-score samples, newest first.
    pub fn low_scores(&self) -> impl Iterator<Item = &Stamped<TrustScoreUpdate>> {
        self.low.recent()
    }

    /// Low-score values in arrival order.
    #[must_use]
    pub fn low_score_values(&self) -> Vec<f64> {
        self.low.chronological().map(|s| s.value.score).collect()
    }

    /// Newest sample.
    #[must_use]
    pub fn latest(&self) -> Option<&TrustScoreUpdate> {
        self.samples.latest().map(|s| &s.value)
    }

    /// Newest sample for one exam session.
    #[must_use]
    pub fn latest_for_session(&self, session_id: u64) -> Option<&TrustScoreUpdate> {
        self.samples
            .recent()
            .map(|s| &s.value)
            .find(|update| update.session_id == Some(session_id))
    }

    /// Mean of the buffered scores.
    #[must_use]
    pub fn average(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        let sum: f64 = self.samples.recent().map(|s| s.value.score).sum();
        Some(sum / self.samples.len() as f64)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl Feed for TrustScoreFeed {
    const KIND: &'static str = kinds::TRUST_SCORE_UPDATE;

    fn ingest(&mut self, envelope: &Envelope) {
        let Message::TrustScoreUpdate(update) = envelope.message() else {
            return;
        };

        let stamped = Stamped::from_envelope(envelope, update.clone());
        if update.score < self.threshold {
            self.low.push(stamped.clone());
        }
        self.samples.push(stamped);
    }

    fn clear(&mut self) {
        self.samples.clear();
        self.low.clear();
    }
}
