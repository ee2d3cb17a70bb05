//! System metrics feed.

use crate::protocol::{Envelope, Message, SystemMetrics, kinds};

use super::Feed;
use super::buffer::{ChannelBuffer, Stamped};

/// Default number of samples kept.
pub const DEFAULT_METRICS_CAP: usize = 30;

/// CPU percentage at or above which a sample counts as high load.
pub const DEFAULT_HIGH_LOAD_THRESHOLD: f64 = 80.0;

/// Recent platform health samples.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsFeed {
    buffer: ChannelBuffer<Stamped<SystemMetrics>>,
    high_load_threshold: f64,
    peak_cpu: Option<f64>,
    high_load_count: usize,
}

impl Default for MetricsFeed {
    fn default() -> Self {
        Self::new(DEFAULT_METRICS_CAP)
    }
}

impl MetricsFeed {
    /// Creates a feed keeping at most `capacity` samples.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: ChannelBuffer::new(capacity),
            high_load_threshold: DEFAULT_HIGH_LOAD_THRESHOLD,
            peak_cpu: None,
            high_load_count: 0,
        }
    }

    /// Sets the high-load CPU threshold.
    #[must_use]
    pub fn with_high_load_threshold(mut self, threshold: f64) -> Self {
        self.high_load_threshold = threshold;
        self
    }

    /// Samples, newest first.
    pub fn recent(&self) -> impl Iterator<Item = &Stamped<SystemMetrics>> {
        self.buffer.recent()
    }

    /// Newest sample.
    #[must_use]
    pub fn latest(&self) -> Option<&SystemMetrics> {
        self.buffer.latest().map(|s| &s.value)
    }

    /// Highest CPU usage seen since the last clear.
    #[inline]
    #[must_use]
    pub fn peak_cpu(&self) -> Option<f64> {
        self.peak_cpu
    }

    /// Samples at or above the high-load threshold since the last clear.
    #[inline]
    #[must_use]
    pub fn high_load_count(&self) -> usize {
        self.high_load_count
    }

    /// CPU usage in arrival order, for charting.
    #[must_use]
    pub fn cpu_series(&self) -> Vec<f64> {
        self.buffer.chronological().map(|s| s.value.cpu_usage).collect()
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

impl Feed for MetricsFeed {
    const KIND: &'static str = kinds::SYSTEM_METRICS;

    fn ingest(&mut self, envelope: &Envelope) {
        let Message::SystemMetrics(sample) = envelope.message() else {
            return;
        };

        let cpu = sample.cpu_usage;
        self.peak_cpu = Some(self.peak_cpu.map_or(cpu, |peak| peak.max(cpu)));
        if cpu >= self.high_load_threshold {
            self.high_load_count += 1;
        }
        self.buffer.push(Stamped::from_envelope(envelope, sample.clone()));
    }

    fn clear(&mut self) {
        self.buffer.clear();
        self.peak_cpu = None;
        self.high_load_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::identifiers::Endpoint;

    fn envelope(cpu: f64) -> Envelope {
        let endpoint = Endpoint::parse("metrics").expect("endpoint");
        let text = json!({ "type": "system_metrics", "cpu_usage": cpu, "memory_usage": 50.0 }).to_string();
        Envelope::decode(&endpoint, &text).expect("decode")
    }

    #[test]
    fn test_peak_and_high_load() {
        let mut feed = MetricsFeed::default();
        for cpu in [35.0, 91.5, 80.0, 12.0] {
            feed.ingest(&envelope(cpu));
        }

        assert_eq!(feed.peak_cpu(), Some(91.5));
        assert_eq!(feed.high_load_count(), 2);
        assert_eq!(feed.latest().map(|m| m.cpu_usage), Some(12.0));
        assert_eq!(feed.cpu_series(), vec![35.0, 91.5, 80.0, 12.0]);
    }

    #[test]
    fn test_clear_resets() {
        let mut feed = MetricsFeed::default().with_high_load_threshold(50.0);
        feed.ingest(&envelope(60.0));
        feed.clear();

        assert!(feed.is_empty());
        assert_eq!(feed.peak_cpu(), None);
        assert_eq!(feed.high_load_count(), 0);
    }
}
