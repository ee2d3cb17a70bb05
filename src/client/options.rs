//! Client tuning options.
//!
//! Groups every knob of the realtime client that does not depend on the
//! target server: reconnection schedule, timeouts, channel capacities and
//! simulation timing.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use proctor_live::RealtimeOptions;
//!
//! let options = RealtimeOptions::new()
//!     .with_max_reconnect_attempts(8)
//!     .with_max_delay(Duration::from_secs(60))
//!     .with_heartbeat_interval(Duration::from_secs(30));
//!
//! options.validate()?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use url::Url;

use crate::channels::metrics::{DEFAULT_HIGH_LOAD_THRESHOLD, DEFAULT_METRICS_CAP};
use crate::channels::notifications::DEFAULT_NOTIFICATION_CAP;
use crate::channels::trust_score::{
    DEFAULT_LOW_SCORE_CAP, DEFAULT_LOW_SCORE_THRESHOLD, DEFAULT_TRUST_SCORE_CAP,
};
use crate::channels::violations::DEFAULT_VIOLATION_CAP;
use crate::error::{Error, Result};
use crate::transport::registry::DEFAULT_CONNECT_TIMEOUT;
use crate::transport::{BackoffPolicy, RegistrySettings, SimulationOptions};

// ============================================================================
// RealtimeOptions
// ============================================================================

/// Realtime client configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RealtimeOptions {
    /// Reconnection schedule.
    pub backoff: BackoffPolicy,

    /// Retry connections that close abnormally.
    pub auto_reconnect: bool,

    /// Time allowed for a transport to open.
    pub connect_timeout: Duration,

    /// Period of outbound heartbeats on live connections.
    pub heartbeat_interval: Option<Duration>,

    /// Notification history size.
    pub notification_cap: usize,

    /// Violation history size.
    pub violation_cap: usize,

    /// Trust-score history size.
    pub trust_score_cap: usize,

    /// Low trust-score history size.
    pub low_score_cap: usize,

    /// Scores strictly below this are flagged.
    pub low_score_threshold: f64,

    /// System metrics history size.
    pub metrics_cap: usize,

    /// CPU percentage counted as high load.
    pub high_load_threshold: f64,

    /// Timing of simulated sessions.
    pub simulation: SimulationOptions,
}

impl Default for RealtimeOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl RealtimeOptions {
    /// Creates options with the default schedule and capacities.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            backoff: BackoffPolicy::new(),
            auto_reconnect: true,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            heartbeat_interval: None,
            notification_cap: DEFAULT_NOTIFICATION_CAP,
            violation_cap: DEFAULT_VIOLATION_CAP,
            trust_score_cap: DEFAULT_TRUST_SCORE_CAP,
            low_score_cap: DEFAULT_LOW_SCORE_CAP,
            low_score_threshold: DEFAULT_LOW_SCORE_THRESHOLD,
            metrics_cap: DEFAULT_METRICS_CAP,
            high_load_threshold: DEFAULT_HIGH_LOAD_THRESHOLD,
            simulation: SimulationOptions::new(),
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl RealtimeOptions {
    /// Sets the number of consecutive failures tolerated per endpoint.
    #[inline]
    #[must_use]
    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.backoff.max_attempts = attempts;
        self
    }

    /// Sets the delay unit of the reconnection schedule.
    #[inline]
    #[must_use]
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.backoff.base_delay = delay;
        self
    }

    /// Sets the ceiling of a single reconnection delay.
    #[inline]
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.backoff.max_delay = delay;
        self
    }

    /// Sets the jitter fraction.
    #[inline]
    #[must_use]
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.backoff.jitter = jitter;
        self
    }

    /// Replaces the whole reconnection schedule.
    #[inline]
    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Disables automatic reconnection.
    #[inline]
    #[must_use]
    pub fn without_auto_reconnect(mut self) -> Self {
        self.auto_reconnect = false;
        self
    }

    /// Sets the transport open timeout.
    #[inline]
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Enables heartbeats at `interval`.
    #[inline]
    #[must_use]
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = Some(interval);
        self
    }

    /// Sets the notification history size.
    #[inline]
    #[must_use]
    pub fn with_notification_cap(mut self, cap: usize) -> Self {
        self.notification_cap = cap;
        self
    }

    /// Sets the violation history size.
    #[inline]
    #[must_use]
    pub fn with_violation_cap(mut self, cap: usize) -> Self {
        self.violation_cap = cap;
        self
    }

    /// Sets the trust-score history sizes.
    #[inline]
    #[must_use]
    pub fn with_trust_score_caps(mut self, cap: usize, low_cap: usize) -> Self {
        self.trust_score_cap = cap;
        self.low_score_cap = low_cap;
        self
    }

    /// Sets the low trust-score threshold.
    #[inline]
    #[must_use]
    pub fn with_low_score_threshold(mut self, threshold: f64) -> Self {
        self.low_score_threshold = threshold;
        self
    }

    /// Sets the metrics history size.
    #[inline]
    #[must_use]
    pub fn with_metrics_cap(mut self, cap: usize) -> Self {
        self.metrics_cap = cap;
        self
    }

    /// Sets the high-load CPU threshold.
    #[inline]
    #[must_use]
    pub fn with_high_load_threshold(mut self, threshold: f64) -> Self {
        self.high_load_threshold = threshold;
        self
    }

    /// Sets simulation timing.
    #[inline]
    #[must_use]
    pub fn with_simulation(mut self, simulation: SimulationOptions) -> Self {
        self.simulation = simulation;
        self
    }
}

// ============================================================================
// Conversion Methods
// ============================================================================

impl RealtimeOptions {
    /// Builds registry settings rooted at `base_url`.
    #[must_use]
    pub fn registry_settings(&self, base_url: Url) -> RegistrySettings {
        RegistrySettings {
            base_url,
            backoff: self.backoff,
            auto_reconnect: self.auto_reconnect,
            connect_timeout: self.connect_timeout,
            heartbeat_interval: self.heartbeat_interval,
        }
    }

    /// Validates the options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        self.backoff.validate()?;
        self.simulation.validate()?;

        if self.connect_timeout.is_zero() {
            return Err(Error::config("connect_timeout must be greater than zero"));
        }
        if self.heartbeat_interval.is_some_and(|interval| interval.is_zero()) {
            return Err(Error::config("heartbeat_interval must be greater than zero"));
        }

        let caps = [
            ("notification_cap", self.notification_cap),
            ("violation_cap", self.violation_cap),
            ("trust_score_cap", self.trust_score_cap),
            ("low_score_cap", self.low_score_cap),
            ("metrics_cap", self.metrics_cap),
        ];
        if let Some((name, _)) = caps.iter().find(|(_, cap)| *cap == 0) {
            return Err(Error::config(format!("{name} must be greater than zero")));
        }

        if !(0.0..=100.0).contains(&self.low_score_threshold) {
            return Err(Error::config(format!(
                "low_score_threshold must be in [0, 100], got {}",
                self.low_score_threshold
            )));
        }
        if !(0.0..=100.0).contains(&self.high_load_threshold) {
            return Err(Error::config(format!(
                "high_load_threshold must be in [0, 100], got {}",
                self.high_load_threshold
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_creates_default() {
        let options = RealtimeOptions::new();
        assert_eq!(options.backoff, BackoffPolicy::new());
        assert!(options.auto_reconnect);
        assert_eq!(options.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
        assert!(options.heartbeat_interval.is_none());
        assert_eq!(options.notification_cap, 50);
        assert_eq!(options.violation_cap, 100);
        assert_eq!(options.trust_score_cap, 20);
        assert_eq!(options.low_score_cap, 10);
        assert_eq!(options.metrics_cap, 30);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_builder_chain() {
        let options = RealtimeOptions::new()
            .with_max_reconnect_attempts(3)
            .with_base_delay(Duration::from_millis(250))
            .with_max_delay(Duration::from_secs(5))
            .with_jitter(0.0)
            .without_auto_reconnect()
            .with_heartbeat_interval(Duration::from_secs(15));

        assert_eq!(options.backoff.max_attempts, 3);
        assert_eq!(options.backoff.base_delay, Duration::from_millis(250));
        assert_eq!(options.backoff.max_delay, Duration::from_secs(5));
        assert!(!options.auto_reconnect);
        assert_eq!(options.heartbeat_interval, Some(Duration::from_secs(15)));
    }

    #[test]
    fn test_registry_settings() {
        let base = Url::parse("ws://localhost:8000/ws").expect("url");
        let settings = RealtimeOptions::new()
            .with_connect_timeout(Duration::from_secs(3))
            .registry_settings(base.clone());

        assert_eq!(settings.base_url, base);
        assert_eq!(settings.connect_timeout, Duration::from_secs(3));
        assert!(settings.auto_reconnect);
    }

    #[test]
    fn test_validate_zero_cap() {
        let err = RealtimeOptions::new()
            .with_violation_cap(0)
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("violation_cap"));
    }

    #[test]
    fn test_validate_threshold_range() {
        assert!(RealtimeOptions::new().with_low_score_threshold(120.0).validate().is_err());
        assert!(RealtimeOptions::new().with_high_load_threshold(-1.0).validate().is_err());
    }

    #[test]
    fn test_validate_delegates_to_backoff() {
        let options = RealtimeOptions::new().with_jitter(1.5);
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_validate_zero_heartbeat() {
        let options = RealtimeOptions::new().with_heartbeat_interval(Duration::ZERO);
        assert!(options.validate().is_err());
    }
}
