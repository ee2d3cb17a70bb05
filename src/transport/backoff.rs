//! Reconnection controller.
//!
//! Delay for the `n`-th consecutive failure is
//! `min(max_delay, base_delay * 2^n)`, scaled by a random factor in
//! `[1 - jitter, 1 + jitter]` and clamped to `max_delay`. Within one failure
//! streak the scheduled delays never decrease. Once `n` would exceed
//! `max_attempts` the controller gives up until [`ReconnectState::reset`].

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use rand::Rng;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default delay unit for the exponential schedule.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Default ceiling for a single delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(30_000);

/// Default number of consecutive failures before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default jitter fraction (±20%).
pub const DEFAULT_JITTER: f64 = 0.2;

// ============================================================================
// BackoffPolicy
// ============================================================================

/// Parameters of the reconnection schedule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    /// Delay unit; the first retry waits `2 * base_delay`.
    pub base_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Consecutive failures tolerated before giving up.
    pub max_attempts: u32,
    /// Jitter fraction in `[0, 1)`.
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl BackoffPolicy {
    /// Creates the default policy (1s base, 30s cap, 5 attempts, ±20%).
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            jitter: DEFAULT_JITTER,
        }
    }

    /// Sets the base delay.
    #[inline]
    #[must_use]
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Sets the maximum delay.
    #[inline]
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the attempt ceiling.
    #[inline]
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the jitter fraction. `0.0` disables jitter.
    #[inline]
    #[must_use]
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    /// Validates the policy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the base delay is zero, the maximum is
    /// below the base, or the jitter is outside `[0, 1)`.
    pub fn validate(&self) -> Result<()> {
        if self.base_delay.is_zero() {
            return Err(Error::config("base_delay must be greater than zero"));
        }
        if self.max_delay < self.base_delay {
            return Err(Error::config("max_delay must not be below base_delay"));
        }
        if !(0.0..1.0).contains(&self.jitter) {
            return Err(Error::config(format!(
                "jitter must be in [0, 1), got {}",
                self.jitter
            )));
        }
        Ok(())
    }

    /// Returns the un-jittered delay for the `attempt`-th failure.
    #[must_use]
    pub fn base_delay_for(&self, attempt: u32) -> Duration {
        let multiplier = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(multiplier)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Scales `delay` by `factor` and clamps it to the maximum.
    #[must_use]
    pub fn scale(&self, delay: Duration, factor: f64) -> Duration {
        Duration::try_from_secs_f64(delay.as_secs_f64() * factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Draws a jitter factor.
    fn random_factor(&self) -> f64 {
        if self.jitter <= 0.0 {
            return 1.0;
        }
        rand::rng().random_range((1.0 - self.jitter)..=(1.0 + self.jitter))
    }
}

// ============================================================================
// ReconnectDecision
// ============================================================================

/// Outcome of recording a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Retry after `delay`.
    Retry {
        /// 1-based attempt number.
        attempt: u32,
        /// Delay before the attempt.
        delay: Duration,
    },
    /// The ceiling was reached; stop retrying.
    GiveUp {
        /// Attempts made before giving up.
        attempts: u32,
    },
}

// ============================================================================
// ReconnectState
// ============================================================================

/// Per-endpoint failure streak.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconnectState {
    attempts: u32,
    last_delay: Option<Duration>,
    exhausted: bool,
}

impl ReconnectState {
    /// Creates a fresh state.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an abnormal closure with a random jitter factor.
    pub fn record_failure(&mut self, policy: &BackoffPolicy) -> ReconnectDecision {
        let factor = policy.random_factor();
        self.record_failure_with(policy, factor)
    }

    /// Records an abnormal closure with an explicit jitter factor.
    pub fn record_failure_with(&mut self, policy: &BackoffPolicy, factor: f64) -> ReconnectDecision {
        if self.exhausted || self.attempts >= policy.max_attempts {
            self.exhausted = true;
            return ReconnectDecision::GiveUp {
                attempts: self.attempts,
            };
        }

        self.attempts += 1;
        let mut delay = policy.scale(policy.base_delay_for(self.attempts), factor);
        if let Some(previous) = self.last_delay {
            delay = delay.max(previous);
        }
        self.last_delay = Some(delay);

        ReconnectDecision::Retry {
            attempt: self.attempts,
            delay,
        }
    }

    /// Clears the streak after a successful open.
    #[inline]
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Returns the number of retries scheduled in the current streak.
    #[inline]
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Returns the most recent scheduled delay.
    #[inline]
    #[must_use]
    pub fn last_delay(&self) -> Option<Duration> {
        self.last_delay
    }

    /// Returns `true` once the controller has given up.
    #[inline]
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}

// ============================================================================
// Tests
// ============================================================================
