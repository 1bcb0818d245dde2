//! Retry policy: decides attempt budget and backoff delays.

use std::time::Duration;

use crate::domain::RunSettings;

/// Retry policy for one task's install attempts.
///
/// Delays are exact (no jitter): consecutive delays never shrink and never
/// exceed `max_delay`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Attempts per task, including the first.
    pub max_attempts: u32,

    /// Delay after the first failed attempt.
    pub base_delay: Duration,

    /// Backoff multiplier for exponential backoff.
    pub multiplier: f64,

    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn from_settings(settings: &RunSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            base_delay: Duration::from_secs(settings.backoff_base_secs),
            max_delay: Duration::from_secs(settings.backoff_cap_secs),
            ..Self::default()
        }
    }

    /// Delay to wait after `attempts` attempts have failed (1-indexed):
    /// `min(base_delay * multiplier^(attempts - 1), max_delay)`.
    ///
    /// With the defaults: 2s, 4s, 8s, 16s, 30s, 30s, ...
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay_secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let cap_secs = self.max_delay.as_secs_f64();
        if !delay_secs.is_finite() || delay_secs >= cap_secs {
            return self.max_delay;
        }
        Duration::from_secs_f64(delay_secs)
    }
}
