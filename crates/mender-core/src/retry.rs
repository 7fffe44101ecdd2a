//! Retry policy: attempt budget and backoff delays.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// Retry policy for failed jobs.
///
/// Immutable once the scheduler is built; passed into the executor by value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts per job, including the first one.
    pub max_attempts: u32,

    /// Delay before the first retry.
    pub initial_delay_ms: u64,

    /// Backoff multiplier for exponential backoff.
    pub multiplier: f64,

    /// Upper bound for any single delay.
    pub max_delay_ms: u64,

    /// Extra random delay as a fraction of the computed delay (0.0 = none).
    /// The result is still clamped to `max_delay_ms`.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    /// 3 attempts, 5s initial delay doubling up to 5 minutes.
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 5_000,
            multiplier: 2.0,
            max_delay_ms: 300_000,
            jitter: 0.0,
        }
    }
}

impl RetryPolicy {
    /// Policy with millisecond delays, handy for tests and local runs.
    pub fn fast(max_attempts: u32, initial_delay_ms: u64) -> Self {
        Self {
            max_attempts,
            initial_delay_ms,
            multiplier: 2.0,
            max_delay_ms: initial_delay_ms.saturating_mul(64),
            jitter: 0.0,
        }
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Backoff before the next attempt, without jitter.
    ///
    /// `attempts` is the number of attempts already made (1-indexed):
    /// `delay = min(initial * multiplier^(attempts - 1), max)`.
    ///
    /// With initial=5s, multiplier=2.0, max=300s:
    /// - after attempt 1: 5s
    /// - after attempt 2: 10s
    /// - after attempt 7: 300s (320s clamped)
    pub fn base_delay(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(i32::MAX as u32) as i32;
        let max_secs = self.max_delay().as_secs_f64();
        let secs = self.initial_delay().as_secs_f64() * self.multiplier.powi(exponent);
        Duration::from_secs_f64(secs.min(max_secs))
    }

    /// Backoff before the next attempt, including jitter.
    ///
    /// Always within `[base_delay(attempts), max_delay]`.
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let base = self.base_delay(attempts);
        if self.jitter <= 0.0 {
            return base;
        }
        let extra = base.as_secs_f64() * self.jitter * rand::thread_rng().gen_range(0.0..=1.0);
        (base + Duration::from_secs_f64(extra)).min(self.max_delay())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be at least 1".into()));
        }
        if !(self.multiplier >= 1.0 && self.multiplier.is_finite()) {
            return Err(ConfigError::Invalid(format!(
                "retry.multiplier must be a finite number >= 1.0 (got {})",
                self.multiplier
            )));
        }
        if self.initial_delay_ms > self.max_delay_ms {
            return Err(ConfigError::Invalid(format!(
                "retry.initial_delay_ms ({}) exceeds retry.max_delay_ms ({})",
                self.initial_delay_ms, self.max_delay_ms
            )));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(ConfigError::Invalid(format!(
                "retry.jitter must be within 0.0..=1.0 (got {})",
                self.jitter
            )));
        }
        Ok(())
    }
}
