//! Reconnect delays with exponential growth and full jitter.

use std::time::Duration;

use rand::Rng;

use crate::config::BackoffConfig;

/// Computes how long a broken stream waits before its next attempt.
///
/// Attempt `n` (starting at 1) draws a delay uniformly from
/// `0..=min(max, base * 2^(n-1))`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base_ms: u64,
    max_ms: u64,
    max_attempts: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration, max_attempts: u32) -> Self {
        Self {
            base_ms: base.as_millis().min(u64::MAX as u128) as u64,
            max_ms: max.as_millis().min(u64::MAX as u128) as u64,
            max_attempts,
        }
    }

    pub fn from_config(config: &BackoffConfig) -> Self {
        Self {
            base_ms: config.base_ms,
            max_ms: config.max_ms,
            max_attempts: config.max_attempts,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns `true` once `attempt` is past the allowed number of attempts.
    pub fn exhausted(&self, attempt: u32) -> bool {
        attempt > self.max_attempts
    }

    /// The largest delay attempt `attempt` may draw.
    pub fn ceiling(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32);
        let ceiling = self.base_ms.saturating_mul(2u64.saturating_pow(exponent));
        Duration::from_millis(ceiling.min(self.max_ms))
    }

    /// A jittered delay for attempt `attempt`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let ceiling = self.ceiling(attempt).as_millis() as u64;
        let jittered = rand::thread_rng().gen_range(0..=ceiling);
        Duration::from_millis(jittered)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::from_config(&BackoffConfig::default())
    }
}
