// src/dag/retry.rs

//! Retry policy and exponential backoff.

use std::time::Duration;

use rand::Rng;

/// Per-task retry configuration.
///
/// `max_attempts` counts *all* attempts, including the first one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_attempts,
            base_backoff,
            max_backoff,
        }
    }

    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Whether another attempt is allowed after `attempts_made` attempts.
    pub fn allows_another(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }

    /// Un-jittered delay after the `failed_attempt`-th failure (1-based):
    /// `min(base * 2^(failed_attempt - 1), max)`.
    pub fn delay_for(&self, failed_attempt: u32) -> Duration {
        let exp = failed_attempt.saturating_sub(1).min(31);
        let factor = 1u32 << exp;
        self.base_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }

    /// [`delay_for`](Self::delay_for) plus uniform jitter in `[0, 10%]`.
    pub fn jittered_delay_for(&self, failed_attempt: u32) -> Duration {
        with_jitter(self.delay_for(failed_attempt), &mut rand::rng())
    }
}

/// Add up to 10% of `delay` as random jitter.
pub fn with_jitter<R: Rng + ?Sized>(delay: Duration, rng: &mut R) -> Duration {
    let fraction: f64 = rng.random_range(0.0..=0.1);
    delay + delay.mul_f64(fraction)
}
