//! Retry policy with exponential backoff for exchange calls.
//!
//! Only transient failures (connection loss, timeouts, rate limits)
//! are retried; a rejection or invalid price retries into the same
//! rejection. When attempts run out the operation is deferred to the
//! next cycle rather than queued.

use std::time::Duration;

use rand::Rng;

/// Retry policy for exchange and market-data calls.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts per cycle, including the first.
    pub max_attempts: u32,
    /// Initial backoff duration.
    pub initial_backoff: Duration,
    /// Backoff ceiling.
    pub max_backoff: Duration,
    /// Exponential growth factor.
    pub backoff_multiplier: f64,
    /// Jitter as a fraction of the base delay (0.2 = ±20%).
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter_factor: 0.2,
        }
    }
}

/// Stateful backoff sequence for one operation.
#[derive(Debug)]
pub struct Backoff {
    attempt: u32,
    max_attempts: u32,
    initial_ms: u64,
    max_ms: u64,
    multiplier: f64,
    jitter_factor: f64,
}

impl Backoff {
    /// Start a backoff sequence from a policy.
    #[must_use]
    pub const fn new(policy: &RetryPolicy) -> Self {
        Self {
            attempt: 0,
            max_attempts: policy.max_attempts,
            initial_ms: policy.initial_backoff.as_millis() as u64,
            max_ms: policy.max_backoff.as_millis() as u64,
            multiplier: policy.backoff_multiplier,
            jitter_factor: policy.jitter_factor,
        }
    }

    /// Delay before the next retry, or `None` once attempts run out.
    ///
    /// The first call returns the initial backoff; each subsequent call
    /// grows it by the multiplier, jitters it, and caps it at the
    /// ceiling.
    pub fn next_delay(&mut self) -> Option<Duration> {
        // Attempt 0 is the initial try; it consumes no delay budget.
        if self.attempt + 1 >= self.max_attempts {
            return None;
        }

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let base = ((self.initial_ms as f64) * self.multiplier.powi(self.attempt as i32)) as u64;
        let capped = base.min(self.max_ms);
        let jittered = self.jitter(capped).min(self.max_ms);

        self.attempt += 1;
        Some(Duration::from_millis(jittered))
    }

    fn jitter(&self, delay_ms: u64) -> u64 {
        if self.jitter_factor <= 0.0 {
            return delay_ms;
        }
        let mut rng = rand::rng();
        let spread = delay_ms as f64 * self.jitter_factor;
        let low = (delay_ms as f64 - spread).max(0.0);
        let high = delay_ms as f64 + spread;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let jittered = rng.random_range(low..=high) as u64;
        jittered
    }

    /// Retries consumed so far.
    #[must_use]
    pub const fn attempts_used(&self) -> u32 {
        self.attempt
    }
}
