//! Control-loop configuration.

use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::engine::RetryPolicy;

/// Retry settings as written in configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum attempts per cycle, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Initial backoff in milliseconds.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Backoff ceiling in milliseconds.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Exponential growth factor.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// Jitter fraction.
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
}

const fn default_max_attempts() -> u32 {
    4
}
const fn default_initial_backoff_ms() -> u64 {
    250
}
const fn default_max_backoff_ms() -> u64 {
    10_000
}
const fn default_backoff_multiplier() -> f64 {
    2.0
}
const fn default_jitter_factor() -> f64 {
    0.2
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter_factor: default_jitter_factor(),
        }
    }
}

impl RetryConfig {
    /// Convert into the runtime retry policy.
    #[must_use]
    pub const fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            backoff_multiplier: self.backoff_multiplier,
            jitter_factor: self.jitter_factor,
        }
    }
}

/// Engine section of the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Seconds between evaluation cycles.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Parallel per-position evaluation workers.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// In-flight stop amendments allowed at once.
    #[serde(default = "default_max_concurrent_amendments")]
    pub max_concurrent_amendments: usize,
    /// Multiplier growth per minimum-distance rejection of a first stop.
    #[serde(default = "default_widen_factor")]
    pub widen_factor: Decimal,
    /// How many candles to request per volatility estimate.
    #[serde(default = "default_candle_limit")]
    pub candle_limit: usize,
    /// Retry behavior for exchange calls.
    #[serde(default)]
    pub retry: RetryConfig,
}

const fn default_interval_secs() -> u64 {
    60
}
const fn default_workers() -> usize {
    4
}
const fn default_max_concurrent_amendments() -> usize {
    2
}
fn default_widen_factor() -> Decimal {
    dec!(1.5)
}
const fn default_candle_limit() -> usize {
    50
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            workers: default_workers(),
            max_concurrent_amendments: default_max_concurrent_amendments(),
            widen_factor: default_widen_factor(),
            candle_limit: default_candle_limit(),
            retry: RetryConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Cycle interval as a [`Duration`].
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = EngineConfig::default();
        assert_eq!(config.interval(), Duration::from_secs(60));
        assert_eq!(config.workers, 4);
        assert_eq!(config.max_concurrent_amendments, 2);
        assert_eq!(config.widen_factor, dec!(1.5));
    }

    #[test]
    fn retry_config_converts_to_policy() {
        let policy = RetryConfig::default().to_policy();
        assert_eq!(policy.max_attempts, 4);
        assert_eq!(policy.initial_backoff, Duration::from_millis(250));
        assert_eq!(policy.max_backoff, Duration::from_secs(10));
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let yaml = "interval_secs: 15";
        let config: EngineConfig = serde_yaml_bw::from_str(yaml).unwrap();
        assert_eq!(config.interval_secs, 15);
        assert_eq!(config.workers, 4);
        assert_eq!(config.retry.max_attempts, 4);
    }
}
