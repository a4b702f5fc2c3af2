//! Logging configuration.

use serde::{Deserialize, Serialize};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable single-line output.
    Pretty,
    /// Newline-delimited JSON for log shippers.
    Json,
}

/// Observability section of the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log filter directive, e.g. `info` or `stop_engine=debug`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Output format.
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

const fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}
