//! Tracing setup.
//!
//! Console logging only, pretty or JSON per configuration. The
//! `RUST_LOG` environment variable overrides the configured filter.
//!
//! ```rust,ignore
//! use stop_engine::telemetry::init_telemetry;
//!
//! init_telemetry(&config.observability);
//! ```

use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, ObservabilityConfig};

/// Initialize the tracing subscriber from configuration.
///
/// Safe to call once per process; a second call is a no-op because the
/// global subscriber is already set.
pub fn init_telemetry(config: &ObservabilityConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));

    let builder = tracing_subscriber::fmt().with_env_filter(env_filter);

    let result = match config.log_format {
        LogFormat::Json => builder.json().with_current_span(false).try_init(),
        LogFormat::Pretty => builder.try_init(),
    };

    if result.is_ok() {
        tracing::info!(
            log_level = %config.log_level,
            log_format = ?config.log_format,
            "Telemetry initialized"
        );
    }
}
