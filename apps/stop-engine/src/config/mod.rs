//! Configuration loading, validation, and environment variable
//! interpolation.
//!
//! ```rust,ignore
//! use stop_engine::config::load_config;
//!
//! let config = load_config(None)?; // reads config.yaml
//! println!("interval: {}s", config.engine.interval_secs);
//! ```

mod engine;
mod observability;
mod policy;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use engine::{EngineConfig, RetryConfig};
pub use observability::{LogFormat, ObservabilityConfig};
pub use policy::{BandConfig, ProtectionPolicy, SymbolPolicyConfig};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        /// Path to the config file.
        path: String,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// Failed to parse YAML configuration.
    #[error("Failed to parse config YAML: {0}")]
    Parse(#[from] serde_yaml_bw::Error),

    /// Configuration validation failed.
    #[error("Config validation failed: {0}")]
    Validation(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Control-loop settings.
    #[serde(default)]
    pub engine: EngineConfig,
    /// Per-symbol protection policies, keyed by symbol.
    pub symbols: BTreeMap<String, SymbolPolicyConfig>,
    /// Logging settings.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Load configuration from a YAML file with environment variable
/// interpolation.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file cannot be read, parsed, or
/// validated.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or("config.yaml");
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.to_string(),
        source: e,
    })?;
    load_config_from_string(&contents)
}

/// Load configuration from a YAML string (useful for testing).
///
/// # Errors
///
/// Returns a [`ConfigError`] if the YAML cannot be parsed or validated.
pub fn load_config_from_string(yaml: &str) -> Result<Config, ConfigError> {
    let interpolated = interpolate_env_vars(yaml);
    let config: Config = serde_yaml_bw::from_str(&interpolated)?;
    validate_config(&config)?;
    Ok(config)
}

/// Interpolate environment variables in a string.
///
/// Supports both `${VAR}` and `${VAR:-default}` syntax. Unset variables
/// without a default become empty strings.
#[allow(clippy::expect_used)] // pattern is a compile-time constant
fn interpolate_env_vars(input: &str) -> String {
    use std::sync::OnceLock;

    static ENV_VAR_REGEX: OnceLock<regex::Regex> = OnceLock::new();

    let re = ENV_VAR_REGEX.get_or_init(|| {
        regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .expect("env var regex is valid")
    });

    re.replace_all(input, |caps: &regex::Captures<'_>| {
        let var_name = &caps[1];
        let default_value = caps.get(2).map(|m| m.as_str());
        match std::env::var(var_name) {
            Ok(v) if !v.is_empty() => v,
            _ => default_value.unwrap_or_default().to_string(),
        }
    })
    .into_owned()
}

/// Validate configuration values.
fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.engine.interval_secs == 0 {
        return Err(ConfigError::Validation(
            "engine.interval_secs must be positive".to_string(),
        ));
    }

    if config.engine.workers == 0 {
        return Err(ConfigError::Validation(
            "engine.workers must be positive".to_string(),
        ));
    }

    if config.engine.max_concurrent_amendments == 0 {
        return Err(ConfigError::Validation(
            "engine.max_concurrent_amendments must be positive".to_string(),
        ));
    }

    if config.engine.widen_factor <= rust_decimal::Decimal::ONE {
        return Err(ConfigError::Validation(
            "engine.widen_factor must be greater than 1".to_string(),
        ));
    }

    if config.engine.retry.max_attempts == 0 {
        return Err(ConfigError::Validation(
            "engine.retry.max_attempts must be positive".to_string(),
        ));
    }

    if config.symbols.is_empty() {
        return Err(ConfigError::Validation(
            "at least one symbol policy is required".to_string(),
        ));
    }

    for (symbol, policy) in &config.symbols {
        if policy.atr_period == 0 {
            return Err(ConfigError::Validation(format!(
                "symbols.{symbol}.atr_period must be positive"
            )));
        }
        if policy.tick_size < rust_decimal::Decimal::ZERO {
            return Err(ConfigError::Validation(format!(
                "symbols.{symbol}.tick_size must not be negative"
            )));
        }
        if policy.min_stop_distance < rust_decimal::Decimal::ZERO {
            return Err(ConfigError::Validation(format!(
                "symbols.{symbol}.min_stop_distance must not be negative"
            )));
        }
        // Band ordering errors are fatal at load time, not first use.
        policy
            .to_policy()
            .map_err(|e| ConfigError::Validation(format!("symbols.{symbol}.bands: {e}")))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r"
symbols:
  BTCUSDT:
    bands:
      - profit_threshold_pct: 0
        multiplier: 1.5
      - profit_threshold_pct: 2.0
        multiplier: 2.5
    tick_size: 0.5
";

    #[test]
    fn minimal_config_loads_with_defaults() {
        let config = load_config_from_string(MINIMAL).unwrap();
        assert_eq!(config.engine.interval_secs, 60);
        assert_eq!(config.symbols.len(), 1);
        assert_eq!(config.symbols["BTCUSDT"].timeframe, "1H");
    }

    #[test]
    fn rejects_empty_symbol_table() {
        let err = load_config_from_string("symbols: {}").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn rejects_zero_interval() {
        let yaml = format!("engine:\n  interval_secs: 0\n{MINIMAL}");
        let err = load_config_from_string(&yaml).unwrap_err();
        assert!(err.to_string().contains("interval_secs"));
    }

    #[test]
    fn rejects_unordered_bands() {
        let yaml = r"
symbols:
  BTCUSDT:
    bands:
      - profit_threshold_pct: 2.0
        multiplier: 2.5
      - profit_threshold_pct: 0
        multiplier: 1.5
    tick_size: 0.5
";
        let err = load_config_from_string(yaml).unwrap_err();
        assert!(err.to_string().contains("BTCUSDT.bands"));
    }

    #[test]
    fn interpolates_env_default() {
        let interpolated = interpolate_env_vars("level: ${STOP_ENGINE_UNSET_VAR:-debug}");
        assert_eq!(interpolated, "level: debug");
    }

    #[test]
    fn unset_var_without_default_becomes_empty() {
        let interpolated = interpolate_env_vars("level: '${STOP_ENGINE_UNSET_VAR}'");
        assert_eq!(interpolated, "level: ''");
    }
}
