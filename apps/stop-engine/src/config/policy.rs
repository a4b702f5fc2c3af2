//! Per-symbol protection policy configuration.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::protection::{BandLadder, BandRung, LadderError};
use crate::volatility::DEFAULT_ATR_PERIOD;

/// One band rung as written in configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BandConfig {
    /// Profit percentage that unlocks the rung.
    pub profit_threshold_pct: Decimal,
    /// ATR multiplier while the rung is active.
    pub multiplier: Decimal,
}

/// Protection policy for one symbol as written in configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolPolicyConfig {
    /// Candle timeframe for the volatility estimate.
    #[serde(default = "default_timeframe")]
    pub timeframe: String,
    /// ATR smoothing period.
    #[serde(default = "default_atr_period")]
    pub atr_period: usize,
    /// Profit-band ladder, lowest threshold first.
    pub bands: Vec<BandConfig>,
    /// Exchange price increment for the symbol.
    pub tick_size: Decimal,
    /// Exchange minimum distance between stop and price.
    #[serde(default)]
    pub min_stop_distance: Decimal,
}

fn default_timeframe() -> String {
    "1H".to_string()
}

const fn default_atr_period() -> usize {
    DEFAULT_ATR_PERIOD
}

impl SymbolPolicyConfig {
    /// Validate and convert into a runtime policy.
    ///
    /// # Errors
    ///
    /// Returns a [`LadderError`] when the band ladder is malformed.
    pub fn to_policy(&self) -> Result<ProtectionPolicy, LadderError> {
        let rungs = self
            .bands
            .iter()
            .map(|b| BandRung::new(b.profit_threshold_pct, b.multiplier))
            .collect();
        Ok(ProtectionPolicy {
            timeframe: self.timeframe.clone(),
            atr_period: self.atr_period,
            ladder: BandLadder::new(rungs)?,
            tick_size: self.tick_size,
            min_stop_distance: self.min_stop_distance,
        })
    }
}

impl Default for SymbolPolicyConfig {
    fn default() -> Self {
        Self {
            timeframe: default_timeframe(),
            atr_period: default_atr_period(),
            bands: vec![
                BandConfig {
                    profit_threshold_pct: dec!(0),
                    multiplier: dec!(1.5),
                },
                BandConfig {
                    profit_threshold_pct: dec!(2.0),
                    multiplier: dec!(2.5),
                },
            ],
            tick_size: dec!(0.1),
            min_stop_distance: Decimal::ZERO,
        }
    }
}

/// Validated runtime policy for one symbol.
#[derive(Debug, Clone)]
pub struct ProtectionPolicy {
    /// Candle timeframe for the volatility estimate.
    pub timeframe: String,
    /// ATR smoothing period.
    pub atr_period: usize,
    /// Validated band ladder.
    pub ladder: BandLadder,
    /// Exchange price increment.
    pub tick_size: Decimal,
    /// Exchange minimum stop distance.
    pub min_stop_distance: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_converts() {
        let policy = SymbolPolicyConfig::default().to_policy().unwrap();
        assert_eq!(policy.timeframe, "1H");
        assert_eq!(policy.atr_period, 14);
        assert_eq!(policy.ladder.len(), 2);
    }

    #[test]
    fn malformed_ladder_is_rejected() {
        let config = SymbolPolicyConfig {
            bands: vec![BandConfig {
                profit_threshold_pct: dec!(1),
                multiplier: dec!(1.5),
            }],
            ..Default::default()
        };
        assert!(config.to_policy().is_err());
    }

    #[test]
    fn deserializes_with_defaults() {
        let yaml = r"
bands:
  - profit_threshold_pct: 0
    multiplier: 1.5
tick_size: 0.5
";
        let config: SymbolPolicyConfig = serde_yaml_bw::from_str(yaml).unwrap();
        assert_eq!(config.timeframe, "1H");
        assert_eq!(config.atr_period, 14);
        assert_eq!(config.min_stop_distance, Decimal::ZERO);
    }
}
