//! Per-position protection state.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Engine-owned protection state for one open position.
///
/// Created the first time a position is observed, destroyed when it
/// closes. The applied stop and band are only written after the
/// exchange has acknowledged an amendment, so a crash mid-cycle leaves
/// this consistent with the last confirmed exchange-side stop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectionState {
    /// Highest band rung this position has reached (sticky).
    pub band: usize,
    /// Last exchange-confirmed stop price, if any.
    pub applied_stop: Option<Decimal>,
    /// How many times the first-stop multiplier has been widened after
    /// a minimum-distance rejection. Reset once a stop is applied.
    pub widen_applications: u32,
    /// When this position was last evaluated.
    pub last_evaluated_at: Option<DateTime<Utc>>,
}

impl ProtectionState {
    /// Fresh state for a newly observed position.
    ///
    /// `existing_stop` seeds from the exchange's own reported stop so
    /// that restarting the engine prefers exchange truth over nothing.
    #[must_use]
    pub const fn new(existing_stop: Option<Decimal>) -> Self {
        Self {
            band: 0,
            applied_stop: existing_stop,
            widen_applications: 0,
            last_evaluated_at: None,
        }
    }

    /// Whether the engine has ever confirmed a stop for this position.
    #[must_use]
    pub const fn is_protected(&self) -> bool {
        self.applied_stop.is_some()
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn new_state_starts_at_initial_band() {
        let state = ProtectionState::new(None);
        assert_eq!(state.band, 0);
        assert!(!state.is_protected());
        assert_eq!(state.widen_applications, 0);
    }

    #[test]
    fn new_state_seeds_from_exchange_stop() {
        let state = ProtectionState::new(Some(dec!(89250)));
        assert!(state.is_protected());
        assert_eq!(state.applied_stop, Some(dec!(89250)));
    }
}
