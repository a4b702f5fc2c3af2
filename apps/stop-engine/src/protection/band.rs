//! Profit-band ladder and sticky classification.
//!
//! Each band pairs a profit threshold with an ATR multiplier. Climbing
//! the ladder tightens the stop relative to volatility; classification
//! is sticky, so a position never drops back to a lower rung once it
//! has qualified for a higher one, even through a retracement.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::Side;

/// One rung of the band ladder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BandRung {
    /// Profit percentage that unlocks this rung (e.g. `2.0` for 2%).
    pub profit_threshold_pct: Decimal,
    /// ATR multiplier applied while this rung is active.
    pub multiplier: Decimal,
}

impl BandRung {
    /// Create a new rung.
    #[must_use]
    pub const fn new(profit_threshold_pct: Decimal, multiplier: Decimal) -> Self {
        Self {
            profit_threshold_pct,
            multiplier,
        }
    }
}

/// Ladder construction errors. All are fatal at startup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LadderError {
    /// At least one rung is required.
    #[error("band ladder must have at least one rung")]
    Empty,

    /// The first rung is the unconditional initial band.
    #[error("first band threshold must be 0, got {got}")]
    FirstRungNotZero {
        /// Threshold found on the first rung.
        got: Decimal,
    },

    /// Thresholds must be strictly ascending to form an ordered ladder.
    #[error("band thresholds must be strictly ascending: {prev} then {next}")]
    NonAscending {
        /// Threshold of the preceding rung.
        prev: Decimal,
        /// Offending threshold.
        next: Decimal,
    },

    /// A non-positive multiplier would place the stop at or through price.
    #[error("band multiplier must be positive, got {got}")]
    NonPositiveMultiplier {
        /// Offending multiplier.
        got: Decimal,
    },
}

/// Band selected for a position on one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BandSelection {
    /// Rung index; higher is more favorable.
    pub index: usize,
    /// The rung's ATR multiplier.
    pub multiplier: Decimal,
}

/// Ordered list of profit bands for one symbol.
///
/// Immutable after construction; built from configuration at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BandLadder {
    rungs: Vec<BandRung>,
}

impl BandLadder {
    /// Build a ladder, validating the rung ordering.
    ///
    /// # Errors
    ///
    /// Returns a [`LadderError`] for an empty ladder, a first rung with
    /// a non-zero threshold, non-ascending thresholds, or a
    /// non-positive multiplier.
    pub fn new(rungs: Vec<BandRung>) -> Result<Self, LadderError> {
        let Some(first) = rungs.first() else {
            return Err(LadderError::Empty);
        };
        if !first.profit_threshold_pct.is_zero() {
            return Err(LadderError::FirstRungNotZero {
                got: first.profit_threshold_pct,
            });
        }
        for pair in rungs.windows(2) {
            if pair[1].profit_threshold_pct <= pair[0].profit_threshold_pct {
                return Err(LadderError::NonAscending {
                    prev: pair[0].profit_threshold_pct,
                    next: pair[1].profit_threshold_pct,
                });
            }
        }
        if let Some(rung) = rungs.iter().find(|r| r.multiplier <= Decimal::ZERO) {
            return Err(LadderError::NonPositiveMultiplier {
                got: rung.multiplier,
            });
        }
        Ok(Self { rungs })
    }

    /// Number of rungs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rungs.len()
    }

    /// Whether the ladder has no rungs. Never true for a constructed ladder.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rungs.is_empty()
    }

    /// Rung at `index`, if present.
    #[must_use]
    pub fn rung(&self, index: usize) -> Option<&BandRung> {
        self.rungs.get(index)
    }

    /// Signed profit percentage of a position at `current` price.
    #[must_use]
    pub fn profit_pct(side: Side, entry: Decimal, current: Decimal) -> Decimal {
        if entry.is_zero() {
            return Decimal::ZERO;
        }
        let raw = (current - entry) / entry * dec!(100);
        match side {
            Side::Long => raw,
            Side::Short => -raw,
        }
    }

    /// Classify a position into a band, honoring stickiness.
    ///
    /// Picks the highest rung whose threshold the current profit meets,
    /// then takes the maximum with `previous_band` so a position never
    /// downgrades after a retracement.
    #[must_use]
    pub fn classify(
        &self,
        side: Side,
        entry: Decimal,
        current: Decimal,
        previous_band: usize,
    ) -> BandSelection {
        let profit = Self::profit_pct(side, entry, current);

        let mut raw = 0;
        for (i, rung) in self.rungs.iter().enumerate() {
            if profit >= rung.profit_threshold_pct {
                raw = i;
            }
        }

        let index = raw.max(previous_band).min(self.rungs.len() - 1);
        BandSelection {
            index,
            multiplier: self.rungs[index].multiplier,
        }
    }
}
