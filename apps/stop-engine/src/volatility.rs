//! Wilder-smoothed average true range estimation.
//!
//! The stop distance for every candidate stop is scaled by a smoothed
//! true-range metric, so the stop widens in choppy markets and tightens
//! in quiet ones. True range per candle is
//! `max(high - low, |high - prev_close|, |low - prev_close|)`; the
//! estimator is the Wilder exponential rolling average with smoothing
//! factor `1 / period`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::Candle;

/// Default ATR lookback period.
pub const DEFAULT_ATR_PERIOD: usize = 14;

/// Volatility estimation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VolatilityError {
    /// Not enough candle history to seed the estimator.
    ///
    /// The affected symbol is skipped for the cycle; this is never
    /// fatal to the scheduler.
    #[error("insufficient candle history: have {have}, need {need}")]
    InsufficientData {
        /// Candles available.
        have: usize,
        /// Candles required.
        need: usize,
    },

    /// Period of zero makes the smoothing factor undefined.
    #[error("ATR period must be at least 1")]
    InvalidPeriod,
}

/// True range of a candle given the previous close.
///
/// Without a previous close (first candle in a series) the range
/// collapses to `high - low`.
#[must_use]
pub fn true_range(candle: &Candle, prev_close: Option<Decimal>) -> Decimal {
    let high_low = candle.high - candle.low;
    prev_close.map_or(high_low, |prev| {
        let high_close = (candle.high - prev).abs();
        let low_close = (candle.low - prev).abs();
        high_low.max(high_close).max(low_close)
    })
}

/// Wilder-smoothed ATR over an ordered candle series.
///
/// Seeds with the simple average of the first `period` true ranges,
/// then folds the remainder with `atr = (atr * (period - 1) + tr) / period`.
///
/// # Errors
///
/// Returns [`VolatilityError::InsufficientData`] when fewer than
/// `period` candles are supplied, and [`VolatilityError::InvalidPeriod`]
/// for a zero period.
pub fn wilder_atr(candles: &[Candle], period: usize) -> Result<Decimal, VolatilityError> {
    if period == 0 {
        return Err(VolatilityError::InvalidPeriod);
    }
    if candles.len() < period {
        return Err(VolatilityError::InsufficientData {
            have: candles.len(),
            need: period,
        });
    }

    let period_dec = Decimal::from(period);
    let mut prev_close: Option<Decimal> = None;
    let mut seed_sum = Decimal::ZERO;
    let mut atr = Decimal::ZERO;

    for (i, candle) in candles.iter().enumerate() {
        let tr = true_range(candle, prev_close);
        if i < period {
            seed_sum += tr;
            if i == period - 1 {
                atr = seed_sum / period_dec;
            }
        } else {
            atr = (atr * (period_dec - Decimal::ONE) + tr) / period_dec;
        }
        prev_close = Some(candle.close);
    }

    Ok(atr)
}

/// Point-in-time volatility estimate for one symbol/timeframe.
///
/// Recomputed from fresh candles every cycle; never reused across
/// cycles longer than one candle period.
#[derive(Debug, Clone, serde::Serialize)]
pub struct VolatilitySnapshot {
    /// Trading pair symbol.
    pub symbol: String,
    /// Timeframe the candles were sampled at, e.g. `1H`.
    pub timeframe: String,
    /// Smoothed true range value.
    pub value: Decimal,
    /// When the estimate was computed.
    pub computed_at: DateTime<Utc>,
}

impl VolatilitySnapshot {
    /// Compute a fresh snapshot from candle history.
    ///
    /// # Errors
    ///
    /// Propagates [`VolatilityError`] from the underlying estimator.
    pub fn compute(
        symbol: &str,
        timeframe: &str,
        candles: &[Candle],
        period: usize,
    ) -> Result<Self, VolatilityError> {
        let value = wilder_atr(candles, period)?;
        Ok(Self {
            symbol: symbol.to_string(),
            timeframe: timeframe.to_string(),
            value,
            computed_at: Utc::now(),
        })
    }
}
