//! Candidate stop-loss price derivation.
//!
//! The candidate is the current price offset by `atr * multiplier` on
//! the loss-limiting side, rounded to the exchange price increment.
//! Rounding always moves toward the protective side so a rounded
//! candidate is never closer to price than the exact one.

use rust_decimal::Decimal;

use crate::models::Side;

/// Derive a candidate stop price from price, volatility and multiplier.
///
/// Long stops sit below price, short stops above. The result is rounded
/// to `tick_size` away from price (long rounds down, short rounds up).
#[must_use]
pub fn candidate_stop(
    side: Side,
    current_price: Decimal,
    atr: Decimal,
    multiplier: Decimal,
    tick_size: Decimal,
) -> Decimal {
    let distance = atr * multiplier;
    let exact = match side {
        Side::Long => current_price - distance,
        Side::Short => current_price + distance,
    };
    round_to_tick(exact, tick_size, side)
}

/// Multiplier after `applications` rounds of widening.
///
/// Used as the fallback when a first stop was rejected for sitting
/// inside the exchange's minimum stop distance: each failed cycle
/// widens the next attempt by `widen_factor`.
#[must_use]
pub fn widened_multiplier(base: Decimal, widen_factor: Decimal, applications: u32) -> Decimal {
    let mut multiplier = base;
    for _ in 0..applications {
        multiplier *= widen_factor;
    }
    multiplier
}

/// Round a price to the exchange increment, away from the protected side.
fn round_to_tick(price: Decimal, tick_size: Decimal, side: Side) -> Decimal {
    if tick_size <= Decimal::ZERO {
        return price;
    }
    let ticks = price / tick_size;
    let rounded = match side {
        Side::Long => ticks.floor(),
        Side::Short => ticks.ceil(),
    };
    rounded * tick_size
}
