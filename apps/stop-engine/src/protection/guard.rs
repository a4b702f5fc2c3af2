//! Monotonicity guard for stop-loss amendments.
//!
//! The guard is the safety core of the engine: a stop may only ever
//! move in the position's favor. Every candidate passes through here
//! before anything is sent to the exchange, and a rejection leaves the
//! previously applied stop untouched.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::Side;

/// Why a candidate stop was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Candidate does not improve on the applied stop. The expected,
    /// benign case whenever price moves against the position.
    NotAnImprovement,
    /// Candidate sits on the wrong side of current price and would
    /// trigger the moment it was placed. Indicates a stale or bad
    /// volatility read.
    WouldTriggerImmediately,
    /// Candidate is inside the exchange's minimum stop distance from
    /// current price.
    TooCloseToPrice,
}

impl RejectReason {
    /// Human-readable reason string for decision events.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NotAnImprovement => "not an improvement",
            Self::WouldTriggerImmediately => "would trigger immediately",
            Self::TooCloseToPrice => "too close to price",
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Guard outcome for one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Candidate may be submitted to the exchange.
    Accept,
    /// Candidate is discarded; the applied stop stays in force.
    Reject(RejectReason),
}

impl Verdict {
    /// Whether the verdict is an acceptance.
    #[must_use]
    pub const fn is_accept(&self) -> bool {
        matches!(self, Self::Accept)
    }
}

/// Inputs the guard needs besides the candidate itself.
#[derive(Debug, Clone, Copy)]
pub struct GuardContext {
    /// Position direction.
    pub side: Side,
    /// Current mark price.
    pub current_price: Decimal,
    /// Applied stop, if one exists. `None` on first evaluation.
    pub prior_stop: Option<Decimal>,
    /// Exchange price increment. The candidate must clear price by at
    /// least one tick.
    pub tick_size: Decimal,
    /// Exchange minimum stop distance from current price.
    pub min_stop_distance: Decimal,
}

/// Evaluate a candidate against the guard rules.
///
/// Checks run in order of severity: wrong side of price first (always
/// rejected regardless of direction), then minimum distance, then the
/// one-directional-improvement rule. Equality with the prior stop
/// rejects, which makes an unchanged cycle a no-op.
#[must_use]
pub fn evaluate(candidate: Decimal, ctx: &GuardContext) -> Verdict {
    let distance = match ctx.side {
        Side::Long => ctx.current_price - candidate,
        Side::Short => candidate - ctx.current_price,
    };

    // Must be strictly on the loss-limiting side by at least one tick.
    if distance < ctx.tick_size.max(Decimal::ZERO) || distance <= Decimal::ZERO {
        return Verdict::Reject(RejectReason::WouldTriggerImmediately);
    }

    if distance < ctx.min_stop_distance {
        return Verdict::Reject(RejectReason::TooCloseToPrice);
    }

    match ctx.prior_stop {
        None => Verdict::Accept,
        Some(prior) => {
            let improves = match ctx.side {
                Side::Long => candidate > prior,
                Side::Short => candidate < prior,
            };
            if improves {
                Verdict::Accept
            } else {
                Verdict::Reject(RejectReason::NotAnImprovement)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    use super::*;

    fn long_ctx(prior: Option<Decimal>) -> GuardContext {
        GuardContext {
            side: Side::Long,
            current_price: dec!(90000),
            prior_stop: prior,
            tick_size: dec!(0.5),
            min_stop_distance: dec!(10),
        }
    }

    fn short_ctx(prior: Option<Decimal>) -> GuardContext {
        GuardContext {
            side: Side::Short,
            current_price: dec!(90000),
            prior_stop: prior,
            tick_size: dec!(0.5),
            min_stop_distance: dec!(10),
        }
    }

    #[test]
    fn first_stop_accepted() {
        assert_eq!(evaluate(dec!(89250), &long_ctx(None)), Verdict::Accept);
        assert_eq!(evaluate(dec!(90750), &short_ctx(None)), Verdict::Accept);
    }

    #[test]
    fn improvement_accepted() {
        assert_eq!(
            evaluate(dec!(89500), &long_ctx(Some(dec!(89250)))),
            Verdict::Accept
        );
        assert_eq!(
            evaluate(dec!(90500), &short_ctx(Some(dec!(90750)))),
            Verdict::Accept
        );
    }

    #[test]
    fn regression_rejected() {
        assert_eq!(
            evaluate(dec!(89000), &long_ctx(Some(dec!(89250)))),
            Verdict::Reject(RejectReason::NotAnImprovement)
        );
        assert_eq!(
            evaluate(dec!(91000), &short_ctx(Some(dec!(90750)))),
            Verdict::Reject(RejectReason::NotAnImprovement)
        );
    }

    #[test]
    fn equal_candidate_rejected_for_idempotence() {
        assert_eq!(
            evaluate(dec!(89250), &long_ctx(Some(dec!(89250)))),
            Verdict::Reject(RejectReason::NotAnImprovement)
        );
    }

    #[test]
    fn wrong_side_rejected_even_when_improving() {
        // Above current price for a long: would trigger immediately.
        assert_eq!(
            evaluate(dec!(90100), &long_ctx(Some(dec!(89250)))),
            Verdict::Reject(RejectReason::WouldTriggerImmediately)
        );
        // Below current price for a short.
        assert_eq!(
            evaluate(dec!(89900), &short_ctx(Some(dec!(90750)))),
            Verdict::Reject(RejectReason::WouldTriggerImmediately)
        );
    }

    #[test]
    fn exactly_at_price_rejected() {
        assert_eq!(
            evaluate(dec!(90000), &long_ctx(None)),
            Verdict::Reject(RejectReason::WouldTriggerImmediately)
        );
    }

    #[test]
    fn one_tick_clearance_is_enough_outside_min_distance() {
        let ctx = GuardContext {
            min_stop_distance: Decimal::ZERO,
            ..long_ctx(None)
        };
        assert_eq!(evaluate(dec!(89999.5), &ctx), Verdict::Accept);
        assert_eq!(
            evaluate(dec!(89999.75), &ctx),
            Verdict::Reject(RejectReason::WouldTriggerImmediately)
        );
    }

    #[test]
    fn inside_min_distance_rejected() {
        assert_eq!(
            evaluate(dec!(89995), &long_ctx(None)),
            Verdict::Reject(RejectReason::TooCloseToPrice)
        );
        assert_eq!(
            evaluate(dec!(90005), &short_ctx(None)),
            Verdict::Reject(RejectReason::TooCloseToPrice)
        );
    }

    proptest! {
        /// Monotonicity: folding any candidate sequence through the
        /// guard, the applied stop never moves down for a long.
        #[test]
        fn applied_stop_never_loosens_long(
            candidates in prop::collection::vec(80_000u32..90_000, 1..50)
        ) {
            let mut applied: Option<Decimal> = None;
            for c in candidates {
                let candidate = Decimal::from(c);
                let ctx = long_ctx(applied);
                if evaluate(candidate, &ctx).is_accept() {
                    if let Some(prev) = applied {
                        prop_assert!(candidate > prev);
                    }
                    applied = Some(candidate);
                }
            }
        }

        /// Same property for shorts: the stop never moves up.
        #[test]
        fn applied_stop_never_loosens_short(
            candidates in prop::collection::vec(90_001u32..100_000, 1..50)
        ) {
            let mut applied: Option<Decimal> = None;
            for c in candidates {
                let candidate = Decimal::from(c);
                let ctx = short_ctx(applied);
                if evaluate(candidate, &ctx).is_accept() {
                    if let Some(prev) = applied {
                        prop_assert!(candidate < prev);
                    }
                    applied = Some(candidate);
                }
            }
        }

        /// Accepted candidates always clear the minimum distance.
        #[test]
        fn accepted_never_inside_min_distance(candidate in 80_000u32..100_000) {
            let candidate = Decimal::from(candidate);
            let ctx = long_ctx(None);
            if evaluate(candidate, &ctx).is_accept() {
                prop_assert!(ctx.current_price - candidate >= ctx.min_stop_distance);
            }
        }
    }
}
