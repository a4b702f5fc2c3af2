//! Stop decision events emitted by the control loop.
//!
//! Every evaluated position produces one event, applied or not, so an
//! auditor can replay exactly why each stop moved or stayed put.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{PositionKey, Side};
use crate::protection::RejectReason;

/// Outcome of one position evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionOutcome {
    /// Candidate accepted and confirmed by the exchange.
    Applied,
    /// Candidate rejected by the monotonicity guard.
    Rejected,
    /// Position skipped this cycle (insufficient data, still in flight,
    /// or amendment failed after retries).
    Skipped,
}

/// One stop-loss decision for one position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopDecision {
    /// Symbol of the evaluated position.
    pub symbol: String,
    /// Position direction.
    pub side: Side,
    /// When the decision was made.
    pub timestamp: DateTime<Utc>,
    /// What happened.
    pub outcome: DecisionOutcome,
    /// Band rung in force for this evaluation.
    pub band: usize,
    /// ATR multiplier used to derive the candidate.
    pub multiplier: Decimal,
    /// Candidate stop that was evaluated, when one was derived.
    pub proposed: Option<Decimal>,
    /// Stop in force before this decision.
    pub old_stop: Option<Decimal>,
    /// Stop in force after this decision.
    pub new_stop: Option<Decimal>,
    /// Reason string for rejections and skips.
    pub reason: Option<String>,
}

impl StopDecision {
    /// Event for an exchange-confirmed amendment.
    #[must_use]
    pub fn applied(
        key: &PositionKey,
        band: usize,
        multiplier: Decimal,
        old_stop: Option<Decimal>,
        new_stop: Decimal,
    ) -> Self {
        Self {
            symbol: key.symbol.clone(),
            side: key.side,
            timestamp: Utc::now(),
            outcome: DecisionOutcome::Applied,
            band,
            multiplier,
            proposed: Some(new_stop),
            old_stop,
            new_stop: Some(new_stop),
            reason: None,
        }
    }

    /// Event for a guard rejection. The prior stop stays in force.
    #[must_use]
    pub fn rejected(
        key: &PositionKey,
        band: usize,
        multiplier: Decimal,
        old_stop: Option<Decimal>,
        proposed: Decimal,
        reason: RejectReason,
    ) -> Self {
        Self {
            symbol: key.symbol.clone(),
            side: key.side,
            timestamp: Utc::now(),
            outcome: DecisionOutcome::Rejected,
            band,
            multiplier,
            proposed: Some(proposed),
            old_stop,
            new_stop: old_stop,
            reason: Some(reason.as_str().to_string()),
        }
    }

    /// Event for a position skipped without a candidate.
    ///
    /// `band` is the rung the position already holds; no multiplier was
    /// derived, so that field stays zero.
    #[must_use]
    pub fn skipped(
        key: &PositionKey,
        band: usize,
        old_stop: Option<Decimal>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            symbol: key.symbol.clone(),
            side: key.side,
            timestamp: Utc::now(),
            outcome: DecisionOutcome::Skipped,
            band,
            multiplier: Decimal::ZERO,
            proposed: None,
            old_stop,
            new_stop: old_stop,
            reason: Some(reason.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use crate::models::Side;

    use super::*;

    fn key() -> PositionKey {
        PositionKey {
            symbol: "BTCUSDT".to_string(),
            side: Side::Long,
        }
    }

    #[test]
    fn applied_event_carries_both_stops() {
        let event = StopDecision::applied(&key(), 1, dec!(2.5), Some(dec!(89250)), dec!(90550));
        assert_eq!(event.outcome, DecisionOutcome::Applied);
        assert_eq!(event.old_stop, Some(dec!(89250)));
        assert_eq!(event.new_stop, Some(dec!(90550)));
        assert!(event.reason.is_none());
    }

    #[test]
    fn rejected_event_keeps_prior_stop() {
        let event = StopDecision::rejected(
            &key(),
            1,
            dec!(2.5),
            Some(dec!(90550)),
            dec!(89650),
            RejectReason::NotAnImprovement,
        );
        assert_eq!(event.outcome, DecisionOutcome::Rejected);
        assert_eq!(event.new_stop, Some(dec!(90550)));
        assert_eq!(event.reason.as_deref(), Some("not an improvement"));
    }

    #[test]
    fn skipped_event_has_no_candidate() {
        let event = StopDecision::skipped(&key(), 0, None, "insufficient candles");
        assert_eq!(event.outcome, DecisionOutcome::Skipped);
        assert!(event.proposed.is_none());
        assert!(event.new_stop.is_none());
    }

    #[test]
    fn skipped_event_keeps_tracked_band() {
        let event = StopDecision::skipped(&key(), 1, Some(dec!(90550)), "amendment in flight");
        assert_eq!(event.band, 1);
        assert_eq!(event.old_stop, Some(dec!(90550)));
        assert_eq!(event.new_stop, Some(dec!(90550)));
    }
}
