//! Keyed store of per-position protection state.
//!
//! Pure state holder, no business logic. Safe for concurrent access
//! from parallel per-symbol evaluations; all writes happen through the
//! control loop after an exchange acknowledgment.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use parking_lot::RwLock;
use rust_decimal::Decimal;

use crate::models::{Position, PositionKey};
use crate::protection::state::ProtectionState;

/// Store of [`ProtectionState`] keyed by symbol + side.
#[derive(Debug, Default)]
pub struct PositionTracker {
    states: RwLock<HashMap<PositionKey, ProtectionState>>,
}

impl PositionTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// State for a position, creating it on first sighting.
    ///
    /// A newly created state seeds its applied stop from the position's
    /// exchange-side stop price (exchange truth wins over nothing).
    pub fn get_or_create(&self, position: &Position) -> ProtectionState {
        let mut states = self.states.write();
        states
            .entry(position.key())
            .or_insert_with(|| ProtectionState::new(position.stop_price))
            .clone()
    }

    /// Current state for a key, if tracked.
    #[must_use]
    pub fn get(&self, key: &PositionKey) -> Option<ProtectionState> {
        self.states.read().get(key).cloned()
    }

    /// Record an exchange-confirmed stop amendment.
    ///
    /// Resets the widen counter; the position is protected again.
    pub fn record_applied(&self, key: &PositionKey, stop: Decimal, band: usize) {
        let mut states = self.states.write();
        if let Some(state) = states.get_mut(key) {
            state.applied_stop = Some(stop);
            state.band = band.max(state.band);
            state.widen_applications = 0;
            state.last_evaluated_at = Some(Utc::now());
        }
    }

    /// Note a first-stop minimum-distance rejection so the next cycle
    /// widens the multiplier.
    pub fn note_min_distance_reject(&self, key: &PositionKey) {
        let mut states = self.states.write();
        if let Some(state) = states.get_mut(key) {
            state.widen_applications = state.widen_applications.saturating_add(1);
            state.last_evaluated_at = Some(Utc::now());
        }
    }

    /// Mark a position as evaluated this cycle without other changes.
    pub fn touch(&self, key: &PositionKey) {
        let mut states = self.states.write();
        if let Some(state) = states.get_mut(key) {
            state.last_evaluated_at = Some(Utc::now());
        }
    }

    /// Drop state for a closed position.
    pub fn remove(&self, key: &PositionKey) -> Option<ProtectionState> {
        self.states.write().remove(key)
    }

    /// Drop state for every position not in `open`, returning the
    /// removed keys.
    pub fn retain_open(&self, open: &HashSet<PositionKey>) -> Vec<PositionKey> {
        let mut states = self.states.write();
        let removed: Vec<PositionKey> = states
            .keys()
            .filter(|k| !open.contains(*k))
            .cloned()
            .collect();
        states.retain(|k, _| open.contains(k));
        removed
    }

    /// Number of tracked positions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.states.read().len()
    }

    /// Whether nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal_macros::dec;

    use crate::models::Side;

    use super::*;

    fn position(symbol: &str, side: Side, stop: Option<Decimal>) -> Position {
        Position {
            symbol: symbol.to_string(),
            side,
            entry_price: dec!(90000),
            size: dec!(1),
            leverage: dec!(10),
            opened_at: Utc::now(),
            mark_price: dec!(90000),
            stop_price: stop,
        }
    }

    #[test]
    fn get_or_create_is_stable() {
        let tracker = PositionTracker::new();
        let pos = position("BTCUSDT", Side::Long, None);

        let first = tracker.get_or_create(&pos);
        assert_eq!(first.band, 0);
        assert_eq!(tracker.len(), 1);

        // Second sighting returns the same state, not a fresh one.
        tracker.record_applied(&pos.key(), dec!(89250), 0);
        let second = tracker.get_or_create(&pos);
        assert_eq!(second.applied_stop, Some(dec!(89250)));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn seeds_from_exchange_stop_on_first_sighting() {
        let tracker = PositionTracker::new();
        let pos = position("BTCUSDT", Side::Long, Some(dec!(88000)));
        let state = tracker.get_or_create(&pos);
        assert_eq!(state.applied_stop, Some(dec!(88000)));
    }

    #[test]
    fn record_applied_keeps_band_sticky() {
        let tracker = PositionTracker::new();
        let pos = position("BTCUSDT", Side::Long, None);
        tracker.get_or_create(&pos);

        tracker.record_applied(&pos.key(), dec!(90550), 1);
        // A later confirmation at a lower band does not downgrade.
        tracker.record_applied(&pos.key(), dec!(90600), 0);

        let state = tracker.get(&pos.key()).unwrap();
        assert_eq!(state.band, 1);
        assert_eq!(state.applied_stop, Some(dec!(90600)));
    }

    #[test]
    fn widen_counter_bumps_and_resets() {
        let tracker = PositionTracker::new();
        let pos = position("BTCUSDT", Side::Long, None);
        tracker.get_or_create(&pos);

        tracker.note_min_distance_reject(&pos.key());
        tracker.note_min_distance_reject(&pos.key());
        assert_eq!(tracker.get(&pos.key()).unwrap().widen_applications, 2);

        tracker.record_applied(&pos.key(), dec!(89250), 0);
        assert_eq!(tracker.get(&pos.key()).unwrap().widen_applications, 0);
    }

    #[test]
    fn retain_open_prunes_closed_positions() {
        let tracker = PositionTracker::new();
        let long = position("BTCUSDT", Side::Long, None);
        let short = position("ETHUSDT", Side::Short, None);
        tracker.get_or_create(&long);
        tracker.get_or_create(&short);

        let open: HashSet<PositionKey> = [long.key()].into_iter().collect();
        let removed = tracker.retain_open(&open);

        assert_eq!(removed, vec![short.key()]);
        assert_eq!(tracker.len(), 1);
        assert!(tracker.get(&short.key()).is_none());
    }

    #[test]
    fn hedge_mode_sides_tracked_independently() {
        let tracker = PositionTracker::new();
        let long = position("BTCUSDT", Side::Long, None);
        let short = position("BTCUSDT", Side::Short, None);
        tracker.get_or_create(&long);
        tracker.get_or_create(&short);

        tracker.record_applied(&long.key(), dec!(89250), 1);

        assert_eq!(tracker.get(&long.key()).unwrap().band, 1);
        assert_eq!(tracker.get(&short.key()).unwrap().band, 0);
    }
}
