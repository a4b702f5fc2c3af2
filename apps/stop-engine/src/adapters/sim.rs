//! In-memory simulation adapters.
//!
//! Back the engine with settable positions and candle data. Used for
//! dry runs without exchange credentials and for end-to-end tests; a
//! live deployment swaps these for real transport adapters behind the
//! same ports.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tokio::sync::Semaphore;

use crate::application::ports::{
    AmendmentAck, ExchangeError, ExchangePort, MarketDataError, MarketDataPort, StopAmendment,
};
use crate::models::{Candle, Position, PositionKey, Side};

/// Simulated exchange holding positions in memory.
///
/// Amendments mutate the held positions and are recorded for
/// inspection. An amendment matching the current stop is acknowledged
/// as unchanged, mirroring idempotent exchange APIs.
#[derive(Debug, Default)]
pub struct SimExchange {
    positions: Mutex<HashMap<PositionKey, Position>>,
    amendments: Mutex<Vec<StopAmendment>>,
    fail_next: Mutex<Option<ExchangeError>>,
    hold_gate: Mutex<Option<Arc<Semaphore>>>,
    held: AtomicUsize,
}

impl SimExchange {
    /// Create an empty simulated exchange.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a position.
    pub fn set_position(&self, position: Position) {
        self.positions.lock().insert(position.key(), position);
    }

    /// Update the mark price of a held position.
    pub fn set_mark_price(&self, symbol: &str, side: Side, mark_price: Decimal) {
        let key = PositionKey {
            symbol: symbol.to_string(),
            side,
        };
        if let Some(position) = self.positions.lock().get_mut(&key) {
            position.mark_price = mark_price;
        }
    }

    /// Remove a position, simulating a close.
    pub fn close_position(&self, symbol: &str, side: Side) {
        let key = PositionKey {
            symbol: symbol.to_string(),
            side,
        };
        self.positions.lock().remove(&key);
    }

    /// Fail the next exchange call with the given error.
    pub fn fail_next(&self, error: ExchangeError) {
        *self.fail_next.lock() = Some(error);
    }

    /// Park subsequent `amend_stop` calls until released.
    ///
    /// Simulates exchange latency on the amendment path.
    pub fn hold_amendments(&self) {
        *self.hold_gate.lock() = Some(Arc::new(Semaphore::new(0)));
    }

    /// Release every amendment parked by [`Self::hold_amendments`].
    pub fn release_amendments(&self) {
        if let Some(gate) = self.hold_gate.lock().take() {
            gate.close();
        }
    }

    /// Number of amendment calls currently parked on the hold gate.
    #[must_use]
    pub fn held_amendments(&self) -> usize {
        self.held.load(Ordering::SeqCst)
    }

    /// All amendments accepted so far, oldest first.
    #[must_use]
    pub fn recorded_amendments(&self) -> Vec<StopAmendment> {
        self.amendments.lock().clone()
    }

    /// Current stop of a held position.
    #[must_use]
    pub fn stop_price(&self, symbol: &str, side: Side) -> Option<Decimal> {
        let key = PositionKey {
            symbol: symbol.to_string(),
            side,
        };
        self.positions.lock().get(&key).and_then(|p| p.stop_price)
    }

    fn take_failure(&self) -> Option<ExchangeError> {
        self.fail_next.lock().take()
    }
}

#[async_trait]
impl ExchangePort for SimExchange {
    async fn list_positions(&self) -> Result<Vec<Position>, ExchangeError> {
        if let Some(error) = self.take_failure() {
            return Err(error);
        }
        Ok(self.positions.lock().values().cloned().collect())
    }

    async fn amend_stop(&self, request: StopAmendment) -> Result<AmendmentAck, ExchangeError> {
        let gate = self.hold_gate.lock().clone();
        if let Some(gate) = gate {
            self.held.fetch_add(1, Ordering::SeqCst);
            // Closing the gate wakes every parked call at once.
            let _ = gate.acquire().await;
            self.held.fetch_sub(1, Ordering::SeqCst);
        }

        if let Some(error) = self.take_failure() {
            return Err(error);
        }

        let key = PositionKey {
            symbol: request.symbol.clone(),
            side: request.side,
        };

        let mut positions = self.positions.lock();
        let Some(position) = positions.get_mut(&key) else {
            return Err(ExchangeError::PositionNotFound {
                symbol: request.symbol,
                side: request.side,
            });
        };

        if request.stop_price <= Decimal::ZERO {
            return Err(ExchangeError::InvalidPrice {
                symbol: request.symbol,
                price: request.stop_price,
                reason: "stop price must be positive".to_string(),
            });
        }

        let unchanged = position.stop_price == Some(request.stop_price);
        if !unchanged {
            position.stop_price = Some(request.stop_price);
            self.amendments.lock().push(request.clone());
        }

        Ok(AmendmentAck {
            symbol: request.symbol,
            side: request.side,
            stop_price: request.stop_price,
            unchanged,
            acked_at: Utc::now(),
        })
    }
}

/// Simulated market data source with per-symbol candle stores.
#[derive(Debug, Default)]
pub struct SimMarketData {
    candles: Mutex<HashMap<String, Vec<Candle>>>,
}

impl SimMarketData {
    /// Create an empty candle store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the candle series for a symbol, oldest first.
    pub fn set_candles(&self, symbol: &str, candles: Vec<Candle>) {
        self.candles.lock().insert(symbol.to_string(), candles);
    }

    /// Append one candle to a symbol's series.
    pub fn push_candle(&self, symbol: &str, candle: Candle) {
        self.candles
            .lock()
            .entry(symbol.to_string())
            .or_default()
            .push(candle);
    }
}

#[async_trait]
impl MarketDataPort for SimMarketData {
    async fn candle_history(
        &self,
        symbol: &str,
        _timeframe: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, MarketDataError> {
        let candles = self.candles.lock();
        let Some(series) = candles.get(symbol) else {
            return Err(MarketDataError::UnknownSymbol {
                symbol: symbol.to_string(),
            });
        };
        let start = series.len().saturating_sub(limit);
        Ok(series[start..].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn long_position(stop: Option<Decimal>) -> Position {
        Position {
            symbol: "BTCUSDT".to_string(),
            side: Side::Long,
            entry_price: dec!(90000),
            size: dec!(1),
            leverage: dec!(10),
            opened_at: Utc::now(),
            mark_price: dec!(90000),
            stop_price: stop,
        }
    }

    #[tokio::test]
    async fn amend_updates_position_and_records() {
        let exchange = SimExchange::new();
        exchange.set_position(long_position(None));

        let ack = exchange
            .amend_stop(StopAmendment::new(
                "BTCUSDT".to_string(),
                Side::Long,
                dec!(89250),
            ))
            .await
            .unwrap();

        assert!(!ack.unchanged);
        assert_eq!(exchange.stop_price("BTCUSDT", Side::Long), Some(dec!(89250)));
        assert_eq!(exchange.recorded_amendments().len(), 1);
    }

    #[tokio::test]
    async fn repeat_amend_is_idempotent() {
        let exchange = SimExchange::new();
        exchange.set_position(long_position(Some(dec!(89250))));

        let ack = exchange
            .amend_stop(StopAmendment::new(
                "BTCUSDT".to_string(),
                Side::Long,
                dec!(89250),
            ))
            .await
            .unwrap();

        assert!(ack.unchanged);
        assert!(exchange.recorded_amendments().is_empty());
    }

    #[tokio::test]
    async fn amend_unknown_position_fails() {
        let exchange = SimExchange::new();
        let err = exchange
            .amend_stop(StopAmendment::new(
                "BTCUSDT".to_string(),
                Side::Long,
                dec!(89250),
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::PositionNotFound { .. }));
    }

    #[tokio::test]
    async fn injected_failure_fires_once() {
        let exchange = SimExchange::new();
        exchange.set_position(long_position(None));
        exchange.fail_next(ExchangeError::RateLimited);

        assert!(exchange.list_positions().await.is_err());
        assert!(exchange.list_positions().await.is_ok());
    }

    #[tokio::test]
    async fn held_amendment_parks_until_released() {
        let exchange = Arc::new(SimExchange::new());
        exchange.set_position(long_position(None));
        exchange.hold_amendments();

        let pending = tokio::spawn({
            let exchange = Arc::clone(&exchange);
            async move {
                exchange
                    .amend_stop(StopAmendment::new(
                        "BTCUSDT".to_string(),
                        Side::Long,
                        dec!(89250),
                    ))
                    .await
            }
        });

        while exchange.held_amendments() == 0 {
            tokio::task::yield_now().await;
        }
        assert!(exchange.recorded_amendments().is_empty());

        exchange.release_amendments();
        let ack = pending.await.unwrap().unwrap();
        assert!(!ack.unchanged);
        assert_eq!(exchange.stop_price("BTCUSDT", Side::Long), Some(dec!(89250)));
    }

    #[tokio::test]
    async fn candle_history_honors_limit() {
        let data = SimMarketData::new();
        let candle = Candle {
            open: dec!(1),
            high: dec!(2),
            low: dec!(1),
            close: dec!(2),
            timestamp: Utc::now(),
        };
        data.set_candles("BTCUSDT", vec![candle.clone(); 30]);

        let history = data.candle_history("BTCUSDT", "1H", 10).await.unwrap();
        assert_eq!(history.len(), 10);
    }

    #[tokio::test]
    async fn unknown_symbol_errors() {
        let data = SimMarketData::new();
        let err = data.candle_history("NOPE", "1H", 10).await.unwrap_err();
        assert!(matches!(err, MarketDataError::UnknownSymbol { .. }));
    }
}
