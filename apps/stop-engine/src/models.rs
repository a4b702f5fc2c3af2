//! Shared market and position models.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Direction of an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// Long position - profits when price rises, stop sits below price.
    Long,
    /// Short position - profits when price falls, stop sits above price.
    Short,
}

impl Side {
    /// Lowercase string form, matching the wire/config representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Long => "long",
            Self::Short => "short",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a position within the engine.
///
/// Hedge-mode exchanges allow a long and a short on the same symbol to
/// coexist, so the key is symbol plus side rather than symbol alone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PositionKey {
    /// Trading pair symbol, e.g. `BTCUSDT`.
    pub symbol: String,
    /// Position direction.
    pub side: Side,
}

impl PositionKey {
    /// Create a new position key.
    #[must_use]
    pub fn new(symbol: impl Into<String>, side: Side) -> Self {
        Self {
            symbol: symbol.into(),
            side,
        }
    }
}

impl std::fmt::Display for PositionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.symbol, self.side)
    }
}

/// Open position as reported by the exchange.
///
/// The engine mirrors this read-only each cycle; it never owns or
/// mutates position fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    /// Trading pair symbol.
    pub symbol: String,
    /// Position direction.
    pub side: Side,
    /// Average entry price.
    pub entry_price: Decimal,
    /// Position size in base units. Zero means closed.
    pub size: Decimal,
    /// Leverage in use.
    pub leverage: Decimal,
    /// When the position was opened.
    pub opened_at: DateTime<Utc>,
    /// Current mark price reported by the exchange.
    pub mark_price: Decimal,
    /// Exchange-side stop-loss price, if one is set.
    pub stop_price: Option<Decimal>,
}

impl Position {
    /// Engine identity of this position.
    #[must_use]
    pub fn key(&self) -> PositionKey {
        PositionKey::new(self.symbol.clone(), self.side)
    }

    /// Whether the exchange reports this position as closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.size.is_zero()
    }
}

/// A single OHLC candle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candle {
    /// Open price.
    pub open: Decimal,
    /// High price.
    pub high: Decimal,
    /// Low price.
    pub low: Decimal,
    /// Close price.
    pub close: Decimal,
    /// Candle open time.
    pub timestamp: DateTime<Utc>,
}
