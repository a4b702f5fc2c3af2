//! Exchange Port (Driven Port)
//!
//! Interface for reading open positions and amending stop-loss orders.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{Position, Side};

/// Request to move a position's stop-loss to a new price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopAmendment {
    /// Symbol of the position.
    pub symbol: String,
    /// Position direction.
    pub side: Side,
    /// New stop trigger price.
    pub stop_price: Decimal,
}

impl StopAmendment {
    /// Create an amendment request.
    #[must_use]
    pub const fn new(symbol: String, side: Side, stop_price: Decimal) -> Self {
        Self {
            symbol,
            side,
            stop_price,
        }
    }
}

/// Acknowledgment from the exchange after a stop amendment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmendmentAck {
    /// Symbol of the amended position.
    pub symbol: String,
    /// Position direction.
    pub side: Side,
    /// Stop price now in force on the exchange.
    pub stop_price: Decimal,
    /// True when the exchange already had this exact stop and treated
    /// the request as a no-op.
    pub unchanged: bool,
    /// Exchange-side timestamp of the acknowledgment.
    pub acked_at: DateTime<Utc>,
}

/// Exchange port error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExchangeError {
    /// Connection error.
    #[error("Exchange connection error: {message}")]
    Connection {
        /// Error details.
        message: String,
    },

    /// Request timed out.
    #[error("Exchange request timed out after {timeout_ms}ms")]
    Timeout {
        /// Configured timeout in milliseconds.
        timeout_ms: u64,
    },

    /// Rate limited by the exchange.
    #[error("Rate limited by exchange")]
    RateLimited,

    /// Amendment rejected by the exchange.
    #[error("Amendment rejected: {reason}")]
    Rejected {
        /// Rejection reason.
        reason: String,
    },

    /// The stop price violates an exchange price rule.
    #[error("Invalid stop price {price} for {symbol}: {reason}")]
    InvalidPrice {
        /// Symbol of the rejected amendment.
        symbol: String,
        /// The rejected price.
        price: Decimal,
        /// Exchange-provided reason.
        reason: String,
    },

    /// The position no longer exists on the exchange.
    #[error("Position not found: {symbol} {side}")]
    PositionNotFound {
        /// Symbol of the missing position.
        symbol: String,
        /// Direction of the missing position.
        side: Side,
    },
}

impl ExchangeError {
    /// Whether the error is transient and worth retrying.
    ///
    /// Rejections, invalid prices and missing positions never resolve
    /// by retrying the same request.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::Timeout { .. } | Self::RateLimited
        )
    }
}

/// Port for exchange position and stop-order interactions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExchangePort: Send + Sync {
    /// List all currently open positions, including any exchange-side
    /// stop already attached to each.
    async fn list_positions(&self) -> Result<Vec<Position>, ExchangeError>;

    /// Amend the stop-loss of an open position.
    async fn amend_stop(&self, request: StopAmendment) -> Result<AmendmentAck, ExchangeError>;
}
