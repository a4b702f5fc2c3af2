//! Market Data Port (Driven Port)
//!
//! Interface for fetching historical candles used by the volatility
//! estimator.

use async_trait::async_trait;

use crate::models::Candle;

/// Market data port error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MarketDataError {
    /// Connection error.
    #[error("Market data connection error: {message}")]
    Connection {
        /// Error details.
        message: String,
    },

    /// Request timed out.
    #[error("Market data request timed out after {timeout_ms}ms")]
    Timeout {
        /// Configured timeout in milliseconds.
        timeout_ms: u64,
    },

    /// Rate limited by the data provider.
    #[error("Rate limited by market data provider")]
    RateLimited,

    /// The symbol is not known to the provider.
    #[error("Unknown symbol: {symbol}")]
    UnknownSymbol {
        /// The symbol that was requested.
        symbol: String,
    },
}

impl MarketDataError {
    /// Whether the error is transient and worth retrying.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::Timeout { .. } | Self::RateLimited
        )
    }
}

/// Port for historical market data.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataPort: Send + Sync {
    /// Fetch the most recent closed candles for a symbol, oldest first.
    ///
    /// Returns at most `limit` candles; fewer when the listing is young.
    async fn candle_history(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, MarketDataError>;
}
