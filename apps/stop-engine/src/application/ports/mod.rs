//! Driven ports: interfaces the engine depends on, implemented by
//! adapters at the edge.

pub mod exchange_port;
pub mod market_data_port;

pub use exchange_port::{AmendmentAck, ExchangeError, ExchangePort, StopAmendment};
pub use market_data_port::{MarketDataError, MarketDataPort};

#[cfg(test)]
pub use exchange_port::MockExchangePort;
#[cfg(test)]
pub use market_data_port::MockMarketDataPort;
