//! Adapters implementing the driven ports.

pub mod sim;

pub use sim::{SimExchange, SimMarketData};
