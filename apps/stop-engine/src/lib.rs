// Allow unwrap/expect in tests - tests should panic on unexpected errors
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::field_reassign_with_default,
        clippy::cast_possible_wrap
    )
)]

//! Stop Engine - Adaptive Volatility-Based Stop-Loss
//!
//! Continuously re-derives protective stop-loss levels for open
//! leveraged positions from recent price volatility, and ratchets them
//! in the position's favor as profit accumulates.
//!
//! # Architecture
//!
//! - **Models**: positions, candles, and their identity
//! - **Volatility**: Wilder-smoothed Average True Range estimation
//! - **Protection**: band ladder, candidate derivation, monotonicity
//!   guard, and per-position state tracking
//! - **Application**: driven ports (`MarketDataPort`, `ExchangePort`)
//! - **Engine**: the periodic control loop tying it all together
//! - **Adapters**: in-memory simulation implementations of the ports
//!
//! # Safety model
//!
//! Stops only ever tighten. Every candidate passes the monotonicity
//! guard, and tracked state is only mutated after the exchange has
//! acknowledged an amendment, so a crash at any point leaves the
//! exchange-side stop as the source of truth.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

/// Adapters implementing the driven ports.
pub mod adapters;

/// Application layer - port definitions.
pub mod application;

/// Configuration loading and validation.
pub mod config;

/// The periodic control loop.
pub mod engine;

/// Core position and candle types.
pub mod models;

/// Stop-loss protection pipeline.
pub mod protection;

/// Tracing setup.
pub mod telemetry;

/// Volatility estimation.
pub mod volatility;

pub use application::ports::{
    AmendmentAck, ExchangeError, ExchangePort, MarketDataError, MarketDataPort, StopAmendment,
};
pub use config::{Config, ConfigError, load_config, load_config_from_string};
pub use engine::{CyclePhase, CycleSummary, StopDecision, StopLossEngine};
pub use models::{Candle, Position, PositionKey, Side};
pub use protection::{BandLadder, BandRung, PositionTracker, ProtectionState, RejectReason};
pub use volatility::{VolatilityError, VolatilitySnapshot, wilder_atr};
