//! Stop-loss protection pipeline.
//!
//! The pipeline for one position runs band classification, candidate
//! derivation, then the monotonicity guard. State lives in the
//! [`tracker::PositionTracker`] and is only mutated after the exchange
//! acknowledges an amendment.

pub mod band;
pub mod candidate;
pub mod guard;
pub mod state;
pub mod tracker;

pub use band::{BandLadder, BandRung, BandSelection, LadderError};
pub use candidate::{candidate_stop, widened_multiplier};
pub use guard::{GuardContext, RejectReason, Verdict, evaluate};
pub use state::ProtectionState;
pub use tracker::PositionTracker;
