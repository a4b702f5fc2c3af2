//! Application layer: port definitions for the engine's dependencies.

pub mod ports;
