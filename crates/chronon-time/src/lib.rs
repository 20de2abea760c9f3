//! Chronon Time - the proven logical clock
//!
//! This crate implements the Chronon Manager:
//! - Append-only, hash-linked chain of chronons
//! - Periodic driver producing one VDF-proven chronon per tick
//! - Tick subscribers and a broadcast event stream
//! - Drift correction against an external time source
//! - Chain validation and windowed statistics

pub mod chain;
pub mod chronon;
pub mod clock;
pub mod config;
pub mod events;
pub mod manager;
pub mod metrics;

pub use chain::*;
pub use chronon::*;
pub use clock::*;
pub use config::*;
pub use events::*;
pub use manager::*;
pub use metrics::*;
