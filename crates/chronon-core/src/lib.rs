//! Chronon Core - Fundamental types and primitives
//!
//! This crate defines the types shared by the VDF engine and the chronon chain:
//! - Digests (ChainHash)
//! - Time primitives (Timestamp, TimeSource)
//! - Error taxonomy

pub mod error;
pub mod hash;
pub mod time;

pub use error::*;
pub use hash::*;
pub use time::*;
