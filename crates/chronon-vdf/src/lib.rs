//! Chronon VDF Engine - proofs of elapsed sequential work
//!
//! Provides the delay function behind every chronon:
//! - Challenge generation (OS randomness)
//! - Sequential evaluation (modular squaring, SHA-256 chains, or both)
//! - Proof commitment and verification
//! - Benchmarking

pub mod challenge;
pub mod engine;
pub mod modular;

pub use challenge::*;
pub use engine::*;
pub use modular::*;
