//! Chronon Test Harness - simulation and validation
//!
//! This crate provides:
//! - Clock drift models for a reference clock
//! - A drift simulator driving a manager by hand
//! - End-to-end integration tests (`tests/`)
//! - VDF and chain benchmarks (`benches/`)

pub mod time_simulator;

pub use time_simulator::*;
