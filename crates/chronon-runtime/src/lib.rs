//! Chronon Runtime - Node orchestration around the Chronon Manager
//!
//! A node:
//! 1. Reads configuration from the environment
//! 2. Self-tests the VDF engine
//! 3. Initializes the manager (genesis + periodic driver)
//! 4. Logs every tick through a subscriber
//! 5. Periodically synchronizes against a reference clock
//! 6. Shuts the manager down on request

pub mod logging;
pub mod node;

pub use logging::*;
pub use node::*;
