//! Error types for the chronon clock

use thiserror::Error;

/// Core chronon errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChrononError {
    // Configuration errors
    #[error("Unknown VDF algorithm: {0}")]
    UnknownAlgorithm(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Lifecycle errors
    #[error("Chronon manager already initialized")]
    AlreadyInitialized,

    #[error("Chronon manager not initialized")]
    NotInitialized,

    #[error("Chronon manager stopped")]
    Stopped,

    // Chain errors
    #[error("Chain corrupt: chronon {0} missing")]
    ChainCorrupt(u64),

    #[error("Chronon not found: {0}")]
    ChrononNotFound(u64),

    // Computation errors
    #[error("VDF computation failed: {0}")]
    Computation(String),
}

impl ChrononError {
    /// Transient errors skip a tick; everything else is a caller bug or a
    /// lifecycle condition.
    pub fn is_transient(&self) -> bool {
        matches!(self, ChrononError::Computation(_))
    }
}

/// Result type for chronon operations
pub type ChrononResult<T> = Result<T, ChrononError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ChrononError::UnknownAlgorithm("cubing".into());
        assert_eq!(err.to_string(), "Unknown VDF algorithm: cubing");

        let err = ChrononError::ChainCorrupt(7);
        assert_eq!(err.to_string(), "Chain corrupt: chronon 7 missing");
    }

    #[test]
    fn test_transient_classification() {
        assert!(ChrononError::Computation("overflow".into()).is_transient());
        assert!(!ChrononError::AlreadyInitialized.is_transient());
        assert!(!ChrononError::Stopped.is_transient());
    }
}
