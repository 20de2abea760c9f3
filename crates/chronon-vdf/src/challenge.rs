//! VDF challenges, proofs and algorithm tags

use std::fmt;
use std::str::FromStr;

use chronon_core::{ChrononError, Timestamp};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Challenge input length in bytes
pub const CHALLENGE_SIZE: usize = 32;

/// Sequential evaluator selected for a VDF engine
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VdfAlgorithm {
    /// Repeated modular squaring
    #[default]
    Squaring,
    /// Repeated SHA-256
    Hashing,
    /// Squaring followed by hashing at half difficulty
    Composite,
}

impl VdfAlgorithm {
    pub fn as_str(self) -> &'static str {
        match self {
            VdfAlgorithm::Squaring => "squaring",
            VdfAlgorithm::Hashing => "hashing",
            VdfAlgorithm::Composite => "composite",
        }
    }
}

impl fmt::Display for VdfAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VdfAlgorithm {
    type Err = ChrononError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "squaring" => Ok(VdfAlgorithm::Squaring),
            "hashing" => Ok(VdfAlgorithm::Hashing),
            "composite" => Ok(VdfAlgorithm::Composite),
            other => Err(ChrononError::UnknownAlgorithm(other.to_string())),
        }
    }
}

/// Input to one delay evaluation
///
/// Immutable once created. `difficulty` is the base-2 log of the
/// iteration count.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VdfChallenge {
    #[serde(with = "hex::serde")]
    pub input: [u8; CHALLENGE_SIZE],
    pub difficulty: u32,
    pub timestamp: Timestamp,
}

impl VdfChallenge {
    pub fn new(input: [u8; CHALLENGE_SIZE], difficulty: u32, timestamp: Timestamp) -> Self {
        VdfChallenge {
            input,
            difficulty,
            timestamp,
        }
    }

    /// Challenge with OS-random input
    pub fn random(difficulty: u32, timestamp: Timestamp) -> Self {
        let mut input = [0u8; CHALLENGE_SIZE];
        OsRng.fill_bytes(&mut input);
        Self::new(input, difficulty, timestamp)
    }

    /// Number of sequential steps, `None` when 2^difficulty does not fit in u64
    pub fn iterations(&self) -> Option<u64> {
        iterations_for(self.difficulty)
    }
}

/// 2^difficulty, `None` on overflow
#[inline]
pub fn iterations_for(difficulty: u32) -> Option<u64> {
    1u64.checked_shl(difficulty)
}

/// Result of one delay evaluation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VdfProof {
    /// Final state of the sequential computation
    #[serde(with = "hex::serde")]
    pub output: Vec<u8>,
    /// SHA-256 commitment over challenge, output and algorithm
    #[serde(with = "hex::serde")]
    pub proof: Vec<u8>,
    /// Measured duration of the evaluation loop
    pub computation_time_ms: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_algorithm_parse() {
        assert_eq!("squaring".parse::<VdfAlgorithm>().unwrap(), VdfAlgorithm::Squaring);
        assert_eq!(" Hashing ".parse::<VdfAlgorithm>().unwrap(), VdfAlgorithm::Hashing);
        assert_eq!("COMPOSITE".parse::<VdfAlgorithm>().unwrap(), VdfAlgorithm::Composite);
    }

    #[test]
    fn test_unknown_algorithm_rejected() {
        let err = "wesolowski".parse::<VdfAlgorithm>().unwrap_err();
        assert_eq!(err, ChrononError::UnknownAlgorithm("wesolowski".into()));
    }

    #[test]
    fn test_iterations() {
        assert_eq!(iterations_for(0), Some(1));
        assert_eq!(iterations_for(10), Some(1024));
        assert_eq!(iterations_for(63), Some(1 << 63));
        assert_eq!(iterations_for(64), None);
    }

    #[test]
    fn test_random_challenges_differ() {
        let a = VdfChallenge::random(4, Timestamp(1));
        let b = VdfChallenge::random(4, Timestamp(1));
        assert_ne!(a.input, b.input);
    }

    #[test]
    fn test_challenge_serializes_hex_input() {
        let c = VdfChallenge::new([0xab; CHALLENGE_SIZE], 3, Timestamp(42));
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json["input"], "ab".repeat(CHALLENGE_SIZE));
        assert_eq!(json["difficulty"], 3);
        assert_eq!(json["timestamp"], 42);
    }
}
