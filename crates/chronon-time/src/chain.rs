//! Append-only chronon storage, validation and statistics

use chronon_core::{ChainHash, ChrononError, ChrononResult, Timestamp};
use serde::Serialize;
use thiserror::Error;

use crate::{genesis_hash, Chronon, Transaction};

/// Chronons considered by [`ChrononChain::statistics`] by default
pub const STATISTICS_WINDOW: usize = 100;

/// A single integrity violation found by validation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainViolation {
    #[error("chain is empty")]
    Empty,

    #[error("genesis has number {0}")]
    GenesisNumber(u64),

    #[error("genesis back-reference is not zero")]
    GenesisPreviousHash,

    #[error("genesis carries VDF fields")]
    GenesisVdf,

    #[error("position {position} holds chronon {found}")]
    NumberGap { position: u64, found: u64 },

    #[error("chronon {0} does not link to its predecessor")]
    BrokenLink(u64),

    #[error("chronon {0} hash does not match its contents")]
    HashMismatch(u64),

    #[error("chronon {0} has no VDF proof")]
    MissingProof(u64),
}

/// Outcome of a whole-chain check
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChainReport {
    pub checked: u64,
    pub violations: Vec<ChainViolation>,
}

impl ChainReport {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Windowed chain statistics
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ChrononStatistics {
    pub total_chronons: u64,
    pub average_block_time_ms: f64,
    pub avg_transactions_per_chronon: f64,
    pub implied_hash_rate: f64,
}

/// Append-only chain of chronons
///
/// INVARIANT: `chronons[i].number == i` for every chronon appended through
/// [`ChrononChain::push_genesis`] and [`ChrononChain::append`].
#[derive(Clone, Debug, Default)]
pub struct ChrononChain {
    chronons: Vec<Chronon>,
}

impl ChrononChain {
    pub fn new() -> Self {
        ChrononChain {
            chronons: Vec::new(),
        }
    }

    /// Adopt an existing sequence without checking it
    ///
    /// Used to inspect imported or damaged timelines; run
    /// [`ChrononChain::validate`] before trusting the result.
    pub fn from_unchecked(chronons: Vec<Chronon>) -> Self {
        ChrononChain { chronons }
    }

    pub fn len(&self) -> usize {
        self.chronons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chronons.is_empty()
    }

    /// Highest-numbered chronon
    pub fn current(&self) -> Option<&Chronon> {
        self.chronons.last()
    }

    pub fn current_number(&self) -> Option<u64> {
        self.current().map(|c| c.number)
    }

    /// Create the genesis chronon
    pub fn push_genesis(&mut self, timestamp: Timestamp) -> ChrononResult<&Chronon> {
        if !self.chronons.is_empty() {
            return Err(ChrononError::AlreadyInitialized);
        }
        self.chronons.push(Chronon::genesis(timestamp));
        Ok(&self.chronons[0])
    }

    /// Append a successor of the current chronon
    pub fn append(&mut self, chronon: Chronon) -> ChrononResult<()> {
        let Some(current) = self.current() else {
            return Err(ChrononError::NotInitialized);
        };
        if chronon.number != current.number + 1 || chronon.previous_hash != current.hash {
            return Err(ChrononError::ChainCorrupt(current.number + 1));
        }
        self.chronons.push(chronon);
        Ok(())
    }

    pub fn get(&self, number: u64) -> Option<&Chronon> {
        usize::try_from(number)
            .ok()
            .and_then(|i| self.chronons.get(i))
    }

    /// Up to `count` chronons, newest first
    pub fn recent(&self, count: usize) -> Vec<Chronon> {
        self.chronons.iter().rev().take(count).cloned().collect()
    }

    /// Chronons `start..=end`, clamped to the chain
    pub fn range(&self, start: u64, end: u64) -> Vec<Chronon> {
        let Some(current) = self.current_number() else {
            return Vec::new();
        };
        let end = end.min(current);
        if start > end {
            return Vec::new();
        }
        self.chronons[start as usize..=end as usize].to_vec()
    }

    /// Append to the current chronon; earlier chronons are frozen
    pub fn add_transaction(&mut self, tx: Transaction) -> bool {
        match self.chronons.last_mut() {
            Some(current) => {
                current.transactions.push(tx);
                true
            }
            None => false,
        }
    }

    /// Append to chronon `number` only while it is still current
    pub fn add_transaction_to(&mut self, number: u64, tx: Transaction) -> bool {
        if self.current_number() != Some(number) {
            return false;
        }
        self.add_transaction(tx)
    }

    pub fn transactions(&self, number: u64) -> Vec<Transaction> {
        self.get(number)
            .map(|c| c.transactions.clone())
            .unwrap_or_default()
    }

    /// Walk the whole chain and collect every violation
    pub fn validate(&self) -> ChainReport {
        let mut violations = Vec::new();

        let Some(genesis) = self.chronons.first() else {
            return ChainReport {
                checked: 0,
                violations: vec![ChainViolation::Empty],
            };
        };

        if genesis.number != 0 {
            violations.push(ChainViolation::GenesisNumber(genesis.number));
        }
        if !genesis.previous_hash.is_zero() {
            violations.push(ChainViolation::GenesisPreviousHash);
        }
        if genesis.vdf_challenge.is_some() || genesis.vdf_proof.is_some() {
            violations.push(ChainViolation::GenesisVdf);
        }
        if genesis.hash != genesis_hash() {
            violations.push(ChainViolation::HashMismatch(genesis.number));
        }

        for (position, pair) in self.chronons.windows(2).enumerate() {
            let (previous, current) = (&pair[0], &pair[1]);
            let position = position as u64 + 1;

            if current.number != position {
                violations.push(ChainViolation::NumberGap {
                    position,
                    found: current.number,
                });
            }
            if current.previous_hash != previous.hash {
                violations.push(ChainViolation::BrokenLink(current.number));
            }
            if current.vdf_proof.is_none() {
                violations.push(ChainViolation::MissingProof(current.number));
            }
            if !current.hash_is_consistent() {
                violations.push(ChainViolation::HashMismatch(current.number));
            }
        }

        ChainReport {
            checked: self.chronons.len() as u64,
            violations,
        }
    }

    /// Statistics over the most recent `window` chronons
    pub fn statistics(&self, window: usize) -> ChrononStatistics {
        let total_chronons = self.chronons.len() as u64;
        let start = self.chronons.len().saturating_sub(window);
        let recent = &self.chronons[start..];

        let average_block_time_ms = match (recent.first(), recent.last()) {
            (Some(oldest), Some(newest)) if recent.len() > 1 => {
                newest.timestamp.signed_diff(oldest.timestamp) as f64
                    / (recent.len() - 1) as f64
            }
            _ => 0.0,
        };

        let avg_transactions_per_chronon = if recent.is_empty() {
            0.0
        } else {
            let total: usize = recent.iter().map(|c| c.transactions.len()).sum();
            total as f64 / recent.len() as f64
        };

        let implied_hash_rate = if average_block_time_ms > 0.0 {
            1000.0 / average_block_time_ms
        } else {
            0.0
        };

        ChrononStatistics {
            total_chronons,
            average_block_time_ms,
            avg_transactions_per_chronon,
            implied_hash_rate,
        }
    }

    /// Hash of the current chronon, zero when empty
    pub fn head_hash(&self) -> ChainHash {
        self.current().map(|c| c.hash).unwrap_or(ChainHash::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronon_vdf::{VdfChallenge, VdfProof, CHALLENGE_SIZE};

    fn sealed_successor(chain: &ChrononChain, timestamp: u64) -> Chronon {
        let current = chain.current().unwrap();
        let challenge =
            VdfChallenge::new([timestamp as u8; CHALLENGE_SIZE], 1, Timestamp(timestamp));
        let proof = VdfProof {
            output: vec![timestamp as u8; 32],
            proof: vec![0x5a; 32],
            computation_time_ms: 0.1,
        };
        Chronon::successor(&current.hash, current.number, Timestamp(timestamp), challenge, proof)
    }

    fn chain_of(len: u64) -> ChrononChain {
        let mut chain = ChrononChain::new();
        chain.push_genesis(Timestamp(1_000)).unwrap();
        for i in 1..len {
            let next = sealed_successor(&chain, 1_000 + i * 100);
            chain.append(next).unwrap();
        }
        chain
    }

    #[test]
    fn test_genesis_once() {
        let mut chain = ChrononChain::new();
        chain.push_genesis(Timestamp(1)).unwrap();
        assert_eq!(
            chain.push_genesis(Timestamp(2)).unwrap_err(),
            ChrononError::AlreadyInitialized
        );
        assert_eq!(chain.current_number(), Some(0));
        assert!(chain.validate().is_valid());
    }

    #[test]
    fn test_append_requires_link() {
        let mut chain = chain_of(2);
        let mut bad = sealed_successor(&chain, 5_000);
        bad.previous_hash = ChainHash::digest(b"elsewhere");
        assert_eq!(chain.append(bad).unwrap_err(), ChrononError::ChainCorrupt(2));
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn test_append_before_genesis() {
        let mut chain = ChrononChain::new();
        let template = chain_of(2);
        let next = template.get(1).unwrap().clone();
        assert_eq!(chain.append(next).unwrap_err(), ChrononError::NotInitialized);
    }

    #[test]
    fn test_monotonic_and_linked() {
        let chain = chain_of(10);
        for n in 1..10u64 {
            let prev = chain.get(n - 1).unwrap();
            let cur = chain.get(n).unwrap();
            assert_eq!(cur.number, prev.number + 1);
            assert_eq!(cur.previous_hash, prev.hash);
        }
        assert!(chain.validate().is_valid());
    }

    #[test]
    fn test_recent_newest_first_and_capped() {
        let chain = chain_of(5);
        let numbers: Vec<u64> = chain.recent(3).iter().map(|c| c.number).collect();
        assert_eq!(numbers, vec![4, 3, 2]);
        assert_eq!(chain.recent(50).len(), 5);
        assert!(chain.recent(0).is_empty());
    }

    #[test]
    fn test_range_clamped() {
        let chain = chain_of(5);
        let numbers: Vec<u64> = chain.range(2, 100).iter().map(|c| c.number).collect();
        assert_eq!(numbers, vec![2, 3, 4]);
        assert!(chain.range(4, 2).is_empty());
        assert!(chain.range(10, 20).is_empty());
        assert!(ChrononChain::new().range(0, 3).is_empty());
    }

    #[test]
    fn test_transactions_freeze_on_advance() {
        let mut chain = chain_of(1);
        assert!(chain.add_transaction(Transaction::from_static(b"a")));
        assert!(chain.add_transaction_to(0, Transaction::from_static(b"b")));

        let next = sealed_successor(&chain, 2_000);
        chain.append(next).unwrap();

        assert!(!chain.add_transaction_to(0, Transaction::from_static(b"c")));
        assert_eq!(chain.transactions(0).len(), 2);

        assert!(chain.add_transaction(Transaction::from_static(b"d")));
        assert_eq!(chain.transactions(1), vec![Transaction::from_static(b"d")]);
        assert_eq!(chain.transactions(0).len(), 2);
    }

    #[test]
    fn test_add_transaction_empty_chain() {
        let mut chain = ChrononChain::new();
        assert!(!chain.add_transaction(Transaction::from_static(b"x")));
        assert!(chain.transactions(0).is_empty());
    }

    #[test]
    fn test_transactions_do_not_affect_hash() {
        let mut chain = chain_of(3);
        chain.add_transaction(Transaction::from_static(b"payload"));
        assert!(chain.validate().is_valid());
    }

    #[test]
    fn test_validate_empty() {
        let report = ChrononChain::new().validate();
        assert!(!report.is_valid());
        assert_eq!(report.violations, vec![ChainViolation::Empty]);
    }

    #[test]
    fn test_validate_reports_broken_link() {
        let good = chain_of(4);
        let mut chronons = good.recent(4);
        chronons.reverse();
        chronons[2].previous_hash = ChainHash::digest(b"forged");

        let report = ChrononChain::from_unchecked(chronons).validate();
        assert!(!report.is_valid());
        assert!(report.violations.contains(&ChainViolation::BrokenLink(2)));
    }

    #[test]
    fn test_validate_reports_gap() {
        let good = chain_of(4);
        let mut chronons = good.recent(4);
        chronons.reverse();
        chronons.remove(2);

        let report = ChrononChain::from_unchecked(chronons).validate();
        assert!(report.violations.contains(&ChainViolation::NumberGap {
            position: 2,
            found: 3
        }));
        assert!(report.violations.contains(&ChainViolation::BrokenLink(3)));
    }

    #[test]
    fn test_validate_late_violation_fails_whole_chain() {
        let good = chain_of(20);
        let mut chronons = good.recent(20);
        chronons.reverse();
        chronons[19].timestamp = Timestamp(0);

        let report = ChrononChain::from_unchecked(chronons).validate();
        assert_eq!(report.violations, vec![ChainViolation::HashMismatch(19)]);
    }

    #[test]
    fn test_validate_genesis_shape() {
        let mut genesis = Chronon::genesis(Timestamp(1));
        genesis.previous_hash = ChainHash::digest(b"not zero");
        let report = ChrononChain::from_unchecked(vec![genesis]).validate();
        assert_eq!(report.violations, vec![ChainViolation::GenesisPreviousHash]);
    }

    #[test]
    fn test_statistics() {
        let mut chain = chain_of(5);
        chain.add_transaction(Transaction::from_static(b"1"));
        chain.add_transaction(Transaction::from_static(b"2"));

        let stats = chain.statistics(STATISTICS_WINDOW);
        assert_eq!(stats.total_chronons, 5);
        assert!((stats.average_block_time_ms - 100.0).abs() < 1e-9);
        assert!((stats.avg_transactions_per_chronon - 0.4).abs() < 1e-9);
        assert!((stats.implied_hash_rate - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_statistics_window_bounded() {
        let chain = chain_of(150);
        let stats = chain.statistics(STATISTICS_WINDOW);
        assert_eq!(stats.total_chronons, 150);
        assert!((stats.average_block_time_ms - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_statistics_single_chronon() {
        let stats = chain_of(1).statistics(STATISTICS_WINDOW);
        assert_eq!(stats.total_chronons, 1);
        assert_eq!(stats.average_block_time_ms, 0.0);
        assert_eq!(stats.implied_hash_rate, 0.0);
    }
}
