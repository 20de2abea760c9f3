//! VDF Engine - sequential evaluation, commitment and verification

use std::time::Instant;

use chronon_core::{ChrononError, ChrononResult, Timestamp};
use parking_lot::RwLock;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::{iterations_for, Residue, VdfAlgorithm, VdfChallenge, VdfProof, CHALLENGE_SIZE};

/// Iterations between cooperative yield points
pub const YIELD_INTERVAL: u64 = 1000;

/// Highest difficulty verification still replays exactly
pub const DEFAULT_REPLAY_LIMIT: u32 = 10;

/// Accepted band for a proof's reported computation time
///
/// The estimate is `base_ms * 2^difficulty`; a proof passes when its time
/// lies within `[min_ratio, max_ratio]` of that estimate.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimingWindow {
    pub base_ms: f64,
    pub min_ratio: f64,
    pub max_ratio: f64,
}

impl Default for TimingWindow {
    fn default() -> Self {
        TimingWindow {
            base_ms: 10.0,
            min_ratio: 0.5,
            max_ratio: 2.0,
        }
    }
}

impl TimingWindow {
    pub fn estimate_ms(&self, difficulty: u32) -> f64 {
        self.base_ms * 2f64.powi(difficulty as i32)
    }

    pub fn contains(&self, difficulty: u32, observed_ms: f64) -> bool {
        let expected = self.estimate_ms(difficulty);
        observed_ms >= expected * self.min_ratio && observed_ms <= expected * self.max_ratio
    }
}

/// VDF engine configuration
#[derive(Clone, Debug, PartialEq)]
pub struct VdfConfig {
    /// Difficulty stamped on generated challenges
    pub difficulty: u32,
    /// Sequential evaluator
    pub algorithm: VdfAlgorithm,
    /// Timing heuristic applied by `verify`, `None` to skip it
    pub timing: Option<TimingWindow>,
    /// Verification replays the real evaluator up to this difficulty and
    /// falls back to a hashing approximation above it
    pub replay_limit: u32,
}

impl Default for VdfConfig {
    fn default() -> Self {
        VdfConfig {
            difficulty: 10,
            algorithm: VdfAlgorithm::Squaring,
            timing: Some(TimingWindow::default()),
            replay_limit: DEFAULT_REPLAY_LIMIT,
        }
    }
}

impl VdfConfig {
    pub fn with_difficulty(difficulty: u32) -> Self {
        VdfConfig {
            difficulty,
            ..Default::default()
        }
    }

    /// Configuration for tests and simulations: no timing heuristic
    pub fn untimed(difficulty: u32, algorithm: VdfAlgorithm) -> Self {
        VdfConfig {
            difficulty,
            algorithm,
            timing: None,
            replay_limit: DEFAULT_REPLAY_LIMIT,
        }
    }

    /// Read `CHRONON_VDF_DIFFICULTY` and `CHRONON_VDF_ALGORITHM`
    pub fn from_env() -> ChrononResult<Self> {
        let mut config = VdfConfig::default();
        if let Ok(raw) = std::env::var("CHRONON_VDF_DIFFICULTY") {
            config.difficulty = raw.trim().parse().map_err(|_| {
                ChrononError::InvalidConfig(format!("CHRONON_VDF_DIFFICULTY: {raw:?}"))
            })?;
        }
        if let Ok(raw) = std::env::var("CHRONON_VDF_ALGORITHM") {
            config.algorithm = raw.parse()?;
        }
        Ok(config)
    }
}

/// Timing summary from [`VdfEngine::benchmark`]
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct BenchmarkReport {
    pub iterations: usize,
    pub successes: usize,
    pub average_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub success_rate_percent: f64,
}

#[derive(Serialize)]
struct ChallengeCommitment {
    input: String,
    difficulty: u32,
    timestamp: u64,
}

#[derive(Serialize)]
struct ProofCommitment {
    challenge: ChallengeCommitment,
    output: String,
    algorithm: &'static str,
}

/// `SHA-256(json({challenge, output, algorithm}))`
pub fn commitment(challenge: &VdfChallenge, output: &[u8], algorithm: VdfAlgorithm) -> Vec<u8> {
    let payload = ProofCommitment {
        challenge: ChallengeCommitment {
            input: hex::encode(challenge.input),
            difficulty: challenge.difficulty,
            timestamp: challenge.timestamp.as_millis(),
        },
        output: hex::encode(output),
        algorithm: algorithm.as_str(),
    };
    // Serializing plain strings and integers cannot fail
    let json = serde_json::to_vec(&payload).unwrap_or_default();
    Sha256::digest(&json).to_vec()
}

/// Repeated modular squaring over 2^difficulty steps
pub async fn evaluate_squaring(input: &[u8], difficulty: u32) -> ChrononResult<Vec<u8>> {
    let iterations = checked_iterations(difficulty)?;
    let mut x = Residue::from_be_bytes(input);

    for i in 0..iterations {
        x.square();
        if i % YIELD_INTERVAL == 0 {
            tokio::task::yield_now().await;
        }
    }

    Ok(x.to_be_bytes().to_vec())
}

/// Repeated SHA-256 over 2^difficulty steps
pub async fn evaluate_hashing(input: &[u8], difficulty: u32) -> ChrononResult<Vec<u8>> {
    let iterations = checked_iterations(difficulty)?;
    let mut current: Vec<u8> = input.to_vec();

    for i in 0..iterations {
        current = Sha256::digest(&current).to_vec();
        if i % YIELD_INTERVAL == 0 {
            tokio::task::yield_now().await;
        }
    }

    Ok(current)
}

/// Squaring to completion, then hashing its output at half difficulty
pub async fn evaluate_composite(input: &[u8], difficulty: u32) -> ChrononResult<Vec<u8>> {
    let squared = evaluate_squaring(input, difficulty).await?;
    evaluate_hashing(&squared, difficulty / 2).await
}

/// Run the selected evaluator
pub async fn evaluate(
    algorithm: VdfAlgorithm,
    input: &[u8],
    difficulty: u32,
) -> ChrononResult<Vec<u8>> {
    match algorithm {
        VdfAlgorithm::Squaring => evaluate_squaring(input, difficulty).await,
        VdfAlgorithm::Hashing => evaluate_hashing(input, difficulty).await,
        VdfAlgorithm::Composite => evaluate_composite(input, difficulty).await,
    }
}

fn checked_iterations(difficulty: u32) -> ChrononResult<u64> {
    iterations_for(difficulty).ok_or_else(|| {
        ChrononError::Computation(format!("difficulty {difficulty} overflows the iteration count"))
    })
}

/// VDF Engine - produces and verifies proofs of elapsed sequential work
///
/// The configuration is read-only except through the explicit `set_*`
/// calls; every computation works from a snapshot taken when it starts.
#[derive(Debug, Default)]
pub struct VdfEngine {
    config: RwLock<VdfConfig>,
}

impl VdfEngine {
    /// Engine at the given difficulty with default algorithm and timing
    ///
    /// The default [`TimingWindow`] assumes `10ms * 2^difficulty` per
    /// proof. Hardware that evaluates faster than half that estimate
    /// produces proofs `verify` rejects, so `benchmark` reports 0% success.
    /// Use [`VdfConfig::untimed`] where only correctness matters.
    pub fn new(difficulty: u32) -> Self {
        Self::with_config(VdfConfig::with_difficulty(difficulty))
    }

    pub fn with_config(config: VdfConfig) -> Self {
        VdfEngine {
            config: RwLock::new(config),
        }
    }

    /// Snapshot of the current configuration
    pub fn config(&self) -> VdfConfig {
        self.config.read().clone()
    }

    pub fn set_config(&self, config: VdfConfig) {
        *self.config.write() = config;
    }

    pub fn set_algorithm(&self, algorithm: VdfAlgorithm) {
        self.config.write().algorithm = algorithm;
    }

    /// Reconfigure from a textual tag, failing fast on unknown tags
    pub fn set_algorithm_tag(&self, tag: &str) -> ChrononResult<()> {
        let algorithm = tag.parse()?;
        self.set_algorithm(algorithm);
        Ok(())
    }

    pub fn set_difficulty(&self, difficulty: u32) {
        self.config.write().difficulty = difficulty;
    }

    pub fn algorithm(&self) -> VdfAlgorithm {
        self.config.read().algorithm
    }

    pub fn difficulty(&self) -> u32 {
        self.config.read().difficulty
    }

    /// Estimated computation time used by the timing heuristic
    pub fn estimate_time_ms(&self, difficulty: u32) -> f64 {
        self.config
            .read()
            .timing
            .unwrap_or_default()
            .estimate_ms(difficulty)
    }

    /// Build a challenge stamped with the system clock, filling the input
    /// with OS randomness when omitted
    pub fn generate_challenge(&self, input: Option<[u8; CHALLENGE_SIZE]>) -> VdfChallenge {
        self.generate_challenge_at(input, Timestamp::now())
    }

    /// Like [`VdfEngine::generate_challenge`], stamped with `timestamp`
    pub fn generate_challenge_at(
        &self,
        input: Option<[u8; CHALLENGE_SIZE]>,
        timestamp: Timestamp,
    ) -> VdfChallenge {
        let difficulty = self.difficulty();
        match input {
            Some(input) => VdfChallenge::new(input, difficulty, timestamp),
            None => VdfChallenge::random(difficulty, timestamp),
        }
    }

    /// Evaluate the delay function for a challenge
    ///
    /// Yields to the scheduler every [`YIELD_INTERVAL`] iterations; the
    /// loop itself is strictly sequential.
    pub async fn compute(&self, challenge: &VdfChallenge) -> ChrononResult<VdfProof> {
        let algorithm = self.algorithm();
        let start = Instant::now();

        let output = evaluate(algorithm, &challenge.input, challenge.difficulty).await?;

        let computation_time_ms = start.elapsed().as_secs_f64() * 1000.0;
        let proof = commitment(challenge, &output, algorithm);

        debug!(
            %algorithm,
            difficulty = challenge.difficulty,
            computation_time_ms,
            "VDF computed"
        );

        Ok(VdfProof {
            output,
            proof,
            computation_time_ms,
        })
    }

    /// Check a proof against a challenge
    ///
    /// A predicate: every mismatch or malformed input yields `false`.
    pub async fn verify(&self, challenge: &VdfChallenge, proof: &VdfProof) -> bool {
        let config = self.config();
        self.verify_with(&config, challenge, proof, config.timing).await
    }

    async fn verify_with(
        &self,
        config: &VdfConfig,
        challenge: &VdfChallenge,
        proof: &VdfProof,
        timing: Option<TimingWindow>,
    ) -> bool {
        if proof.output.is_empty() || proof.proof.is_empty() {
            return false;
        }

        let expected = match recompute_expected(config, challenge).await {
            Ok(expected) => expected,
            Err(e) => {
                debug!("VDF verification could not recompute output: {}", e);
                return false;
            }
        };
        if proof.output != expected {
            return false;
        }

        if proof.proof != commitment(challenge, &proof.output, config.algorithm) {
            return false;
        }

        match timing {
            Some(window) => window.contains(challenge.difficulty, proof.computation_time_ms),
            None => true,
        }
    }

    /// Repeated generate → compute → verify; timing covers successes only
    ///
    /// Verification applies the configured timing window, so proofs that
    /// finish well under the estimate count as failures.
    pub async fn benchmark(&self, iterations: usize) -> BenchmarkReport {
        let mut times = Vec::with_capacity(iterations);

        for i in 0..iterations {
            let challenge = self.generate_challenge(None);
            let start = Instant::now();
            let proof = match self.compute(&challenge).await {
                Ok(proof) => proof,
                Err(e) => {
                    warn!("Benchmark iteration {} failed: {}", i, e);
                    continue;
                }
            };
            let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

            if self.verify(&challenge, &proof).await {
                times.push(elapsed_ms);
            }
        }

        summarize(iterations, &times)
    }

    /// End-to-end sanity check: a fresh proof verifies and a tampered one
    /// is rejected. The timing heuristic is not part of this check.
    pub async fn self_test(&self) -> ChrononResult<()> {
        let config = self.config();
        let challenge = self.generate_challenge(None);
        let proof = self.compute(&challenge).await?;

        if proof.output.is_empty() || proof.proof.is_empty() {
            return Err(ChrononError::Computation("empty proof".into()));
        }
        if !self.verify_with(&config, &challenge, &proof, None).await {
            return Err(ChrononError::Computation(
                "fresh proof failed verification".into(),
            ));
        }

        let mut tampered = proof.clone();
        OsRng.fill_bytes(&mut tampered.output);
        if self.verify_with(&config, &challenge, &tampered, None).await {
            return Err(ChrononError::Computation(
                "tampered proof passed verification".into(),
            ));
        }

        Ok(())
    }
}

/// Output verification compares against
///
/// Up to `replay_limit` the configured evaluator is replayed exactly. Above
/// it only a SHA-256 chain at `replay_limit` is recomputed, which does not
/// reproduce real outputs at those difficulties.
async fn recompute_expected(
    config: &VdfConfig,
    challenge: &VdfChallenge,
) -> ChrononResult<Vec<u8>> {
    if challenge.difficulty <= config.replay_limit {
        evaluate(config.algorithm, &challenge.input, challenge.difficulty).await
    } else {
        evaluate_hashing(&challenge.input, config.replay_limit).await
    }
}

fn summarize(iterations: usize, times: &[f64]) -> BenchmarkReport {
    let successes = times.len();
    let success_rate_percent = if iterations > 0 {
        successes as f64 / iterations as f64 * 100.0
    } else {
        0.0
    };

    if times.is_empty() {
        return BenchmarkReport {
            iterations,
            successes,
            success_rate_percent,
            ..Default::default()
        };
    }

    let total: f64 = times.iter().sum();
    let min_ms = times.iter().copied().fold(f64::INFINITY, f64::min);
    let max_ms = times.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    BenchmarkReport {
        iterations,
        successes,
        average_ms: total / successes as f64,
        min_ms,
        max_ms,
        success_rate_percent,
    }
}
