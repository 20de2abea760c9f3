//! Chronon - one hash-linked unit of logical time

use bytes::Bytes;
use chronon_core::{ChainHash, Timestamp};
use chronon_vdf::{VdfChallenge, VdfProof};
use serde::{Deserialize, Serialize};

/// Opaque payload recorded against a chronon
pub type Transaction = Bytes;

/// Fixed payload whose digest is the genesis hash
pub const GENESIS_MESSAGE: &str = "Chronon Genesis";
pub const GENESIS_VERSION: &str = "1.0";

/// One discrete, hash-chained unit of logical time
///
/// Number 0 is the genesis chronon: zero back-reference, no VDF fields.
/// Every later chronon's `hash` is a pure function of its number,
/// timestamp, back-reference and VDF proof.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Chronon {
    pub number: u64,
    pub timestamp: Timestamp,
    pub hash: ChainHash,
    pub previous_hash: ChainHash,
    pub vdf_challenge: Option<VdfChallenge>,
    pub vdf_proof: Option<VdfProof>,
    pub transactions: Vec<Transaction>,
}

#[derive(Serialize)]
struct GenesisPayload {
    message: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChrononPayload {
    number: u64,
    timestamp: u64,
    previous_hash: String,
    vdf_output: String,
    vdf_proof: String,
}

/// Digest of the fixed genesis payload
pub fn genesis_hash() -> ChainHash {
    let payload = GenesisPayload {
        message: GENESIS_MESSAGE,
        version: GENESIS_VERSION,
    };
    ChainHash::digest(serde_json::to_vec(&payload).unwrap_or_default())
}

/// Digest of `{number, timestamp, previousHash, vdfOutput, vdfProof}`
pub fn chronon_hash(
    number: u64,
    timestamp: Timestamp,
    previous_hash: &ChainHash,
    vdf_output: &[u8],
    vdf_proof: &[u8],
) -> ChainHash {
    let payload = ChrononPayload {
        number,
        timestamp: timestamp.as_millis(),
        previous_hash: previous_hash.to_hex(),
        vdf_output: hex::encode(vdf_output),
        vdf_proof: hex::encode(vdf_proof),
    };
    ChainHash::digest(serde_json::to_vec(&payload).unwrap_or_default())
}

impl Chronon {
    /// The genesis chronon
    pub fn genesis(timestamp: Timestamp) -> Self {
        Chronon {
            number: 0,
            timestamp,
            hash: genesis_hash(),
            previous_hash: ChainHash::ZERO,
            vdf_challenge: None,
            vdf_proof: None,
            transactions: Vec::new(),
        }
    }

    /// Successor of `previous`, sealed by a VDF proof
    pub fn successor(
        previous: &ChainHash,
        previous_number: u64,
        timestamp: Timestamp,
        challenge: VdfChallenge,
        proof: VdfProof,
    ) -> Self {
        let number = previous_number + 1;
        let hash = chronon_hash(number, timestamp, previous, &proof.output, &proof.proof);
        Chronon {
            number,
            timestamp,
            hash,
            previous_hash: *previous,
            vdf_challenge: Some(challenge),
            vdf_proof: Some(proof),
            transactions: Vec::new(),
        }
    }

    #[inline]
    pub fn is_genesis(&self) -> bool {
        self.number == 0
    }

    /// Recompute the hash from the stored fields
    pub fn compute_hash(&self) -> ChainHash {
        if self.is_genesis() {
            return genesis_hash();
        }
        let (output, proof) = match &self.vdf_proof {
            Some(p) => (p.output.as_slice(), p.proof.as_slice()),
            None => (&[][..], &[][..]),
        };
        chronon_hash(self.number, self.timestamp, &self.previous_hash, output, proof)
    }

    /// Stored hash matches its recomputation
    pub fn hash_is_consistent(&self) -> bool {
        self.compute_hash() == self.hash
    }
}
