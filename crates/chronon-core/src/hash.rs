//! Digest types for the chronon chain
//!
//! Every link in the chain is a 32-byte SHA-256 digest. The textual form is
//! lowercase hex, which is also the form used inside hashed JSON payloads.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::ChrononError;

/// Digest length in bytes
pub const HASH_SIZE: usize = 32;

/// SHA-256 digest linking chronons together
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct ChainHash(pub [u8; HASH_SIZE]);

impl ChainHash {
    /// All-zero digest, the genesis back-reference
    pub const ZERO: ChainHash = ChainHash([0u8; HASH_SIZE]);

    #[inline]
    pub fn new(bytes: [u8; HASH_SIZE]) -> Self {
        ChainHash(bytes)
    }

    /// Hash arbitrary bytes with SHA-256
    pub fn digest(data: impl AsRef<[u8]>) -> Self {
        let out = Sha256::digest(data.as_ref());
        let mut bytes = [0u8; HASH_SIZE];
        bytes.copy_from_slice(&out);
        ChainHash(bytes)
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; HASH_SIZE]
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, ChrononError> {
        let raw = hex::decode(s).map_err(|e| ChrononError::InvalidConfig(e.to_string()))?;
        let bytes: [u8; HASH_SIZE] = raw.try_into().map_err(|raw: Vec<u8>| {
            ChrononError::InvalidConfig(format!(
                "digest must be {} bytes, got {}",
                HASH_SIZE,
                raw.len()
            ))
        })?;
        Ok(ChainHash(bytes))
    }
}

impl From<[u8; HASH_SIZE]> for ChainHash {
    fn from(bytes: [u8; HASH_SIZE]) -> Self {
        ChainHash(bytes)
    }
}

impl AsRef<[u8]> for ChainHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl FromStr for ChainHash {
    type Err = ChrononError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ChainHash::from_hex(s)
    }
}

impl fmt::Debug for ChainHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({}..)", &self.to_hex()[..12])
    }
}

impl fmt::Display for ChainHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for ChainHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ChainHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ChainHash::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
