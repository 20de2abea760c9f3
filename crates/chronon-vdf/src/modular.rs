//! Fixed-width arithmetic modulo M = 2^288 - 1
//!
//! The squaring evaluator runs `x = x^2 mod M` millions of times, so the
//! residue lives in nine 32-bit limbs on the stack and every squaring is
//! a schoolbook product followed by a single fold. No heap traffic per
//! iteration.

/// Number of 32-bit limbs in a residue
pub const LIMBS: usize = 9;

/// Serialized width of a residue (big-endian)
pub const RESIDUE_BYTES: usize = LIMBS * 4;

/// Residue modulo 2^288 - 1, little-endian limbs
///
/// INVARIANT: the value is always canonical, i.e. strictly below the modulus.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct Residue {
    limbs: [u32; LIMBS],
}

impl Residue {
    pub const ZERO: Residue = Residue { limbs: [0; LIMBS] };

    /// Interpret up to 36 big-endian bytes as an integer and reduce it
    ///
    /// Longer inputs keep only their trailing 36 bytes.
    pub fn from_be_bytes(bytes: &[u8]) -> Self {
        let bytes = if bytes.len() > RESIDUE_BYTES {
            &bytes[bytes.len() - RESIDUE_BYTES..]
        } else {
            bytes
        };

        let mut padded = [0u8; RESIDUE_BYTES];
        padded[RESIDUE_BYTES - bytes.len()..].copy_from_slice(bytes);

        let mut limbs = [0u32; LIMBS];
        for (i, limb) in limbs.iter_mut().enumerate() {
            let end = RESIDUE_BYTES - i * 4;
            let mut word = [0u8; 4];
            word.copy_from_slice(&padded[end - 4..end]);
            *limb = u32::from_be_bytes(word);
        }

        let mut r = Residue { limbs };
        r.canonicalize();
        r
    }

    /// Fixed-width big-endian serialization
    pub fn to_be_bytes(&self) -> [u8; RESIDUE_BYTES] {
        let mut out = [0u8; RESIDUE_BYTES];
        for (i, limb) in self.limbs.iter().enumerate() {
            let end = RESIDUE_BYTES - i * 4;
            out[end - 4..end].copy_from_slice(&limb.to_be_bytes());
        }
        out
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.limbs.iter().all(|&l| l == 0)
    }

    /// Square in place: `self = self^2 mod (2^288 - 1)`
    #[inline]
    pub fn square(&mut self) {
        let x = &self.limbs;
        let mut wide = [0u32; 2 * LIMBS];

        for i in 0..LIMBS {
            let xi = x[i] as u64;
            let mut carry = 0u64;
            for j in 0..LIMBS {
                // (2^32-1) + (2^32-1)^2 + (2^32-1) == 2^64-1, never overflows
                let cur = wide[i + j] as u64 + xi * x[j] as u64 + carry;
                wide[i + j] = cur as u32;
                carry = cur >> 32;
            }
            wide[i + LIMBS] = carry as u32;
        }

        // 2^288 ≡ 1, so lo + hi is congruent to the product
        let mut folded = [0u32; LIMBS];
        let mut carry = 0u64;
        for i in 0..LIMBS {
            let cur = wide[i] as u64 + wide[i + LIMBS] as u64 + carry;
            folded[i] = cur as u32;
            carry = cur >> 32;
        }

        // The end-around carry cannot overflow again: lo + hi <= 2^289 - 2
        let mut i = 0;
        while carry != 0 && i < LIMBS {
            let cur = folded[i] as u64 + carry;
            folded[i] = cur as u32;
            carry = cur >> 32;
            i += 1;
        }

        self.limbs = folded;
        self.canonicalize();
    }

    /// Map the modulus itself (all ones) to zero
    #[inline]
    fn canonicalize(&mut self) {
        if self.limbs.iter().all(|&l| l == u32::MAX) {
            self.limbs = [0; LIMBS];
        }
    }
}
