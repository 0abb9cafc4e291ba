//! Bloom filter adapter: Implementation of `ProbabilisticSet`.
//!
//! Sizing follows the textbook optimum for `n` items at rate `p`:
//! `m = ceil(-n·ln p / ln²2)` bits (rounded up to whole bytes) and
//! `k = round(-log2 p)` probes. Probe positions use double hashing over
//! `SHA-256(DOMAIN_PREFIX || item)`, so the layout is identical on every
//! platform and a published body can be checked by any consumer.

use sha2::{Digest, Sha256};

use crate::ports::{FilterError, ProbabilisticSet};

/// Domain separation prefix for probe hashing.
const DOMAIN_PREFIX: &[u8] = b"epitrace:batch-bloom:v1";

/// Upper bound on a filter body (256 MiB).
const MAX_BODY_BYTES: f64 = (256 * 1024 * 1024) as f64;

/// Bloom filter over byte strings.
#[derive(Clone)]
pub struct BloomFilter {
    bits: Vec<u8>,
    num_bits: u64,
    num_probes: u32,
}

impl BloomFilter {
    /// Number of hash probes per item.
    #[must_use]
    pub fn num_probes(&self) -> u32 {
        self.num_probes
    }

    fn geometry(capacity: u64, false_positive_rate: f64) -> Result<(usize, u32), FilterError> {
        if !(false_positive_rate > 0.0 && false_positive_rate < 1.0) {
            return Err(FilterError::InvalidRate(false_positive_rate));
        }

        let n = capacity.max(1) as f64;
        let ln2 = std::f64::consts::LN_2;
        let bits = (-n * false_positive_rate.ln() / (ln2 * ln2)).ceil();
        let bytes = (bits / 8.0).ceil().max(1.0);
        if !bytes.is_finite() || bytes > MAX_BODY_BYTES {
            return Err(FilterError::UnsupportedCapacity(capacity));
        }

        let probes = (-false_positive_rate.log2()).round().max(1.0) as u32;
        Ok((bytes as usize, probes))
    }

    /// Bit positions probed for `item`.
    fn probes(&self, item: &[u8]) -> impl Iterator<Item = u64> + '_ {
        let mut hasher = Sha256::new();
        hasher.update(DOMAIN_PREFIX);
        hasher.update(item);
        let digest = hasher.finalize();

        let mut h1_bytes = [0u8; 8];
        let mut h2_bytes = [0u8; 8];
        h1_bytes.copy_from_slice(&digest[..8]);
        h2_bytes.copy_from_slice(&digest[8..16]);
        let h1 = u64::from_be_bytes(h1_bytes);
        // Odd step so successive probes never collapse onto one bit.
        let h2 = u64::from_be_bytes(h2_bytes) | 1;

        (0..u64::from(self.num_probes))
            .map(move |i| h1.wrapping_add(i.wrapping_mul(h2)) % self.num_bits)
    }
}

impl ProbabilisticSet for BloomFilter {
    fn with_capacity(capacity: u64, false_positive_rate: f64) -> Result<Self, FilterError> {
        let (bytes, num_probes) = Self::geometry(capacity, false_positive_rate)?;
        Ok(Self {
            bits: vec![0u8; bytes],
            num_bits: bytes as u64 * 8,
            num_probes,
        })
    }

    fn body_len(capacity: u64, false_positive_rate: f64) -> Result<usize, FilterError> {
        Self::geometry(capacity, false_positive_rate).map(|(bytes, _)| bytes)
    }

    fn insert(&mut self, item: &[u8]) {
        let positions: Vec<u64> = self.probes(item).collect();
        for bit in positions {
            self.bits[(bit / 8) as usize] |= 1 << (bit % 8);
        }
    }

    fn contains(&self, item: &[u8]) -> bool {
        self.probes(item)
            .all(|bit| self.bits[(bit / 8) as usize] & (1 << (bit % 8)) != 0)
    }

    fn as_bytes(&self) -> &[u8] {
        &self.bits
    }

    fn from_bytes(capacity: u64, false_positive_rate: f64, bytes: Vec<u8>) -> Result<Self, FilterError> {
        let (expected, num_probes) = Self::geometry(capacity, false_positive_rate)?;
        if bytes.len() != expected {
            return Err(FilterError::LengthMismatch {
                capacity,
                expected,
                actual: bytes.len(),
            });
        }

        Ok(Self {
            num_bits: expected as u64 * 8,
            bits: bytes,
            num_probes,
        })
    }
}

impl std::fmt::Debug for BloomFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BloomFilter")
            .field("num_bits", &self.num_bits)
            .field("num_probes", &self.num_probes)
            .finish()
    }
}
