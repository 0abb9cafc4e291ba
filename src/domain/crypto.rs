//! Cryptographic primitives of the unlinkable design.
//!
//! - Seeds: 32 random bytes per epoch, secret until a contagious report
//! - Identifiers (EphIDs): leftmost 128 bits of `SHA-256(seed)`
//! - Observation hashes: `SHA-256(ephid || epoch)`
//!
//! # Memory Security
//!
//! [`Seed`] implements `Zeroize` and `ZeroizeOnDrop`, and its `Debug`
//! output never includes the seed bytes.

use rand::{CryptoRng, RngCore};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::epoch::Epoch;

/// Seed length in bytes.
pub const SEED_LENGTH: usize = 32;

/// Broadcast identifier length in bytes.
pub const EPHID_LENGTH: usize = 16;

/// Observation hash length in bytes.
pub const HASH_LENGTH: usize = 32;

/// Target false-positive rate of published tracing batches.
pub const FALSE_POSITIVE_RATE: f64 = 1.0 / (1u64 << 42) as f64;

/// Error type for cryptographic material handling.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("Invalid seed length: expected {SEED_LENGTH} bytes, got {0}")]
    InvalidSeedLength(usize),

    #[error("Invalid identifier length: expected {EPHID_LENGTH} bytes, got {0}")]
    InvalidIdentifierLength(usize),

    #[error("Invalid observation hash length: expected {HASH_LENGTH} bytes, got {0}")]
    InvalidHashLength(usize),

    #[error("Invalid hex encoding: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

/// Per-epoch secret from which the broadcast identifier is derived.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Seed([u8; SEED_LENGTH]);

impl Seed {
    /// Wrap raw seed bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; SEED_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Parse a seed from a byte slice of exactly [`SEED_LENGTH`] bytes.
    ///
    /// # Errors
    /// Returns `InvalidSeedLength` for any other length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let array: [u8; SEED_LENGTH] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidSeedLength(bytes.len()))?;
        Ok(Self(array))
    }

    /// Parse a hex-encoded seed (report wire form).
    ///
    /// # Errors
    /// Returns error on bad hex or wrong length.
    pub fn from_hex(encoded: &str) -> Result<Self, CryptoError> {
        let mut bytes = hex::decode(encoded.trim())?;
        let seed = Self::from_slice(&bytes);
        bytes.zeroize();
        seed
    }

    /// Hex encoding of the seed. Only used when building a contagious report.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for Seed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Seed([REDACTED])")
    }
}

/// Ephemeral identifier broadcast during one epoch.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct EphId([u8; EPHID_LENGTH]);

impl EphId {
    #[must_use]
    pub fn from_bytes(bytes: [u8; EPHID_LENGTH]) -> Self {
        Self(bytes)
    }

    /// # Errors
    /// Returns `InvalidIdentifierLength` unless `bytes` is exactly [`EPHID_LENGTH`] long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let array: [u8; EPHID_LENGTH] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidIdentifierLength(bytes.len()))?;
        Ok(Self(array))
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Short non-reversible tag for logs.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        short_fingerprint(&self.0)
    }
}

impl std::fmt::Debug for EphId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("EphId").field(&self.fingerprint()).finish()
    }
}

/// Hashed (identifier, epoch) observation, as stored by receivers
/// and inserted into tracing batches.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObservationHash([u8; HASH_LENGTH]);

impl ObservationHash {
    #[must_use]
    pub fn from_bytes(bytes: [u8; HASH_LENGTH]) -> Self {
        Self(bytes)
    }

    /// # Errors
    /// Returns `InvalidHashLength` unless `bytes` is exactly [`HASH_LENGTH`] long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let array: [u8; HASH_LENGTH] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidHashLength(bytes.len()))?;
        Ok(Self(array))
    }

    /// # Errors
    /// Returns error on bad hex or wrong length.
    pub fn from_hex(encoded: &str) -> Result<Self, CryptoError> {
        Self::from_slice(&hex::decode(encoded.trim())?)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for ObservationHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ObservationHash")
            .field(&short_fingerprint(&self.0))
            .finish()
    }
}

/// Generate a fresh seed from the operating system CSPRNG.
#[must_use]
pub fn generate_seed() -> Seed {
    generate_seed_with(&mut rand::rngs::OsRng)
}

/// Generate a fresh seed from the supplied cryptographic RNG.
pub fn generate_seed_with<R: RngCore + CryptoRng>(rng: &mut R) -> Seed {
    let mut bytes = [0u8; SEED_LENGTH];
    rng.fill_bytes(&mut bytes);
    let seed = Seed(bytes);
    bytes.zeroize();
    seed
}

/// Derive the broadcast identifier of `seed`.
#[must_use]
pub fn ephid_from_seed(seed: &Seed) -> EphId {
    let digest = Sha256::digest(seed.as_bytes());
    let mut ephid = [0u8; EPHID_LENGTH];
    ephid.copy_from_slice(&digest[..EPHID_LENGTH]);
    EphId(ephid)
}

/// Hash an overheard identifier together with the epoch it was heard in.
#[must_use]
pub fn hashed_observation_from_ephid(ephid: &EphId, epoch: Epoch) -> ObservationHash {
    let mut hasher = Sha256::new();
    hasher.update(ephid.as_bytes());
    hasher.update(epoch.to_be_bytes());
    ObservationHash(hasher.finalize().into())
}

/// Hash a reported seed for `epoch`.
///
/// Equal to [`hashed_observation_from_ephid`] of the seed's identifier.
#[must_use]
pub fn hashed_observation_from_seed(seed: &Seed, epoch: Epoch) -> ObservationHash {
    hashed_observation_from_ephid(&ephid_from_seed(seed), epoch)
}

/// First 8 bytes of `SHA-256(bytes)` as hex, for log correlation only.
fn short_fingerprint(bytes: &[u8]) -> String {
    hex::encode(&Sha256::digest(bytes)[..8])
}
