//! # Epitrace
//!
//! Decentralized, privacy-preserving proximity tracing (unlinkable design).
//!
//! Devices broadcast a fresh identifier every epoch, derived from a secret
//! per-epoch seed, and record hashed observations of the identifiers they
//! overhear. A device that reports as contagious discloses only the seeds
//! of its contagious epochs; the back end publishes them as a compact
//! probabilistic set against which every other device checks its own
//! observations locally.
//!
//! ## Architecture
//!
//! The crate follows Hexagonal Architecture:
//! - `domain`: epoch arithmetic, seeds/identifiers/hashes, report types
//! - `ports`: trait definitions for stores, the filter structure, radio, clock
//! - `adapters`: concrete implementations (SQLite, Bloom filter, log sanitizer)
//! - `application`: contact tracer, tracing batch, report ingestion, daemons
//! - `config`, `logging`: process configuration and log setup for the binaries

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod logging;
pub mod ports;

use chrono::{DateTime, NaiveDate, Utc};

pub use adapters::StorageError;
pub use application::{ContactTracer, TracerRoles, TracingBatch};
pub use domain::{EphId, Epoch, ObservationHash, Seed};

/// Result type for tracing operations
pub type Result<T> = std::result::Result<T, TracingError>;

/// Coarse classification of failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input: ranges, observation days, report records
    Validation,
    /// Requested epoch, identifier or hash was never provisioned
    NotFound,
    /// Published filter or stored data cannot be decoded
    CorruptData,
    /// Store did not become available in time
    ResourceBusy,
    /// Radio or file I/O failed; the caller may retry
    TransientIo,
}

/// Main error type for tracing operations
#[derive(Debug, thiserror::Error)]
pub enum TracingError {
    #[error("Observation at {time} does not belong to the tracked day {today}")]
    InvalidObservationTime { time: DateTime<Utc>, today: NaiveDate },

    #[error("Invalid range: last time {last} precedes first time {first}")]
    InvalidRange {
        first: DateTime<Utc>,
        last: DateTime<Utc>,
    },

    #[error("Identifier for epoch {0} unavailable; advance the day first")]
    IdentityUnavailable(Epoch),

    #[error("Seeds for epochs {first}..={last} are not all available")]
    EpochRangeUnavailable { first: Epoch, last: Epoch },

    #[error("Corrupt filter: {0}")]
    CorruptFilter(String),

    #[error("Store busy")]
    StoreBusy,

    #[error("Storage operation failed: {0}")]
    Storage(StorageError),

    #[error("Invalid cryptographic material: {0}")]
    Crypto(#[from] domain::CryptoError),

    #[error("Radio error: {0}")]
    Radio(#[from] ports::RadioError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TracingError {
    /// Map the error onto its [`ErrorKind`].
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidObservationTime { .. }
            | Self::InvalidRange { .. }
            | Self::Crypto(_)
            | Self::Serialization(_) => ErrorKind::Validation,
            Self::IdentityUnavailable(_)
            | Self::EpochRangeUnavailable { .. }
            | Self::Storage(StorageError::NotFound(_)) => ErrorKind::NotFound,
            Self::CorruptFilter(_) | Self::Storage(_) => ErrorKind::CorruptData,
            Self::StoreBusy => ErrorKind::ResourceBusy,
            Self::Radio(_) | Self::Io(_) => ErrorKind::TransientIo,
        }
    }

    /// Whether the next scheduled tick may simply try again.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::ResourceBusy | ErrorKind::TransientIo)
    }
}

impl From<StorageError> for TracingError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Busy => Self::StoreBusy,
            other => Self::Storage(other),
        }
    }
}

impl From<ports::FilterError> for TracingError {
    fn from(err: ports::FilterError) -> Self {
        Self::CorruptFilter(err.to_string())
    }
}

/// Convert a port's storage error into a [`TracingError`].
pub(crate) fn store_err<E: Into<StorageError>>(err: E) -> TracingError {
    TracingError::from(err.into())
}
