//! Probabilistic set port: the membership structure published in a
//! tracing batch.
//!
//! The protocol only relies on this narrow interface, so the concrete
//! structure can be swapped without touching the tracer.

/// Errors raised when reconstructing a published structure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FilterError {
    #[error("Filter body length mismatch: expected {expected} bytes for capacity {capacity}, got {actual}")]
    LengthMismatch {
        capacity: u64,
        expected: usize,
        actual: usize,
    },

    #[error("Unsupported filter capacity: {0}")]
    UnsupportedCapacity(u64),

    #[error("Invalid false-positive rate: {0}")]
    InvalidRate(f64),
}

/// Approximate set with no false negatives and a bounded false-positive rate.
pub trait ProbabilisticSet: Sized + Send + Sync {
    /// Create an empty set sized for `capacity` items at `false_positive_rate`.
    ///
    /// # Errors
    /// Returns error if the parameters cannot be represented.
    fn with_capacity(capacity: u64, false_positive_rate: f64) -> Result<Self, FilterError>;

    /// Number of body bytes a set of this capacity serializes to.
    ///
    /// # Errors
    /// Returns error if the parameters cannot be represented.
    fn body_len(capacity: u64, false_positive_rate: f64) -> Result<usize, FilterError>;

    /// Insert an item.
    fn insert(&mut self, item: &[u8]);

    /// Membership query. Never false for an inserted item.
    fn contains(&self, item: &[u8]) -> bool;

    /// Raw body bytes (without any header).
    fn as_bytes(&self) -> &[u8];

    /// Rebuild a set of `capacity` from its raw body bytes.
    ///
    /// # Errors
    /// Returns `LengthMismatch` if `bytes` does not fit `capacity`.
    fn from_bytes(capacity: u64, false_positive_rate: f64, bytes: Vec<u8>) -> Result<Self, FilterError>;
}
