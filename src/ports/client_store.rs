//! Client store port: persistence of a device's own identities and of the
//! observations it has overheard.
//!
//! This trait abstracts the storage backend (SQLite) from the tracer logic.

use crate::domain::{EphId, Epoch, ObservationHash, Seed};

/// A device's own seed and identifier for one epoch.
#[derive(Debug, Clone)]
pub struct EpochIdentity {
    pub epoch: Epoch,
    pub seed: Seed,
    pub ephid: EphId,
}

/// Aggregate statistics of one observation hash over the retained days.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObservationDetails {
    /// Number of receptions
    pub count: u64,
    /// Mean received signal strength over those receptions
    pub mean_rssi: f64,
}

/// Trait for client-side storage operations.
///
/// Nothing stored here leaves the device, except seeds explicitly exported
/// in a contagious report.
pub trait ClientStore: Send + Sync {
    /// Error type for storage operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Time (seconds since the Unix epoch) the broadcast identifier last changed.
    ///
    /// Defaults to `EPOCH_START` on a fresh store.
    fn last_identity_change(&self) -> Result<i64, Self::Error>;

    /// Record the time the broadcast identifier changed.
    fn set_last_identity_change(&self, time: i64) -> Result<(), Self::Error>;

    /// Add the seed and identifier for one epoch.
    ///
    /// # Errors
    /// Returns error if the epoch already has an identity.
    fn add_epoch_ids(&self, identity: &EpochIdentity) -> Result<(), Self::Error>;

    /// Store identities for the epochs that have none yet.
    ///
    /// Epochs already provisioned keep their seed. All inserts run in one
    /// transaction, so concurrent callers never issue two seeds for an epoch.
    ///
    /// # Returns
    /// `true` if any row was inserted, `false` if every epoch already existed.
    fn provision_epoch_ids(&self, identities: &[EpochIdentity]) -> Result<bool, Self::Error>;

    /// Seeds for the half-open epoch range `[start, end)`, in epoch order.
    fn epoch_seeds(&self, start: Epoch, end: Epoch) -> Result<Vec<Seed>, Self::Error>;

    /// Identifier for `epoch`, or `None` when it was never provisioned.
    fn epoch_ephid(&self, epoch: Epoch) -> Result<Option<EphId>, Self::Error>;

    /// Delete identities of epochs before `last_retained_epoch`.
    ///
    /// # Returns
    /// Number of deleted rows.
    fn delete_past_epoch_ids(&self, last_retained_epoch: Epoch) -> Result<usize, Self::Error>;

    /// Record one reception of `hash` on `day`, aggregating with earlier ones.
    fn add_observation(&self, day: i64, hash: &ObservationHash, rssi: i64) -> Result<(), Self::Error>;

    /// Hashes observed on `last_retained_day` or later (one per day and hash).
    fn observations(&self, last_retained_day: i64) -> Result<Vec<ObservationHash>, Self::Error>;

    /// Count and mean signal strength of `hash` over the retained days.
    ///
    /// # Errors
    /// Returns a not-found error if `hash` was never observed.
    fn observation_details(&self, hash: &ObservationHash) -> Result<ObservationDetails, Self::Error>;

    /// Delete observations of days before `last_retained_day`.
    ///
    /// # Returns
    /// Number of deleted rows.
    fn delete_past_observations(&self, last_retained_day: i64) -> Result<usize, Self::Error>;
}
