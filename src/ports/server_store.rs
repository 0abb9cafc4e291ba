//! Server store port: the health authority's corpus of reported seeds.

use chrono::{DateTime, Utc};

use crate::domain::{Epoch, Seed};

/// Streamed `(epoch, seed)` rows of the server corpus.
pub type EpochSeedRows<'a, E> = &'a mut dyn Iterator<Item = Result<(Epoch, Seed), E>>;

/// Trait for server-side storage of contagious reports.
pub trait ServerStore: Send + Sync {
    /// Error type for storage operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Append one reported `(epoch, seed)` pair.
    fn add_epoch_seed(&self, epoch: Epoch, seed: &Seed) -> Result<(), Self::Error>;

    /// Append a whole report in one transaction.
    ///
    /// # Returns
    /// Number of inserted rows.
    fn add_epoch_seeds(&self, rows: &[(Epoch, Seed)]) -> Result<usize, Self::Error>;

    /// Number of stored rows.
    fn count_epoch_seeds(&self) -> Result<u64, Self::Error>;

    /// Stream every stored row to `visit` without materializing the corpus.
    ///
    /// `visit` receives the row count and a lazy iterator, both taken from
    /// the same read snapshot.
    fn scan_epoch_seeds<R, F>(&self, visit: F) -> Result<R, Self::Error>
    where
        F: FnOnce(u64, EpochSeedRows<'_, Self::Error>) -> R;

    /// Delete rows of epochs before the epoch containing `last_retained_time`.
    ///
    /// # Returns
    /// Number of deleted rows.
    fn delete_expired_data(&self, last_retained_time: DateTime<Utc>) -> Result<usize, Self::Error>;
}
