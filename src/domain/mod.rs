//! Domain layer: protocol types, epoch arithmetic and cryptography.
//!
//! Pure code with no I/O. Everything that touches storage or the clock
//! lives behind the ports.

pub mod crypto;
pub mod epoch;
mod report;

pub use crypto::{
    ephid_from_seed, generate_seed, generate_seed_with, hashed_observation_from_ephid,
    hashed_observation_from_seed, CryptoError, EphId, ObservationHash, Seed,
    FALSE_POSITIVE_RATE,
};
pub use epoch::{
    day_timestamp, epoch_from_time, should_advance_day, Epoch, EPOCH_LENGTH, EPOCH_START,
    NUM_EPOCHS_PER_DAY, RETENTION_PERIOD,
};
pub use report::{ContagiousReport, ReportRecord, ReportSubmission};
