//! Adapters layer: Concrete implementations of ports.
//!
//! - `sqlite`: client and server stores
//! - `bloom`: probabilistic set published in tracing batches
//! - `sanitize`: redaction of tracing material in logs
//! - `radio`, `scanner`, `clock`: device-side backends

pub mod bloom;
pub mod clock;
pub mod radio;
pub mod sanitize;
pub mod scanner;
pub mod sqlite;

pub use bloom::BloomFilter;
pub use clock::SystemClock;
pub use radio::DryRunRadio;
pub use scanner::LineBeaconSource;
pub use sqlite::{SqliteClientStore, SqliteServerStore, StorageError};
