//! Ports layer: Trait definitions for external operations.
//!
//! These traits define the boundaries between the tracing protocol and
//! external systems (SQLite stores, filter structure, radio, scanner, clock).

mod beacon;
mod client_store;
mod filter;
mod server_store;

pub use beacon::{BeaconPoll, BeaconRadio, BeaconSource, Clock, RadioError, ReceivedBeacon};
pub use client_store::{ClientStore, EpochIdentity, ObservationDetails};
pub use filter::{FilterError, ProbabilisticSet};
pub use server_store::{EpochSeedRows, ServerStore};
