//! Radio, scanner and clock ports used by the device daemons.
//!
//! Physical framing and transmission stay outside this crate.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::domain::EphId;

/// Errors reported by a radio backend. Callers may retry on the next tick.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RadioError {
    #[error("Radio command failed: {0}")]
    Command(String),

    #[error("Radio unavailable: {0}")]
    Unavailable(String),
}

/// Beacon transmitter backend.
pub trait BeaconRadio: Send {
    /// Start (or switch to) advertising `ephid`.
    fn advertise(&mut self, ephid: &EphId) -> Result<(), RadioError>;

    /// Stop advertising.
    fn stop(&mut self) -> Result<(), RadioError>;
}

/// One beacon heard by the scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceivedBeacon {
    pub ephid: EphId,
    /// Received signal strength (dBm)
    pub rssi: i64,
}

/// Outcome of waiting for a beacon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeaconPoll {
    Beacon(ReceivedBeacon),
    /// Nothing arrived within the timeout
    Idle,
    /// The source will produce no more beacons
    Closed,
}

/// Beacon scanner backend.
pub trait BeaconSource: Send {
    /// Wait up to `timeout` for the next beacon.
    fn poll(&mut self, timeout: Duration) -> Result<BeaconPoll, RadioError>;
}

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}
