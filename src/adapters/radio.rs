//! Dry-run radio: logs beacon changes instead of driving hardware.

use crate::domain::EphId;
use crate::ports::{BeaconRadio, RadioError};

/// Radio backend that only records and logs what it would transmit.
#[derive(Debug, Default)]
pub struct DryRunRadio {
    current: Option<EphId>,
    changes: u64,
}

impl DryRunRadio {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Identifier currently being advertised.
    #[must_use]
    pub fn current(&self) -> Option<EphId> {
        self.current
    }

    /// Number of identifier changes so far.
    #[must_use]
    pub fn changes(&self) -> u64 {
        self.changes
    }
}

impl BeaconRadio for DryRunRadio {
    fn advertise(&mut self, ephid: &EphId) -> Result<(), RadioError> {
        self.current = Some(*ephid);
        self.changes += 1;
        tracing::info!("(dry run) advertise identifier {}", ephid.fingerprint());
        Ok(())
    }

    fn stop(&mut self) -> Result<(), RadioError> {
        self.current = None;
        tracing::info!("(dry run) stop advertising");
        Ok(())
    }
}
