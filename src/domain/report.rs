//! Contagious reports: what a device discloses on voluntary self-report,
//! and the JSON form in which it is submitted to the back end.

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use super::crypto::{CryptoError, Seed};
use super::epoch::Epoch;

/// Seeds of a contiguous epoch range, exported by a contagious device.
#[derive(Debug, Clone)]
pub struct ContagiousReport {
    /// Reported epochs (closed range)
    pub epochs: RangeInclusive<Epoch>,
    /// One seed per reported epoch, in epoch order
    pub seeds: Vec<Seed>,
}

impl ContagiousReport {
    /// Iterate over `(epoch, seed)` pairs.
    pub fn pairs(&self) -> impl Iterator<Item = (Epoch, &Seed)> {
        self.epochs.clone().zip(self.seeds.iter())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.seeds.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seeds.is_empty()
    }
}

/// One `{epoch, seed}` record of a submission.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReportRecord {
    pub epoch: Epoch,
    /// Hex-encoded seed
    pub seed: String,
}

impl std::fmt::Debug for ReportRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportRecord")
            .field("epoch", &self.epoch)
            .field("seed", &"[REDACTED]")
            .finish()
    }
}

/// Report submission body sent from a device to the health authority.
///
/// The authorization token is carried but not validated by this crate.
#[derive(Clone, Serialize, Deserialize)]
pub struct ReportSubmission {
    pub authorization: String,
    pub data: Vec<ReportRecord>,
}

impl ReportSubmission {
    /// Build the wire form of an exported report.
    #[must_use]
    pub fn from_report(report: &ContagiousReport, authorization: impl Into<String>) -> Self {
        Self {
            authorization: authorization.into(),
            data: report
                .pairs()
                .map(|(epoch, seed)| ReportRecord {
                    epoch,
                    seed: seed.to_hex(),
                })
                .collect(),
        }
    }

    /// Decode every record into `(epoch, seed)` pairs.
    ///
    /// # Errors
    /// Fails on the first record with a malformed seed.
    pub fn decode(&self) -> Result<Vec<(Epoch, Seed)>, CryptoError> {
        self.data
            .iter()
            .map(|rec| Ok((rec.epoch, Seed::from_hex(&rec.seed)?)))
            .collect()
    }
}

impl std::fmt::Debug for ReportSubmission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportSubmission")
            .field("has_authorization", &!self.authorization.is_empty())
            .field("records", &self.data.len())
            .finish()
    }
}
