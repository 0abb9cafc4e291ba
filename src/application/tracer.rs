//! Contact tracer: the device-side protocol state machine.
//!
//! The tracer tracks one "current day". Advancing the day provisions the
//! new day's identities (transmitter role) and prunes data that left the
//! retention window (both roles). All external times are passed in by the
//! caller, so the state machine never reads the wall clock itself.
//!
//! Exporting seeds for epochs after the current time would hand the server
//! identifiers the device has not broadcast yet. The tracer has no notion
//! of "now", so callers of [`ContactTracer::export_report`] enforce that.

use std::ops::RangeInclusive;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::application::TracingBatch;
use crate::domain::epoch::{retention_cutoff_day, retention_cutoff_epoch};
use crate::domain::{
    day_timestamp, ephid_from_seed, epoch_from_time, generate_seed,
    hashed_observation_from_ephid, should_advance_day, ContagiousReport, EphId, Epoch,
    ObservationHash, Seed, NUM_EPOCHS_PER_DAY,
};
use crate::ports::{ClientStore, EpochIdentity, ObservationDetails, ProbabilisticSet};
use crate::{store_err, Result, StorageError, TracingError};

/// Which housekeeping a tracer performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TracerRoles {
    /// Keeps observations and prunes old ones
    pub receiver: bool,
    /// Provisions identities and prunes old ones
    pub transmitter: bool,
}

impl TracerRoles {
    pub const BOTH: Self = Self {
        receiver: true,
        transmitter: true,
    };
    pub const RECEIVER: Self = Self {
        receiver: true,
        transmitter: false,
    };
    pub const TRANSMITTER: Self = Self {
        receiver: false,
        transmitter: true,
    };
    /// Read-only access (report export, exposure checks).
    pub const NONE: Self = Self {
        receiver: false,
        transmitter: false,
    };
}

/// Device-side contact tracer over an injected [`ClientStore`].
pub struct ContactTracer<S> {
    store: Arc<S>,
    start_of_today: DateTime<Utc>,
    roles: TracerRoles,
}

impl<S> ContactTracer<S>
where
    S: ClientStore,
    S::Error: Into<StorageError>,
{
    /// Create a tracer whose first day begins at `start_time`.
    ///
    /// With the transmitter role, the day's identities are provisioned
    /// immediately (idempotently).
    ///
    /// # Errors
    /// Returns error if provisioning fails.
    pub fn new(store: Arc<S>, start_time: DateTime<Utc>, roles: TracerRoles) -> Result<Self> {
        let tracer = Self {
            store,
            start_of_today: start_time,
            roles,
        };
        tracer.create_new_day_ephids()?;
        Ok(tracer)
    }

    /// Create a tracer whose first day is the UTC day containing `now`.
    ///
    /// # Errors
    /// Returns error if provisioning fails.
    pub fn starting_on(store: Arc<S>, now: DateTime<Utc>, roles: TracerRoles) -> Result<Self> {
        let midnight = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map_or(now, |t| t.and_utc());
        Self::new(store, midnight, roles)
    }

    /// The tracked day.
    #[must_use]
    pub fn today(&self) -> NaiveDate {
        self.start_of_today.date_naive()
    }

    /// Start of the tracked day.
    #[must_use]
    pub fn start_of_today(&self) -> DateTime<Utc> {
        self.start_of_today
    }

    #[must_use]
    pub fn roles(&self) -> TracerRoles {
        self.roles
    }

    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Provision `NUM_EPOCHS_PER_DAY` fresh identities for the tracked day.
    fn create_new_day_ephids(&self) -> Result<()> {
        if !self.roles.transmitter {
            return Ok(());
        }

        let first_epoch = epoch_from_time(self.start_of_today);
        let identities: Vec<EpochIdentity> = (0..NUM_EPOCHS_PER_DAY)
            .map(|offset| {
                let seed = generate_seed();
                let ephid = ephid_from_seed(&seed);
                EpochIdentity {
                    epoch: first_epoch + offset,
                    seed,
                    ephid,
                }
            })
            .collect();

        let created = self
            .store
            .provision_epoch_ids(&identities)
            .map_err(store_err)?;
        if created {
            tracing::info!(
                "Provisioned {NUM_EPOCHS_PER_DAY} identities for {} from epoch {first_epoch}",
                self.today()
            );
        } else {
            tracing::debug!("Identities for {} already provisioned", self.today());
        }
        Ok(())
    }

    /// Advance the tracked day while `now + safety_margin` lies beyond it.
    ///
    /// # Returns
    /// Number of days advanced.
    ///
    /// # Errors
    /// Returns the first failure of [`Self::advance_day`].
    pub fn check_advance_day(&mut self, now: DateTime<Utc>, safety_margin: Duration) -> Result<u32> {
        let mut advanced = 0;
        while should_advance_day(now, self.today(), safety_margin) {
            self.advance_day()?;
            advanced += 1;
        }
        Ok(advanced)
    }

    /// Move to the next day: provision its identities, then prune data
    /// that left the retention window.
    ///
    /// Failures are not retried here; pruning is idempotent, so the next
    /// advance repeats it.
    ///
    /// # Errors
    /// Returns error if provisioning or pruning fails.
    pub fn advance_day(&mut self) -> Result<()> {
        self.start_of_today += Duration::days(1);
        tracing::info!("Advanced to day {}", self.today());

        self.create_new_day_ephids()?;

        if self.roles.receiver {
            let last_retained_day = retention_cutoff_day(self.today());
            let deleted = self
                .store
                .delete_past_observations(last_retained_day)
                .map_err(store_err)?;
            tracing::debug!("Pruned {deleted} observation rows before {last_retained_day}");
        }

        if self.roles.transmitter {
            let last_retained_epoch = retention_cutoff_epoch(self.start_of_today);
            let deleted = self
                .store
                .delete_past_epoch_ids(last_retained_epoch)
                .map_err(store_err)?;
            tracing::debug!("Pruned {deleted} identity rows before epoch {last_retained_epoch}");
        }

        Ok(())
    }

    /// Identifier to broadcast at `time`.
    ///
    /// # Errors
    /// Returns `IdentityUnavailable` if the epoch was never provisioned.
    pub fn identifier_for_time(&self, time: DateTime<Utc>) -> Result<EphId> {
        let epoch = epoch_from_time(time);
        self.store
            .epoch_ephid(epoch)
            .map_err(store_err)?
            .ok_or(TracingError::IdentityUnavailable(epoch))
    }

    /// Record an overheard identifier. `time` must fall on the tracked day.
    ///
    /// # Errors
    /// Returns `InvalidObservationTime` for any other day.
    pub fn record_observation(&self, ephid: &EphId, time: DateTime<Utc>, rssi: i64) -> Result<()> {
        if time.date_naive() != self.today() {
            return Err(TracingError::InvalidObservationTime {
                time,
                today: self.today(),
            });
        }

        let hash = hashed_observation_from_ephid(ephid, epoch_from_time(time));
        self.store
            .add_observation(day_timestamp(self.today()), &hash, rssi)
            .map_err(store_err)
    }

    /// Seeds for every epoch of `epochs`, in order.
    ///
    /// # Errors
    /// Returns `EpochRangeUnavailable` if any epoch lacks a seed.
    pub fn tracing_seeds_for_epochs(&self, epochs: RangeInclusive<Epoch>) -> Result<Vec<Seed>> {
        let (first, last) = (*epochs.start(), *epochs.end());
        let seeds = self
            .store
            .epoch_seeds(first, last.saturating_add(1))
            .map_err(store_err)?;

        let expected = usize::try_from(last - first + 1).unwrap_or(usize::MAX);
        if seeds.len() != expected {
            return Err(TracingError::EpochRangeUnavailable { first, last });
        }
        Ok(seeds)
    }

    /// Export the seeds of the closed time range `[first_time, last_time]`
    /// for a contagious report. `last_time` defaults to the start of the
    /// tracked day.
    ///
    /// # Errors
    /// Returns `InvalidRange` if `last_time < first_time`, and
    /// `EpochRangeUnavailable` if any covered epoch lacks a seed.
    pub fn export_report(
        &self,
        first_time: DateTime<Utc>,
        last_time: Option<DateTime<Utc>>,
    ) -> Result<ContagiousReport> {
        let last_time = last_time.unwrap_or(self.start_of_today);
        if last_time < first_time {
            return Err(TracingError::InvalidRange {
                first: first_time,
                last: last_time,
            });
        }

        let epochs = epoch_from_time(first_time)..=epoch_from_time(last_time);
        let seeds = self.tracing_seeds_for_epochs(epochs.clone())?;
        tracing::info!("Exported {} seeds for a contagious report", seeds.len());
        Ok(ContagiousReport { epochs, seeds })
    }

    /// Count retained observations present in `batch`.
    ///
    /// Observations from days before the retention window are ignored even
    /// when no receiver has pruned them yet.
    ///
    /// # Errors
    /// Returns error if the observations cannot be read.
    pub fn evaluate_exposure<F: ProbabilisticSet>(&self, batch: &TracingBatch<F>) -> Result<usize> {
        let observations = self
            .store
            .observations(retention_cutoff_day(self.today()))
            .map_err(store_err)?;
        let matches = observations
            .iter()
            .filter(|hash| batch.contains(hash))
            .count();
        tracing::info!(
            "Checked {} observations against batch: {matches} matches",
            observations.len()
        );
        Ok(matches)
    }

    /// Aggregate count and mean signal of one observation hash.
    ///
    /// # Errors
    /// Returns a not-found storage error if the hash was never observed.
    pub fn observation_details(&self, hash: &ObservationHash) -> Result<ObservationDetails> {
        self.store.observation_details(hash).map_err(store_err)
    }

    /// Record that the broadcast identifier changed at `time`.
    ///
    /// # Errors
    /// Returns error if the store write fails.
    pub fn mark_identity_change(&self, time: DateTime<Utc>) -> Result<()> {
        self.store
            .set_last_identity_change(time.timestamp())
            .map_err(store_err)
    }
}
