//! Device daemons: the transmitter and receiver loops.

use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};

use crate::application::ContactTracer;
use crate::domain::EphId;
use crate::ports::{BeaconPoll, BeaconRadio, BeaconSource, ClientStore, Clock};
use crate::{ErrorKind, Result, StorageError};

/// Signal strength above which a beacon counts as a close contact.
pub const CLOSE_CONTACT_RSSI: i64 = -50;

/// Sleep that a termination signal can cut short.
///
/// Once interrupted it stays signaled: later sleeps return immediately.
#[derive(Debug, Default)]
pub struct InterruptibleSleep {
    signaled: Mutex<bool>,
    wakeup: Condvar,
}

impl InterruptibleSleep {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep for `duration` or until interrupted.
    ///
    /// # Returns
    /// Whether the sleeper has been signaled.
    pub fn sleep(&self, duration: StdDuration) -> bool {
        let guard = self.signaled.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = self
            .wakeup
            .wait_timeout_while(guard, duration, |signaled| !*signaled)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }

    /// Wake every sleeper and mark the sleeper signaled.
    pub fn interrupt(&self) {
        let mut signaled = self.signaled.lock().unwrap_or_else(PoisonError::into_inner);
        *signaled = true;
        self.wakeup.notify_all();
    }

    #[must_use]
    pub fn signaled(&self) -> bool {
        *self.signaled.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Advertises the current epoch's identifier, rotating it as epochs pass.
pub struct Transmitter<S, R> {
    tracer: ContactTracer<S>,
    radio: R,
    current: Option<EphId>,
    poll_interval: StdDuration,
}

impl<S, R> Transmitter<S, R>
where
    S: ClientStore,
    S::Error: Into<StorageError>,
    R: BeaconRadio,
{
    pub fn new(tracer: ContactTracer<S>, radio: R, poll_interval: StdDuration) -> Self {
        Self {
            tracer,
            radio,
            current: None,
            poll_interval,
        }
    }

    #[must_use]
    pub fn tracer(&self) -> &ContactTracer<S> {
        &self.tracer
    }

    #[must_use]
    pub fn radio(&self) -> &R {
        &self.radio
    }

    /// One poll: advance the day if the next poll could cross midnight,
    /// then switch the beacon if the epoch's identifier changed.
    ///
    /// # Returns
    /// Whether the advertised identifier changed.
    ///
    /// # Errors
    /// Returns error if provisioning, lookup or the radio fails.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Result<bool> {
        let margin = Duration::from_std(self.poll_interval).unwrap_or_else(|_| Duration::zero());
        self.tracer.check_advance_day(now, margin)?;

        let ephid = self.tracer.identifier_for_time(now)?;
        if self.current == Some(ephid) {
            return Ok(false);
        }

        self.radio.advertise(&ephid)?;
        self.tracer.mark_identity_change(now)?;
        self.current = Some(ephid);
        tracing::debug!("Switched beacon to identifier {}", ephid.fingerprint());
        Ok(true)
    }

    /// Poll until `sleeper` is signaled, then stop the radio.
    ///
    /// Busy stores and radio failures are logged and retried on the next
    /// poll; other errors end the loop.
    ///
    /// # Errors
    /// Returns the first non-retryable error.
    pub fn run<C: Clock>(&mut self, clock: &C, sleeper: &InterruptibleSleep) -> Result<()> {
        tracing::info!(
            "Transmitter running, polling every {}s",
            self.poll_interval.as_secs()
        );

        while !sleeper.signaled() {
            match self.tick(clock.now()) {
                Ok(_) => {}
                Err(e) if e.is_retryable() => tracing::warn!("Transmitter tick failed: {e}"),
                Err(e) => {
                    if let Err(stop_err) = self.radio.stop() {
                        tracing::warn!("Failed to stop radio: {stop_err}");
                    }
                    return Err(e);
                }
            }
            if sleeper.sleep(self.poll_interval) {
                break;
            }
        }

        self.radio.stop()?;
        tracing::info!("Transmitter stopped");
        Ok(())
    }
}

/// Records overheard beacons.
pub struct Receiver<S> {
    tracer: ContactTracer<S>,
}

impl<S> Receiver<S>
where
    S: ClientStore,
    S::Error: Into<StorageError>,
{
    pub fn new(tracer: ContactTracer<S>) -> Self {
        Self { tracer }
    }

    #[must_use]
    pub fn tracer(&self) -> &ContactTracer<S> {
        &self.tracer
    }

    /// Handle one received beacon.
    ///
    /// # Returns
    /// Whether the beacon counts as a close contact.
    ///
    /// # Errors
    /// Returns error if the day cannot be advanced or the store write fails.
    pub fn on_beacon(&mut self, ephid: &EphId, rssi: i64, now: DateTime<Utc>) -> Result<bool> {
        self.tracer.check_advance_day(now, Duration::zero())?;
        self.tracer.record_observation(ephid, now, rssi)?;

        let close = rssi > CLOSE_CONTACT_RSSI;
        if close {
            tracing::debug!("Close contact: identifier {} at {rssi} dBm", ephid.fingerprint());
        }
        Ok(close)
    }

    /// Record beacons from `source` until `sleeper` is signaled or the
    /// source closes. Each poll waits at most `poll_interval`; idle polls
    /// still advance the day so old observations get pruned.
    ///
    /// Busy stores, scanner failures and beacons stamped outside the
    /// tracked day are logged and skipped; other errors end the loop.
    ///
    /// # Errors
    /// Returns the first non-retryable error.
    pub fn run<B, C>(
        &mut self,
        source: &mut B,
        clock: &C,
        sleeper: &InterruptibleSleep,
        poll_interval: StdDuration,
    ) -> Result<()>
    where
        B: BeaconSource,
        C: Clock,
    {
        tracing::info!("Receiver running");

        while !sleeper.signaled() {
            let handled = match source.poll(poll_interval) {
                Ok(BeaconPoll::Beacon(beacon)) => self
                    .on_beacon(&beacon.ephid, beacon.rssi, clock.now())
                    .map(|_| ()),
                Ok(BeaconPoll::Idle) => self
                    .tracer
                    .check_advance_day(clock.now(), Duration::zero())
                    .map(|_| ()),
                Ok(BeaconPoll::Closed) => {
                    tracing::info!("Beacon source closed");
                    break;
                }
                Err(e) => Err(e.into()),
            };

            match handled {
                Ok(()) => {}
                Err(e) if e.is_retryable() || e.kind() == ErrorKind::Validation => {
                    tracing::warn!("Receiver skipped a beacon: {e}");
                }
                Err(e) => return Err(e),
            }
        }

        tracing::info!("Receiver stopped");
        Ok(())
    }
}
