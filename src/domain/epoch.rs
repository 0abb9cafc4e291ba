//! Epoch clock: pure time and epoch arithmetic.
//!
//! All times are UTC. An epoch is a fixed-length slot counted from
//! [`EPOCH_START`]; a device uses exactly one (seed, identifier) pair per epoch.

use chrono::{DateTime, Duration, NaiveDate, Utc};

/// Epoch counter type.
pub type Epoch = i64;

/// Length of one epoch in seconds (15 minutes).
pub const EPOCH_LENGTH: i64 = 15 * 60;

/// Number of epochs provisioned at the start of every day.
pub const NUM_EPOCHS_PER_DAY: i64 = 24 * 60 * 60 / EPOCH_LENGTH;

/// Days for which seeds, reports and observations are kept.
pub const RETENTION_PERIOD: i64 = 14;

/// Reference time (seconds since the Unix epoch) of epoch zero.
pub const EPOCH_START: i64 = 0;

/// Return the epoch containing `time`.
///
/// Total and monotonic: times before [`EPOCH_START`] map to negative epochs.
#[must_use]
pub fn epoch_from_time(time: DateTime<Utc>) -> Epoch {
    (time.timestamp() - EPOCH_START).div_euclid(EPOCH_LENGTH)
}

/// Return the time at which `epoch` begins.
#[must_use]
pub fn epoch_start_time(epoch: Epoch) -> Option<DateTime<Utc>> {
    let secs = epoch.checked_mul(EPOCH_LENGTH)?.checked_add(EPOCH_START)?;
    DateTime::from_timestamp(secs, 0)
}

/// Unix timestamp of the midnight that begins `date`.
///
/// Used as the retention key of daily observation rows.
#[must_use]
pub fn day_timestamp(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|midnight| midnight.and_utc().timestamp())
        .unwrap_or_default()
}

/// Decide whether the tracked day must be advanced.
///
/// Returns true when `now + safety_margin` falls on a calendar day after
/// `tracked_day`. A margin of one polling interval makes a caller that
/// sleeps across midnight wake up with the next day already provisioned.
#[must_use]
pub fn should_advance_day(now: DateTime<Utc>, tracked_day: NaiveDate, safety_margin: Duration) -> bool {
    let lookahead = now.checked_add_signed(safety_margin).unwrap_or(now);
    lookahead.date_naive() > tracked_day
}

/// First epoch still retained when the current day begins at `start_of_today`.
#[must_use]
pub fn retention_cutoff_epoch(start_of_today: DateTime<Utc>) -> Epoch {
    let cutoff = start_of_today
        .checked_sub_signed(Duration::days(RETENTION_PERIOD))
        .unwrap_or(start_of_today);
    epoch_from_time(cutoff)
}

/// First day (as a [`day_timestamp`]) still retained on `today`.
#[must_use]
pub fn retention_cutoff_day(today: NaiveDate) -> i64 {
    let cutoff = today
        .checked_sub_signed(Duration::days(RETENTION_PERIOD))
        .unwrap_or(today);
    day_timestamp(cutoff)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).single().expect("Valid time")
    }

    #[test]
    fn test_epochs_per_day() {
        assert_eq!(NUM_EPOCHS_PER_DAY, 96);
    }

    #[test]
    fn test_epoch_step() {
        let base = at(2020, 4, 25, 22, 0);
        let e = epoch_from_time(base);
        assert_eq!(epoch_from_time(base + Duration::seconds(EPOCH_LENGTH - 1)), e);
        assert_eq!(epoch_from_time(base + Duration::seconds(EPOCH_LENGTH)), e + 1);
        assert_eq!(epoch_start_time(e), Some(base));
    }

    #[test]
    fn test_epoch_before_start_is_negative() {
        let before = DateTime::from_timestamp(EPOCH_START - 1, 0).expect("Valid time");
        assert_eq!(epoch_from_time(before), -1);
    }

    #[test]
    fn test_day_timestamp() {
        let date = NaiveDate::from_ymd_opt(2020, 4, 25).expect("Valid date");
        assert_eq!(day_timestamp(date), at(2020, 4, 25, 0, 0).timestamp());
    }

    #[test]
    fn test_should_advance_day() {
        let today = NaiveDate::from_ymd_opt(2020, 4, 25).expect("Valid date");
        let late = at(2020, 4, 25, 23, 59);

        assert!(!should_advance_day(late, today, Duration::zero()));
        assert!(should_advance_day(late, today, Duration::minutes(2)));
        assert!(should_advance_day(at(2020, 4, 26, 0, 0), today, Duration::zero()));
        assert!(!should_advance_day(at(2020, 4, 24, 23, 59), today, Duration::minutes(2)));
    }

    #[test]
    fn test_retention_cutoffs() {
        let start = at(2020, 5, 15, 0, 0);
        assert_eq!(retention_cutoff_epoch(start), epoch_from_time(at(2020, 5, 1, 0, 0)));
        assert_eq!(
            retention_cutoff_day(start.date_naive()),
            at(2020, 5, 1, 0, 0).timestamp()
        );
    }
}
