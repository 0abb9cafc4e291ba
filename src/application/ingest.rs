//! Back-end use cases: report ingestion and corpus retention.

use chrono::{DateTime, Duration, Utc};

use crate::domain::{ReportSubmission, RETENTION_PERIOD};
use crate::ports::ServerStore;
use crate::{store_err, Result, StorageError};

/// Add every record of `submission` to the server corpus.
///
/// All records are decoded before anything is written, and the rows are
/// inserted in one transaction: a malformed record rejects the whole
/// submission. The authorization token is not validated here.
///
/// # Returns
/// Number of stored `(epoch, seed)` rows.
///
/// # Errors
/// Returns error if a seed is malformed or the store write fails.
pub fn ingest_submission<S>(store: &S, submission: &ReportSubmission) -> Result<usize>
where
    S: ServerStore,
    S::Error: Into<StorageError>,
{
    let rows = submission.decode()?;
    let stored = store.add_epoch_seeds(&rows).map_err(store_err)?;

    tracing::info!(
        has_authorization = !submission.authorization.is_empty(),
        "Stored contagious report with {stored} epochs"
    );
    Ok(stored)
}

/// Drop reported rows older than the retention period, relative to `now`.
///
/// # Returns
/// Number of deleted rows.
///
/// # Errors
/// Returns error if the store delete fails.
pub fn prune_expired_reports<S>(store: &S, now: DateTime<Utc>) -> Result<usize>
where
    S: ServerStore,
    S::Error: Into<StorageError>,
{
    let last_retained = now
        .checked_sub_signed(Duration::days(RETENTION_PERIOD))
        .unwrap_or(now);
    store.delete_expired_data(last_retained).map_err(store_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::SqliteServerStore;
    use crate::domain::{epoch_from_time, ReportRecord, Seed};
    use crate::ErrorKind;
    use chrono::TimeZone;

    fn record(epoch: i64, byte: u8) -> ReportRecord {
        ReportRecord {
            epoch,
            seed: hex::encode([byte; 32]),
        }
    }

    #[test]
    fn test_ingest_stores_all_records() {
        let store = SqliteServerStore::in_memory().expect("Should create db");
        let submission = ReportSubmission {
            authorization: "code".into(),
            data: vec![record(5, 1), record(6, 2)],
        };

        assert_eq!(ingest_submission(&store, &submission).expect("Should ingest"), 2);
        assert_eq!(store.count_epoch_seeds().expect("Should count"), 2);
    }

    #[test]
    fn test_ingest_rejects_whole_submission_on_bad_seed() {
        let store = SqliteServerStore::in_memory().expect("Should create db");
        let mut bad = record(6, 2);
        bad.seed = "not-hex".into();
        let submission = ReportSubmission {
            authorization: String::new(),
            data: vec![record(5, 1), bad],
        };

        let err = ingest_submission(&store, &submission).expect_err("Should fail");
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(store.count_epoch_seeds().expect("Should count"), 0);
    }

    #[test]
    fn test_ingest_from_json() {
        let store = SqliteServerStore::in_memory().expect("Should create db");
        let json = format!(
            r#"{{"authorization":"x","data":[{{"epoch":2650000,"seed":"{}"}}]}}"#,
            hex::encode([7u8; 32])
        );
        let submission: ReportSubmission = serde_json::from_str(&json).expect("Should parse");

        ingest_submission(&store, &submission).expect("Should ingest");
        let rows = store
            .scan_epoch_seeds(|_, rows| rows.collect::<std::result::Result<Vec<_>, _>>())
            .expect("Should scan")
            .expect("Should decode");
        assert_eq!(rows, vec![(2_650_000, Seed::from_bytes([7; 32]))]);
    }

    #[test]
    fn test_prune_expired_reports() {
        let now = Utc.with_ymd_and_hms(2020, 5, 10, 12, 0, 0).single().expect("Valid time");
        let old = now - Duration::days(RETENTION_PERIOD) - Duration::hours(1);
        let recent = now - Duration::days(1);

        let store = SqliteServerStore::in_memory().expect("Should create db");
        store
            .add_epoch_seeds(&[
                (epoch_from_time(old), Seed::from_bytes([1; 32])),
                (epoch_from_time(recent), Seed::from_bytes([2; 32])),
            ])
            .expect("Should add");

        assert_eq!(prune_expired_reports(&store, now).expect("Should prune"), 1);
        assert_eq!(store.count_epoch_seeds().expect("Should count"), 1);
    }
}
