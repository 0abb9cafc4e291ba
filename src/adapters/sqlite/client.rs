//! Client database: own identities per epoch and daily observations.

use std::path::Path;

use rusqlite::{params, OptionalExtension, TransactionBehavior};
use zeroize::Zeroizing;

use super::{Database, StorageError};
use crate::domain::{EphId, Epoch, ObservationHash, Seed, EPOCH_START};
use crate::ports::{ClientStore, EpochIdentity, ObservationDetails};

/// SQLite implementation of [`ClientStore`].
pub struct SqliteClientStore {
    db: Database,
}

impl SqliteClientStore {
    /// Open the client database at `path`, creating the schema if needed.
    ///
    /// # Errors
    /// Returns error if database cannot be opened or initialized.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let store = Self {
            db: Database::open(path)?,
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create a private in-memory database (one per logical device).
    ///
    /// # Errors
    /// Returns error if database cannot be created.
    pub fn in_memory() -> Result<Self, StorageError> {
        let store = Self {
            db: Database::in_memory()?,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StorageError> {
        let conn = self.db.lock()?;

        conn.execute_batch(
            r"
            CREATE TABLE IF NOT EXISTS state (
                singleton INTEGER PRIMARY KEY CHECK (singleton = 0),
                last_ephid_change INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS epoch_ids (
                epoch INTEGER PRIMARY KEY,
                seed BLOB NOT NULL,
                ephid BLOB NOT NULL
            );

            CREATE TABLE IF NOT EXISTS daily_observations (
                day INTEGER NOT NULL,
                ephid_hash BLOB NOT NULL,
                ocount INTEGER NOT NULL DEFAULT 1,
                srssi INTEGER NOT NULL,
                PRIMARY KEY (day, ephid_hash)
            );

            CREATE INDEX IF NOT EXISTS idx_daily_observations_day
                ON daily_observations(day);
            ",
        )?;

        conn.execute(
            "INSERT OR IGNORE INTO state (singleton, last_ephid_change) VALUES (0, ?1)",
            params![EPOCH_START],
        )?;

        Ok(())
    }
}

impl ClientStore for SqliteClientStore {
    type Error = StorageError;

    fn last_identity_change(&self) -> Result<i64, Self::Error> {
        let conn = self.db.lock()?;
        let time = conn.query_row(
            "SELECT last_ephid_change FROM state WHERE singleton = 0",
            [],
            |row| row.get(0),
        )?;
        Ok(time)
    }

    fn set_last_identity_change(&self, time: i64) -> Result<(), Self::Error> {
        let conn = self.db.lock()?;
        conn.execute(
            "UPDATE state SET last_ephid_change = ?1 WHERE singleton = 0",
            params![time],
        )?;
        Ok(())
    }

    fn add_epoch_ids(&self, identity: &EpochIdentity) -> Result<(), Self::Error> {
        let conn = self.db.lock()?;
        conn.execute(
            "INSERT INTO epoch_ids (epoch, seed, ephid) VALUES (?1, ?2, ?3)",
            params![
                identity.epoch,
                identity.seed.as_bytes(),
                identity.ephid.as_bytes()
            ],
        )?;
        Ok(())
    }

    fn provision_epoch_ids(&self, identities: &[EpochIdentity]) -> Result<bool, Self::Error> {
        if identities.is_empty() {
            return Ok(false);
        }

        let mut conn = self.db.lock()?;
        // IMMEDIATE takes the write lock up front, so two processes
        // provisioning overlapping ranges serialize here.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO epoch_ids (epoch, seed, ephid) VALUES (?1, ?2, ?3)",
            )?;
            for identity in identities {
                inserted += stmt.execute(params![
                    identity.epoch,
                    identity.seed.as_bytes(),
                    identity.ephid.as_bytes()
                ])?;
            }
        }

        tx.commit()?;
        Ok(inserted > 0)
    }

    fn epoch_seeds(&self, start: Epoch, end: Epoch) -> Result<Vec<Seed>, Self::Error> {
        if start >= end {
            return Ok(Vec::new());
        }

        let conn = self.db.lock()?;
        let mut stmt = conn.prepare(
            "SELECT seed FROM epoch_ids WHERE epoch >= ?1 AND epoch < ?2 ORDER BY epoch",
        )?;

        let raw = stmt
            .query_map(params![start, end], |row| {
                row.get::<_, Vec<u8>>(0).map(Zeroizing::new)
            })?
            .collect::<Result<Vec<_>, _>>()?;

        raw.iter()
            .map(|bytes| Seed::from_slice(bytes).map_err(|e| StorageError::Corrupt(e.to_string())))
            .collect()
    }

    fn epoch_ephid(&self, epoch: Epoch) -> Result<Option<EphId>, Self::Error> {
        let conn = self.db.lock()?;
        let raw: Option<Vec<u8>> = conn
            .query_row(
                "SELECT ephid FROM epoch_ids WHERE epoch = ?1",
                params![epoch],
                |row| row.get(0),
            )
            .optional()?;

        raw.map(|bytes| EphId::from_slice(&bytes).map_err(|e| StorageError::Corrupt(e.to_string())))
            .transpose()
    }

    fn delete_past_epoch_ids(&self, last_retained_epoch: Epoch) -> Result<usize, Self::Error> {
        let conn = self.db.lock()?;
        let deleted = conn.execute(
            "DELETE FROM epoch_ids WHERE epoch < ?1",
            params![last_retained_epoch],
        )?;
        Ok(deleted)
    }

    fn add_observation(&self, day: i64, hash: &ObservationHash, rssi: i64) -> Result<(), Self::Error> {
        let conn = self.db.lock()?;
        conn.execute(
            r"
            INSERT INTO daily_observations (day, ephid_hash, ocount, srssi)
            VALUES (?1, ?2, 1, ?3)
            ON CONFLICT (day, ephid_hash) DO UPDATE SET
                ocount = ocount + 1,
                srssi = srssi + excluded.srssi
            ",
            params![day, hash.as_bytes(), rssi],
        )?;
        Ok(())
    }

    fn observations(&self, last_retained_day: i64) -> Result<Vec<ObservationHash>, Self::Error> {
        let conn = self.db.lock()?;
        let mut stmt = conn.prepare("SELECT ephid_hash FROM daily_observations WHERE day >= ?1")?;

        let raw = stmt
            .query_map(params![last_retained_day], |row| row.get::<_, Vec<u8>>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        raw.iter()
            .map(|bytes| {
                ObservationHash::from_slice(bytes).map_err(|e| StorageError::Corrupt(e.to_string()))
            })
            .collect()
    }

    fn observation_details(&self, hash: &ObservationHash) -> Result<ObservationDetails, Self::Error> {
        let conn = self.db.lock()?;
        let (count, rssi_sum): (i64, i64) = conn.query_row(
            r"
            SELECT COALESCE(SUM(ocount), 0), COALESCE(SUM(srssi), 0)
            FROM daily_observations
            WHERE ephid_hash = ?1
            ",
            params![hash.as_bytes()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        if count <= 0 {
            return Err(StorageError::NotFound(format!("observation {hash:?}")));
        }

        Ok(ObservationDetails {
            count: count as u64,
            mean_rssi: rssi_sum as f64 / count as f64,
        })
    }

    fn delete_past_observations(&self, last_retained_day: i64) -> Result<usize, Self::Error> {
        let conn = self.db.lock()?;
        let deleted = conn.execute(
            "DELETE FROM daily_observations WHERE day < ?1",
            params![last_retained_day],
        )?;
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ephid_from_seed, generate_seed};

    fn identity(epoch: Epoch) -> EpochIdentity {
        let seed = generate_seed();
        let ephid = ephid_from_seed(&seed);
        EpochIdentity { epoch, seed, ephid }
    }

    fn hash(byte: u8) -> ObservationHash {
        ObservationHash::from_bytes([byte; 32])
    }

    #[test]
    fn test_last_identity_change() {
        let store = SqliteClientStore::in_memory().expect("Should create db");
        assert_eq!(store.last_identity_change().expect("Should read"), EPOCH_START);

        store.set_last_identity_change(42).expect("Should write");
        assert_eq!(store.last_identity_change().expect("Should read"), 42);

        store.set_last_identity_change(80).expect("Should write");
        assert_eq!(store.last_identity_change().expect("Should read"), 80);
    }

    #[test]
    fn test_epoch_ids_roundtrip() {
        let store = SqliteClientStore::in_memory().expect("Should create db");
        let id = identity(100);
        store.add_epoch_ids(&id).expect("Should add");

        assert_eq!(store.epoch_ephid(100).expect("Should get"), Some(id.ephid));
        assert_eq!(store.epoch_ephid(101).expect("Should get"), None);
        assert_eq!(store.epoch_seeds(100, 101).expect("Should get"), vec![id.seed]);
        assert!(store.epoch_seeds(100, 100).expect("Should get").is_empty());
    }

    #[test]
    fn test_duplicate_epoch_rejected() {
        let store = SqliteClientStore::in_memory().expect("Should create db");
        store.add_epoch_ids(&identity(7)).expect("Should add");
        assert!(store.add_epoch_ids(&identity(7)).is_err());
    }

    #[test]
    fn test_provision_is_idempotent() {
        let store = SqliteClientStore::in_memory().expect("Should create db");
        let day: Vec<_> = (0..96).map(identity).collect();
        let again: Vec<_> = (0..96).map(identity).collect();

        assert!(store.provision_epoch_ids(&day).expect("Should provision"));
        assert!(!store.provision_epoch_ids(&again).expect("Should skip"));

        let seeds = store.epoch_seeds(0, 96).expect("Should get");
        assert_eq!(seeds.len(), 96);
        assert_eq!(seeds[0], day[0].seed);
    }

    #[test]
    fn test_provision_fills_partial_overlap() {
        let store = SqliteClientStore::in_memory().expect("Should create db");
        let first: Vec<_> = (0..96).map(identity).collect();
        let overlapping: Vec<_> = (88..184).map(identity).collect();

        assert!(store.provision_epoch_ids(&first).expect("Should provision"));
        assert!(store.provision_epoch_ids(&overlapping).expect("Should provision rest"));

        assert_eq!(store.epoch_ephid(90).expect("Should get"), Some(first[90].ephid));
        assert_eq!(store.epoch_ephid(150).expect("Should get"), Some(overlapping[62].ephid));
        assert_eq!(store.epoch_seeds(0, 184).expect("Should get").len(), 184);
    }

    #[test]
    fn test_observations_skip_days_before_cutoff() {
        let store = SqliteClientStore::in_memory().expect("Should create db");
        store.add_observation(1000, &hash(1), -40).expect("Should add");
        store.add_observation(2000, &hash(2), -40).expect("Should add");

        assert_eq!(store.observations(1500).expect("Should list"), vec![hash(2)]);
        assert_eq!(store.observations(1000).expect("Should list").len(), 2);
        assert!(store.observations(2001).expect("Should list").is_empty());
    }

    #[test]
    fn test_delete_past_epoch_ids() {
        let store = SqliteClientStore::in_memory().expect("Should create db");
        for epoch in 0..10 {
            store.add_epoch_ids(&identity(epoch)).expect("Should add");
        }

        assert_eq!(store.delete_past_epoch_ids(5).expect("Should delete"), 5);
        assert!(store.epoch_seeds(0, 5).expect("Should get").is_empty());
        assert_eq!(store.epoch_seeds(5, 10).expect("Should get").len(), 5);
    }

    #[test]
    fn test_observation_aggregation() {
        let store = SqliteClientStore::in_memory().expect("Should create db");
        store.add_observation(1000, &hash(1), -40).expect("Should add");
        store.add_observation(1000, &hash(1), -60).expect("Should add");

        assert_eq!(store.observations(1000).expect("Should list"), vec![hash(1)]);
        let details = store.observation_details(&hash(1)).expect("Should exist");
        assert_eq!(details.count, 2);
        assert!((details.mean_rssi - -50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_observation_details_unknown_hash() {
        let store = SqliteClientStore::in_memory().expect("Should create db");
        assert!(matches!(
            store.observation_details(&hash(9)),
            Err(StorageError::NotFound(_))
        ));
    }

    #[test]
    fn test_delete_past_observations() {
        let store = SqliteClientStore::in_memory().expect("Should create db");
        store.add_observation(1000, &hash(1), 0).expect("Should add");
        store.add_observation(2000, &hash(2), 0).expect("Should add");

        assert_eq!(store.delete_past_observations(2000).expect("Should delete"), 1);
        assert_eq!(store.observations(0).expect("Should list"), vec![hash(2)]);
    }

    #[test]
    fn test_in_memory_stores_are_isolated() {
        let a = SqliteClientStore::in_memory().expect("Should create db");
        let b = SqliteClientStore::in_memory().expect("Should create db");
        a.add_epoch_ids(&identity(1)).expect("Should add");
        assert_eq!(b.epoch_ephid(1).expect("Should get"), None);
    }

    #[test]
    fn test_file_store_persists() {
        let dir = tempfile::tempdir().expect("Should create dir");
        let path = dir.path().join("client.db");
        let id = identity(3);
        {
            let store = SqliteClientStore::new(&path).expect("Should open");
            store.add_epoch_ids(&id).expect("Should add");
        }
        let store = SqliteClientStore::new(&path).expect("Should reopen");
        assert_eq!(store.epoch_ephid(3).expect("Should get"), Some(id.ephid));
    }
}
