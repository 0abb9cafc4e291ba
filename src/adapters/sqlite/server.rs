//! Server database: `(epoch, seed)` pairs reported by contagious users.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, TransactionBehavior};

use super::{count_to_u64, Database, StorageError};
use crate::domain::{epoch_from_time, Epoch, Seed};
use crate::ports::{EpochSeedRows, ServerStore};

/// SQLite implementation of [`ServerStore`].
pub struct SqliteServerStore {
    db: Database,
}

impl SqliteServerStore {
    /// Open the server database at `path`, creating the schema if needed.
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

    /// Create a private in-memory database.
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
            CREATE TABLE IF NOT EXISTS contagious_ids (
                id INTEGER PRIMARY KEY,
                epoch INTEGER NOT NULL,
                seed BLOB NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_contagious_ids_epoch
                ON contagious_ids(epoch);
            ",
        )?;
        Ok(())
    }
}

impl ServerStore for SqliteServerStore {
    type Error = StorageError;

    fn add_epoch_seed(&self, epoch: Epoch, seed: &Seed) -> Result<(), Self::Error> {
        let conn = self.db.lock()?;
        conn.execute(
            "INSERT INTO contagious_ids (epoch, seed) VALUES (?1, ?2)",
            params![epoch, seed.as_bytes()],
        )?;
        Ok(())
    }

    fn add_epoch_seeds(&self, rows: &[(Epoch, Seed)]) -> Result<usize, Self::Error> {
        let mut conn = self.db.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        {
            let mut stmt = tx.prepare("INSERT INTO contagious_ids (epoch, seed) VALUES (?1, ?2)")?;
            for (epoch, seed) in rows {
                stmt.execute(params![epoch, seed.as_bytes()])?;
            }
        }
        tx.commit()?;
        Ok(rows.len())
    }

    fn count_epoch_seeds(&self) -> Result<u64, Self::Error> {
        let conn = self.db.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM contagious_ids", [], |row| row.get(0))?;
        Ok(count_to_u64(count))
    }

    fn scan_epoch_seeds<R, F>(&self, visit: F) -> Result<R, Self::Error>
    where
        F: FnOnce(u64, EpochSeedRows<'_, Self::Error>) -> R,
    {
        let mut conn = self.db.lock()?;
        // One read transaction so the count and the rows come from the same snapshot.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;
        let count: i64 = tx.query_row("SELECT COUNT(*) FROM contagious_ids", [], |row| row.get(0))?;

        let mut stmt = tx.prepare("SELECT epoch, seed FROM contagious_ids ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, Epoch>(0)?, row.get::<_, Vec<u8>>(1)?))
        })?;
        let mut decoded = rows.map(|row| -> Result<(Epoch, Seed), StorageError> {
            let (epoch, bytes) = row?;
            let seed = Seed::from_slice(&bytes).map_err(|e| StorageError::Corrupt(e.to_string()))?;
            Ok((epoch, seed))
        });

        let result = visit(count_to_u64(count), &mut decoded);

        drop(decoded);
        drop(stmt);
        tx.commit()?;
        Ok(result)
    }

    fn delete_expired_data(&self, last_retained_time: DateTime<Utc>) -> Result<usize, Self::Error> {
        let last_retained_epoch = epoch_from_time(last_retained_time);
        let conn = self.db.lock()?;
        let deleted = conn.execute(
            "DELETE FROM contagious_ids WHERE epoch < ?1",
            params![last_retained_epoch],
        )?;
        tracing::info!(
            "Deleted {deleted} expired report rows before epoch {last_retained_epoch}"
        );
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn seed(byte: u8) -> Seed {
        Seed::from_bytes([byte; 32])
    }

    fn collect(store: &SqliteServerStore) -> Vec<(Epoch, Seed)> {
        store
            .scan_epoch_seeds(|_, rows| rows.collect::<Result<Vec<_>, _>>())
            .expect("Should scan")
            .expect("Should decode")
    }

    #[test]
    fn test_scan_empty() {
        let store = SqliteServerStore::in_memory().expect("Should create db");
        let (count, rows) = store
            .scan_epoch_seeds(|count, rows| (count, rows.count()))
            .expect("Should scan");
        assert_eq!((count, rows), (0, 0));
    }

    #[test]
    fn test_add_and_scan_in_insertion_order() {
        let store = SqliteServerStore::in_memory().expect("Should create db");
        for i in 1..10u8 {
            store.add_epoch_seed(Epoch::from(i), &seed(i)).expect("Should add");
        }

        let rows = collect(&store);
        assert_eq!(rows.len(), 9);
        for (i, (epoch, s)) in rows.iter().enumerate() {
            assert_eq!(*epoch, i as Epoch + 1);
            assert_eq!(*s, seed(i as u8 + 1));
        }
        assert_eq!(store.count_epoch_seeds().expect("Should count"), 9);
    }

    #[test]
    fn test_batch_insert() {
        let store = SqliteServerStore::in_memory().expect("Should create db");
        let rows = vec![(1, seed(1)), (2, seed(2))];
        assert_eq!(store.add_epoch_seeds(&rows).expect("Should add"), 2);
        assert_eq!(collect(&store), rows);
    }

    #[test]
    fn test_delete_expired_data() {
        let time_out = Utc.with_ymd_and_hms(2020, 4, 25, 20, 59, 0).single().expect("Valid time");
        let time_in = Utc.with_ymd_and_hms(2020, 4, 25, 21, 1, 0).single().expect("Valid time");
        let cutoff = Utc.with_ymd_and_hms(2020, 4, 25, 21, 0, 0).single().expect("Valid time");

        let store = SqliteServerStore::in_memory().expect("Should create db");
        store.add_epoch_seed(epoch_from_time(time_out), &seed(1)).expect("Should add");
        store.add_epoch_seed(epoch_from_time(time_in), &seed(2)).expect("Should add");
        assert_eq!(store.count_epoch_seeds().expect("Should count"), 2);

        assert_eq!(store.delete_expired_data(cutoff).expect("Should delete"), 1);
        assert_eq!(collect(&store), vec![(epoch_from_time(time_in), seed(2))]);
    }

    #[test]
    fn test_corrupt_seed_surfaces() {
        let store = SqliteServerStore::in_memory().expect("Should create db");
        {
            let conn = store.db.lock().expect("Should lock");
            conn.execute(
                "INSERT INTO contagious_ids (epoch, seed) VALUES (1, x'0102')",
                [],
            )
            .expect("Should insert");
        }
        let result = store
            .scan_epoch_seeds(|_, rows| rows.collect::<Result<Vec<_>, _>>())
            .expect("Should scan");
        assert!(matches!(result, Err(StorageError::Corrupt(_))));
    }
}
