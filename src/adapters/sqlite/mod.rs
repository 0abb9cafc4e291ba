//! SQLite adapters: Implementations of `ClientStore` and `ServerStore`.
//!
//! Every store instance owns its own connection, so independent devices
//! (or tests) never share state through a process-wide handle.
//!
//! # Concurrency
//!
//! Several daemons share one database file. Multi-step mutations run in
//! a single transaction; connections give up with [`StorageError::Busy`]
//! after [`BUSY_TIMEOUT`] instead of blocking indefinitely. File-backed
//! databases use the WAL journal so readers never block the writer.

mod client;
mod server;

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{Connection, ErrorCode};

pub use client::SqliteClientStore;
pub use server::SqliteServerStore;

/// How long a connection waits for a competing writer.
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(3);

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(rusqlite::Error),

    #[error("Database busy: no access within {BUSY_TIMEOUT:?}")]
    Busy,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Store lock poisoned")]
    LockPoisoned,
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(failure, _)
                if matches!(
                    failure.code,
                    ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
                ) =>
            {
                Self::Busy
            }
            _ => Self::Database(err),
        }
    }
}

/// A single guarded SQLite connection.
pub(crate) struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a file-backed database.
    pub(crate) fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "wal", |row| row.get(0))?;
        tracing::debug!("Opened database with journal mode {mode}");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create a private in-memory database.
    pub(crate) fn in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }
}

fn count_to_u64(count: i64) -> u64 {
    u64::try_from(count).unwrap_or_default()
}
