//! Tracing batch: the published membership structure of reported
//! observation hashes.
//!
//! File format: an 8-byte big-endian capacity header followed by the
//! body of a [`ProbabilisticSet`] sized for that capacity at
//! [`FALSE_POSITIVE_RATE`]. The body length is fully determined by the
//! header, so a reader validates it before allocating.

use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind as IoErrorKind, Read, Write};
use std::path::Path;

use crate::adapters::BloomFilter;
use crate::domain::{
    hashed_observation_from_seed, ContagiousReport, Epoch, ObservationHash, Seed,
    FALSE_POSITIVE_RATE,
};
use crate::ports::{EpochSeedRows, ProbabilisticSet, ServerStore};
use crate::{store_err, Result, StorageError, TracingError};

/// Length of the capacity header.
const HEADER_LEN: usize = 8;

/// Capacity for `report_count` items: 20% headroom, rounded up.
#[must_use]
pub fn capacity_for(report_count: u64) -> u64 {
    report_count.saturating_mul(6).saturating_add(4) / 5
}

/// Probabilistic set of hashed observations derived from reported seeds.
#[derive(Debug, Clone)]
pub struct TracingBatch<F = BloomFilter> {
    capacity: u64,
    filter: F,
}

impl<F: ProbabilisticSet> TracingBatch<F> {
    fn empty(report_count: u64) -> Result<Self> {
        let capacity = capacity_for(report_count);
        Ok(Self {
            capacity,
            filter: F::with_capacity(capacity, FALSE_POSITIVE_RATE)?,
        })
    }

    fn insert(&mut self, epoch: Epoch, seed: &Seed) {
        let hash = hashed_observation_from_seed(seed, epoch);
        self.filter.insert(hash.as_bytes());
    }

    /// Build a batch from `report_count` reported `(epoch, seed)` pairs.
    ///
    /// # Errors
    /// Returns error if a filter of that capacity cannot be allocated.
    pub fn from_epoch_seeds<'a, I>(report_count: u64, pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (Epoch, &'a Seed)>,
    {
        let mut batch = Self::empty(report_count)?;
        for (epoch, seed) in pairs {
            batch.insert(epoch, seed);
        }
        Ok(batch)
    }

    /// Build a batch directly from exported reports.
    ///
    /// # Errors
    /// Returns error if a filter of that capacity cannot be allocated.
    pub fn from_reports(reports: &[ContagiousReport]) -> Result<Self> {
        let count = reports.iter().map(|r| r.len() as u64).sum();
        Self::from_epoch_seeds(count, reports.iter().flat_map(|r| r.pairs()))
    }

    /// Build a batch from every row of the server corpus.
    ///
    /// Rows are streamed from a single read snapshot; the corpus is never
    /// held in memory.
    ///
    /// # Errors
    /// Returns error if the scan or any row fails.
    pub fn from_server_store<S>(store: &S) -> Result<Self>
    where
        S: ServerStore,
        S::Error: Into<StorageError>,
    {
        let batch = store
            .scan_epoch_seeds(|count, rows| Self::from_rows(count, rows))
            .map_err(store_err)??;
        tracing::info!("Built tracing batch with capacity {}", batch.capacity);
        Ok(batch)
    }

    fn from_rows<E: Into<StorageError>>(count: u64, rows: EpochSeedRows<'_, E>) -> Result<Self> {
        let mut batch = Self::empty(count)?;
        for row in rows {
            let (epoch, seed) = row.map_err(store_err)?;
            batch.insert(epoch, &seed);
        }
        Ok(batch)
    }

    /// Membership query. Never false for a hash derived from an inserted pair.
    #[must_use]
    pub fn contains(&self, hash: &ObservationHash) -> bool {
        self.filter.contains(hash.as_bytes())
    }

    /// Capacity the filter was sized for.
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Serialized size in bytes.
    #[must_use]
    pub fn serialized_len(&self) -> usize {
        HEADER_LEN + self.filter.as_bytes().len()
    }

    /// Serialize to header plus body.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.serialized_len());
        out.extend_from_slice(&self.capacity.to_be_bytes());
        out.extend_from_slice(self.filter.as_bytes());
        out
    }

    /// Write header plus body to `writer`.
    ///
    /// # Errors
    /// Returns error if writing fails.
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<()> {
        writer.write_all(&self.capacity.to_be_bytes())?;
        writer.write_all(self.filter.as_bytes())?;
        writer.flush()?;
        Ok(())
    }

    /// Parse a batch from a complete serialized buffer.
    ///
    /// # Errors
    /// Returns `CorruptFilter` if the buffer is truncated or has the wrong length.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::read_from(bytes)
    }

    /// Read a batch from `reader`, which must hold exactly one serialized batch.
    ///
    /// # Errors
    /// Returns `CorruptFilter` on a truncated header, a body whose length
    /// does not match the header, or trailing bytes.
    pub fn read_from<R: Read>(mut reader: R) -> Result<Self> {
        let mut header = [0u8; HEADER_LEN];
        reader.read_exact(&mut header).map_err(|e| match e.kind() {
            IoErrorKind::UnexpectedEof => TracingError::CorruptFilter("truncated header".into()),
            _ => TracingError::Io(e),
        })?;
        let capacity = u64::from_be_bytes(header);

        let expected = F::body_len(capacity, FALSE_POSITIVE_RATE)?;
        let mut body = Vec::with_capacity(expected);
        reader
            .by_ref()
            .take(expected as u64)
            .read_to_end(&mut body)?;
        if body.len() != expected {
            return Err(TracingError::CorruptFilter(format!(
                "body is {} bytes, capacity {capacity} requires {expected}",
                body.len()
            )));
        }

        let mut trailing = [0u8; 1];
        if reader.read(&mut trailing)? != 0 {
            return Err(TracingError::CorruptFilter("trailing bytes after body".into()));
        }

        Ok(Self {
            capacity,
            filter: F::from_bytes(capacity, FALSE_POSITIVE_RATE, body)?,
        })
    }

    /// Atomically replace the file at `path` with this batch.
    ///
    /// The batch is written to a temporary file in the same directory and
    /// renamed over `path`, so readers never observe a partial file.
    ///
    /// # Errors
    /// Returns error if writing or renaming fails.
    pub fn publish<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        self.write_to(BufWriter::new(tmp.as_file_mut()))?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| TracingError::Io(e.error))?;

        tracing::info!(
            "Published tracing batch ({} bytes) to {}",
            self.serialized_len(),
            path.display()
        );
        Ok(())
    }

    /// Load a published batch from `path`.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or is corrupt.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Self::read_from(BufReader::new(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::SqliteServerStore;
    use crate::domain::{ephid_from_seed, hashed_observation_from_ephid};
    use crate::ErrorKind;

    fn seed(byte: u8) -> Seed {
        Seed::from_bytes([byte; 32])
    }

    fn batch_of(pairs: &[(Epoch, Seed)]) -> TracingBatch {
        TracingBatch::from_epoch_seeds(pairs.len() as u64, pairs.iter().map(|(e, s)| (*e, s)))
            .expect("Should build")
    }

    #[test]
    fn test_capacity_headroom() {
        assert_eq!(capacity_for(0), 0);
        assert_eq!(capacity_for(1), 2);
        assert_eq!(capacity_for(5), 6);
        assert_eq!(capacity_for(100), 120);
        assert_eq!(capacity_for(101), 122);
    }

    #[test]
    fn test_contains_reported_observations() {
        let pairs: Vec<_> = (0..50u8).map(|i| (1000 + Epoch::from(i), seed(i))).collect();
        let batch = batch_of(&pairs);

        for (epoch, s) in &pairs {
            let observed = hashed_observation_from_ephid(&ephid_from_seed(s), *epoch);
            assert!(batch.contains(&observed));
        }
        assert_eq!(batch.capacity(), 60);
    }

    #[test]
    fn test_other_epoch_not_matched() {
        let batch = batch_of(&[(7, seed(1))]);
        assert!(!batch.contains(&hashed_observation_from_seed(&seed(1), 8)));
    }

    #[test]
    fn test_empty_batch_roundtrip() {
        let batch = batch_of(&[]);
        let bytes = batch.to_bytes();
        assert_eq!(&bytes[..8], &[0u8; 8]);

        let restored: TracingBatch = TracingBatch::from_bytes(&bytes).expect("Should parse");
        assert_eq!(restored.capacity(), 0);
        assert!(!restored.contains(&hashed_observation_from_seed(&seed(1), 1)));
    }

    #[test]
    fn test_write_to_matches_to_bytes() {
        let batch = batch_of(&[(1, seed(1)), (2, seed(2))]);
        let mut buf = Vec::new();
        batch.write_to(&mut buf).expect("Should write");
        assert_eq!(buf, batch.to_bytes());
        assert_eq!(buf.len(), batch.serialized_len());
    }

    #[test]
    fn test_truncated_header_rejected() {
        let err = TracingBatch::<BloomFilter>::from_bytes(&[0, 0, 0]).expect_err("Should fail");
        assert!(matches!(err, TracingError::CorruptFilter(_)));
        assert_eq!(err.kind(), ErrorKind::CorruptData);
    }

    #[test]
    fn test_truncated_body_rejected() {
        let mut bytes = batch_of(&[(1, seed(1))]).to_bytes();
        bytes.pop();
        assert!(matches!(
            TracingBatch::<BloomFilter>::from_bytes(&bytes),
            Err(TracingError::CorruptFilter(_))
        ));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = batch_of(&[(1, seed(1))]).to_bytes();
        bytes.push(0);
        assert!(matches!(
            TracingBatch::<BloomFilter>::from_bytes(&bytes),
            Err(TracingError::CorruptFilter(_))
        ));
    }

    #[test]
    fn test_absurd_capacity_rejected_without_allocating() {
        let bytes = u64::MAX.to_be_bytes();
        assert!(matches!(
            TracingBatch::<BloomFilter>::from_bytes(&bytes),
            Err(TracingError::CorruptFilter(_))
        ));
    }

    #[test]
    fn test_from_server_store() {
        let store = SqliteServerStore::in_memory().expect("Should create db");
        store
            .add_epoch_seeds(&[(10, seed(1)), (11, seed(2)), (12, seed(3))])
            .expect("Should add");

        let batch: TracingBatch = TracingBatch::from_server_store(&store).expect("Should build");
        assert_eq!(batch.capacity(), capacity_for(3));
        assert!(batch.contains(&hashed_observation_from_seed(&seed(2), 11)));
    }

    #[test]
    fn test_publish_and_load() {
        let dir = tempfile::tempdir().expect("Should create dir");
        let path = dir.path().join("filter.bin");

        let batch = batch_of(&[(42, seed(9))]);
        batch.publish(&path).expect("Should publish");
        // Republishing replaces the file.
        batch.publish(&path).expect("Should publish again");

        let loaded: TracingBatch = TracingBatch::load(&path).expect("Should load");
        assert_eq!(loaded.capacity(), batch.capacity());
        assert!(loaded.contains(&hashed_observation_from_seed(&seed(9), 42)));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().expect("Should create dir");
        let err = TracingBatch::<BloomFilter>::load(dir.path().join("absent.bin"))
            .expect_err("Should fail");
        assert!(matches!(err, TracingError::Io(_)));
    }
}
