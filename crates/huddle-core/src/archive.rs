//! Persistent room archives.
//!
//! Each archived room owns one bucket named `<room>_arch`, holding
//! `(nanosecond key -> serialized chat message)` pairs. Keys are strictly
//! increasing within a store, so a reverse scan from the last key yields
//! the most recent messages.

use bytes::Bytes;
use parking_lot::Mutex;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition, TableError};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::debug;

/// Suffix appended to a room name to build its bucket name.
pub const BUCKET_SUFFIX: &str = "_arch";

/// Archive errors.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Underlying storage failure.
    #[error("Database error: {0}")]
    Database(String),

    /// The bucket was never created.
    #[error("Archive bucket not found: {0}")]
    BucketNotFound(String),
}

/// Bucket name for a room.
#[must_use]
pub fn bucket_name(room: &str) -> String {
    format!("{room}{BUCKET_SUFFIX}")
}

/// Persistent key-value collaborator used by archived rooms.
///
/// Implementations provide their own per-bucket isolation; callers do not
/// lock around them.
pub trait ArchiveBackend: Send + Sync {
    /// Create a bucket if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage layer fails.
    fn create_bucket(&self, bucket: &str) -> Result<(), ArchiveError>;

    /// Append a record, returning the key it was stored under.
    ///
    /// The bucket is created on demand.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage layer fails.
    fn append(&self, bucket: &str, record: &[u8]) -> Result<u64, ArchiveError>;

    /// Fetch up to `limit` most recent records, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the bucket does not exist or the storage layer
    /// fails.
    fn latest(&self, bucket: &str, limit: usize) -> Result<Vec<Bytes>, ArchiveError>;
}

/// Source of strictly increasing nanosecond keys.
///
/// Wall-clock nanoseconds are used when they move forward; otherwise the
/// previous key plus one.
#[derive(Debug, Default)]
pub struct KeySource {
    last: AtomicU64,
}

impl KeySource {
    /// Create a key source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Produce the next key.
    pub fn next_key(&self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        let mut prev = self.last.load(Ordering::Acquire);
        loop {
            let candidate = now.max(prev + 1);
            match self.last.compare_exchange_weak(
                prev,
                candidate,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return candidate,
                Err(actual) => prev = actual,
            }
        }
    }
}

/// Redb-backed archive: one table per bucket in a single database file.
pub struct RedbArchive {
    db: Arc<Database>,
    keys: KeySource,
}

impl RedbArchive {
    /// Open (or create) the database file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ArchiveError> {
        let db = Database::create(path.as_ref())
            .map_err(|e| ArchiveError::Database(e.to_string()))?;
        debug!(path = %path.as_ref().display(), "Archive database opened");
        Ok(Self {
            db: Arc::new(db),
            keys: KeySource::new(),
        })
    }
}

impl ArchiveBackend for RedbArchive {
    fn create_bucket(&self, bucket: &str) -> Result<(), ArchiveError> {
        let table_def: TableDefinition<u64, &[u8]> = TableDefinition::new(bucket);
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| ArchiveError::Database(e.to_string()))?;
        write_txn
            .open_table(table_def)
            .map_err(|e| ArchiveError::Database(e.to_string()))?;
        write_txn
            .commit()
            .map_err(|e| ArchiveError::Database(e.to_string()))?;
        Ok(())
    }

    fn append(&self, bucket: &str, record: &[u8]) -> Result<u64, ArchiveError> {
        let table_def: TableDefinition<u64, &[u8]> = TableDefinition::new(bucket);
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| ArchiveError::Database(e.to_string()))?;
        // Keys are drawn inside the write transaction so key order matches
        // commit order.
        let key = self.keys.next_key();
        {
            let mut table = write_txn
                .open_table(table_def)
                .map_err(|e| ArchiveError::Database(e.to_string()))?;
            table
                .insert(key, record)
                .map_err(|e| ArchiveError::Database(e.to_string()))?;
        }
        write_txn
            .commit()
            .map_err(|e| ArchiveError::Database(e.to_string()))?;
        Ok(key)
    }

    fn latest(&self, bucket: &str, limit: usize) -> Result<Vec<Bytes>, ArchiveError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let table_def: TableDefinition<u64, &[u8]> = TableDefinition::new(bucket);
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| ArchiveError::Database(e.to_string()))?;
        let table = match read_txn.open_table(table_def) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => {
                return Err(ArchiveError::BucketNotFound(bucket.to_string()))
            }
            Err(e) => return Err(ArchiveError::Database(e.to_string())),
        };

        let mut records = Vec::with_capacity(limit);
        for item in table
            .iter()
            .map_err(|e| ArchiveError::Database(e.to_string()))?
            .rev()
            .take(limit)
        {
            let (_key, value) = item.map_err(|e| ArchiveError::Database(e.to_string()))?;
            records.push(Bytes::copy_from_slice(value.value()));
        }
        records.reverse();
        Ok(records)
    }
}

/// In-memory archive, for tests and for running without a data directory.
#[derive(Debug, Default)]
pub struct MemoryArchive {
    buckets: Mutex<HashMap<String, BTreeMap<u64, Bytes>>>,
    keys: KeySource,
}

impl MemoryArchive {
    /// Create an empty in-memory archive.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records in a bucket.
    #[must_use]
    pub fn len(&self, bucket: &str) -> usize {
        self.buckets.lock().get(bucket).map_or(0, BTreeMap::len)
    }

    /// Check if a bucket is missing or empty.
    #[must_use]
    pub fn is_empty(&self, bucket: &str) -> bool {
        self.len(bucket) == 0
    }
}

impl ArchiveBackend for MemoryArchive {
    fn create_bucket(&self, bucket: &str) -> Result<(), ArchiveError> {
        self.buckets.lock().entry(bucket.to_string()).or_default();
        Ok(())
    }

    fn append(&self, bucket: &str, record: &[u8]) -> Result<u64, ArchiveError> {
        let mut buckets = self.buckets.lock();
        let key = self.keys.next_key();
        buckets
            .entry(bucket.to_string())
            .or_default()
            .insert(key, Bytes::copy_from_slice(record));
        Ok(key)
    }

    fn latest(&self, bucket: &str, limit: usize) -> Result<Vec<Bytes>, ArchiveError> {
        let buckets = self.buckets.lock();
        let records = buckets
            .get(bucket)
            .ok_or_else(|| ArchiveError::BucketNotFound(bucket.to_string()))?;
        let mut latest: Vec<Bytes> = records.values().rev().take(limit).cloned().collect();
        latest.reverse();
        Ok(latest)
    }
}
