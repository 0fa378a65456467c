//! Transactional access to a RocksDB namespace.
//!
//! This module wraps RocksDB in the two primitives the board engine is built
//! on: `view` (read against one snapshot) and `update` (buffer writes and
//! commit them as one atomic batch). It contains no board-specific logic.
//!
//! ## Key Features
//!
//! - Configurable RocksDB setup with sensible defaults
//! - Snapshot-consistent read transactions
//! - Single-writer update transactions with read-your-own-writes
//! - Bounded ascending/descending range scans

use crate::error::{BoardError, Result};
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBRawIteratorWithThreadMode, DBWithThreadMode,
    MultiThreaded, Options, SnapshotWithThreadMode, WriteBatch,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, trace};

type Db = DBWithThreadMode<MultiThreaded>;

// =============================================================================
// RocksDB Configuration
// =============================================================================

/// Configuration for RocksDB storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RocksDbConfig {
    /// Maximum number of open files.
    pub max_open_files: i32,
    /// Number of log files to keep.
    pub keep_log_file_num: usize,
    /// Maximum WAL size in bytes.
    pub max_wal_size: u64,
    /// Write buffer size in bytes.
    pub write_buffer_size: usize,
    /// Maximum number of write buffers.
    pub max_write_buffer_number: i32,
    /// Target file size for SST files.
    pub target_file_size_base: u64,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            max_open_files: 128,
            keep_log_file_num: 2,
            max_wal_size: 32 * 1024 * 1024,      // 32MB
            write_buffer_size: 32 * 1024 * 1024, // 32MB
            max_write_buffer_number: 2,
            target_file_size_base: 32 * 1024 * 1024, // 32MB
        }
    }
}

impl RocksDbConfig {
    /// Creates a configuration optimized for server workloads.
    ///
    /// Uses larger buffers and more files for higher throughput.
    pub fn for_server() -> Self {
        Self {
            max_open_files: 256,
            keep_log_file_num: 3,
            max_wal_size: 64 * 1024 * 1024,      // 64MB
            write_buffer_size: 64 * 1024 * 1024, // 64MB
            max_write_buffer_number: 3,
            target_file_size_base: 64 * 1024 * 1024, // 64MB
        }
    }

    /// Builds RocksDB Options from this configuration.
    pub fn build_options(&self) -> Options {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.set_max_open_files(self.max_open_files);
        opts.set_keep_log_file_num(self.keep_log_file_num);
        opts.set_max_total_wal_size(self.max_wal_size);
        opts.increase_parallelism(num_cpus::get() as i32);
        opts.set_write_buffer_size(self.write_buffer_size);
        opts.set_max_write_buffer_number(self.max_write_buffer_number);
        opts.set_target_file_size_base(self.target_file_size_base);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }
}

/// Scan direction for range iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Seek to the first key `>= start` and walk forward.
    Ascending,
    /// Seek to the last key `<= start` and walk backward.
    Descending,
}

fn cf_handle<'a>(db: &'a Db, name: &str) -> Result<Arc<BoundColumnFamily<'a>>> {
    db.cf_handle(name)
        .ok_or_else(|| BoardError::transaction(format!("Column family '{}' not found", name)))
}

/// Walks a positioned raw iterator until the prefix ends or the callback stops it.
fn drive_scan<F>(
    mut iter: DBRawIteratorWithThreadMode<'_, Db>,
    start: &[u8],
    prefix: &[u8],
    direction: Direction,
    mut callback: F,
) -> Result<usize>
where
    F: FnMut(&[u8], &[u8]) -> bool,
{
    match direction {
        Direction::Ascending => iter.seek(start),
        Direction::Descending => iter.seek_for_prev(start),
    }

    let mut count: usize = 0;
    while iter.valid() {
        if let (Some(key), Some(value)) = (iter.key(), iter.value()) {
            if !key.starts_with(prefix) {
                break;
            }
            count += 1;
            if !callback(key, value) {
                break;
            }
        } else {
            break;
        }
        match direction {
            Direction::Ascending => iter.next(),
            Direction::Descending => iter.prev(),
        }
    }

    iter.status()
        .map_err(|e| BoardError::transaction(format!("Iterator error: {}", e)))?;

    Ok(count)
}

// =============================================================================
// Database Handle
// =============================================================================

/// A RocksDB database exposing snapshot reads and atomic batched writes.
///
/// All access to the stored bytes goes through [`RocksDbHandle::view`] and
/// [`RocksDbHandle::update`]. Updates are serialized by an internal writer
/// lock, so at most one write transaction is open at a time.
pub struct RocksDbHandle {
    db: Arc<Db>,
    write_lock: Mutex<()>,
}

impl RocksDbHandle {
    /// Opens a RocksDB database with the given column families.
    pub fn open(
        db_path: impl AsRef<Path>,
        config: &RocksDbConfig,
        column_families: &[&str],
    ) -> Result<Self> {
        let opts = config.build_options();
        let cf_opts = Options::default();

        let cf_descriptors: Vec<_> = column_families
            .iter()
            .map(|cf| ColumnFamilyDescriptor::new(*cf, cf_opts.clone()))
            .collect();

        let db = Db::open_cf_descriptors(&opts, db_path.as_ref(), cf_descriptors)
            .map_err(|e| BoardError::transaction(format!("Failed to open RocksDB: {}", e)))?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Mutex::new(()),
        })
    }

    /// Runs `f` against a consistent snapshot of the database.
    pub fn view<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&ReadTxn<'_>) -> Result<T>,
    {
        let txn = ReadTxn {
            db: &self.db,
            snapshot: self.db.snapshot(),
        };
        f(&txn)
    }

    /// Runs `f` as a write transaction and commits its writes atomically.
    ///
    /// If `f` returns an error nothing is written.
    pub fn update<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut WriteTxn<'_>) -> Result<T>,
    {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| BoardError::transaction("Writer lock poisoned"))?;

        let mut txn = WriteTxn {
            db: &self.db,
            batch: WriteBatch::default(),
            pending: HashMap::new(),
        };

        let value = f(&mut txn)?;

        let WriteTxn { batch, pending, .. } = txn;
        if pending.is_empty() {
            return Ok(value);
        }

        self.db
            .write(batch)
            .map_err(|e| BoardError::transaction(format!("Failed to commit: {}", e)))?;

        debug!(
            keys_written = pending.len(),
            "db_update: committed write batch"
        );

        Ok(value)
    }
}

impl std::fmt::Debug for RocksDbHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RocksDbHandle")
            .field("db", &"RocksDB")
            .finish()
    }
}

// =============================================================================
// Transactions
// =============================================================================

/// Point reads shared by read and write transactions.
pub trait KvRead {
    /// Loads raw bytes from the given key.
    fn get(&self, cf_name: &str, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Checks if a key exists.
    fn exists(&self, cf_name: &str, key: &[u8]) -> Result<bool> {
        Ok(self.get(cf_name, key)?.is_some())
    }
}

/// A read-only transaction bound to one database snapshot.
pub struct ReadTxn<'a> {
    db: &'a Db,
    snapshot: SnapshotWithThreadMode<'a, Db>,
}

impl<'a> ReadTxn<'a> {
    /// Loads raw bytes from the given key.
    pub fn get(&self, cf_name: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let cf = cf_handle(self.db, cf_name)?;
        let value = self
            .snapshot
            .get_cf(&cf, key)
            .map_err(|e| BoardError::transaction(format!("Failed to read: {}", e)))?;

        trace!(
            cf = cf_name,
            key_len = key.len(),
            found = value.is_some(),
            "txn_get: snapshot read"
        );

        Ok(value)
    }

    /// Checks if a key exists.
    pub fn exists(&self, cf_name: &str, key: &[u8]) -> Result<bool> {
        Ok(self.get(cf_name, key)?.is_some())
    }

    /// Scans keys sharing `prefix`, starting at `start`, in `direction`.
    ///
    /// The callback receives (key, value) pairs and should return true to continue
    /// or false to stop iteration. Returns the number of entries visited.
    pub fn scan<F>(
        &self,
        cf_name: &str,
        start: &[u8],
        prefix: &[u8],
        direction: Direction,
        callback: F,
    ) -> Result<usize>
    where
        F: FnMut(&[u8], &[u8]) -> bool,
    {
        let cf = cf_handle(self.db, cf_name)?;
        let iter = self.snapshot.raw_iterator_cf(&cf);
        let count = drive_scan(iter, start, prefix, direction, callback)?;

        debug!(
            cf = cf_name,
            prefix_len = prefix.len(),
            ?direction,
            records_iterated = count,
            "txn_scan: completed snapshot scan"
        );

        Ok(count)
    }
}

impl KvRead for ReadTxn<'_> {
    fn get(&self, cf_name: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        ReadTxn::get(self, cf_name, key)
    }
}

/// A write transaction. Writes are buffered and applied on commit.
pub struct WriteTxn<'a> {
    db: &'a Db,
    batch: WriteBatch,
    pending: HashMap<(String, Vec<u8>), Option<Vec<u8>>>,
}

impl<'a> WriteTxn<'a> {
    /// Loads raw bytes, observing writes already made in this transaction.
    pub fn get(&self, cf_name: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if let Some(pending) = self.pending.get(&(cf_name.to_string(), key.to_vec())) {
            return Ok(pending.clone());
        }

        let cf = cf_handle(self.db, cf_name)?;
        self.db
            .get_cf(&cf, key)
            .map_err(|e| BoardError::transaction(format!("Failed to read: {}", e)))
    }

    /// Checks if a key exists.
    pub fn exists(&self, cf_name: &str, key: &[u8]) -> Result<bool> {
        Ok(self.get(cf_name, key)?.is_some())
    }

    /// Stores raw bytes at the given key.
    pub fn put(&mut self, cf_name: &str, key: &[u8], value: &[u8]) -> Result<()> {
        let cf = cf_handle(self.db, cf_name)?;

        trace!(
            cf = cf_name,
            key_len = key.len(),
            value_bytes = value.len(),
            "txn_put: buffering write"
        );

        self.batch.put_cf(&cf, key, value);
        self.pending
            .insert((cf_name.to_string(), key.to_vec()), Some(value.to_vec()));
        Ok(())
    }

    /// Deletes a key. Deleting a missing key is not an error.
    pub fn delete(&mut self, cf_name: &str, key: &[u8]) -> Result<()> {
        let cf = cf_handle(self.db, cf_name)?;

        trace!(cf = cf_name, key_len = key.len(), "txn_delete: buffering delete");

        self.batch.delete_cf(&cf, key);
        self.pending.insert((cf_name.to_string(), key.to_vec()), None);
        Ok(())
    }

    /// Scans the committed state; writes pending in this transaction are not visible.
    pub fn scan<F>(
        &self,
        cf_name: &str,
        start: &[u8],
        prefix: &[u8],
        direction: Direction,
        callback: F,
    ) -> Result<usize>
    where
        F: FnMut(&[u8], &[u8]) -> bool,
    {
        let cf = cf_handle(self.db, cf_name)?;
        let iter = self.db.raw_iterator_cf(&cf);
        drive_scan(iter, start, prefix, direction, callback)
    }
}

impl KvRead for WriteTxn<'_> {
    fn get(&self, cf_name: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        WriteTxn::get(self, cf_name, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_db() -> (RocksDbHandle, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test_db");
        let config = RocksDbConfig::default();
        let db =
            RocksDbHandle::open(&db_path, &config, &["data", "meta"]).expect("Failed to open db");
        (db, temp_dir)
    }

    fn put_all(db: &RocksDbHandle, entries: &[(&[u8], &[u8])]) {
        db.update(|txn| {
            for (key, value) in entries {
                txn.put("data", key, value)?;
            }
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_update_and_view() {
        let (db, _temp) = create_test_db();
        put_all(&db, &[(b"key1", b"raw bytes")]);

        let loaded = db.view(|txn| txn.get("data", b"key1")).unwrap();
        assert_eq!(loaded.as_deref(), Some(&b"raw bytes"[..]));
    }

    #[test]
    fn test_failed_update_writes_nothing() {
        let (db, _temp) = create_test_db();

        let result: Result<()> = db.update(|txn| {
            txn.put("data", b"a", b"1")?;
            txn.put("meta", b"b", b"2")?;
            Err(BoardError::invalid_input("abort"))
        });
        assert!(result.is_err());

        db.view(|txn| {
            assert!(!txn.exists("data", b"a")?);
            assert!(!txn.exists("meta", b"b")?);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_update_reads_own_writes() {
        let (db, _temp) = create_test_db();
        put_all(&db, &[(b"gone", b"x")]);

        db.update(|txn| {
            txn.put("data", b"fresh", b"1")?;
            txn.delete("data", b"gone")?;
            assert_eq!(txn.get("data", b"fresh")?.as_deref(), Some(&b"1"[..]));
            assert!(!txn.exists("data", b"gone")?);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_view_is_snapshot_isolated() {
        let (db, _temp) = create_test_db();
        put_all(&db, &[(b"k", b"old")]);

        db.view(|txn| {
            db.update(|w| w.put("data", b"k", b"new"))?;
            assert_eq!(txn.get("data", b"k")?.as_deref(), Some(&b"old"[..]));
            Ok(())
        })
        .unwrap();

        let current = db.view(|txn| txn.get("data", b"k")).unwrap();
        assert_eq!(current.as_deref(), Some(&b"new"[..]));
    }

    #[test]
    fn test_scan_ascending_within_prefix() {
        let (db, _temp) = create_test_db();
        put_all(
            &db,
            &[
                (b"p1:a", b"1"),
                (b"p1:b", b"2"),
                (b"p1:c", b"3"),
                (b"p2:a", b"4"),
            ],
        );

        let mut found = Vec::new();
        db.view(|txn| {
            txn.scan("data", b"p1:b", b"p1:", Direction::Ascending, |key, _| {
                found.push(key.to_vec());
                true
            })
        })
        .unwrap();

        assert_eq!(found, vec![b"p1:b".to_vec(), b"p1:c".to_vec()]);
    }

    #[test]
    fn test_scan_descending_stops_at_prefix_and_callback() {
        let (db, _temp) = create_test_db();
        put_all(
            &db,
            &[
                (b"p0:z", b"0"),
                (b"p1:a", b"1"),
                (b"p1:b", b"2"),
                (b"p1:c", b"3"),
            ],
        );

        let mut all = Vec::new();
        db.view(|txn| {
            txn.scan("data", b"p1:\xff", b"p1:", Direction::Descending, |key, _| {
                all.push(key.to_vec());
                true
            })
        })
        .unwrap();
        assert_eq!(
            all,
            vec![b"p1:c".to_vec(), b"p1:b".to_vec(), b"p1:a".to_vec()]
        );

        let mut limited = Vec::new();
        db.view(|txn| {
            txn.scan("data", b"p1:b", b"p1:", Direction::Descending, |key, _| {
                limited.push(key.to_vec());
                limited.len() < 1
            })
        })
        .unwrap();
        assert_eq!(limited, vec![b"p1:b".to_vec()]);
    }

    #[test]
    fn test_server_config() {
        let config = RocksDbConfig::for_server();
        assert_eq!(config.max_open_files, 256);
        assert_eq!(config.max_wal_size, 64 * 1024 * 1024);
    }

    #[test]
    fn test_missing_column_family() {
        let (db, _temp) = create_test_db();
        let result = db.view(|txn| txn.get("nope", b"k"));
        assert!(matches!(result, Err(BoardError::Transaction(_))));
    }
}
