//! Storage utilities and abstractions.
//!
//! ## Modules
//!
//! - `rocksdb`: RocksDB configuration and the view/update transaction manager

pub mod rocksdb;

pub use rocksdb::{Direction, KvRead, ReadTxn, RocksDbConfig, RocksDbHandle, WriteTxn};
