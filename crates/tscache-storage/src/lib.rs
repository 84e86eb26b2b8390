#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/tscache/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Storage backends for the time-series data cache.
//!
//! This crate provides implementations of the [`CacheIndex`] and
//! [`EntryStore`] traits from `tscache-core`:
//!
//! - [`SqliteIndex`] - Persistent SQLite metadata index (default, requires `sqlite` feature)
//! - [`ParquetStore`] - One Parquet file per cached entry
//! - [`InMemoryIndex`] / [`InMemoryStore`] - Volatile backends for testing

/// In-memory index and store implementations.
pub mod memory;
/// Parquet-file entry store.
pub mod parquet;

/// SQLite-based index implementation.
#[cfg(feature = "sqlite")]
pub mod sqlite;

// Re-export the traits for convenience
pub use tscache_core::{CacheIndex, EntryStore};

// Re-export implementations
pub use memory::{InMemoryIndex, InMemoryStore};
pub use parquet::ParquetStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteIndex;
