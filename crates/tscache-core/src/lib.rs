#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/tscache/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Core traits and types for the time-series data cache.
//!
//! This crate provides the foundational abstractions:
//!
//! - [`CacheIndex`](index::CacheIndex) - Metadata index of cached entries
//! - [`EntryStore`](store::EntryStore) - Row storage, one file per entry
//! - [`Fetcher`](fetch::Fetcher) - Upstream fetch callback contract
//! - [`resolve_coverage`](coverage::resolve_coverage) - Gap computation
//! - [`merge_frames`](frame::merge_frames) - Deduplicating, time-ordered merge

/// Coverage resolution over cached date ranges.
pub mod coverage;
/// Error types for cache operations.
pub mod error;
/// Fetch callback trait.
pub mod fetch;
/// Timestamp-aware row set helpers.
pub mod frame;
/// Metadata index trait.
pub mod index;
/// Data kind definitions.
pub mod kind;
/// Entry storage trait.
pub mod store;
/// Core data types (CacheKey, DateRange, CacheEntry, etc.).
pub mod types;

// Re-export commonly used items at crate root
pub use coverage::{Coverage, resolve_coverage};
pub use error::{DataError, Result};
pub use fetch::Fetcher;
pub use frame::{TIMESTAMP_COLUMNS, merge_frames, normalize_timestamps, timestamp_column};
pub use index::{CacheIndex, Deletion};
pub use kind::DataKind;
pub use store::{EntryStore, entry_file_name};
pub use types::{CacheEntry, CacheKey, DateRange, EntryFilter, Parameters, Symbol};
