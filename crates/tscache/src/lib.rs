#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/tscache/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Gap-aware time-series cache for pay-per-call financial data sources.
//!
//! This crate re-exports the core types and storage backends, and provides
//! [`TimeSeriesCache`], which answers `(key, kind, range)` requests from cached
//! entries and fetches only the uncovered gaps through a caller-supplied
//! [`Fetcher`].
//!
//! # Features
//!
//! - `sqlite` - SQLite metadata index and [`TimeSeriesCache::open`] (default)
//!
//! # Example
//!
//! ```rust,ignore
//! use tscache::{CacheConfig, DateRange, Symbol, TimeSeriesCache};
//! use chrono::NaiveDate;
//!
//! #[tokio::main]
//! async fn main() -> tscache::Result<()> {
//!     let cache = TimeSeriesCache::open(&CacheConfig::default())?;
//!
//!     let range = DateRange::new(
//!         NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
//!         NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
//!     )?;
//!     let bars = cache.fetch_ohlcv(&Symbol::new("AAPL"), range, &download_bars).await?;
//!     println!("{:?}", bars);
//!
//!     println!("{:?}", cache.stats().await?);
//!     Ok(())
//! }
//! ```

// Core types and traits
pub use tscache_core::*;

// Storage backends
#[cfg(feature = "sqlite")]
pub use tscache_storage::SqliteIndex;
pub use tscache_storage::{InMemoryIndex, InMemoryStore, ParquetStore};

mod admin;
mod cache;
mod config;
mod locks;
mod series;

pub use admin::CacheStats;
pub use cache::{ResolveReport, TimeSeriesCache};
pub use config::CacheConfig;
pub use series::InsiderDataset;
