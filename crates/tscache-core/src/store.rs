//! Entry storage trait.
//!
//! This module defines the [`EntryStore`] trait for persisting the row data of
//! cache entries, and the deterministic file naming shared by implementations.

use async_trait::async_trait;
use polars::prelude::DataFrame;
use std::path::{Path, PathBuf};

use crate::{
    error::Result,
    kind::DataKind,
    types::{CacheKey, DateRange, Parameters},
};

/// Longest key prefix kept in a file name.
const MAX_KEY_CHARS: usize = 48;

/// Storage for the row data of cache entries.
///
/// Each entry is one self-contained file (or blob) at a path computed from the
/// entry's identity, so writing the same identity again replaces the content.
#[async_trait]
pub trait EntryStore: Send + Sync {
    /// Returns the storage path for an entry identity.
    fn path_for(
        &self,
        key: &CacheKey,
        kind: DataKind,
        range: DateRange,
        parameters: &Parameters,
    ) -> PathBuf;

    /// Persists `rows`, replacing anything stored at the same path.
    ///
    /// Returns the path written. Row sets without a timestamp field are
    /// rejected with
    /// [`DataError::MissingTimestampField`](crate::DataError::MissingTimestampField).
    async fn write(
        &self,
        key: &CacheKey,
        kind: DataKind,
        range: DateRange,
        parameters: &Parameters,
        rows: &DataFrame,
    ) -> Result<PathBuf>;

    /// Loads the rows stored at `path`.
    ///
    /// Missing or corrupt data is reported as
    /// [`DataError::EntryUnreadable`](crate::DataError::EntryUnreadable).
    async fn read(&self, path: &Path) -> Result<DataFrame>;

    /// Deletes the data stored at `path`. Deleting a missing path succeeds.
    async fn delete(&self, path: &Path) -> Result<()>;

    /// Returns the number of bytes the store occupies.
    async fn disk_usage(&self) -> Result<u64>;
}

/// Deterministic file name for an entry identity.
///
/// The name is `{key}_{hash}.parquet` where `key` is the cache key with
/// characters outside `[A-Za-z0-9.-]` replaced by `_`, and `hash` is the first
/// 16 hex characters of a hash over the full identity.
#[must_use]
pub fn entry_file_name(
    key: &CacheKey,
    kind: DataKind,
    range: DateRange,
    parameters: &Parameters,
) -> String {
    let identity = format!(
        "{}_{}_{}_{}_{}",
        key,
        kind,
        range.start(),
        range.end(),
        parameters.fingerprint()
    );
    let hash = blake3::hash(identity.as_bytes()).to_hex();

    let prefix: String = key
        .as_str()
        .chars()
        .take(MAX_KEY_CHARS)
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();

    format!("{}_{}.parquet", prefix, &hash.as_str()[..16])
}
