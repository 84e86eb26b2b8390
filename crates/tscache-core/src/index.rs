//! Metadata index trait.
//!
//! This module defines the [`CacheIndex`] trait, the single source of truth
//! for which fetch results are cached.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::{
    error::Result,
    kind::DataKind,
    types::{CacheEntry, CacheKey, DateRange, EntryFilter, Parameters},
};

/// Outcome of an [`CacheIndex::delete`] call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Deletion {
    /// Storage paths of the removed entries, for the caller to unlink.
    pub paths: Vec<PathBuf>,
    /// Number of metadata rows removed.
    pub count: usize,
}

/// Queryable metadata table of cached entries.
///
/// Implementations report any read or write failure as
/// [`DataError::StorageUnavailable`](crate::DataError::StorageUnavailable).
#[async_trait]
pub trait CacheIndex: Send + Sync {
    /// Returns entries for `key` and `kind` whose range intersects `range`,
    /// ascending by range start.
    ///
    /// When `parameters` is given only entries with the same parameter set
    /// are returned.
    async fn query(
        &self,
        key: &CacheKey,
        kind: DataKind,
        range: DateRange,
        parameters: Option<&Parameters>,
    ) -> Result<Vec<CacheEntry>>;

    /// Inserts an entry, replacing any entry with the same identity.
    ///
    /// Either the whole row is written or nothing is.
    async fn upsert(&self, entry: &CacheEntry) -> Result<()>;

    /// Removes the entry with the same identity as `entry`.
    ///
    /// Returns whether a row was removed.
    async fn remove(&self, entry: &CacheEntry) -> Result<bool>;

    /// Removes every entry matching `filter`.
    async fn delete(&self, filter: &EntryFilter) -> Result<Deletion>;

    /// Returns the number of entries per kind. Kinds without entries are absent.
    async fn count_by_kind(&self) -> Result<BTreeMap<DataKind, usize>>;
}
