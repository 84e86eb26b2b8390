//! In-memory index and store implementations.

use async_trait::async_trait;
use polars::prelude::DataFrame;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, instrument};
use tscache_core::{
    CacheEntry, CacheIndex, CacheKey, DataError, DataKind, DateRange, Deletion, EntryFilter,
    EntryStore, Parameters, Result, entry_file_name, normalize_timestamps,
};

/// Identity of an index row: key, kind, range bounds and parameter fingerprint.
type EntryId = (String, DataKind, DateRange, String);

fn entry_id(entry: &CacheEntry) -> EntryId {
    (
        entry.key.to_string(),
        entry.kind,
        entry.range,
        entry.parameters.fingerprint(),
    )
}

/// Simple in-memory index for testing and development.
///
/// Entries are stored in a `RwLock`-protected map and are lost when the index
/// is dropped.
#[derive(Debug, Default)]
pub struct InMemoryIndex {
    entries: RwLock<HashMap<EntryId, CacheEntry>>,
}

impl InMemoryIndex {
    /// Create a new empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries currently indexed.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Returns true if nothing is indexed.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl CacheIndex for InMemoryIndex {
    async fn query(
        &self,
        key: &CacheKey,
        kind: DataKind,
        range: DateRange,
        parameters: Option<&Parameters>,
    ) -> Result<Vec<CacheEntry>> {
        let entries = self.entries.read().await;
        let mut found: Vec<CacheEntry> = entries
            .values()
            .filter(|e| e.key == *key && e.kind == kind && e.range.intersects(&range))
            .filter(|e| parameters.is_none_or(|p| e.parameters == *p))
            .cloned()
            .collect();
        found.sort_by_key(|e| (e.range.start(), e.range.end()));
        Ok(found)
    }

    async fn upsert(&self, entry: &CacheEntry) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(entry_id(entry), entry.clone());
        Ok(())
    }

    async fn remove(&self, entry: &CacheEntry) -> Result<bool> {
        Ok(self.entries.write().await.remove(&entry_id(entry)).is_some())
    }

    #[instrument(skip(self))]
    async fn delete(&self, filter: &EntryFilter) -> Result<Deletion> {
        let mut entries = self.entries.write().await;
        let mut paths = Vec::new();
        entries.retain(|_, entry| {
            let matched = filter.matches(entry);
            if matched {
                paths.push(entry.storage_path.clone());
            }
            !matched
        });

        let count = paths.len();
        debug!("Deleted {} index entries", count);
        Ok(Deletion { paths, count })
    }

    async fn count_by_kind(&self) -> Result<BTreeMap<DataKind, usize>> {
        let mut counts = BTreeMap::new();
        for entry in self.entries.read().await.values() {
            *counts.entry(entry.kind).or_insert(0) += 1;
        }
        Ok(counts)
    }
}

/// Entry store that keeps row sets in memory.
///
/// Paths are synthetic (`memory/{kind}/{file}`) and only meaningful to the
/// store that produced them.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    frames: RwLock<HashMap<PathBuf, DataFrame>>,
}

impl InMemoryStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored row sets.
    pub async fn len(&self) -> usize {
        self.frames.read().await.len()
    }

    /// Returns true if nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.frames.read().await.is_empty()
    }
}

#[async_trait]
impl EntryStore for InMemoryStore {
    fn path_for(
        &self,
        key: &CacheKey,
        kind: DataKind,
        range: DateRange,
        parameters: &Parameters,
    ) -> PathBuf {
        PathBuf::from("memory")
            .join(kind.as_str())
            .join(entry_file_name(key, kind, range, parameters))
    }

    async fn write(
        &self,
        key: &CacheKey,
        kind: DataKind,
        range: DateRange,
        parameters: &Parameters,
        rows: &DataFrame,
    ) -> Result<PathBuf> {
        let df = normalize_timestamps(rows.clone())?;
        let path = self.path_for(key, kind, range, parameters);
        self.frames.write().await.insert(path.clone(), df);
        Ok(path)
    }

    async fn read(&self, path: &Path) -> Result<DataFrame> {
        self.frames
            .read()
            .await
            .get(path)
            .cloned()
            .ok_or_else(|| DataError::EntryUnreadable {
                path: path.display().to_string(),
                reason: "no such entry".to_string(),
            })
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        self.frames.write().await.remove(path);
        Ok(())
    }

    async fn disk_usage(&self) -> Result<u64> {
        let frames = self.frames.read().await;
        Ok(frames.values().map(|df| df.estimated_size() as u64).sum())
    }
}
