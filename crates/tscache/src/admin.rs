//! Cache statistics and retention.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use tracing::{info, instrument, warn};

use tscache_core::{CacheKey, DataKind, EntryFilter, Result};

use crate::cache::TimeSeriesCache;

/// Point-in-time snapshot of cache contents and activity.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Number of entries per kind; kinds without entries are absent.
    pub entries_by_kind: BTreeMap<DataKind, usize>,
    /// Total number of entries.
    pub total_entries: usize,
    /// Bytes held by the entry store.
    pub total_bytes: u64,
    /// `resolve` calls that needed no fetch, plus successful `get_cached` calls.
    pub hits: u64,
    /// `resolve` calls that fetched at least one gap.
    pub misses: u64,
    /// `hits / max(1, hits + misses)`.
    pub hit_ratio: f64,
    /// Cached entries used in place of an upstream call.
    pub api_calls_saved: u64,
    /// `resolve` calls that combined cached entries with fresh rows.
    pub merges: u64,
}

impl TimeSeriesCache {
    /// Returns a snapshot of entry counts, disk usage and hit statistics.
    ///
    /// # Errors
    /// Returns an error if the index or the store cannot be inspected.
    pub async fn stats(&self) -> Result<CacheStats> {
        let entries_by_kind = self.index.count_by_kind().await?;
        let total_bytes = self.store.disk_usage().await?;
        let hits = self.counters.hits.load(Ordering::Relaxed);
        let misses = self.counters.misses.load(Ordering::Relaxed);

        Ok(CacheStats {
            total_entries: entries_by_kind.values().sum(),
            entries_by_kind,
            total_bytes,
            hits,
            misses,
            hit_ratio: hits as f64 / (hits + misses).max(1) as f64,
            api_calls_saved: self.counters.api_calls_saved.load(Ordering::Relaxed),
            merges: self.counters.merges.load(Ordering::Relaxed),
        })
    }

    /// Removes every entry matching `filter` along with its data.
    ///
    /// Index rows are removed even when unlinking their data fails; such
    /// failures are logged and skipped. Returns the number of entries removed.
    ///
    /// # Errors
    /// Returns an error if the index cannot be updated.
    #[instrument(skip(self))]
    pub async fn clear(&self, filter: &EntryFilter) -> Result<usize> {
        let deletion = self.index.delete(filter).await?;

        for path in &deletion.paths {
            if let Err(e) = self.store.delete(path).await {
                warn!(path = %path.display(), error = %e, "Failed to remove entry data");
            }
        }

        info!(count = deletion.count, "Cleared cache entries");
        Ok(deletion.count)
    }

    /// Removes every entry for `key`.
    pub async fn clear_key(&self, key: impl Into<CacheKey>) -> Result<usize> {
        self.clear(&EntryFilter::all().with_key(key)).await
    }

    /// Removes every entry of `kind`.
    pub async fn clear_kind(&self, kind: DataKind) -> Result<usize> {
        self.clear(&EntryFilter::all().with_kind(kind)).await
    }

    /// Removes entries last updated more than `days` days ago.
    pub async fn clear_older_than(&self, days: u32) -> Result<usize> {
        self.clear(&EntryFilter::all().older_than_days(days)).await
    }

    /// Removes entries for `key` last updated more than `days` days ago.
    pub async fn clear_key_older_than(
        &self,
        key: impl Into<CacheKey>,
        days: u32,
    ) -> Result<usize> {
        self.clear(&EntryFilter::all().with_key(key).older_than_days(days))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, NaiveDate};
    use polars::prelude::*;
    use tscache_core::{DateRange, Parameters};

    fn rows(start: NaiveDate, days: i32) -> DataFrame {
        let first = start.num_days_from_ce() - 719_163;
        let dates: Vec<i32> = (first..first + days).collect();
        DataFrame::new(vec![
            Column::new("date".into(), dates)
                .cast(&DataType::Date)
                .unwrap(),
            Column::new("close".into(), vec![1.0; days as usize]),
        ])
        .unwrap()
    }

    fn jan(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[tokio::test]
    async fn test_empty_stats() {
        let cache = TimeSeriesCache::in_memory();
        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.total_entries, 0);
        assert_eq!(stats.total_bytes, 0);
        assert_eq!(stats.hit_ratio, 0.0);
    }

    #[tokio::test]
    async fn test_stats_and_clear_by_kind() {
        let cache = TimeSeriesCache::in_memory();
        let key = CacheKey::new("AAPL");
        let params = Parameters::new();
        let range = DateRange::new(jan(1), jan(3)).unwrap();

        cache
            .put(&key, DataKind::Ohlcv, range, &params, &rows(jan(1), 3))
            .await
            .unwrap();
        cache
            .put(&key, DataKind::News, range, &params, &rows(jan(1), 3))
            .await
            .unwrap();

        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.entries_by_kind.get(&DataKind::News), Some(&1));
        assert!(stats.total_bytes > 0);

        assert_eq!(cache.clear_kind(DataKind::News).await.unwrap(), 1);
        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.total_entries, 1);
        assert!(!stats.entries_by_kind.contains_key(&DataKind::News));
    }

    #[tokio::test]
    async fn test_clear_key_keeps_other_keys() {
        let cache = TimeSeriesCache::in_memory();
        let params = Parameters::new();
        let range = DateRange::new(jan(1), jan(2)).unwrap();
        for key in ["AAPL", "MSFT"] {
            cache
                .put(&CacheKey::new(key), DataKind::Ohlcv, range, &params, &rows(jan(1), 2))
                .await
                .unwrap();
        }

        assert_eq!(cache.clear_key("AAPL").await.unwrap(), 1);
        assert_eq!(cache.clear_older_than(1).await.unwrap(), 0);
        assert_eq!(cache.stats().await.unwrap().total_entries, 1);
    }

    #[tokio::test]
    async fn test_clear_older_than_huge_age() {
        let cache = TimeSeriesCache::in_memory();
        let range = DateRange::new(jan(1), jan(2)).unwrap();
        cache
            .put(&CacheKey::new("AAPL"), DataKind::Ohlcv, range, &Parameters::new(), &rows(jan(1), 2))
            .await
            .unwrap();

        assert_eq!(cache.clear_older_than(u32::MAX).await.unwrap(), 0);
        assert_eq!(cache.clear_key_older_than("AAPL", u32::MAX).await.unwrap(), 0);
        assert_eq!(cache.stats().await.unwrap().total_entries, 1);
    }
}
