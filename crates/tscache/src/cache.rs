//! Fetch orchestration over a cache index and an entry store.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use polars::prelude::DataFrame;
use tracing::{debug, info, instrument, warn};

use tscache_core::{
    CacheEntry, CacheIndex, CacheKey, Coverage, DataError, DataKind, DateRange, EntryStore,
    Fetcher, Parameters, Result, merge_frames, resolve_coverage,
};
use tscache_storage::{InMemoryIndex, InMemoryStore};

use crate::locks::KeyLocks;

/// Running counters, reset only when the cache is dropped.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub(crate) hits: AtomicU64,
    pub(crate) misses: AtomicU64,
    pub(crate) api_calls_saved: AtomicU64,
    pub(crate) merges: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }
}

/// What happened during one [`TimeSeriesCache::resolve_with_report`] call.
#[derive(Debug, Default)]
pub struct ResolveReport {
    /// Gaps computed against the index, ascending.
    pub gaps: Vec<DateRange>,
    /// Gaps whose fetch returned rows.
    pub fetched: Vec<DateRange>,
    /// Gaps whose fetch returned no rows or reported no upstream data (not cached).
    pub empty: Vec<DateRange>,
    /// Fetched gaps served from memory because they could not be persisted.
    pub unpersisted: Vec<DateRange>,
    /// Per-gap failures that were absorbed.
    pub failures: Vec<DataError>,
    /// Cached entries that satisfied part of the request without a fetch.
    pub entries_reused: usize,
    /// Cached entries skipped because their data could not be read.
    pub entries_unreadable: usize,
    /// True if no gap needed fetching.
    pub hit: bool,
    /// True if the index failed and the call fell back to fetching.
    pub index_degraded: bool,
}

/// Gap-aware cache in front of pay-per-call data sources.
///
/// A request for `(key, kind, range, parameters)` is answered from cached
/// entries where possible; only the uncovered sub-ranges are passed to the
/// caller's [`Fetcher`], one at a time. Fetched rows are persisted as new
/// entries and merged with the cached rows into one deduplicated, time-ordered
/// frame.
///
/// # Example
///
/// ```rust,ignore
/// use tscache::{CacheConfig, CacheKey, DataKind, DateRange, Parameters, TimeSeriesCache};
///
/// let cache = TimeSeriesCache::open(&CacheConfig::default())?;
/// let rows = cache
///     .resolve(&CacheKey::new("AAPL"), DataKind::Ohlcv, range, &fetch_bars, &Parameters::new())
///     .await?;
/// ```
pub struct TimeSeriesCache {
    pub(crate) index: Arc<dyn CacheIndex>,
    pub(crate) store: Arc<dyn EntryStore>,
    locks: Option<KeyLocks>,
    pub(crate) counters: Counters,
}

impl std::fmt::Debug for TimeSeriesCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeSeriesCache")
            .field("per_key_locking", &self.locks.is_some())
            .field("counters", &self.counters)
            .finish()
    }
}

impl TimeSeriesCache {
    /// Create a cache over the given index and store, with per-key locking on.
    #[must_use]
    pub fn new(index: Arc<dyn CacheIndex>, store: Arc<dyn EntryStore>) -> Self {
        Self {
            index,
            store,
            locks: Some(KeyLocks::default()),
            counters: Counters::default(),
        }
    }

    /// Create a volatile cache backed by [`InMemoryIndex`] and [`InMemoryStore`].
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemoryIndex::new()),
            Arc::new(InMemoryStore::new()),
        )
    }

    /// Open an on-disk cache: a SQLite index and a Parquet entry store.
    ///
    /// # Errors
    /// Returns [`DataError::StorageUnavailable`] if the cache directory or the
    /// index cannot be opened.
    #[cfg(feature = "sqlite")]
    pub fn open(config: &crate::CacheConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.cache_dir).map_err(|e| {
            DataError::StorageUnavailable(format!(
                "create {}: {}",
                config.cache_dir.display(),
                e
            ))
        })?;
        let index = tscache_storage::SqliteIndex::new(config.index_path())?;
        let store = tscache_storage::ParquetStore::new(&config.cache_dir);

        info!(cache_dir = %config.cache_dir.display(), "Opened time-series cache");
        Ok(Self::new(Arc::new(index), Arc::new(store))
            .with_per_key_locking(config.per_key_locking))
    }

    /// Enable or disable per-`(key, kind)` serialization of `resolve` calls.
    #[must_use]
    pub fn with_per_key_locking(mut self, enabled: bool) -> Self {
        self.locks = enabled.then(KeyLocks::default);
        self
    }

    /// The metadata index.
    pub fn index(&self) -> &Arc<dyn CacheIndex> {
        &self.index
    }

    /// The entry store.
    pub fn store(&self) -> &Arc<dyn EntryStore> {
        &self.store
    }

    /// Returns rows for `range`, fetching only the parts not already cached.
    ///
    /// Failures local to one gap or one entry are logged and skipped, so the
    /// result may be partial. See [`resolve_with_report`](Self::resolve_with_report).
    ///
    /// # Errors
    /// Returns an error only if the collected rows cannot be merged.
    pub async fn resolve<F>(
        &self,
        key: &CacheKey,
        kind: DataKind,
        range: DateRange,
        fetcher: &F,
        parameters: &Parameters,
    ) -> Result<DataFrame>
    where
        F: Fetcher + ?Sized,
    {
        self.resolve_with_report(key, kind, range, fetcher, parameters)
            .await
            .map(|(rows, _)| rows)
    }

    /// Like [`resolve`](Self::resolve), also returning what the call did.
    ///
    /// Duplicate timestamps resolve to the most recently fetched copy: cached
    /// entries are merged in order of `last_updated`, and rows fetched during
    /// this call but not persisted come last.
    ///
    /// # Errors
    /// Returns an error only if the collected rows cannot be merged.
    #[instrument(skip(self, fetcher, parameters), fields(key = %key, kind = %kind, range = %range))]
    pub async fn resolve_with_report<F>(
        &self,
        key: &CacheKey,
        kind: DataKind,
        range: DateRange,
        fetcher: &F,
        parameters: &Parameters,
    ) -> Result<(DataFrame, ResolveReport)>
    where
        F: Fetcher + ?Sized,
    {
        let _guard = match &self.locks {
            Some(locks) => Some(locks.acquire(key, kind).await),
            None => None,
        };

        let mut report = ResolveReport::default();
        let coverage = match self.check_coverage(key, kind, range, parameters).await {
            Ok(coverage) => coverage,
            Err(e) => {
                warn!(error = %e, "Index unavailable, fetching full range");
                report.index_degraded = true;
                Coverage {
                    gaps: vec![range],
                    entries: Vec::new(),
                }
            }
        };

        report.gaps = coverage.gaps.clone();
        report.entries_reused = coverage.entries.len();
        report.hit = coverage.is_complete();
        if report.hit {
            debug!(entries = coverage.entries.len(), "Cache hit");
        } else {
            debug!(
                gaps = coverage.gaps.len(),
                missing_days = coverage.missing_days(),
                "Cache miss"
            );
        }

        let mut written = Vec::new();
        let mut fresh = Vec::new();
        for &gap in &coverage.gaps {
            let rows = match fetcher.fetch(key, gap, parameters).await {
                Ok(rows) => rows,
                Err(e @ DataError::DataNotAvailable { .. }) => {
                    debug!(gap = %gap, error = %e, "No data upstream, not caching");
                    report.empty.push(gap);
                    continue;
                }
                Err(e) => {
                    warn!(gap = %gap, error = %e, "Fetch failed, skipping gap");
                    report.failures.push(DataError::FetchFailed {
                        key: key.to_string(),
                        start: gap.start().to_string(),
                        end: gap.end().to_string(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            if rows.height() == 0 {
                debug!(gap = %gap, "Fetch returned no rows, not caching");
                report.empty.push(gap);
                continue;
            }

            info!(gap = %gap, rows = rows.height(), "Fetched gap");
            report.fetched.push(gap);
            match self.put(key, kind, gap, parameters, &rows).await {
                Ok(entry) => written.push(entry),
                Err(e @ DataError::MissingTimestampField(_)) => {
                    warn!(gap = %gap, error = %e, "Rejected rows without a timestamp field");
                    report.failures.push(e);
                }
                Err(e) => {
                    warn!(gap = %gap, error = %e, "Failed to persist gap, serving rows uncached");
                    report.unpersisted.push(gap);
                    fresh.push(rows);
                }
            }
        }

        let entries = if report.index_degraded {
            written.clone()
        } else {
            match self.index.query(key, kind, range, Some(parameters)).await {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(error = %e, "Index unavailable on read-back, using known entries");
                    report.index_degraded = true;
                    let mut entries = coverage.entries;
                    entries.extend(written.iter().cloned());
                    entries
                }
            }
        };

        let (mut frames, unreadable) = self.load_entries(entries).await;
        let fetched_any = !written.is_empty() || !fresh.is_empty();
        frames.extend(fresh);
        let rows = merge_frames(frames, range)?;

        report.entries_unreadable = unreadable.len();
        self.forget(&unreadable).await;

        if report.hit {
            Counters::bump(&self.counters.hits, 1);
        } else {
            Counters::bump(&self.counters.misses, 1);
        }
        Counters::bump(&self.counters.api_calls_saved, report.entries_reused as u64);
        if report.entries_reused > 0 && fetched_any {
            Counters::bump(&self.counters.merges, 1);
        }

        debug!(rows = rows.height(), "Resolved");
        Ok((rows, report))
    }

    /// Computes which parts of `range` are cached for this parameter set.
    ///
    /// # Errors
    /// Returns [`DataError::StorageUnavailable`] if the index cannot be read.
    pub async fn check_coverage(
        &self,
        key: &CacheKey,
        kind: DataKind,
        range: DateRange,
        parameters: &Parameters,
    ) -> Result<Coverage> {
        let entries = self
            .index
            .query(key, kind, range, Some(parameters))
            .await?;
        Ok(resolve_coverage(range, entries))
    }

    /// Returns the cached rows for `range` if it is fully covered, without
    /// fetching.
    ///
    /// Returns `None` when any day of the range is uncovered or a covering
    /// entry cannot be read.
    ///
    /// # Errors
    /// Returns an error if the index cannot be read or the rows cannot be merged.
    #[instrument(skip(self, parameters), fields(key = %key, kind = %kind, range = %range))]
    pub async fn get_cached(
        &self,
        key: &CacheKey,
        kind: DataKind,
        range: DateRange,
        parameters: &Parameters,
    ) -> Result<Option<DataFrame>> {
        let coverage = self.check_coverage(key, kind, range, parameters).await?;
        if !coverage.is_complete() {
            debug!(gaps = coverage.gaps.len(), "Cached data incomplete");
            return Ok(None);
        }

        let (frames, unreadable) = self.load_entries(coverage.entries).await;
        if !unreadable.is_empty() {
            self.forget(&unreadable).await;
            return Ok(None);
        }

        let rows = merge_frames(frames, range)?;
        Counters::bump(&self.counters.hits, 1);
        Ok(Some(rows))
    }

    /// Persists `rows` as the entry for `(key, kind, range, parameters)`,
    /// replacing any entry with the same identity.
    ///
    /// # Errors
    /// Returns [`DataError::InvalidParameter`] for an empty row set,
    /// [`DataError::MissingTimestampField`] if the rows have no timestamp
    /// field, or the store or index error that prevented the write.
    #[instrument(skip(self, parameters, rows), fields(key = %key, kind = %kind, range = %range, rows = rows.height()))]
    pub async fn put(
        &self,
        key: &CacheKey,
        kind: DataKind,
        range: DateRange,
        parameters: &Parameters,
        rows: &DataFrame,
    ) -> Result<CacheEntry> {
        if rows.height() == 0 {
            return Err(DataError::InvalidParameter(
                "refusing to cache an empty row set".to_string(),
            ));
        }

        let path = self.store.write(key, kind, range, parameters, rows).await?;
        let entry = CacheEntry::new(key.clone(), kind, range, parameters.clone(), path);
        self.index.upsert(&entry).await?;

        debug!(path = %entry.storage_path.display(), "Cached entry");
        Ok(entry)
    }

    /// Reads entries oldest first, splitting off the unreadable ones.
    async fn load_entries(
        &self,
        mut entries: Vec<CacheEntry>,
    ) -> (Vec<DataFrame>, Vec<CacheEntry>) {
        entries.sort_by_key(|entry| entry.last_updated);

        let mut frames = Vec::with_capacity(entries.len());
        let mut unreadable = Vec::new();
        for entry in entries {
            match self.store.read(&entry.storage_path).await {
                Ok(df) => frames.push(df),
                Err(e) => {
                    warn!(
                        path = %entry.storage_path.display(),
                        error = %e,
                        "Skipping unreadable entry"
                    );
                    unreadable.push(entry);
                }
            }
        }
        (frames, unreadable)
    }

    /// Drops index rows whose data is gone, so the next call re-fetches them.
    async fn forget(&self, entries: &[CacheEntry]) {
        for entry in entries {
            if let Err(e) = self.index.remove(entry).await {
                warn!(
                    path = %entry.storage_path.display(),
                    error = %e,
                    "Failed to drop unreadable entry from index"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{Datelike, Duration, NaiveDate};
    use polars::prelude::*;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;
    use tscache_core::EntryFilter;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn range(start: u32, end: u32) -> DateRange {
        DateRange::new(date(start), date(end)).unwrap()
    }

    fn daily(range: DateRange, close: f64) -> DataFrame {
        let days: Vec<i32> = (0..range.num_days())
            .map(|i| (range.start() + Duration::days(i)).num_days_from_ce() - 719_163)
            .collect();
        let closes = vec![close; days.len()];
        DataFrame::new(vec![
            Column::new("date".into(), days)
                .cast(&DataType::Date)
                .unwrap(),
            Column::new("close".into(), closes),
        ])
        .unwrap()
    }

    fn closes(df: &DataFrame) -> Vec<f64> {
        df.column("close")
            .unwrap()
            .f64()
            .unwrap()
            .into_no_null_iter()
            .collect()
    }

    /// Returns one row per day at a fixed close and records every call.
    #[derive(Debug, Default)]
    struct Recorder {
        close: f64,
        calls: Mutex<Vec<DateRange>>,
    }

    impl Recorder {
        fn with_close(close: f64) -> Self {
            Self {
                close,
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<DateRange> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Fetcher for Recorder {
        async fn fetch(
            &self,
            _key: &CacheKey,
            range: DateRange,
            _parameters: &Parameters,
        ) -> Result<DataFrame> {
            self.calls.lock().unwrap().push(range);
            Ok(daily(range, self.close))
        }
    }

    /// Store whose writes always fail.
    #[derive(Debug, Default)]
    struct ReadOnlyStore(InMemoryStore);

    #[async_trait]
    impl EntryStore for ReadOnlyStore {
        fn path_for(
            &self,
            key: &CacheKey,
            kind: DataKind,
            range: DateRange,
            parameters: &Parameters,
        ) -> PathBuf {
            self.0.path_for(key, kind, range, parameters)
        }

        async fn write(
            &self,
            _key: &CacheKey,
            _kind: DataKind,
            _range: DateRange,
            _parameters: &Parameters,
            _rows: &DataFrame,
        ) -> Result<PathBuf> {
            Err(DataError::Cache("disk full".to_string()))
        }

        async fn read(&self, path: &Path) -> Result<DataFrame> {
            self.0.read(path).await
        }

        async fn delete(&self, path: &Path) -> Result<()> {
            self.0.delete(path).await
        }

        async fn disk_usage(&self) -> Result<u64> {
            self.0.disk_usage().await
        }
    }

    #[tokio::test]
    async fn test_hit_and_miss_counters() {
        let cache = TimeSeriesCache::in_memory();
        let fetcher = Recorder::with_close(1.0);
        let key = CacheKey::new("AAPL");
        let params = Parameters::new();

        let (rows, report) = cache
            .resolve_with_report(&key, DataKind::Ohlcv, range(1, 10), &fetcher, &params)
            .await
            .unwrap();
        assert_eq!(rows.height(), 10);
        assert!(!report.hit);
        assert_eq!(report.fetched, vec![range(1, 10)]);

        let (_, report) = cache
            .resolve_with_report(&key, DataKind::Ohlcv, range(2, 8), &fetcher, &params)
            .await
            .unwrap();
        assert!(report.hit);
        assert_eq!(report.entries_reused, 1);
        assert_eq!(fetcher.calls().len(), 1);

        assert_eq!(cache.counters.hits.load(Ordering::Relaxed), 1);
        assert_eq!(cache.counters.misses.load(Ordering::Relaxed), 1);
        assert_eq!(cache.counters.api_calls_saved.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_fresh_rows_win_over_cached() {
        let cache = TimeSeriesCache::in_memory();
        let key = CacheKey::new("AAPL");
        let params = Parameters::new();

        let mut stale = cache
            .put(&key, DataKind::Ohlcv, range(1, 5), &params, &daily(range(1, 5), 1.0))
            .await
            .unwrap();
        stale.last_updated -= Duration::hours(1);
        cache.index.upsert(&stale).await.unwrap();
        cache
            .put(&key, DataKind::Ohlcv, range(6, 8), &params, &daily(range(3, 8), 2.0))
            .await
            .unwrap();

        let fetcher = Recorder::with_close(9.0);
        let rows = cache
            .resolve(&key, DataKind::Ohlcv, range(1, 8), &fetcher, &params)
            .await
            .unwrap();

        assert!(fetcher.calls().is_empty());
        assert_eq!(closes(&rows), vec![1.0, 1.0, 2.0, 2.0, 2.0, 2.0, 2.0, 2.0]);
        assert_eq!(cache.counters.merges.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_merge_counter_on_partial_hit() {
        let cache = TimeSeriesCache::in_memory();
        let key = CacheKey::new("AAPL");
        let params = Parameters::new();
        let fetcher = Recorder::with_close(1.0);

        cache
            .resolve(&key, DataKind::Ohlcv, range(1, 5), &fetcher, &params)
            .await
            .unwrap();
        cache
            .resolve(&key, DataKind::Ohlcv, range(1, 9), &fetcher, &params)
            .await
            .unwrap();

        assert_eq!(fetcher.calls(), vec![range(1, 5), range(6, 9)]);
        assert_eq!(cache.counters.merges.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_write_failure_still_returns_rows() {
        let cache = TimeSeriesCache::new(
            Arc::new(InMemoryIndex::new()),
            Arc::new(ReadOnlyStore::default()),
        );
        let fetcher = Recorder::with_close(3.0);
        let key = CacheKey::new("AAPL");

        let (rows, report) = cache
            .resolve_with_report(&key, DataKind::Ohlcv, range(1, 4), &fetcher, &Parameters::new())
            .await
            .unwrap();

        assert_eq!(rows.height(), 4);
        assert_eq!(report.unpersisted, vec![range(1, 4)]);
        assert!(cache.index.count_by_kind().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rows_without_timestamp_are_rejected() {
        let cache = TimeSeriesCache::in_memory();
        let fetcher = |_key: CacheKey, _range: DateRange, _params: Parameters| async move {
            Ok::<_, DataError>(
                DataFrame::new(vec![Column::new("close".into(), vec![1.0, 2.0])]).unwrap(),
            )
        };

        let (rows, report) = cache
            .resolve_with_report(
                &CacheKey::new("AAPL"),
                DataKind::Ohlcv,
                range(1, 2),
                &fetcher,
                &Parameters::new(),
            )
            .await
            .unwrap();

        assert_eq!(rows.height(), 0);
        assert!(matches!(
            report.failures.as_slice(),
            [DataError::MissingTimestampField(_)]
        ));
        assert!(report.unpersisted.is_empty());
    }

    #[tokio::test]
    async fn test_gap_rows_with_wider_types_are_kept() {
        let cache = TimeSeriesCache::in_memory();
        let key = CacheKey::new("AAPL");
        let params = Parameters::new();
        let cached = daily(range(1, 10), 1.0)
            .hstack(&[Column::new("volume".into(), vec![100.0f64; 10])])
            .unwrap();
        cache
            .put(&key, DataKind::Ohlcv, range(1, 10), &params, &cached)
            .await
            .unwrap();

        let fetcher = |_key: CacheKey, gap: DateRange, _params: Parameters| async move {
            let rows = daily(gap, 2.0);
            let height = rows.height();
            Ok::<_, DataError>(
                rows.hstack(&[Column::new("volume".into(), vec![200i64; height])])
                    .unwrap(),
            )
        };

        let (rows, report) = cache
            .resolve_with_report(&key, DataKind::Ohlcv, range(5, 15), &fetcher, &params)
            .await
            .unwrap();
        assert_eq!(report.fetched, vec![range(11, 15)]);
        assert_eq!(rows.height(), 11);
        assert_eq!(rows.column("volume").unwrap().null_count(), 0);

        let (again, report) = cache
            .resolve_with_report(&key, DataKind::Ohlcv, range(5, 15), &fetcher, &params)
            .await
            .unwrap();
        assert!(report.hit);
        assert_eq!(again.height(), 11);
        assert_eq!(closes(&again)[10], 2.0);
    }

    #[tokio::test]
    async fn test_datetime_string_rows_are_cached() {
        let cache = TimeSeriesCache::in_memory();
        let key = CacheKey::new("AAPL");
        let params = Parameters::new();
        let fetcher = |_key: CacheKey, _gap: DateRange, _params: Parameters| async move {
            Ok::<_, DataError>(
                DataFrame::new(vec![
                    Column::new("timestamp".into(), vec!["2024-01-02T14:30:00", "2024-01-03 09:45"]),
                    Column::new("headline".into(), vec!["guidance raised", "analyst day"]),
                ])
                .unwrap(),
            )
        };

        let (rows, report) = cache
            .resolve_with_report(&key, DataKind::News, range(1, 5), &fetcher, &params)
            .await
            .unwrap();
        assert!(report.failures.is_empty());
        assert_eq!(rows.height(), 2);

        let cached = cache
            .get_cached(&key, DataKind::News, range(1, 5), &params)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cached.height(), 2);
        assert_eq!(cached.column("timestamp").unwrap().null_count(), 0);
    }

    #[tokio::test]
    async fn test_unparseable_timestamps_are_not_cached() {
        let cache = TimeSeriesCache::in_memory();
        let fetcher = |_key: CacheKey, _gap: DateRange, _params: Parameters| async move {
            Ok::<_, DataError>(
                DataFrame::new(vec![
                    Column::new("date".into(), vec!["yesterday"]),
                    Column::new("close".into(), vec![1.0]),
                ])
                .unwrap(),
            )
        };

        let (_, report) = cache
            .resolve_with_report(
                &CacheKey::new("AAPL"),
                DataKind::Ohlcv,
                range(1, 2),
                &fetcher,
                &Parameters::new(),
            )
            .await
            .unwrap();
        assert!(matches!(
            report.failures.as_slice(),
            [DataError::MissingTimestampField(_)]
        ));
        assert!(cache.index.count_by_kind().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_upstream_is_an_empty_gap() {
        let cache = TimeSeriesCache::in_memory();
        let fetcher = |key: CacheKey, gap: DateRange, _params: Parameters| async move {
            Err::<DataFrame, _>(DataError::DataNotAvailable {
                key: key.to_string(),
                start: gap.start().to_string(),
                end: gap.end().to_string(),
            })
        };

        let (rows, report) = cache
            .resolve_with_report(
                &CacheKey::new("DELISTED"),
                DataKind::Ohlcv,
                range(1, 5),
                &fetcher,
                &Parameters::new(),
            )
            .await
            .unwrap();

        assert_eq!(rows.height(), 0);
        assert_eq!(report.empty, vec![range(1, 5)]);
        assert!(report.failures.is_empty());
        assert!(cache.index.count_by_kind().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rate_limited_gap_is_reported() {
        let cache = TimeSeriesCache::in_memory();
        let fetcher = |_key: CacheKey, _gap: DateRange, _params: Parameters| async move {
            Err::<DataFrame, _>(DataError::RateLimited {
                provider: "alphavantage".to_string(),
                retry_after: Some(std::time::Duration::from_secs(60)),
            })
        };

        let (_, report) = cache
            .resolve_with_report(
                &CacheKey::new("AAPL"),
                DataKind::Ohlcv,
                range(1, 5),
                &fetcher,
                &Parameters::new(),
            )
            .await
            .unwrap();

        match report.failures.as_slice() {
            [DataError::FetchFailed { reason, .. }] => {
                assert!(reason.starts_with("Rate limited by alphavantage"));
            }
            other => panic!("unexpected failures: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_parameters_partition_coverage() {
        let cache = TimeSeriesCache::in_memory();
        let fetcher = Recorder::with_close(1.0);
        let key = CacheKey::new("AAPL");
        let rsi = Parameters::new().with("indicator", "rsi");
        let macd = Parameters::new().with("indicator", "macd");

        cache
            .resolve(&key, DataKind::Indicators, range(1, 5), &fetcher, &rsi)
            .await
            .unwrap();
        cache
            .resolve(&key, DataKind::Indicators, range(1, 5), &fetcher, &macd)
            .await
            .unwrap();
        cache
            .resolve(&key, DataKind::Indicators, range(1, 5), &fetcher, &rsi)
            .await
            .unwrap();

        assert_eq!(fetcher.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_get_cached_and_check_coverage() {
        let cache = TimeSeriesCache::in_memory();
        let key = CacheKey::new("AAPL");
        let params = Parameters::new();
        cache
            .put(&key, DataKind::Ohlcv, range(1, 10), &params, &daily(range(1, 10), 1.0))
            .await
            .unwrap();

        let coverage = cache
            .check_coverage(&key, DataKind::Ohlcv, range(5, 15), &params)
            .await
            .unwrap();
        assert_eq!(coverage.gaps, vec![range(11, 15)]);

        assert!(
            cache
                .get_cached(&key, DataKind::Ohlcv, range(5, 15), &params)
                .await
                .unwrap()
                .is_none()
        );
        let rows = cache
            .get_cached(&key, DataKind::Ohlcv, range(5, 10), &params)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rows.height(), 6);
        assert_eq!(cache.counters.hits.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_put_rejects_empty_rows() {
        let cache = TimeSeriesCache::in_memory();
        let result = cache
            .put(
                &CacheKey::new("AAPL"),
                DataKind::Ohlcv,
                range(1, 2),
                &Parameters::new(),
                &DataFrame::empty(),
            )
            .await;
        assert!(matches!(result, Err(DataError::InvalidParameter(_))));
        assert_eq!(
            cache.index.delete(&EntryFilter::all()).await.unwrap().count,
            0
        );
    }

    #[tokio::test]
    async fn test_locking_can_be_disabled() {
        let cache = TimeSeriesCache::in_memory().with_per_key_locking(false);
        assert!(format!("{:?}", cache).contains("per_key_locking: false"));
    }
}
