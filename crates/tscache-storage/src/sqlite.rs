//! SQLite-based cache index implementation.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::{Connection, Row, params, params_from_iter};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, instrument};
use tscache_core::{
    CacheEntry, CacheIndex, CacheKey, DataError, DataKind, DateRange, Deletion, EntryFilter,
    Parameters, Result,
};

/// Column list shared by every entry query, in [`SqliteIndex::entry_from_row`] order.
const ENTRY_COLUMNS: &str =
    "symbol, data_type, start_date, end_date, parameters, cache_path, last_updated";

fn unavailable(e: impl std::fmt::Display) -> DataError {
    DataError::StorageUnavailable(e.to_string())
}

/// Fixed-width RFC 3339 so lexical order matches time order.
fn timestamp_to_str(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// SQLite-based metadata index.
///
/// Entries live in a single `cache_entries` table keyed by
/// `(symbol, data_type, start_date, end_date, params_hash)`. The connection is
/// guarded by a mutex, so statements from concurrent callers are serialized.
#[derive(Debug)]
pub struct SqliteIndex {
    conn: Mutex<Connection>,
}

impl SqliteIndex {
    /// Open (or create) an index at the given path.
    ///
    /// # Arguments
    /// * `path` - Path to the SQLite database file
    ///
    /// # Errors
    /// Returns [`DataError::StorageUnavailable`] if the database cannot be
    /// opened or schema creation fails.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(unavailable)?;
        let index = Self {
            conn: Mutex::new(conn),
        };
        index.initialize_schema()?;
        Ok(index)
    }

    /// Create an in-memory SQLite index.
    ///
    /// Useful for testing; data is lost when the index is dropped.
    ///
    /// # Errors
    /// Returns an error if schema creation fails.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(unavailable)?;
        let index = Self {
            conn: Mutex::new(conn),
        };
        index.initialize_schema()?;
        Ok(index)
    }

    /// Initialize the database schema.
    fn initialize_schema(&self) -> Result<()> {
        let conn = self.conn.lock().map_err(unavailable)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS cache_entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                symbol TEXT NOT NULL,
                data_type TEXT NOT NULL,
                start_date TEXT NOT NULL,
                end_date TEXT NOT NULL,
                params_hash TEXT NOT NULL,
                parameters TEXT NOT NULL,
                cache_path TEXT NOT NULL,
                last_updated TEXT NOT NULL,
                UNIQUE (symbol, data_type, start_date, end_date, params_hash)
            )",
            [],
        )
        .map_err(unavailable)?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_symbol_type_date
             ON cache_entries(symbol, data_type, start_date, end_date)",
            [],
        )
        .map_err(unavailable)?;

        debug!("SQLite index schema initialized");
        Ok(())
    }

    /// Decode one `ENTRY_COLUMNS` row.
    fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<RawEntry> {
        Ok(RawEntry {
            symbol: row.get(0)?,
            data_type: row.get(1)?,
            start_date: row.get(2)?,
            end_date: row.get(3)?,
            parameters: row.get(4)?,
            cache_path: row.get(5)?,
            last_updated: row.get(6)?,
        })
    }

    /// Build the WHERE clause and bind values for a filter.
    fn filter_clause(filter: &EntryFilter) -> (String, Vec<String>) {
        let mut conditions = Vec::new();
        let mut values = Vec::new();

        if let Some(key) = &filter.key {
            values.push(key.to_string());
            conditions.push(format!("symbol = ?{}", values.len()));
        }
        if let Some(kind) = filter.kind {
            values.push(kind.as_str().to_string());
            conditions.push(format!("data_type = ?{}", values.len()));
        }
        if let Some(cutoff) = &filter.updated_before {
            values.push(timestamp_to_str(cutoff));
            conditions.push(format!("last_updated < ?{}", values.len()));
        }

        let clause = if conditions.is_empty() {
            "1=1".to_string()
        } else {
            conditions.join(" AND ")
        };
        (clause, values)
    }
}

/// Undecoded index row.
struct RawEntry {
    symbol: String,
    data_type: String,
    start_date: String,
    end_date: String,
    parameters: String,
    cache_path: String,
    last_updated: String,
}

impl RawEntry {
    /// Decode into a [`CacheEntry`]; malformed rows mean a corrupt index.
    fn decode(self) -> Result<CacheEntry> {
        let parse_date = |s: &str| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map_err(|e| unavailable(format!("corrupt date '{}': {}", s, e)))
        };
        let range = DateRange::new(parse_date(&self.start_date)?, parse_date(&self.end_date)?)
            .map_err(unavailable)?;
        let kind: DataKind = self.data_type.parse().map_err(unavailable)?;
        let parameters = Parameters::from_json(&self.parameters).map_err(unavailable)?;
        let last_updated = DateTime::parse_from_rfc3339(&self.last_updated)
            .map_err(|e| unavailable(format!("corrupt timestamp '{}': {}", self.last_updated, e)))?
            .with_timezone(&Utc);

        Ok(CacheEntry {
            key: CacheKey::new(self.symbol),
            kind,
            range,
            parameters,
            storage_path: PathBuf::from(self.cache_path),
            last_updated,
        })
    }
}

#[async_trait]
impl CacheIndex for SqliteIndex {
    #[instrument(skip(self, parameters), fields(key = %key, kind = %kind, range = %range))]
    async fn query(
        &self,
        key: &CacheKey,
        kind: DataKind,
        range: DateRange,
        parameters: Option<&Parameters>,
    ) -> Result<Vec<CacheEntry>> {
        let params_hash = parameters.map(Parameters::fingerprint);

        let conn = self.conn.lock().map_err(unavailable)?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {}
                 FROM cache_entries
                 WHERE symbol = ?1 AND data_type = ?2
                   AND end_date >= ?3 AND start_date <= ?4
                   AND (?5 IS NULL OR params_hash = ?5)
                 ORDER BY start_date ASC, end_date ASC",
                ENTRY_COLUMNS
            ))
            .map_err(unavailable)?;

        let rows = stmt
            .query_map(
                params![
                    key.as_str(),
                    kind.as_str(),
                    range.start().to_string(),
                    range.end().to_string(),
                    params_hash
                ],
                Self::entry_from_row,
            )
            .map_err(unavailable)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row.map_err(unavailable)?.decode()?);
        }

        debug!("Found {} intersecting entries", entries.len());
        Ok(entries)
    }

    #[instrument(skip(self, entry), fields(key = %entry.key, kind = %entry.kind, range = %entry.range))]
    async fn upsert(&self, entry: &CacheEntry) -> Result<()> {
        let conn = self.conn.lock().map_err(unavailable)?;

        conn.execute(
            "INSERT OR REPLACE INTO cache_entries
             (symbol, data_type, start_date, end_date, params_hash, parameters, cache_path, last_updated)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                entry.key.as_str(),
                entry.kind.as_str(),
                entry.range.start().to_string(),
                entry.range.end().to_string(),
                entry.parameters.fingerprint(),
                entry.parameters.to_json(),
                entry.storage_path.to_string_lossy(),
                timestamp_to_str(&entry.last_updated)
            ],
        )
        .map_err(unavailable)?;

        debug!("Upserted index entry");
        Ok(())
    }

    #[instrument(skip(self, entry), fields(key = %entry.key, kind = %entry.kind, range = %entry.range))]
    async fn remove(&self, entry: &CacheEntry) -> Result<bool> {
        let conn = self.conn.lock().map_err(unavailable)?;

        let removed = conn
            .execute(
                "DELETE FROM cache_entries
                 WHERE symbol = ?1 AND data_type = ?2 AND start_date = ?3
                   AND end_date = ?4 AND params_hash = ?5",
                params![
                    entry.key.as_str(),
                    entry.kind.as_str(),
                    entry.range.start().to_string(),
                    entry.range.end().to_string(),
                    entry.parameters.fingerprint()
                ],
            )
            .map_err(unavailable)?;

        Ok(removed > 0)
    }

    #[instrument(skip(self))]
    async fn delete(&self, filter: &EntryFilter) -> Result<Deletion> {
        let (clause, values) = Self::filter_clause(filter);

        let conn = self.conn.lock().map_err(unavailable)?;
        let tx = conn.unchecked_transaction().map_err(unavailable)?;

        let paths = {
            let mut stmt = tx
                .prepare(&format!(
                    "SELECT cache_path FROM cache_entries WHERE {}",
                    clause
                ))
                .map_err(unavailable)?;
            let rows = stmt
                .query_map(params_from_iter(values.iter()), |row| row.get::<_, String>(0))
                .map_err(unavailable)?;

            let mut paths = Vec::new();
            for row in rows {
                paths.push(PathBuf::from(row.map_err(unavailable)?));
            }
            paths
        };

        let count = tx
            .execute(
                &format!("DELETE FROM cache_entries WHERE {}", clause),
                params_from_iter(values.iter()),
            )
            .map_err(unavailable)?;

        tx.commit().map_err(unavailable)?;

        if count > 0 {
            debug!("Deleted {} index entries", count);
        }
        Ok(Deletion { paths, count })
    }

    async fn count_by_kind(&self) -> Result<BTreeMap<DataKind, usize>> {
        let conn = self.conn.lock().map_err(unavailable)?;

        let mut stmt = conn
            .prepare("SELECT data_type, COUNT(*) FROM cache_entries GROUP BY data_type")
            .map_err(unavailable)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
            .map_err(unavailable)?;

        let mut counts = BTreeMap::new();
        for row in rows {
            let (data_type, count) = row.map_err(unavailable)?;
            let kind: DataKind = data_type.parse().map_err(unavailable)?;
            counts.insert(kind, usize::try_from(count).unwrap_or_default());
        }
        Ok(counts)
    }
}
