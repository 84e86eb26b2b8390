//! Parquet-file entry store.

use async_trait::async_trait;
use polars::prelude::{DataFrame, ParquetReader, ParquetWriter, SerReader};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};
use tscache_core::{
    CacheKey, DataError, DataKind, DateRange, EntryStore, Parameters, Result, entry_file_name,
    normalize_timestamps,
};

/// Stores each entry as one Parquet file.
///
/// Layout: `{root}/{kind}/{key}_{hash}.parquet`. Writes go to a `.tmp` sibling
/// first and are renamed into place, so readers never see a partial file.
/// File I/O and Parquet encoding run on tokio's blocking pool.
#[derive(Debug, Clone)]
pub struct ParquetStore {
    root: PathBuf,
}

impl ParquetStore {
    /// Create a store rooted at `root`. The directory is created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn unreadable(path: &Path, reason: impl std::fmt::Display) -> DataError {
    DataError::EntryUnreadable {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}

fn write_parquet(df: &DataFrame, path: &Path) -> Result<()> {
    let file = fs::File::create(path)
        .map_err(|e| DataError::Cache(format!("create {}: {}", path.display(), e)))?;
    ParquetWriter::new(file)
        .finish(&mut df.clone())
        .map_err(|e| DataError::Cache(format!("write parquet {}: {}", path.display(), e)))?;
    Ok(())
}

/// Runs filesystem work off the async worker threads.
async fn blocking<T, F>(task: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| DataError::Cache(format!("blocking task failed: {}", e)))?
}

/// Total size of regular files under `dir`, recursing into subdirectories.
fn dir_size(dir: &Path) -> std::io::Result<u64> {
    let mut total = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        if meta.is_dir() {
            total += dir_size(&entry.path())?;
        } else {
            total += meta.len();
        }
    }
    Ok(total)
}

#[async_trait]
impl EntryStore for ParquetStore {
    fn path_for(
        &self,
        key: &CacheKey,
        kind: DataKind,
        range: DateRange,
        parameters: &Parameters,
    ) -> PathBuf {
        self.root
            .join(kind.as_str())
            .join(entry_file_name(key, kind, range, parameters))
    }

    #[instrument(skip(self, parameters, rows), fields(key = %key, kind = %kind, range = %range, rows = rows.height()))]
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

        let target = path.clone();
        blocking(move || {
            if let Some(dir) = target.parent() {
                fs::create_dir_all(dir).map_err(|e| {
                    DataError::Cache(format!("create dir {}: {}", dir.display(), e))
                })?;
            }

            let tmp_path = target.with_extension("parquet.tmp");
            write_parquet(&df, &tmp_path)?;

            fs::rename(&tmp_path, &target).map_err(|e| {
                let _ = fs::remove_file(&tmp_path);
                DataError::Cache(format!("atomic rename failed: {}", e))
            })
        })
        .await?;

        debug!(path = %path.display(), "Wrote entry file");
        Ok(path)
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    async fn read(&self, path: &Path) -> Result<DataFrame> {
        let source = path.to_path_buf();
        let df = blocking(move || {
            let file = fs::File::open(&source).map_err(|e| unreadable(&source, e))?;
            ParquetReader::new(file)
                .finish()
                .map_err(|e| unreadable(&source, e))
        })
        .await?;
        debug!(rows = df.height(), "Read entry file");
        Ok(df)
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        let path = path.to_path_buf();
        blocking(move || match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DataError::Cache(format!(
                "delete {}: {}",
                path.display(),
                e
            ))),
        })
        .await
    }

    async fn disk_usage(&self) -> Result<u64> {
        let root = self.root.clone();
        blocking(move || match dir_size(&root) {
            Ok(total) => Ok(total),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
            Err(e) => Err(DataError::Cache(format!(
                "disk usage of {}: {}",
                root.display(),
                e
            ))),
        })
        .await
    }
}
