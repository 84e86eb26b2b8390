//! Cache configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Settings for opening an on-disk [`TimeSeriesCache`](crate::TimeSeriesCache).
///
/// Every field has a default, so a partial config file deserializes cleanly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Root directory holding the index file and the per-kind entry directories.
    pub cache_dir: PathBuf,
    /// Index file name, resolved relative to `cache_dir` unless absolute.
    pub index_file: PathBuf,
    /// Serialize `resolve` calls per `(key, kind)` within this process.
    pub per_key_locking: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("data_cache/time_series"),
            index_file: PathBuf::from("cache_index.db"),
            per_key_locking: true,
        }
    }
}

impl CacheConfig {
    /// Create a config with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cache root directory.
    #[must_use]
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    /// Set the index file name or path.
    #[must_use]
    pub fn with_index_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.index_file = file.into();
        self
    }

    /// Enable or disable per-key locking.
    #[must_use]
    pub const fn with_per_key_locking(mut self, enabled: bool) -> Self {
        self.per_key_locking = enabled;
        self
    }

    /// Full path of the index file.
    #[must_use]
    pub fn index_path(&self) -> PathBuf {
        self.cache_dir.join(&self.index_file)
    }
}
