//! Error types for cache operations.
//!
//! This module defines [`DataError`] which covers every failure the cache can
//! observe: an unavailable metadata index, an unreadable entry file, a failed
//! upstream fetch, a row set without a timestamp field, and the errors fetch
//! callbacks report about their upstream sources.

use thiserror::Error;

/// Errors that can occur during cache operations.
#[derive(Error, Debug)]
pub enum DataError {
    /// The metadata index could not be opened, read, or written.
    ///
    /// Resolving callers degrade to a full-range fetch when they see this.
    #[error("Cache index unavailable: {0}")]
    StorageUnavailable(String),

    /// A cached entry file is missing or corrupt.
    #[error("Cache entry unreadable at {path}: {reason}")]
    EntryUnreadable {
        /// Location of the entry's row data.
        path: String,
        /// Why the file could not be read.
        reason: String,
    },

    /// The fetch callback failed for one gap.
    #[error("Fetch failed for {key} in range {start} to {end}: {reason}")]
    FetchFailed {
        /// The key that was requested.
        key: String,
        /// Start of the gap.
        start: String,
        /// End of the gap.
        end: String,
        /// The upstream error message.
        reason: String,
    },

    /// A row set has no recognizable timestamp field and cannot be cached.
    #[error("Missing timestamp field: {0}")]
    MissingTimestampField(String),

    /// Writing an entry's row data failed.
    #[error("Cache error: {0}")]
    Cache(String),

    /// Error parsing or converting data.
    #[error("Parse error: {0}")]
    Parse(String),

    /// An invalid parameter was provided.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Network-related errors reported by a fetch callback.
    #[error("Network error: {0}")]
    Network(String),

    /// Rate limit exceeded by an upstream source.
    #[error("Rate limited by {provider}: retry after {retry_after:?}")]
    RateLimited {
        /// The source that rate limited the request.
        provider: String,
        /// Suggested time to wait before retrying.
        retry_after: Option<std::time::Duration>,
    },

    /// Data is not available upstream for the requested key and date range.
    ///
    /// Resolving callers treat this like an empty result for the gap.
    #[error("Data not available for {key} in range {start} to {end}")]
    DataNotAvailable {
        /// The key that was requested.
        key: String,
        /// Start of the requested date range.
        start: String,
        /// End of the requested date range.
        end: String,
    },
}

/// Result type alias using [`DataError`].
pub type Result<T> = std::result::Result<T, DataError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_unreadable_message() {
        let err = DataError::EntryUnreadable {
            path: "ohlcv/AAPL_0123.parquet".to_string(),
            reason: "missing".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Cache entry unreadable at ohlcv/AAPL_0123.parquet: missing"
        );
    }

    #[test]
    fn test_rate_limited_message() {
        let err = DataError::RateLimited {
            provider: "alphavantage".to_string(),
            retry_after: None,
        };
        assert_eq!(err.to_string(), "Rate limited by alphavantage: retry after None");
    }

    #[test]
    fn test_error_messages() {
        let err = DataError::FetchFailed {
            key: "AAPL".to_string(),
            start: "2024-01-11".to_string(),
            end: "2024-01-20".to_string(),
            reason: "timeout".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Fetch failed for AAPL in range 2024-01-11 to 2024-01-20: timeout"
        );
    }
}
