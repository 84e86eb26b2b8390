//! Per-kind convenience wrappers around [`TimeSeriesCache::resolve`].

use chrono::NaiveDate;
use polars::prelude::DataFrame;
use std::fmt;
use std::str::FromStr;

use tscache_core::{CacheKey, DataError, DataKind, DateRange, Fetcher, Parameters, Result, Symbol};

use crate::cache::TimeSeriesCache;

/// Insider datasets, each cached under its own kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InsiderDataset {
    /// Insider transactions.
    Transactions,
    /// Insider sentiment scores.
    Sentiment,
}

impl InsiderDataset {
    /// Kind the dataset is cached under.
    #[must_use]
    pub const fn kind(&self) -> DataKind {
        match self {
            Self::Transactions => DataKind::Insider,
            Self::Sentiment => DataKind::Sentiment,
        }
    }

    /// Value of the `data_type` parameter passed to the fetcher.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Transactions => "insider_trans",
            Self::Sentiment => "insider_senti",
        }
    }
}

impl fmt::Display for InsiderDataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InsiderDataset {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "transactions" | "insider_trans" => Ok(Self::Transactions),
            "sentiment" | "insider_senti" => Ok(Self::Sentiment),
            other => Err(DataError::InvalidParameter(format!(
                "unknown insider dataset '{}'",
                other
            ))),
        }
    }
}

impl TimeSeriesCache {
    /// Daily price bars for `symbol`.
    pub async fn fetch_ohlcv<F>(
        &self,
        symbol: &Symbol,
        range: DateRange,
        fetcher: &F,
    ) -> Result<DataFrame>
    where
        F: Fetcher + ?Sized,
    {
        self.resolve(&symbol.into(), DataKind::Ohlcv, range, fetcher, &Parameters::new())
            .await
    }

    /// Price bars for the `look_back_days` days up to and including `end`.
    pub async fn fetch_ohlcv_window<F>(
        &self,
        symbol: &Symbol,
        end: NaiveDate,
        look_back_days: u32,
        fetcher: &F,
    ) -> Result<DataFrame>
    where
        F: Fetcher + ?Sized,
    {
        self.fetch_ohlcv(symbol, DateRange::lookback(end, look_back_days), fetcher)
            .await
    }

    /// News for a ticker or free-text query. The query's case is preserved.
    pub async fn fetch_news<F>(&self, query: &str, range: DateRange, fetcher: &F) -> Result<DataFrame>
    where
        F: Fetcher + ?Sized,
    {
        self.resolve(
            &CacheKey::new(query),
            DataKind::News,
            range,
            fetcher,
            &Parameters::new(),
        )
        .await
    }

    /// Fundamental data for `symbol`.
    pub async fn fetch_fundamentals<F>(
        &self,
        symbol: &Symbol,
        range: DateRange,
        fetcher: &F,
    ) -> Result<DataFrame>
    where
        F: Fetcher + ?Sized,
    {
        self.resolve(
            &symbol.into(),
            DataKind::Fundamentals,
            range,
            fetcher,
            &Parameters::new(),
        )
        .await
    }

    /// A technical indicator for `symbol`.
    ///
    /// `indicator` is added to `extra` as the `indicator` parameter, so each
    /// indicator and setting combination is cached separately.
    pub async fn fetch_indicator<F>(
        &self,
        symbol: &Symbol,
        indicator: &str,
        extra: Parameters,
        range: DateRange,
        fetcher: &F,
    ) -> Result<DataFrame>
    where
        F: Fetcher + ?Sized,
    {
        let parameters = extra.with("indicator", indicator);
        self.resolve(&symbol.into(), DataKind::Indicators, range, fetcher, &parameters)
            .await
    }

    /// Insider transactions or sentiment for `symbol`.
    pub async fn fetch_insider<F>(
        &self,
        symbol: &Symbol,
        dataset: InsiderDataset,
        range: DateRange,
        fetcher: &F,
    ) -> Result<DataFrame>
    where
        F: Fetcher + ?Sized,
    {
        let parameters = Parameters::new().with("data_type", dataset.as_str());
        self.resolve(&symbol.into(), dataset.kind(), range, fetcher, &parameters)
            .await
    }
}
