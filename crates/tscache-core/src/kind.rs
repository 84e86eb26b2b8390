//! Data kind definitions.
//!
//! This module defines [`DataKind`], the fixed set of data categories the cache
//! partitions its entries by.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DataError;

/// Category of cached time-series data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataKind {
    /// Open, high, low, close, volume price bars.
    Ohlcv,
    /// News articles.
    News,
    /// Financial statements.
    Fundamentals,
    /// Technical indicators.
    Indicators,
    /// Insider transactions.
    Insider,
    /// Sentiment data.
    Sentiment,
    /// Economic indicators.
    Economic,
}

impl DataKind {
    /// Every kind, in declaration order.
    pub const ALL: [Self; 7] = [
        Self::Ohlcv,
        Self::News,
        Self::Fundamentals,
        Self::Indicators,
        Self::Insider,
        Self::Sentiment,
        Self::Economic,
    ];

    /// Returns the persisted name of this kind.
    ///
    /// The name is stored in the index and doubles as the entry store's
    /// directory name for the kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ohlcv => "ohlcv",
            Self::News => "news",
            Self::Fundamentals => "fundamentals",
            Self::Indicators => "indicators",
            Self::Insider => "insider",
            Self::Sentiment => "sentiment",
            Self::Economic => "economic",
        }
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataKind {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| DataError::Parse(format!("Invalid data kind: {}", s)))
    }
}
