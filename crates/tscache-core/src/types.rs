//! Core data types for cached time-series data.
//!
//! This module defines the fundamental data structures:
//!
//! - [`Symbol`] - Trading symbol/ticker
//! - [`CacheKey`] - Logical identity of a cached subject (ticker or query)
//! - [`DateRange`] - Inclusive calendar-date range
//! - [`Parameters`] - Fetch-call parameters that participate in entry identity
//! - [`CacheEntry`] - One persisted fetch result
//! - [`EntryFilter`] - Selection of entries for deletion

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{DataError, Result};
use crate::kind::DataKind;

/// A trading symbol/ticker.
///
/// Symbols are automatically uppercased on creation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Symbol(String);

impl Symbol {
    /// Creates a new symbol from a string, converting to uppercase.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into().trim().to_uppercase())
    }

    /// Returns the symbol as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Symbol {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Symbol {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Logical identity of a cached subject.
///
/// Unlike [`Symbol`], a key preserves case so free-text queries (for example a
/// news search string) are passed to the fetch callback unchanged. Surrounding
/// whitespace is trimmed.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    /// Creates a new key.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        let s = s.into();
        Self(s.trim().to_string())
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CacheKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for CacheKey {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<Symbol> for CacheKey {
    fn from(symbol: Symbol) -> Self {
        Self(symbol.0)
    }
}

impl From<&Symbol> for CacheKey {
    fn from(symbol: &Symbol) -> Self {
        Self(symbol.0.clone())
    }
}

/// An inclusive range of calendar dates, `[start, end]`.
///
/// The invariant `start <= end` is enforced on construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    /// Creates a new range.
    ///
    /// # Errors
    /// Returns [`DataError::InvalidParameter`] if `start` is after `end`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(DataError::InvalidParameter(format!(
                "range start {} is after end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    /// Creates a range covering a single day.
    #[must_use]
    pub const fn day(date: NaiveDate) -> Self {
        Self {
            start: date,
            end: date,
        }
    }

    /// Creates the range `[end - look_back_days, end]`.
    ///
    /// Saturates at the earliest representable date.
    #[must_use]
    pub fn lookback(end: NaiveDate, look_back_days: u32) -> Self {
        let start = end
            .checked_sub_signed(Duration::days(i64::from(look_back_days)))
            .unwrap_or(NaiveDate::MIN);
        Self { start, end }
    }

    /// First day of the range.
    #[must_use]
    pub const fn start(&self) -> NaiveDate {
        self.start
    }

    /// Last day of the range.
    #[must_use]
    pub const fn end(&self) -> NaiveDate {
        self.end
    }

    /// Number of calendar days in the range (always at least one).
    #[must_use]
    pub fn num_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// Returns true if `date` falls inside the range.
    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Returns true if the two ranges share at least one day.
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// Clips this range to `bounds`, or `None` when they do not intersect.
    #[must_use]
    pub fn clip(&self, bounds: &Self) -> Option<Self> {
        if !self.intersects(bounds) {
            return None;
        }
        Some(Self {
            start: self.start.max(bounds.start),
            end: self.end.min(bounds.end),
        })
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

/// Parameters of a fetch call that participate in entry identity.
///
/// Two fetches with the same key, kind and range but different parameters
/// are distinct entries. Keys are kept sorted so the canonical JSON form, and
/// therefore the [fingerprint](Self::fingerprint), is stable.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameters(BTreeMap<String, Value>);

impl Parameters {
    /// Creates an empty parameter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a parameter, returning the updated set.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Adds or replaces a parameter.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(name.into(), value.into());
    }

    /// Returns the value of a parameter.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Returns true if no parameters are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over parameters in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Canonical JSON encoding.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_else(|_| "{}".to_string())
    }

    /// Parses the canonical JSON encoding.
    ///
    /// # Errors
    /// Returns [`DataError::Parse`] if the text is not a JSON object.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map(Self)
            .map_err(|e| DataError::Parse(e.to_string()))
    }

    /// Stable hash of the canonical JSON encoding, as lowercase hex.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        blake3::hash(self.to_json().as_bytes()).to_hex().to_string()
    }
}

impl fmt::Display for Parameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_json())
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Parameters {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// One persisted fetch result.
///
/// `(key, kind, range, parameters)` is unique across the index; the entry owns
/// the file at `storage_path` exclusively.
#[derive(Clone, Debug, PartialEq)]
pub struct CacheEntry {
    /// Logical identity of the subject.
    pub key: CacheKey,
    /// Data category.
    pub kind: DataKind,
    /// Date range the fetch covered.
    pub range: DateRange,
    /// Parameters of the fetch call.
    pub parameters: Parameters,
    /// Location of the entry's row data.
    pub storage_path: PathBuf,
    /// When the entry was written or last overwritten.
    pub last_updated: DateTime<Utc>,
}

impl CacheEntry {
    /// Creates an entry stamped with the current time.
    #[must_use]
    pub fn new(
        key: CacheKey,
        kind: DataKind,
        range: DateRange,
        parameters: Parameters,
        storage_path: PathBuf,
    ) -> Self {
        Self {
            key,
            kind,
            range,
            parameters,
            storage_path,
            last_updated: Utc::now(),
        }
    }

    /// Returns true if `other` has the same identity tuple.
    #[must_use]
    pub fn same_identity(&self, other: &Self) -> bool {
        self.key == other.key
            && self.kind == other.kind
            && self.range == other.range
            && self.parameters == other.parameters
    }
}

/// Selection of index entries, used for deletion.
///
/// Unset criteria match everything; set criteria are combined with AND.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EntryFilter {
    /// Only entries for this key.
    pub key: Option<CacheKey>,
    /// Only entries of this kind.
    pub kind: Option<DataKind>,
    /// Only entries last updated strictly before this instant.
    pub updated_before: Option<DateTime<Utc>>,
}

impl EntryFilter {
    /// A filter that matches every entry.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Restricts the filter to one key.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<CacheKey>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Restricts the filter to one kind.
    #[must_use]
    pub const fn with_kind(mut self, kind: DataKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Restricts the filter to entries last updated before `cutoff`.
    #[must_use]
    pub const fn updated_before(mut self, cutoff: DateTime<Utc>) -> Self {
        self.updated_before = Some(cutoff);
        self
    }

    /// Restricts the filter to entries last updated more than `days` days ago.
    ///
    /// Ages reaching past the earliest representable instant match nothing.
    #[must_use]
    pub fn older_than_days(self, days: u32) -> Self {
        let cutoff = Utc::now()
            .checked_sub_signed(Duration::days(i64::from(days)))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        self.updated_before(cutoff)
    }

    /// Returns true if `entry` satisfies every set criterion.
    #[must_use]
    pub fn matches(&self, entry: &CacheEntry) -> bool {
        self.key.as_ref().is_none_or(|key| *key == entry.key)
            && self.kind.is_none_or(|kind| kind == entry.kind)
            && self
                .updated_before
                .is_none_or(|cutoff| entry.last_updated < cutoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_symbol_uppercases() {
        assert_eq!(Symbol::new(" aapl ").as_str(), "AAPL");
        assert_eq!(CacheKey::from(Symbol::new("msft")).as_str(), "MSFT");
    }

    #[test]
    fn test_cache_key_preserves_case() {
        assert_eq!(
            CacheKey::new("  apple earnings ").as_str(),
            "apple earnings"
        );
    }

    #[test]
    fn test_date_range_rejects_inverted() {
        assert!(DateRange::new(date(2024, 1, 10), date(2024, 1, 1)).is_err());
        let single = DateRange::new(date(2024, 1, 1), date(2024, 1, 1)).unwrap();
        assert_eq!(single.num_days(), 1);
    }

    #[test]
    fn test_date_range_clip() {
        let range = DateRange::new(date(2024, 1, 1), date(2024, 1, 10)).unwrap();
        let bounds = DateRange::new(date(2024, 1, 5), date(2024, 1, 15)).unwrap();
        let clipped = range.clip(&bounds).unwrap();
        assert_eq!(clipped.start(), date(2024, 1, 5));
        assert_eq!(clipped.end(), date(2024, 1, 10));

        let later = DateRange::new(date(2024, 2, 1), date(2024, 2, 2)).unwrap();
        assert!(range.clip(&later).is_none());
        assert!(!range.intersects(&later));
    }

    #[test]
    fn test_lookback() {
        let range = DateRange::lookback(date(2024, 1, 31), 30);
        assert_eq!(range.start(), date(2024, 1, 1));
        assert_eq!(range.num_days(), 31);
    }

    #[test]
    fn test_parameter_fingerprint_is_order_independent() {
        let a = Parameters::new().with("indicator", "rsi").with("window", 14);
        let b = Parameters::new().with("window", 14).with("indicator", "rsi");
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), Parameters::new().fingerprint());

        let parsed = Parameters::from_json(&a.to_json()).unwrap();
        assert_eq!(parsed, a);
    }

    #[test]
    fn test_entry_filter_matches() {
        let range = DateRange::day(date(2024, 1, 1));
        let mut entry = CacheEntry::new(
            CacheKey::new("AAPL"),
            DataKind::Ohlcv,
            range,
            Parameters::new(),
            PathBuf::from("ohlcv/AAPL.parquet"),
        );
        entry.last_updated = Utc::now() - Duration::days(45);

        assert!(EntryFilter::all().matches(&entry));
        assert!(EntryFilter::all().with_key("AAPL").older_than_days(30).matches(&entry));
        assert!(!EntryFilter::all().with_key("MSFT").matches(&entry));
        assert!(!EntryFilter::all().with_kind(DataKind::News).matches(&entry));
        assert!(!EntryFilter::all().older_than_days(60).matches(&entry));
    }

    #[test]
    fn test_older_than_days_saturates() {
        let mut entry = CacheEntry::new(
            CacheKey::new("AAPL"),
            DataKind::Ohlcv,
            DateRange::day(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()),
            Parameters::new(),
            PathBuf::from("ohlcv/AAPL.parquet"),
        );
        entry.last_updated = Utc::now() - Duration::days(365 * 100);

        let filter = EntryFilter::all().older_than_days(u32::MAX);
        assert_eq!(filter.updated_before, Some(DateTime::<Utc>::MIN_UTC));
        assert!(!filter.matches(&entry));
    }
}
