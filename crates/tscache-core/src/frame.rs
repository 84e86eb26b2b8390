//! Timestamp-aware helpers for row sets.
//!
//! Rows are carried as polars [`DataFrame`]s. Each row set must carry a
//! timestamp field named one of [`TIMESTAMP_COLUMNS`]; the first present name
//! wins. Timestamps may be `Date`, `Datetime` (any unit), or `String`; strings
//! are parsed to `Date` (or `Datetime` when any value carries a time of day)
//! before a frame is persisted.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use polars::prelude::*;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::error::{DataError, Result};
use crate::types::DateRange;

/// Column names recognized as the timestamp field, in priority order.
pub const TIMESTAMP_COLUMNS: [&str; 4] = ["date", "timestamp", "Date", "Timestamp"];

const SECONDS_PER_DAY: i64 = 86_400;

/// Days from 0001-01-01 to the Unix epoch.
const EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Accepted layouts for string timestamps that carry a time of day.
const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

fn frame_err(e: PolarsError) -> DataError {
    DataError::Parse(e.to_string())
}

/// Returns the name of the frame's timestamp field.
///
/// # Errors
/// Returns [`DataError::MissingTimestampField`] if none of
/// [`TIMESTAMP_COLUMNS`] is present.
pub fn timestamp_column(df: &DataFrame) -> Result<&'static str> {
    TIMESTAMP_COLUMNS
        .into_iter()
        .find(|name| df.column(name).is_ok())
        .ok_or_else(|| {
            let columns = df
                .get_column_names()
                .iter()
                .map(|c| c.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            DataError::MissingTimestampField(format!(
                "expected one of {:?}, found [{}]",
                TIMESTAMP_COLUMNS, columns
            ))
        })
}

/// Normalizes the timestamp field so it can be persisted and merged.
///
/// String timestamps are parsed strictly: plain `YYYY-MM-DD` values become
/// `Date`, and a column where any value carries a time of day becomes
/// `Datetime` in milliseconds. `Date` and `Datetime` pass through.
///
/// # Errors
/// Returns [`DataError::MissingTimestampField`] if there is no timestamp field,
/// its type cannot hold a timestamp, or any non-null string fails to parse.
pub fn normalize_timestamps(mut df: DataFrame) -> Result<DataFrame> {
    let name = timestamp_column(&df)?;
    let dtype = df.column(name).map_err(frame_err)?.dtype().clone();

    match dtype {
        DataType::Date | DataType::Datetime(_, _) => Ok(df),
        DataType::String => {
            let parsed = parse_timestamp_column(df.column(name).map_err(frame_err)?)?;
            df.with_column(parsed).map_err(frame_err)?;
            Ok(df)
        }
        other => Err(DataError::MissingTimestampField(format!(
            "column '{}' has unsupported type {}",
            name, other
        ))),
    }
}

fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date.and_time(NaiveTime::MIN));
    }
    if let Ok(stamp) = DateTime::parse_from_rfc3339(raw) {
        return Some(stamp.naive_utc());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
}

fn parse_timestamp_column(column: &Column) -> Result<Column> {
    let values = column.str().map_err(frame_err)?;
    let mut parsed = Vec::with_capacity(values.len());
    let mut has_time = false;

    for value in values {
        let Some(raw) = value else {
            parsed.push(None);
            continue;
        };
        let stamp = parse_timestamp(raw.trim()).ok_or_else(|| {
            DataError::MissingTimestampField(format!(
                "column '{}' holds unparseable timestamp '{}'",
                column.name(),
                raw
            ))
        })?;
        has_time |= stamp.time() != NaiveTime::MIN;
        parsed.push(Some(stamp));
    }

    let name = column.name().clone();
    let column = if has_time {
        let millis: Vec<Option<i64>> = parsed
            .into_iter()
            .map(|stamp| stamp.map(|s| s.and_utc().timestamp_millis()))
            .collect();
        Column::new(name, millis).cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
    } else {
        let days: Vec<Option<i32>> = parsed
            .into_iter()
            .map(|stamp| stamp.map(|s| s.date().num_days_from_ce() - EPOCH_DAYS_FROM_CE))
            .collect();
        Column::new(name, days).cast(&DataType::Date)
    };
    column.map_err(frame_err)
}

/// Physical units per day for a timestamp type.
fn units_per_day(dtype: &DataType) -> Result<i64> {
    match dtype {
        DataType::Date => Ok(1),
        DataType::Datetime(TimeUnit::Milliseconds, _) => Ok(SECONDS_PER_DAY * 1_000),
        DataType::Datetime(TimeUnit::Microseconds, _) => Ok(SECONDS_PER_DAY * 1_000_000),
        DataType::Datetime(TimeUnit::Nanoseconds, _) => Ok(SECONDS_PER_DAY * 1_000_000_000),
        other => Err(DataError::MissingTimestampField(format!(
            "unsupported timestamp type {}",
            other
        ))),
    }
}

/// Inclusive bounds of `range` in the physical units of `dtype`, clamped to
/// the `i64` domain.
fn physical_bounds(dtype: &DataType, range: DateRange) -> Result<(i64, i64)> {
    let per_day = units_per_day(dtype)?;
    let start = i64::from(range.start().num_days_from_ce() - EPOCH_DAYS_FROM_CE);
    let end = i64::from(range.end().num_days_from_ce() - EPOCH_DAYS_FROM_CE);
    let clamp = |days: i64| if days < 0 { i64::MIN } else { i64::MAX };

    let lo = start.checked_mul(per_day).unwrap_or_else(|| clamp(start));
    let hi = (end + 1)
        .checked_mul(per_day)
        .and_then(|next| next.checked_sub(1))
        .unwrap_or_else(|| clamp(end));
    Ok((lo, hi))
}

/// Stacks two frames, aligning columns by name and widening types.
fn stack(acc: &DataFrame, frame: DataFrame) -> PolarsResult<DataFrame> {
    concat(
        [acc.clone().lazy(), frame.lazy()],
        UnionArgs {
            parallel: false,
            rechunk: false,
            to_supertypes: true,
            diagonal: true,
            ..Default::default()
        },
    )?
    .collect()
}

/// Merges row sets into one deduplicated, time-ordered frame.
///
/// Frames are stacked in the order given with their columns unioned by name;
/// columns a frame lacks are null for its rows and differing column types are
/// widened to a common supertype. Rows outside `range` and rows with a null
/// timestamp are dropped. When a timestamp occurs more than once the copy from
/// the *latest* frame in `frames` wins, so callers pass frames from lowest to
/// highest precedence. Frames without a usable timestamp field, or whose
/// timestamps cannot be reconciled with the frames before them, are skipped
/// with a warning rather than failing the merge.
///
/// # Errors
/// Returns [`DataError::Parse`] if the stacked frame cannot be indexed.
pub fn merge_frames(frames: Vec<DataFrame>, range: DateRange) -> Result<DataFrame> {
    let mut combined: Option<(DataFrame, &'static str)> = None;

    for frame in frames {
        let mut frame = match normalize_timestamps(frame) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Skipping row set without usable timestamps");
                continue;
            }
        };
        let Ok(name) = timestamp_column(&frame) else {
            continue;
        };

        combined = match combined.take() {
            None => Some((frame, name)),
            Some((acc, canonical)) => {
                if name != canonical {
                    if let Err(e) = frame.rename(name, canonical.into()) {
                        warn!(error = %e, from = name, to = canonical, "Skipping row set with conflicting timestamp field");
                        combined = Some((acc, canonical));
                        continue;
                    }
                }
                match stack(&acc, frame) {
                    Ok(stacked) => Some((stacked, canonical)),
                    Err(e) => {
                        warn!(error = %e, "Skipping row set with irreconcilable schema");
                        Some((acc, canonical))
                    }
                }
            }
        };
    }

    let Some((combined, name)) = combined else {
        return Ok(DataFrame::empty());
    };

    let column = combined.column(name).map_err(frame_err)?;
    let (lo, hi) = physical_bounds(column.dtype(), range)?;
    let keys = column.cast(&DataType::Int64).map_err(frame_err)?;
    let keys = keys.i64().map_err(frame_err)?;

    // Last occurrence wins.
    let mut winners: HashMap<i64, IdxSize> = HashMap::with_capacity(combined.height());
    for (idx, key) in keys.into_iter().enumerate() {
        if let Some(key) = key.filter(|k| (lo..=hi).contains(k)) {
            winners.insert(key, idx as IdxSize);
        }
    }

    let mut ordered: Vec<(i64, IdxSize)> = winners.into_iter().collect();
    ordered.sort_unstable_by_key(|(key, _)| *key);
    let indices: Vec<IdxSize> = ordered.into_iter().map(|(_, idx)| idx).collect();

    debug!(
        rows_in = combined.height(),
        rows_out = indices.len(),
        "Merged row sets"
    );

    let indices = IdxCa::from_vec("idx".into(), indices);
    combined.take(&indices).map_err(frame_err)
}

/// Returns the distinct calendar dates present in the frame's timestamp field.
///
/// # Errors
/// Returns an error if the frame has no usable timestamp field.
pub fn timestamp_dates(df: &DataFrame) -> Result<Vec<NaiveDate>> {
    let df = normalize_timestamps(df.clone())?;
    let name = timestamp_column(&df)?;
    let column = df.column(name).map_err(frame_err)?;
    let per_day = units_per_day(column.dtype())?;
    let keys = column.cast(&DataType::Int64).map_err(frame_err)?;
    let keys = keys.i64().map_err(frame_err)?;

    let mut dates: Vec<NaiveDate> = keys
        .into_iter()
        .flatten()
        .filter_map(|k| days_to_date(k.div_euclid(per_day)))
        .collect();
    dates.sort_unstable();
    dates.dedup();
    Ok(dates)
}

/// Converts days since the Unix epoch to a date.
fn days_to_date(days: i64) -> Option<NaiveDate> {
    // Polars dates are days since Unix epoch (1970-01-01)
    let days = i32::try_from(days).ok()?;
    NaiveDate::from_num_days_from_ce_opt(days.checked_add(EPOCH_DAYS_FROM_CE)?)
}
