//! Coverage resolution over cached date ranges.
//!
//! [`resolve_coverage`] is a pure function: given a requested range and the
//! index entries intersecting it, it returns the gaps that still need a fetch
//! and the entries that (partially or fully) satisfy the request.

use chrono::NaiveDate;

use crate::types::{CacheEntry, DateRange};

/// Result of resolving a request against cached entries.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Coverage {
    /// Disjoint, non-empty sub-ranges not covered by any entry, ascending.
    pub gaps: Vec<DateRange>,
    /// Entries intersecting the request, ascending by range start.
    pub entries: Vec<CacheEntry>,
}

impl Coverage {
    /// Returns true if no fetch is needed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.gaps.is_empty()
    }

    /// Total number of days that still need fetching.
    #[must_use]
    pub fn missing_days(&self) -> i64 {
        self.gaps.iter().map(DateRange::num_days).sum()
    }
}

/// Computes the gaps in `target` not covered by `entries`.
///
/// Entries that do not intersect `target` are ignored, so callers may pass an
/// unfiltered list. Entries are expected to be non-overlapping; overlapping
/// entries still yield a valid (possibly smaller) gap set.
#[must_use]
pub fn resolve_coverage(target: DateRange, entries: Vec<CacheEntry>) -> Coverage {
    let mut entries: Vec<CacheEntry> = entries
        .into_iter()
        .filter(|entry| entry.range.intersects(&target))
        .collect();
    entries.sort_by_key(|entry| entry.range.start());

    if entries.is_empty() {
        return Coverage {
            gaps: vec![target],
            entries,
        };
    }

    let mut gaps = Vec::new();
    // `None` once the cursor has moved past the last representable date.
    let mut cursor: Option<NaiveDate> = Some(target.start());

    for entry in &entries {
        let Some(clipped) = entry.range.clip(&target) else {
            continue;
        };
        let Some(current) = cursor else {
            break;
        };

        if clipped.start() > current {
            if let Some(gap_end) = clipped.start().pred_opt() {
                gaps.push(DateRange::new(current, gap_end).unwrap_or(DateRange::day(current)));
            }
        }

        let next = clipped.end().succ_opt();
        cursor = match next {
            Some(next) if next > current => Some(next),
            Some(_) => Some(current),
            None => None,
        };
    }

    if let Some(current) = cursor.filter(|c| *c <= target.end()) {
        gaps.push(DateRange::new(current, target.end()).unwrap_or(DateRange::day(current)));
    }

    Coverage { gaps, entries }
}
