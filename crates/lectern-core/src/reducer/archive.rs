//! Archive reducer: weekday activity, monthly loans, and the most-borrowed
//! ranking joined against the cross-reference table.
//!
//! Two independent windows run over the same entries:
//!
//! - `recent_activity` buckets entries whose absolute distance from `now` is
//!   within the trailing window (7 days by default), by weekday, Monday = 0.
//! - `monthly_loans` counts entries at or after local midnight on the first
//!   day of `now`'s calendar month.
//!
//! The ranking is not windowed: it counts every entry with a valid timestamp.

use super::{expect_document, top_by_count, Clock, Reducer, ReducerSettings, Reduction};
use crate::alias::{ARCHIVE_DOCUMENT, ARCHIVE_ENTRIES, ARCHIVE_TIMESTAMP};
use crate::error::{DecodeError, Result};
use crate::source::{Snapshot, Source};
use crate::stats::{ArchiveFragment, BorrowedBook};
use crate::xref::{CrossReferenceEntry, CrossReferenceStore, CrossReferenceTable};
use chrono::{
    DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc,
};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Separator between the book identifier and free text in an entry's document name.
pub const KEY_SEPARATOR: &str = " - ";

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Parse an archive timestamp. Accepts RFC 3339 strings, naive date-times and
/// bare dates (read in `offset`), epoch milliseconds, and `{seconds, nanoseconds}`
/// objects.
pub fn parse_timestamp(value: &Value, offset: &FixedOffset) -> Option<DateTime<FixedOffset>> {
    let utc: DateTime<Utc> = match value {
        Value::Number(n) => {
            let millis = n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?;
            DateTime::from_timestamp_millis(millis)?
        }
        Value::String(s) => return parse_text(s.trim(), offset),
        Value::Object(obj) => {
            let seconds = obj
                .get("seconds")
                .or_else(|| obj.get("_seconds"))
                .and_then(Value::as_i64)?;
            let nanos = obj
                .get("nanoseconds")
                .or_else(|| obj.get("_nanoseconds"))
                .and_then(Value::as_u64)
                .unwrap_or(0);
            DateTime::from_timestamp(seconds, u32::try_from(nanos).ok()?)?
        }
        _ => return None,
    };
    Some(utc.with_timezone(offset))
}

fn parse_text(s: &str, offset: &FixedOffset) -> Option<DateTime<FixedOffset>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(offset));
    }
    let naive = NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })?;
    offset.from_local_datetime(&naive).single()
}

/// The join key: text before the first separator, or the whole name if that is empty.
pub fn join_key(document_name: &str) -> &str {
    match document_name.split(KEY_SEPARATOR).next() {
        Some(head) if !head.is_empty() => head,
        _ => document_name,
    }
}

fn start_of_month(now: &DateTime<FixedOffset>) -> Option<DateTime<FixedOffset>> {
    let first = now.date_naive().with_day(1)?.and_hms_opt(0, 0, 0)?;
    now.offset().from_local_datetime(&first).single()
}

fn entry_timestamp(
    index: usize,
    entry: &Map<String, Value>,
    offset: &FixedOffset,
) -> std::result::Result<DateTime<FixedOffset>, DecodeError> {
    let raw = ARCHIVE_TIMESTAMP
        .truthy(entry)
        .ok_or(DecodeError::MissingTimestamp { index })?;
    parse_timestamp(raw, offset).ok_or_else(|| DecodeError::BadTimestamp {
        index,
        raw: raw.to_string(),
    })
}

/// The raw entry list of an archive document, empty if absent or not an array.
pub fn archive_entries(document: &Value) -> &[Value] {
    document
        .as_object()
        .and_then(|doc| ARCHIVE_ENTRIES.raw(doc))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// Timestamp of one archive entry, if it is an object with a parseable `heure`.
pub fn archive_entry_time(entry: &Value, offset: &FixedOffset) -> Option<DateTime<FixedOffset>> {
    let entry = entry.as_object()?;
    entry_timestamp(0, entry, offset).ok()
}

pub fn reduce_archive(
    document: &Value,
    xref: &CrossReferenceTable,
    now: &DateTime<FixedOffset>,
    settings: &ReducerSettings,
) -> ArchiveFragment {
    let mut fragment = ArchiveFragment::default();
    let entries = archive_entries(document);

    let offset = now.offset();
    let month_start = start_of_month(now);
    let window_ms = settings
        .recent_window_days
        .saturating_mul(Duration::days(1).num_milliseconds());

    let mut borrow_counts: Vec<(String, u64)> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for (index, entry) in entries.iter().enumerate() {
        let Some(entry) = entry.as_object() else {
            debug!(index, "skipping archive entry that is not an object");
            fragment.skipped += 1;
            continue;
        };
        let at = match entry_timestamp(index, entry, offset) {
            Ok(at) => at,
            Err(err) => {
                debug!(error = %err, "skipping archive entry");
                fragment.skipped += 1;
                continue;
            }
        };

        if month_start.is_some_and(|start| at >= start) {
            fragment.monthly_loans += 1;
        }

        if (*now - at).num_milliseconds().abs() <= window_ms {
            let day = at.weekday().num_days_from_monday() as usize;
            fragment.recent_activity[day] += 1;
        }

        if let Some(name) = ARCHIVE_DOCUMENT.string(entry) {
            let key = join_key(name);
            match positions.get(key) {
                Some(&idx) => borrow_counts[idx].1 += 1,
                None => {
                    positions.insert(key.to_string(), borrow_counts.len());
                    borrow_counts.push((key.to_string(), 1));
                }
            }
        }
    }

    let mut misses = 0usize;
    fragment.top_borrowed_books = top_by_count(borrow_counts, settings.top_n, |(_, c)| *c)
        .into_iter()
        .map(|(id, count)| {
            let entry = xref.get(&id).cloned().unwrap_or_else(|| {
                misses += 1;
                CrossReferenceEntry::fallback(&id)
            });
            BorrowedBook {
                title: entry.title,
                category: entry.category,
                count,
            }
        })
        .collect();

    if misses > 0 {
        debug!(misses, "archive join fell back to raw identifiers");
    }

    fragment
}

/// Archive reducer bound to the cross-reference store it reads and its clock.
pub struct ArchiveReducer {
    settings: ReducerSettings,
    xref: Arc<CrossReferenceStore>,
    clock: Arc<dyn Clock>,
}

impl ArchiveReducer {
    pub fn new(
        settings: ReducerSettings,
        xref: Arc<CrossReferenceStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            settings,
            xref,
            clock,
        }
    }
}

impl Reducer for ArchiveReducer {
    fn source(&self) -> Source {
        Source::Archive
    }

    fn reduce(&self, snapshot: &Snapshot) -> Result<Option<Reduction>> {
        let Some(document) = expect_document("archive", snapshot)? else {
            warn!("archive document not found, keeping previous archive statistics");
            return Ok(None);
        };
        if self.xref.generation() == 0 {
            debug!("archive reduced before the catalog populated the cross-reference store");
        }
        let table = self.xref.snapshot();
        let fragment = reduce_archive(document, &table, &self.clock.now(), &self.settings);
        Ok(Some(Reduction::new(fragment)))
    }
}
