//! Per-source reducers.
//!
//! A reducer turns the full current snapshot of one feed into that feed's
//! fragment. The same snapshot always yields the same fragment; the archive
//! reducer additionally depends on the cross-reference table and the clock it
//! is handed. Malformed records are skipped, never fatal.

pub mod archive;
pub mod catalog;
pub mod config;
pub mod members;

use crate::error::{json_kind, DecodeError, ReduceError, Result};
use crate::source::{Document, Snapshot, Source, PLACEHOLDER_ID};
use crate::stats::{Fragment, TOP_N};
use crate::xref::CrossReferenceTable;
use chrono::{DateTime, FixedOffset, Local};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use archive::{archive_entries, archive_entry_time, parse_timestamp, reduce_archive, ArchiveReducer};
pub use catalog::{reduce_catalog, CatalogReducer, CatalogReduction};
pub use config::{reduce_config, ConfigReducer};
pub use members::{reduce_members, MembersReducer};

/// Tunables shared by all reducers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReducerSettings {
    /// Record id excluded from every count.
    pub placeholder_id: String,
    /// Length of every ranking.
    pub top_n: usize,
    /// Trailing window, in days, for the weekday activity buckets.
    pub recent_window_days: i64,
}

impl Default for ReducerSettings {
    fn default() -> Self {
        Self {
            placeholder_id: PLACEHOLDER_ID.to_string(),
            top_n: TOP_N,
            recent_window_days: 7,
        }
    }
}

impl ReducerSettings {
    pub(crate) fn is_placeholder(&self, doc: &Document) -> bool {
        doc.id == self.placeholder_id
    }
}

/// Source of "now" for time-windowed reductions.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<FixedOffset>;
}

/// Wall clock in the local time zone.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }
}

/// A clock frozen at one instant.
#[derive(Clone, Copy, Debug)]
pub struct FixedClock(pub DateTime<FixedOffset>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<FixedOffset> {
        self.0
    }
}

/// Everything one snapshot reduces to.
///
/// Reducers never write shared state. A catalog reduction carries its
/// cross-reference table here, and the caller installs it together with the
/// fragment, under the same revision check.
#[derive(Clone, Debug, PartialEq)]
pub struct Reduction {
    pub fragment: Fragment,
    pub cross_reference: Option<CrossReferenceTable>,
}

impl Reduction {
    pub fn new(fragment: impl Into<Fragment>) -> Self {
        Self {
            fragment: fragment.into(),
            cross_reference: None,
        }
    }
}

impl From<CatalogReduction> for Reduction {
    fn from(reduction: CatalogReduction) -> Self {
        Self {
            fragment: reduction.fragment.into(),
            cross_reference: Some(reduction.cross_reference),
        }
    }
}

/// Transforms one feed's snapshot into its fragment.
pub trait Reducer: Send + Sync {
    fn source(&self) -> Source;

    /// `Ok(None)` means the snapshot carries nothing to apply and the
    /// previous fragment should stay.
    fn reduce(&self, snapshot: &Snapshot) -> Result<Option<Reduction>>;
}

pub(crate) fn expect_collection<'a>(
    reducer: &'static str,
    snapshot: &'a Snapshot,
) -> Result<&'a [Document]> {
    match snapshot {
        Snapshot::Collection(docs) => Ok(docs),
        other => Err(ReduceError::UnexpectedShape {
            reducer,
            expected: "collection",
            found: other.kind(),
        }),
    }
}

pub(crate) fn expect_document<'a>(
    reducer: &'static str,
    snapshot: &'a Snapshot,
) -> Result<Option<&'a Value>> {
    match snapshot {
        Snapshot::Document(doc) => Ok(doc.as_ref()),
        other => Err(ReduceError::UnexpectedShape {
            reducer,
            expected: "document",
            found: other.kind(),
        }),
    }
}

pub(crate) fn decode_record(doc: &Document) -> std::result::Result<&Map<String, Value>, DecodeError> {
    doc.data.as_object().ok_or_else(|| DecodeError::NotAnObject {
        id: doc.id.clone(),
        found: json_kind(&doc.data),
    })
}

/// Sort by count descending, keeping first-seen order among ties, and keep `n`.
pub(crate) fn top_by_count<T>(mut items: Vec<T>, n: usize, count: impl Fn(&T) -> u64) -> Vec<T> {
    // sort_by is stable, so insertion order breaks ties
    items.sort_by(|a, b| count(b).cmp(&count(a)));
    items.truncate(n);
    items
}
