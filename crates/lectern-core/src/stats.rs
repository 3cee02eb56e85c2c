//! Statistics fragments produced by the per-source reducers.

use crate::settings::OrgSettings;
use crate::source::Source;
use serde::{Deserialize, Serialize};

/// Number of entries kept in every ranking.
pub const TOP_N: usize = 5;

/// Weekday buckets, Monday first.
pub type WeekActivity = [u64; 7];

/// One row of the popular-categories ranking.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryCount {
    pub name: String,
    pub count: u64,
    /// Share of the catalog, rounded to a whole percent.
    pub percentage: u32,
}

/// One row of the most-borrowed ranking.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BorrowedBook {
    pub title: String,
    pub category: String,
    pub count: u64,
}

/// Catalog reducer output.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookFragment {
    pub total_books: u64,
    pub popular_categories: Vec<CategoryCount>,
    pub total_exemplaires: i64,
    pub available_exemplaires: i64,
    /// Malformed records counted in `total_books` but nowhere else.
    pub skipped: u64,
}

/// Member reducer output.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberFragment {
    pub total_users: u64,
    /// Occupied loan slots across all members (three slots each).
    pub active_loans: u64,
    pub suspended_users: u64,
    pub overdue_loans: u64,
    pub skipped: u64,
}

/// Archive reducer output.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveFragment {
    pub recent_activity: WeekActivity,
    pub monthly_loans: u64,
    pub top_borrowed_books: Vec<BorrowedBook>,
    pub skipped: u64,
}

/// The output of one reducer, merged wholesale into the aggregate state.
#[derive(Clone, Debug, PartialEq)]
pub enum Fragment {
    Books(BookFragment),
    Members(MemberFragment),
    Config(OrgSettings),
    Archive(ArchiveFragment),
}

impl Fragment {
    pub fn source(&self) -> Source {
        match self {
            Fragment::Books(_) => Source::Catalog,
            Fragment::Members(_) => Source::Members,
            Fragment::Config(_) => Source::Config,
            Fragment::Archive(_) => Source::Archive,
        }
    }
}

impl From<BookFragment> for Fragment {
    fn from(f: BookFragment) -> Self {
        Fragment::Books(f)
    }
}

impl From<MemberFragment> for Fragment {
    fn from(f: MemberFragment) -> Self {
        Fragment::Members(f)
    }
}

impl From<ArchiveFragment> for Fragment {
    fn from(f: ArchiveFragment) -> Self {
        Fragment::Archive(f)
    }
}

impl From<OrgSettings> for Fragment {
    fn from(f: OrgSettings) -> Self {
        Fragment::Config(f)
    }
}

/// Round to one decimal place.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Active loans as a percentage of the catalog, one decimal. Zero for an empty catalog.
pub fn rotation_rate(active_loans: u64, total_books: u64) -> f64 {
    if total_books == 0 {
        return 0.0;
    }
    round1(active_loans as f64 / total_books as f64 * 100.0)
}

/// Whole-percent share, half away from zero. Zero when `total` is zero.
pub fn percentage(count: u64, total: u64) -> u32 {
    if total == 0 {
        return 0;
    }
    (count as f64 / total as f64 * 100.0).round() as u32
}
