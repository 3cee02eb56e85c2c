//! The aggregate state: one revisioned slot per source plus the derived
//! rotation rate.

use crate::register::Revisioned;
use crate::settings::OrgSettings;
use crate::source::Source;
use crate::stats::{
    rotation_rate, ArchiveFragment, BookFragment, BorrowedBook, CategoryCount, Fragment,
    MemberFragment, WeekActivity,
};
use serde::{Deserialize, Serialize};

/// Merge of the most recent fragment from each source.
///
/// Fragments from different sources live in separate slots and never touch
/// each other's fields. `rotation_rate` is never set directly; it is
/// recomputed from the catalog and member slots on every apply that touches
/// either of them.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AggregateState {
    books: Revisioned<BookFragment>,
    members: Revisioned<MemberFragment>,
    config: Revisioned<OrgSettings>,
    archive: Revisioned<ArchiveFragment>,
    rotation_rate: f64,
}

impl AggregateState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `fragment` into its slot if `revision` is not stale.
    /// Returns whether the state changed slot ownership (i.e. the write was accepted).
    pub fn apply(&mut self, fragment: Fragment, revision: u64) -> bool {
        let (accepted, touches_rate) = match fragment {
            Fragment::Books(f) => (self.books.set(f, revision), true),
            Fragment::Members(f) => (self.members.set(f, revision), true),
            Fragment::Config(f) => (self.config.set(f, revision), false),
            Fragment::Archive(f) => (self.archive.set(f, revision), false),
        };
        if accepted && touches_rate {
            self.rotation_rate = rotation_rate(self.active_loans(), self.total_books());
        }
        accepted
    }

    /// Revision currently held for `source`, 0 if never written.
    pub fn revision(&self, source: Source) -> u64 {
        match source {
            Source::Catalog => self.books.revision(),
            Source::Members => self.members.revision(),
            Source::Config => self.config.revision(),
            Source::Archive => self.archive.revision(),
        }
    }

    pub fn has(&self, source: Source) -> bool {
        match source {
            Source::Catalog => !self.books.is_empty(),
            Source::Members => !self.members.is_empty(),
            Source::Config => !self.config.is_empty(),
            Source::Archive => !self.archive.is_empty(),
        }
    }

    pub fn books(&self) -> Option<&BookFragment> {
        self.books.get()
    }

    pub fn members(&self) -> Option<&MemberFragment> {
        self.members.get()
    }

    pub fn archive(&self) -> Option<&ArchiveFragment> {
        self.archive.get()
    }

    pub fn settings(&self) -> Option<&OrgSettings> {
        self.config.get()
    }

    pub fn total_books(&self) -> u64 {
        self.books.get().map_or(0, |b| b.total_books)
    }

    pub fn active_loans(&self) -> u64 {
        self.members.get().map_or(0, |m| m.active_loans)
    }

    pub fn rotation_rate(&self) -> f64 {
        self.rotation_rate
    }

    /// Flat view for rendering, zero-filled where a source has not reported yet.
    pub fn stats(&self) -> DashboardStats {
        let books = self.books.get().cloned().unwrap_or_default();
        let members = self.members.get().cloned().unwrap_or_default();
        let archive = self.archive.get().cloned().unwrap_or_default();
        DashboardStats {
            total_books: books.total_books,
            popular_categories: books.popular_categories,
            total_exemplaires: books.total_exemplaires,
            available_exemplaires: books.available_exemplaires,
            total_users: members.total_users,
            active_loans: members.active_loans,
            suspended_users: members.suspended_users,
            overdue_loans: members.overdue_loans,
            recent_activity: archive.recent_activity,
            monthly_loans: archive.monthly_loans,
            top_borrowed_books: archive.top_borrowed_books,
            rotation_rate: self.rotation_rate,
        }
    }
}

/// The flattened statistics a dashboard renders.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_books: u64,
    pub popular_categories: Vec<CategoryCount>,
    pub total_exemplaires: i64,
    pub available_exemplaires: i64,
    pub total_users: u64,
    pub active_loans: u64,
    pub suspended_users: u64,
    pub overdue_loans: u64,
    pub recent_activity: WeekActivity,
    pub monthly_loans: u64,
    pub top_borrowed_books: Vec<BorrowedBook>,
    pub rotation_rate: f64,
}
