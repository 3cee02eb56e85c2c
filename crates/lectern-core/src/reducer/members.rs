//! Member reducer: headcount, suspensions, and loan-slot occupancy.

use super::{decode_record, expect_collection, Reducer, ReducerSettings, Reduction};
use crate::alias::{is_truthy, SUSPENSION};
use crate::error::Result;
use crate::source::{Document, Snapshot, Source};
use crate::stats::MemberFragment;
use serde_json::{Map, Value};
use tracing::debug;

/// Status value marking a suspended member.
pub const SUSPENDED: &str = "bloc";
/// Slot status for a book currently out.
pub const BORROWED: &str = "emprunt";
/// Slot status for a book past its due date.
pub const OVERDUE: &str = "retard";

/// The three loan slots: direct status field, companion array field.
pub const LOAN_SLOTS: [(&str, &str); 3] = [
    ("Etat1", "tabEtat1"),
    ("Etat2", "tabEtat2"),
    ("Etat3", "tabEtat3"),
];

fn slot_is_active(record: &Map<String, Value>, status_key: &str, array_key: &str) -> bool {
    if record.get(status_key).and_then(Value::as_str) == Some(BORROWED) {
        return true;
    }
    record
        .get(array_key)
        .and_then(Value::as_array)
        .and_then(|items| items.first())
        .is_some_and(is_truthy)
}

pub fn reduce_members(docs: &[Document], settings: &ReducerSettings) -> MemberFragment {
    let mut fragment = MemberFragment::default();

    for doc in docs.iter().filter(|d| !settings.is_placeholder(d)) {
        fragment.total_users += 1;

        let record = match decode_record(doc) {
            Ok(record) => record,
            Err(err) => {
                debug!(error = %err, "skipping member record");
                fragment.skipped += 1;
                continue;
            }
        };

        if SUSPENSION.any_equals(record, SUSPENDED) {
            fragment.suspended_users += 1;
        }

        for (status_key, array_key) in LOAN_SLOTS {
            if slot_is_active(record, status_key, array_key) {
                fragment.active_loans += 1;
            }
            if record.get(status_key).and_then(Value::as_str) == Some(OVERDUE) {
                fragment.overdue_loans += 1;
            }
        }
    }

    fragment
}

pub struct MembersReducer {
    settings: ReducerSettings,
}

impl MembersReducer {
    pub fn new(settings: ReducerSettings) -> Self {
        Self { settings }
    }
}

impl Reducer for MembersReducer {
    fn source(&self) -> Source {
        Source::Members
    }

    fn reduce(&self, snapshot: &Snapshot) -> Result<Option<Reduction>> {
        let docs = expect_collection("members", snapshot)?;
        Ok(Some(Reduction::new(reduce_members(docs, &self.settings))))
    }
}
