//! Cross-reference store: catalog identifier to display metadata.
//!
//! Produced by the catalog reducer and installed alongside the catalog
//! fragment it came with, always as a whole-table replacement stamped with
//! that fragment's revision. Read by the archive reducer to resolve the book identifiers it finds in
//! loan history. Readers take an `Arc` to the current table, so a replacement
//! is a single pointer swap and never visible half-done.

use crate::alias::UNCLASSIFIED;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Metadata exposed by one catalog record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossReferenceEntry {
    pub title: String,
    pub category: String,
}

impl CrossReferenceEntry {
    pub fn new(title: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            category: category.into(),
        }
    }

    /// Display values used when a join misses: the raw identifier as title.
    pub fn fallback(id: &str) -> Self {
        Self::new(id, UNCLASSIFIED)
    }
}

/// A complete cross-reference table as produced from one catalog snapshot.
pub type CrossReferenceTable = HashMap<String, CrossReferenceEntry>;

#[derive(Debug, Default)]
struct Inner {
    table: Arc<CrossReferenceTable>,
    generation: u64,
    revision: u64,
}

/// Owned, injectable cross-reference store.
#[derive(Debug, Default)]
pub struct CrossReferenceStore {
    inner: RwLock<Inner>,
}

impl CrossReferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the entire table with one built from the catalog snapshot at
    /// `revision`. Identifiers absent from `table` are gone afterwards.
    ///
    /// A table older than the installed one is dropped; returns whether the
    /// replacement happened.
    pub fn put(&self, table: CrossReferenceTable, revision: u64) -> bool {
        let table = Arc::new(table);
        let mut inner = self.inner.write();
        if revision < inner.revision {
            return false;
        }
        inner.table = table;
        inner.revision = revision;
        inner.generation += 1;
        true
    }

    pub fn lookup(&self, id: &str) -> Option<CrossReferenceEntry> {
        self.inner.read().table.get(id).cloned()
    }

    /// A consistent view of the current table for a batch of lookups.
    pub fn snapshot(&self) -> Arc<CrossReferenceTable> {
        Arc::clone(&self.inner.read().table)
    }

    /// Number of completed replacements. Zero means never populated.
    pub fn generation(&self) -> u64 {
        self.inner.read().generation
    }

    /// Catalog revision of the installed table.
    pub fn revision(&self) -> u64 {
        self.inner.read().revision
    }

    pub fn len(&self) -> usize {
        self.inner.read().table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(entries: &[(&str, &str, &str)]) -> CrossReferenceTable {
        entries
            .iter()
            .map(|(id, t, c)| (id.to_string(), CrossReferenceEntry::new(*t, *c)))
            .collect()
    }

    #[test]
    fn test_put_then_lookup() {
        let store = CrossReferenceStore::new();
        assert_eq!(store.generation(), 0);
        assert!(store.lookup("B1").is_none());

        assert!(store.put(table(&[("B1", "Les Misérables", "Roman")]), 1));

        assert_eq!(
            store.lookup("B1"),
            Some(CrossReferenceEntry::new("Les Misérables", "Roman"))
        );
        assert_eq!(store.generation(), 1);
    }

    #[test]
    fn test_put_replaces_whole_table() {
        let store = CrossReferenceStore::new();
        store.put(table(&[("B1", "A", "X"), ("B2", "B", "Y")]), 1);
        store.put(table(&[("B3", "C", "Z")]), 2);

        assert!(store.lookup("B1").is_none());
        assert!(store.lookup("B2").is_none());
        assert!(store.lookup("B3").is_some());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_older_table_does_not_replace_newer() {
        let store = CrossReferenceStore::new();
        assert!(store.put(table(&[("B1", "NEW", "X")]), 5));

        // a slow reduction of an earlier catalog finishing last
        assert!(!store.put(table(&[("B1", "OLD", "X"), ("B2", "OLD", "X")]), 4));

        assert_eq!(store.lookup("B1").unwrap().title, "NEW");
        assert!(store.lookup("B2").is_none());
        assert_eq!(store.revision(), 5);
        assert_eq!(store.generation(), 1);

        // re-delivery at the same revision is accepted
        assert!(store.put(table(&[("B1", "NEW", "X")]), 5));
        assert_eq!(store.generation(), 2);
    }

    #[test]
    fn test_snapshot_survives_replacement() {
        let store = CrossReferenceStore::new();
        store.put(table(&[("B1", "A", "X")]), 1);
        let view = store.snapshot();
        store.put(table(&[("B2", "B", "Y")]), 2);

        assert!(view.contains_key("B1"));
        assert!(!view.contains_key("B2"));
    }
}
