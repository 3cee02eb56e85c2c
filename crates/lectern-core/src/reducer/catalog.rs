//! Catalog reducer: book counts, category ranking, exemplaire totals, and the
//! cross-reference table consumed by the archive join.

use super::{decode_record, expect_collection, top_by_count, Reducer, ReducerSettings, Reduction};
use crate::alias::{AVAILABLE_COPIES, CATEGORY, INITIAL_COPIES, TITLE, UNCLASSIFIED, UNTITLED};
use crate::error::Result;
use crate::source::{Document, Snapshot, Source};
use crate::stats::{percentage, BookFragment, CategoryCount};
use crate::xref::{CrossReferenceEntry, CrossReferenceTable};
use std::collections::HashMap;
use tracing::debug;

/// Everything one catalog snapshot yields.
#[derive(Clone, Debug, PartialEq)]
pub struct CatalogReduction {
    pub fragment: BookFragment,
    pub cross_reference: CrossReferenceTable,
}

pub fn reduce_catalog(docs: &[Document], settings: &ReducerSettings) -> CatalogReduction {
    let mut fragment = BookFragment::default();
    let mut cross_reference = CrossReferenceTable::new();
    let mut categories: Vec<(String, u64)> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for doc in docs.iter().filter(|d| !settings.is_placeholder(d)) {
        fragment.total_books += 1;

        let record = match decode_record(doc) {
            Ok(record) => record,
            Err(err) => {
                debug!(error = %err, "skipping catalog record");
                fragment.skipped += 1;
                continue;
            }
        };

        let category = CATEGORY.string(record).unwrap_or(UNCLASSIFIED);
        match positions.get(category) {
            Some(&idx) => categories[idx].1 += 1,
            None => {
                positions.insert(category.to_string(), categories.len());
                categories.push((category.to_string(), 1));
            }
        }

        fragment.total_exemplaires += INITIAL_COPIES.count(record);
        fragment.available_exemplaires += AVAILABLE_COPIES.count(record);

        let title = TITLE.string(record).unwrap_or(UNTITLED);
        cross_reference.insert(doc.id.clone(), CrossReferenceEntry::new(title, category));
    }

    let total = fragment.total_books;
    fragment.popular_categories = top_by_count(categories, settings.top_n, |(_, c)| *c)
        .into_iter()
        .map(|(name, count)| CategoryCount {
            name,
            count,
            percentage: percentage(count, total),
        })
        .collect();

    CatalogReduction {
        fragment,
        cross_reference,
    }
}

pub struct CatalogReducer {
    settings: ReducerSettings,
}

impl CatalogReducer {
    pub fn new(settings: ReducerSettings) -> Self {
        Self { settings }
    }
}

impl Reducer for CatalogReducer {
    fn source(&self) -> Source {
        Source::Catalog
    }

    fn reduce(&self, snapshot: &Snapshot) -> Result<Option<Reduction>> {
        let docs = expect_collection("catalog", snapshot)?;
        let reduction = reduce_catalog(docs, &self.settings);
        debug!(
            books = reduction.fragment.total_books,
            skipped = reduction.fragment.skipped,
            entries = reduction.cross_reference.len(),
            "catalog reduced"
        );
        Ok(Some(reduction.into()))
    }
}
