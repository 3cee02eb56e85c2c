//! On-demand statistics computed from one-shot reads of the backing store.
//!
//! Unlike [`Dashboard`](crate::Dashboard), nothing here is live: each query
//! fetches what it needs, reduces it, and memoizes the result in a
//! [`ResultCache`] under a fixed key. Failed fetches are not cached.

use crate::cache::ResultCache;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, TimeZone};
use lectern_core::alias::{ARCHIVE_DOCUMENT, CREATED_AT};
use lectern_core::reducer::archive::join_key;
use lectern_core::reducer::{
    archive_entries, archive_entry_time, parse_timestamp, reduce_catalog, reduce_members,
    ReducerSettings,
};
use lectern_core::stats::round1;
use lectern_core::Document;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::debug;

pub const SYSTEM_STATS_KEY: &str = "systemStats";
pub const CATEGORY_PERFORMANCE_KEY: &str = "categoryPerformance";
pub const MONTHLY_TRENDS_KEY: &str = "monthlyTrends";

/// Number of calendar months in a trend report, current month included.
pub const TREND_MONTHS: i32 = 6;

/// One-shot reads against the document store.
#[async_trait]
pub trait StatsSource: Send + Sync {
    async fn fetch_collection(&self, name: &str) -> Result<Vec<Document>>;

    /// `Ok(None)` when the document does not exist.
    async fn fetch_document(&self, collection: &str, id: &str) -> Result<Option<Value>>;
}

/// Where each dataset lives in the store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionNames {
    pub catalog: String,
    pub members: String,
    pub archive_collection: String,
    pub archive_document: String,
}

impl Default for CollectionNames {
    fn default() -> Self {
        Self {
            catalog: "BiblioLivres".to_string(),
            members: "BiblioUser".to_string(),
            archive_collection: "ArchivesBiblio".to_string(),
            archive_document: "Arch".to_string(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStats {
    pub total_users: u64,
    pub total_books: u64,
    pub active_loans: u64,
    pub overdue_loans: u64,
    pub suspended_users: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryPerformance {
    pub name: String,
    pub books: u64,
    /// Distinct catalog books of this category borrowed at least once.
    pub loans: u64,
    pub rate: f64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyTrend {
    /// `YYYY-MM`.
    pub month: String,
    pub loans: u64,
    pub books: u64,
}

/// Cached statistics queries over a [`StatsSource`].
pub struct StatisticsService<S> {
    source: S,
    cache: ResultCache,
    names: CollectionNames,
    settings: ReducerSettings,
}

impl<S: StatsSource> StatisticsService<S> {
    pub fn new(source: S, config: &EngineConfig) -> Self {
        Self {
            source,
            cache: ResultCache::new(config.cache_ttl()),
            names: CollectionNames::default(),
            settings: config.reducer.clone(),
        }
    }

    pub fn with_names(mut self, names: CollectionNames) -> Self {
        self.names = names;
        self
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    async fn cached<T, F, Fut>(&self, key: &str, compute: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(hit) = self.cache.get_as::<T>(key) {
            debug!(key, "statistics served from cache");
            return Ok(hit);
        }
        let value = compute().await?;
        self.cache.set_from(key, &value)?;
        debug!(key, "statistics computed");
        Ok(value)
    }

    async fn archive(&self) -> Result<Option<Value>> {
        self.source
            .fetch_document(&self.names.archive_collection, &self.names.archive_document)
            .await
    }

    pub async fn system_stats(&self) -> Result<SystemStats> {
        self.cached(SYSTEM_STATS_KEY, || async move {
            let books = self.source.fetch_collection(&self.names.catalog).await?;
            let members = self.source.fetch_collection(&self.names.members).await?;
            let catalog = reduce_catalog(&books, &self.settings).fragment;
            let members = reduce_members(&members, &self.settings);
            Ok(SystemStats {
                total_users: members.total_users,
                total_books: catalog.total_books,
                active_loans: members.active_loans,
                overdue_loans: members.overdue_loans,
                suspended_users: members.suspended_users,
            })
        })
        .await
    }

    /// Per category in first-seen catalog order.
    pub async fn category_performance(&self) -> Result<Vec<CategoryPerformance>> {
        self.cached(CATEGORY_PERFORMANCE_KEY, || async move {
            let books = self.source.fetch_collection(&self.names.catalog).await?;
            let archive = self.archive().await?;
            let table = reduce_catalog(&books, &self.settings).cross_reference;

            let mut order: Vec<String> = Vec::new();
            let mut book_counts: HashMap<String, u64> = HashMap::new();
            for doc in books.iter().filter(|d| d.id != self.settings.placeholder_id) {
                let Some(entry) = table.get(&doc.id) else {
                    continue;
                };
                let count = book_counts.entry(entry.category.clone()).or_insert(0);
                if *count == 0 {
                    order.push(entry.category.clone());
                }
                *count += 1;
            }

            let mut borrowed: HashMap<&str, HashSet<&str>> = HashMap::new();
            let entries = archive.as_ref().map(archive_entries).unwrap_or_default();
            for entry in entries.iter().filter_map(Value::as_object) {
                let Some(name) = ARCHIVE_DOCUMENT.string(entry) else {
                    continue;
                };
                let id = join_key(name);
                if let Some((id, book)) = table.get_key_value(id) {
                    borrowed
                        .entry(book.category.as_str())
                        .or_default()
                        .insert(id.as_str());
                }
            }

            Ok(order
                .into_iter()
                .map(|name| {
                    let books = book_counts.get(&name).copied().unwrap_or(0);
                    let loans = borrowed.get(name.as_str()).map_or(0, |ids| ids.len() as u64);
                    let rate = if books == 0 {
                        0.0
                    } else {
                        round1(loans as f64 / books as f64 * 100.0)
                    };
                    CategoryPerformance {
                        name,
                        books,
                        loans,
                        rate,
                    }
                })
                .collect())
        })
        .await
    }

    /// The last six calendar months relative to `now`, oldest first.
    pub async fn monthly_trends(&self, now: DateTime<FixedOffset>) -> Result<Vec<MonthlyTrend>> {
        let key = format!("{}:{}", MONTHLY_TRENDS_KEY, now.format("%Y-%m"));
        self.cached(&key, || async move {
            let books = self.source.fetch_collection(&self.names.catalog).await?;
            let archive = self.archive().await?;
            let offset = now.offset();

            let mut trends: Vec<(DateTime<FixedOffset>, DateTime<FixedOffset>, MonthlyTrend)> =
                Vec::new();
            for back in (0..TREND_MONTHS).rev() {
                let start = month_start(&now, -back)?;
                let end = month_start(&now, 1 - back)?;
                trends.push((
                    start,
                    end,
                    MonthlyTrend {
                        month: start.format("%Y-%m").to_string(),
                        loans: 0,
                        books: 0,
                    },
                ));
            }

            let bucket = |at: DateTime<FixedOffset>| {
                trends
                    .iter()
                    .position(|(start, end, _)| at >= *start && at < *end)
            };

            let entries = archive.as_ref().map(archive_entries).unwrap_or_default();
            let loan_buckets: Vec<usize> = entries
                .iter()
                .filter_map(|e| archive_entry_time(e, offset))
                .filter_map(&bucket)
                .collect();

            let book_buckets: Vec<usize> = books
                .iter()
                .filter(|d| d.id != self.settings.placeholder_id)
                .filter_map(|d| d.data.as_object())
                .filter_map(|record| CREATED_AT.truthy(record))
                .filter_map(|raw| parse_timestamp(raw, offset))
                .filter_map(&bucket)
                .collect();

            for idx in loan_buckets {
                trends[idx].2.loans += 1;
            }
            for idx in book_buckets {
                trends[idx].2.books += 1;
            }
            Ok(trends.into_iter().map(|(_, _, t)| t).collect())
        })
        .await
    }
}

/// Local midnight on the first day of the month `delta` months from `now`'s month.
fn month_start(now: &DateTime<FixedOffset>, delta: i32) -> Result<DateTime<FixedOffset>> {
    let index = now.year() * 12 + now.month0() as i32 + delta;
    let (year, month) = (index.div_euclid(12), index.rem_euclid(12) as u32 + 1);
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .and_then(|d| now.offset().from_local_datetime(&d).single())
        .ok_or_else(|| EngineError::Source(format!("month {year}-{month:02} out of range")))
}

/// In-process [`StatsSource`] for tests and the CLI.
#[derive(Default)]
pub struct MemorySource {
    collections: RwLock<HashMap<String, Vec<Document>>>,
    documents: RwLock<HashMap<(String, String), Value>>,
    fetches: AtomicU64,
    failing: AtomicBool,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_collection(&self, name: impl Into<String>, docs: Vec<Document>) {
        self.collections.write().insert(name.into(), docs);
    }

    pub fn insert_document(&self, collection: impl Into<String>, id: impl Into<String>, data: Value) {
        self.documents
            .write()
            .insert((collection.into(), id.into()), data);
    }

    /// Make every later fetch fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Total fetches served or failed so far.
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::SeqCst)
    }

    fn check(&self, what: &str) -> Result<()> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(EngineError::Source(format!("{what}: unavailable")));
        }
        Ok(())
    }
}

#[async_trait]
impl StatsSource for MemorySource {
    async fn fetch_collection(&self, name: &str) -> Result<Vec<Document>> {
        self.check(name)?;
        Ok(self.collections.read().get(name).cloned().unwrap_or_default())
    }

    async fn fetch_document(&self, collection: &str, id: &str) -> Result<Option<Value>> {
        self.check(collection)?;
        Ok(self
            .documents
            .read()
            .get(&(collection.to_string(), id.to_string()))
            .cloned())
    }
}
