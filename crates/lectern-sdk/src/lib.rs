//! Lectern SDK - live library dashboard aggregation
//!
//! Binds four independent change feeds (catalog, members, configuration,
//! archive) to the reducers in `lectern-core` and keeps one consistent,
//! read-only aggregate that any number of readers can observe.
//!
//! # Quick Start
//!
//! ```rust
//! use lectern_sdk::prelude::*;
//! use serde_json::json;
//!
//! let dashboard = Dashboard::default();
//! let books = MemoryFeed::new("BiblioLivres");
//! let _handle = dashboard.attach(Source::Catalog, &books);
//!
//! books.push(Snapshot::Collection(vec![
//!     Document::new("B1", json!({"Nom": "Germinal", "Cathegorie": "Roman"})),
//! ]));
//!
//! assert_eq!(dashboard.stats().total_books, 1);
//! ```
//!
//! # Architecture
//!
//! - [`engine`] - the [`Dashboard`] and its feed handles
//! - [`feed`] - change-feed boundary and in-process feeds
//! - [`cache`] - time-bounded result cache
//! - [`service`] - cached on-demand statistics queries
//! - [`config`] - engine configuration
//! - [`error`] - error types

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod feed;
pub mod service;

pub use cache::{ResultCache, DEFAULT_TTL};
pub use config::{EngineConfig, EngineConfigBuilder};
pub use engine::{Dashboard, DashboardEvent, FeedHandle, FeedHealth};
pub use error::{EngineError, Result};
pub use feed::{ChangeFeed, ErrorCallback, FeedError, MemoryFeed, SnapshotCallback, StreamFeed, Subscription};
pub use service::{
    CategoryPerformance, CollectionNames, MemorySource, MonthlyTrend, StatisticsService,
    StatsSource, SystemStats,
};

// Re-export the data model
pub use lectern_core::{
    AggregateState, Clock, DashboardStats, Document, FixedClock, Fragment, OrgSettings, Snapshot,
    Source, SystemClock,
};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::EngineConfig;
    pub use crate::engine::{Dashboard, DashboardEvent, FeedHandle};
    pub use crate::error::EngineError;
    pub use crate::feed::{ChangeFeed, FeedError, MemoryFeed, StreamFeed};
    pub use crate::service::{MemorySource, StatisticsService, StatsSource};
    pub use lectern_core::{AggregateState, DashboardStats, Document, Snapshot, Source};
}
