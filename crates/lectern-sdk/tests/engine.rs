//! Engine integration tests
//!
//! These drive a `Dashboard` through real feeds: concurrent delivery from
//! independent threads, teardown, the loading flag, and failure isolation.

use async_stream::stream;
use chrono::{DateTime, FixedOffset, TimeZone};
use lectern_sdk::prelude::*;
use lectern_sdk::{ErrorCallback, FeedHealth, FixedClock, SnapshotCallback, Subscription};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::runtime::Handle;

fn now() -> DateTime<FixedOffset> {
    FixedOffset::east_opt(3600)
        .unwrap()
        .with_ymd_and_hms(2026, 3, 18, 10, 0, 0)
        .unwrap()
}

fn dashboard() -> Dashboard {
    Dashboard::default().with_clock(Arc::new(FixedClock(now())))
}

fn catalog(n: usize) -> Snapshot {
    let mut docs = vec![Document::new("_placeholder", json!({}))];
    docs.extend((0..n).map(|i| {
        Document::new(
            format!("B{i}"),
            json!({"Nom": format!("Livre {i}"), "Cathegorie": if i % 2 == 0 { "Roman" } else { "Poésie" }}),
        )
    }));
    Snapshot::Collection(docs)
}

fn members(borrowing: usize) -> Snapshot {
    Snapshot::Collection(
        (0..borrowing)
            .map(|i| Document::new(format!("U{i}"), json!({"Etat1": "emprunt"})))
            .collect(),
    )
}

fn archive(n: usize) -> Snapshot {
    let entries: Vec<Value> = (0..n)
        .map(|i| json!({"heure": now().to_rfc3339(), "nomDoc": format!("B{} - Livre", i % 3)}))
        .collect();
    Snapshot::Document(Some(json!({ "tableauArchives": entries })))
}

fn settings(version: usize) -> Snapshot {
    Snapshot::Document(Some(json!({"Name": format!("Bibliothèque v{version}")})))
}

fn labelled_catalog(label: &str, n: usize) -> Snapshot {
    Snapshot::Collection(
        (0..n)
            .map(|i| Document::new(format!("B{i}"), json!({"Nom": format!("{label} {i}"), "Cathegorie": label})))
            .collect(),
    )
}

/// A feed whose deliveries are not serialized: each `deliver` runs the
/// callback on the calling thread, like a transport with one worker per event.
#[derive(Default)]
struct UnorderedFeed {
    on_snapshot: Mutex<Option<SnapshotCallback>>,
}

impl UnorderedFeed {
    fn deliver(&self, snapshot: Snapshot) {
        let callback = self.on_snapshot.lock().clone();
        if let Some(callback) = callback {
            callback(snapshot);
        }
    }
}

impl ChangeFeed for UnorderedFeed {
    fn subscribe(&self, on_snapshot: SnapshotCallback, _on_error: ErrorCallback) -> Subscription {
        *self.on_snapshot.lock() = Some(on_snapshot);
        Subscription::noop()
    }
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn test_concurrent_feeds_converge_to_last_snapshots() {
    const ROUNDS: usize = 200;

    let dashboard = dashboard();
    let books = MemoryFeed::new("BiblioLivres");
    let users = MemoryFeed::new("BiblioUser");
    let config = MemoryFeed::new("OrgSettings");
    let arch = MemoryFeed::new("Arch");

    let _handles = [
        dashboard.attach(Source::Catalog, &books),
        dashboard.attach(Source::Members, &users),
        dashboard.attach(Source::Config, &config),
        dashboard.attach(Source::Archive, &arch),
    ];

    thread::scope(|s| {
        s.spawn(|| (1..=ROUNDS).for_each(|i| books.push(catalog(i))));
        s.spawn(|| (1..=ROUNDS).for_each(|i| users.push(members(i / 2))));
        s.spawn(|| (1..=ROUNDS).for_each(|i| config.push(settings(i))));
        s.spawn(|| (1..=ROUNDS).for_each(|i| arch.push(archive(i))));
    });

    let stats = dashboard.stats();
    assert_eq!(stats.total_books, ROUNDS as u64);
    assert_eq!(stats.active_loans, (ROUNDS / 2) as u64);
    assert_eq!(stats.rotation_rate, 50.0);
    assert_eq!(stats.monthly_loans, ROUNDS as u64);
    assert_eq!(
        dashboard.settings().and_then(|s| s.name().map(str::to_owned)),
        Some(format!("Bibliothèque v{ROUNDS}"))
    );

    let state = dashboard.state();
    for source in Source::ALL {
        assert_eq!(state.revision(source), ROUNDS as u64, "{source}");
    }
}

#[test]
fn test_readers_never_see_torn_rotation() {
    let dashboard = Arc::new(dashboard());
    let books = MemoryFeed::new("BiblioLivres");
    let users = MemoryFeed::new("BiblioUser");
    let _b = dashboard.attach(Source::Catalog, &books);
    let _u = dashboard.attach(Source::Members, &users);

    thread::scope(|s| {
        s.spawn(|| (1..=100).for_each(|i| books.push(catalog(i))));
        s.spawn(|| (1..=100).for_each(|i| users.push(members(i))));
        s.spawn(|| {
            for _ in 0..500 {
                let state = dashboard.state();
                let expected =
                    lectern_core::stats::rotation_rate(state.active_loans(), state.total_books());
                assert_eq!(state.rotation_rate(), expected);
            }
        });
    });
}

// ============================================================================
// Teardown
// ============================================================================

#[test]
fn test_no_apply_after_detach_returns() {
    let dashboard = dashboard();
    let books = MemoryFeed::new("BiblioLivres");
    let handle = dashboard.attach(Source::Catalog, &books);

    thread::scope(|s| {
        let pusher = s.spawn(|| {
            for i in 1..=1000 {
                books.push(catalog(i));
            }
        });
        thread::sleep(Duration::from_millis(1));
        handle.detach();
        let frozen = dashboard.state();
        pusher.join().unwrap();

        assert_eq!(dashboard.state().revision(Source::Catalog), frozen.revision(Source::Catalog));
        assert_eq!(dashboard.state().total_books(), frozen.total_books());
    });

    assert_eq!(books.listener_count(), 0);
}

#[test]
fn test_detach_during_catalog_reduction_leaves_cross_reference_alone() {
    let dashboard = dashboard();
    let books = UnorderedFeed::default();
    let handle = dashboard.attach(Source::Catalog, &books);
    let large = labelled_catalog("OLD", 200_000);

    thread::scope(|s| {
        let reducing = s.spawn(|| books.deliver(large));
        thread::sleep(Duration::from_millis(5));
        handle.detach();
        let generation = dashboard.cross_reference().generation();
        let len = dashboard.cross_reference().len();
        reducing.join().unwrap();

        assert_eq!(dashboard.cross_reference().generation(), generation);
        assert_eq!(dashboard.cross_reference().len(), len);
    });
}

#[test]
fn test_reattach_after_detach_moves_forward() {
    let dashboard = dashboard();
    let books = MemoryFeed::new("BiblioLivres");

    let first = dashboard.attach(Source::Catalog, &books);
    books.push(catalog(3));
    books.push(catalog(4));
    drop(first);

    // replay of the last snapshot plus one fresh push
    let _second = dashboard.attach(Source::Catalog, &books);
    books.push(catalog(9));

    assert_eq!(dashboard.state().total_books(), 9);
    assert_eq!(dashboard.state().revision(Source::Catalog), 4);
}

#[tokio::test]
async fn test_detach_emits_event() {
    let dashboard = dashboard();
    let mut events = dashboard.subscribe();
    let feed = MemoryFeed::new("Arch");

    let handle = dashboard.attach(Source::Archive, &feed);
    handle.detach();
    handle.detach();

    match events.recv().await.unwrap() {
        DashboardEvent::Detached { source } => assert_eq!(source, Source::Archive),
        other => panic!("unexpected event {other:?}"),
    }
    assert!(events.try_recv().is_err());
}

// ============================================================================
// Loading and failure isolation
// ============================================================================

#[tokio::test]
async fn test_loading_waits_for_config_only() {
    let dashboard = dashboard();
    let mut loading = dashboard.watch_loading();
    let books = MemoryFeed::new("BiblioLivres");
    let config = MemoryFeed::new("OrgSettings");
    let _b = dashboard.attach(Source::Catalog, &books);
    let _c = dashboard.attach(Source::Config, &config);

    books.push(catalog(2));
    assert!(dashboard.is_loading());

    config.push(Snapshot::Document(None));
    loading.changed().await.unwrap();
    assert!(!*loading.borrow());

    // a missing settings document still counts as an answer
    assert_eq!(dashboard.settings().map(|s| s.is_empty()), Some(true));
}

#[test]
fn test_failed_feed_leaves_others_running() {
    let dashboard = dashboard();
    let books = MemoryFeed::new("BiblioLivres");
    let users = MemoryFeed::new("BiblioUser");
    let _b = dashboard.attach(Source::Catalog, &books);
    let _u = dashboard.attach(Source::Members, &users);

    books.push(catalog(5));
    users.fail(FeedError::Transport("connection reset".into()));
    books.push(catalog(6));

    let health = dashboard.feed_health();
    assert_eq!(health[&Source::Catalog].snapshots_applied, 2);
    assert_eq!(
        health[&Source::Members],
        FeedHealth {
            snapshots_applied: 0,
            snapshots_rejected: 0,
            last_error: Some("transport error: connection reset".into()),
            attached: true,
        }
    );
    assert_eq!(dashboard.stats().total_books, 6);
    assert!(dashboard.is_loading());
}

#[test]
fn test_missing_archive_keeps_previous_fragment() {
    let dashboard = dashboard();
    let arch = MemoryFeed::new("Arch");
    let _a = dashboard.attach(Source::Archive, &arch);

    arch.push(archive(4));
    arch.push(Snapshot::Document(None));

    assert_eq!(dashboard.stats().monthly_loans, 4);
}

#[test]
fn test_archive_join_uses_catalog_titles() {
    let dashboard = dashboard();
    let books = MemoryFeed::new("BiblioLivres");
    let arch = MemoryFeed::new("Arch");
    let _b = dashboard.attach(Source::Catalog, &books);
    let _a = dashboard.attach(Source::Archive, &arch);

    books.push(catalog(3));
    arch.push(archive(7));

    let top = dashboard.stats().top_borrowed_books;
    let rows: Vec<(&str, &str, u64)> = top
        .iter()
        .map(|b| (b.title.as_str(), b.category.as_str(), b.count))
        .collect();
    assert_eq!(
        rows,
        vec![("Livre 0", "Roman", 3), ("Livre 1", "Poésie", 2), ("Livre 2", "Roman", 2)]
    );
}

#[test]
fn test_overlapping_catalog_deliveries_join_newest_titles() {
    let dashboard = dashboard();
    let books = UnorderedFeed::default();
    let arch = MemoryFeed::new("Arch");
    let _b = dashboard.attach(Source::Catalog, &books);
    let _a = dashboard.attach(Source::Archive, &arch);
    let large = labelled_catalog("OLD", 200_000);

    thread::scope(|s| {
        let slow = s.spawn(|| books.deliver(large));
        thread::sleep(Duration::from_millis(20));
        books.deliver(labelled_catalog("NEW", 1));
        slow.join().unwrap();
    });
    arch.push(archive(1));

    let stats = dashboard.stats();
    assert_eq!(stats.total_books, 1);
    assert_eq!(stats.top_borrowed_books[0].title, "NEW 0");
    assert_eq!(stats.top_borrowed_books[0].category, "NEW");
    assert_eq!(dashboard.cross_reference().len(), 1);
    assert_eq!(
        dashboard.cross_reference().revision(),
        dashboard.state().revision(Source::Catalog)
    );
}

#[test]
fn test_attach_while_pushing_converges_to_last_push() {
    const ROUNDS: usize = 300;

    let books = MemoryFeed::new("BiblioLivres");
    books.push(catalog(0));
    let dashboards: Vec<Dashboard> = (0..40).map(|_| dashboard()).collect();

    let handles = thread::scope(|s| {
        s.spawn(|| (1..=ROUNDS).for_each(|i| books.push(catalog(i))));
        dashboards
            .iter()
            .map(|d| d.attach(Source::Catalog, &books))
            .collect::<Vec<_>>()
    });

    for dashboard in &dashboards {
        assert_eq!(dashboard.state().total_books(), ROUNDS as u64);
    }
    drop(handles);
}

#[test]
fn test_repeated_snapshot_is_stable() {
    let dashboard = dashboard();
    let books = MemoryFeed::new("BiblioLivres");
    let _b = dashboard.attach(Source::Catalog, &books);

    books.push(catalog(10));
    let once = dashboard.stats();
    books.push(catalog(10));

    assert_eq!(dashboard.stats(), once);
}

// ============================================================================
// Stream feeds
// ============================================================================

#[tokio::test]
async fn test_stream_feed_drives_dashboard() {
    let dashboard = dashboard();
    let mut events = dashboard.subscribe();

    let feed = StreamFeed::new(Handle::current(), || {
        stream! {
            for i in 1..=3 {
                yield Ok(catalog(i * 10));
                tokio::task::yield_now().await;
            }
            yield Err(FeedError::Closed);
        }
    });
    let _handle = dashboard.attach(Source::Catalog, &feed);

    let mut revisions = Vec::new();
    loop {
        match events.recv().await.unwrap() {
            DashboardEvent::Updated { revision, state, .. } => {
                revisions.push(revision);
                assert_eq!(state.total_books(), revision * 10);
            }
            DashboardEvent::FeedFailed { source, error } => {
                assert_eq!(source, Source::Catalog);
                assert_eq!(error, FeedError::Closed);
                break;
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    assert_eq!(revisions, vec![1, 2, 3]);
    assert_eq!(dashboard.stats().total_books, 30);
}
