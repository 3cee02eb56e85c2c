//! The dashboard engine: binds change feeds to reducers and publishes the
//! aggregate state.

use crate::config::EngineConfig;
use crate::feed::{ChangeFeed, FeedError, Subscription};
use lectern_core::reducer::{ArchiveReducer, CatalogReducer, ConfigReducer, MembersReducer};
use lectern_core::{
    AggregateState, Clock, CrossReferenceStore, DashboardStats, Fragment, OrgSettings, Reducer,
    Reduction, Snapshot, Source, SystemClock,
};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

/// Events emitted by a dashboard.
#[derive(Clone, Debug)]
pub enum DashboardEvent {
    /// A fragment was accepted. Carries the state right after the merge.
    Updated {
        source: Source,
        revision: u64,
        state: Arc<AggregateState>,
    },
    /// A feed reported a terminal error. Other feeds keep running.
    FeedFailed { source: Source, error: FeedError },
    /// The configuration feed answered for the first time.
    Loaded,
    /// A feed was detached.
    Detached { source: Source },
}

/// Per-feed counters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FeedHealth {
    pub snapshots_applied: u64,
    pub snapshots_rejected: u64,
    pub last_error: Option<String>,
    pub attached: bool,
}

struct Attachment {
    source: Source,
    active: AtomicBool,
}

impl Attachment {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

struct Shared {
    state: RwLock<Arc<AggregateState>>,
    health: Mutex<HashMap<Source, FeedHealth>>,
    event_tx: broadcast::Sender<DashboardEvent>,
    loading_tx: watch::Sender<bool>,
    xref: Arc<CrossReferenceStore>,
    revisions: [AtomicU64; 4],
}

impl Shared {
    /// Revisions are ordered by delivery, per source, across attachments.
    fn next_revision(&self, source: Source) -> u64 {
        self.revisions[source as usize].fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Merge a reduction. The cross-reference table it carries is installed
    /// under the same lock, and only when the fragment itself is accepted.
    fn apply(&self, attachment: Option<&Attachment>, reduction: Reduction, revision: u64) -> bool {
        let Reduction {
            fragment,
            cross_reference,
        } = reduction;
        let source = fragment.source();
        let mut guard = self.state.write();
        if attachment.is_some_and(|a| !a.is_active()) {
            debug!(%source, revision, "dropping fragment from detached feed");
            return false;
        }
        if !Arc::make_mut(&mut guard).apply(fragment, revision) {
            drop(guard);
            debug!(%source, revision, "stale fragment ignored");
            self.record(source, |h| h.snapshots_rejected += 1);
            return false;
        }
        if let Some(table) = cross_reference {
            if !self.xref.put(table, revision) {
                debug!(revision, "older cross-reference table ignored");
            }
        }
        let state = Arc::clone(&guard);
        // published under the lock so subscribers see updates in merge order
        let _ = self.event_tx.send(DashboardEvent::Updated {
            source,
            revision,
            state,
        });
        drop(guard);
        self.record(source, |h| h.snapshots_applied += 1);
        true
    }

    fn record(&self, source: Source, f: impl FnOnce(&mut FeedHealth)) {
        f(self.health.lock().entry(source).or_default());
    }

    fn mark_loaded(&self) {
        let changed = self.loading_tx.send_if_modified(|loading| {
            if *loading {
                *loading = false;
                true
            } else {
                false
            }
        });
        if changed {
            info!("dashboard loaded");
            let _ = self.event_tx.send(DashboardEvent::Loaded);
        }
    }

    fn deliver(&self, attachment: &Attachment, reducer: &dyn Reducer, snapshot: Snapshot) {
        let source = attachment.source;
        if !attachment.is_active() {
            return;
        }
        let revision = self.next_revision(source);
        match reducer.reduce(&snapshot) {
            Ok(Some(reduction)) => {
                self.apply(Some(attachment), reduction, revision);
            }
            Ok(None) => debug!(%source, revision, "snapshot produced no fragment"),
            Err(err) => {
                warn!(%source, error = %err, "snapshot rejected");
                self.record(source, |h| {
                    h.snapshots_rejected += 1;
                    h.last_error = Some(err.to_string());
                });
            }
        }
        if source == Source::Config && attachment.is_active() {
            self.mark_loaded();
        }
    }

    fn fail(&self, attachment: &Attachment, err: FeedError) {
        let source = attachment.source;
        if !attachment.is_active() {
            return;
        }
        error!(%source, error = %err, "feed failed");
        self.record(source, |h| h.last_error = Some(err.to_string()));
        let _ = self.event_tx.send(DashboardEvent::FeedFailed { source, error: err });
        if source == Source::Config {
            self.mark_loaded();
        }
    }
}

/// Handle returned by [`Dashboard::attach`]. Detaches on drop.
pub struct FeedHandle {
    attachment: Arc<Attachment>,
    subscription: Subscription,
    shared: Arc<Shared>,
}

impl FeedHandle {
    pub fn source(&self) -> Source {
        self.attachment.source
    }

    pub fn is_attached(&self) -> bool {
        self.attachment.is_active()
    }

    /// Stop consuming the feed. Once this returns, nothing delivered through
    /// this handle reaches the state or the cross-reference store.
    pub fn detach(&self) {
        let was_active = {
            let _state = self.shared.state.write();
            self.attachment.active.swap(false, Ordering::AcqRel)
        };
        if !was_active {
            return;
        }
        self.subscription.unsubscribe();
        let source = self.attachment.source;
        self.shared.record(source, |h| h.attached = false);
        info!(%source, "feed detached");
        let _ = self.shared.event_tx.send(DashboardEvent::Detached { source });
    }
}

impl Drop for FeedHandle {
    fn drop(&mut self) {
        self.detach();
    }
}

impl std::fmt::Debug for FeedHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedHandle")
            .field("source", &self.attachment.source)
            .field("attached", &self.is_attached())
            .finish()
    }
}

/// Live aggregation over the four library feeds.
///
/// Each attached feed is reduced independently and merged into its own slot
/// of the [`AggregateState`]. Readers get an `Arc` snapshot that is never
/// mutated after publication.
pub struct Dashboard {
    shared: Arc<Shared>,
    config: EngineConfig,
    clock: Arc<dyn Clock>,
}

impl Dashboard {
    pub fn new(config: EngineConfig) -> Self {
        let (event_tx, _) = broadcast::channel(config.event_capacity.max(1));
        let (loading_tx, _) = watch::channel(true);
        Self {
            shared: Arc::new(Shared {
                state: RwLock::new(Arc::new(AggregateState::new())),
                health: Mutex::new(HashMap::new()),
                event_tx,
                loading_tx,
                xref: Arc::new(CrossReferenceStore::new()),
                revisions: Default::default(),
            }),
            config,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the clock used by the archive reducer. Affects later attachments.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn reducer_for(&self, source: Source) -> Arc<dyn Reducer> {
        let settings = self.config.reducer.clone();
        match source {
            Source::Catalog => Arc::new(CatalogReducer::new(settings)),
            Source::Members => Arc::new(MembersReducer::new(settings)),
            Source::Config => Arc::new(ConfigReducer),
            Source::Archive => Arc::new(ArchiveReducer::new(
                settings,
                self.shared.xref.clone(),
                self.clock.clone(),
            )),
        }
    }

    /// Subscribe to `feed` as the provider of `source`.
    pub fn attach(&self, source: Source, feed: &dyn ChangeFeed) -> FeedHandle {
        let attachment = Arc::new(Attachment {
            source,
            active: AtomicBool::new(true),
        });
        let reducer = self.reducer_for(source);
        self.shared.record(source, |h| h.attached = true);
        info!(%source, "attaching feed");

        let on_snapshot = {
            let shared = Arc::clone(&self.shared);
            let attachment = Arc::clone(&attachment);
            Arc::new(move |snapshot: Snapshot| {
                shared.deliver(&attachment, reducer.as_ref(), snapshot)
            })
        };
        let on_error = {
            let shared = Arc::clone(&self.shared);
            let attachment = Arc::clone(&attachment);
            Arc::new(move |err: FeedError| shared.fail(&attachment, err))
        };
        let subscription = feed.subscribe(on_snapshot, on_error);

        FeedHandle {
            attachment,
            subscription,
            shared: Arc::clone(&self.shared),
        }
    }

    /// Merge a fragment directly. Later feed deliveries for the same source
    /// are numbered above `revision`.
    pub fn apply_fragment(&self, fragment: Fragment, revision: u64) -> bool {
        self.shared.revisions[fragment.source() as usize].fetch_max(revision, Ordering::AcqRel);
        self.shared.apply(None, Reduction::new(fragment), revision)
    }

    /// Current read-only state.
    pub fn state(&self) -> Arc<AggregateState> {
        Arc::clone(&self.shared.state.read())
    }

    pub fn stats(&self) -> DashboardStats {
        self.state().stats()
    }

    pub fn settings(&self) -> Option<OrgSettings> {
        self.state().settings().cloned()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DashboardEvent> {
        self.shared.event_tx.subscribe()
    }

    /// `true` until the configuration feed answers or fails.
    pub fn watch_loading(&self) -> watch::Receiver<bool> {
        self.shared.loading_tx.subscribe()
    }

    pub fn is_loading(&self) -> bool {
        *self.shared.loading_tx.borrow()
    }

    pub fn cross_reference(&self) -> Arc<CrossReferenceStore> {
        Arc::clone(&self.shared.xref)
    }

    pub fn feed_health(&self) -> HashMap<Source, FeedHealth> {
        self.shared.health.lock().clone()
    }
}

impl Default for Dashboard {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::MemoryFeed;
    use lectern_core::reducer::reduce_catalog;
    use lectern_core::{BookFragment, Document, MemberFragment, ReducerSettings};
    use serde_json::json;

    fn catalog(n: usize) -> Snapshot {
        Snapshot::Collection(
            (0..n)
                .map(|i| Document::new(format!("B{i}"), json!({"Nom": format!("Livre {i}"), "Cathegorie": "Roman"})))
                .collect(),
        )
    }

    fn titled(prefix: &str, n: usize) -> Reduction {
        let docs: Vec<Document> = (0..n)
            .map(|i| Document::new(format!("B{i}"), json!({"Nom": format!("{prefix} {i}"), "Cathegorie": prefix})))
            .collect();
        reduce_catalog(&docs, &ReducerSettings::default()).into()
    }

    #[test]
    fn test_attach_applies_snapshots() {
        let dashboard = Dashboard::default();
        let feed = MemoryFeed::new("BiblioLivres");
        let _handle = dashboard.attach(Source::Catalog, &feed);

        feed.push(catalog(3));

        let state = dashboard.state();
        assert_eq!(state.total_books(), 3);
        assert_eq!(state.revision(Source::Catalog), 1);
        assert_eq!(dashboard.cross_reference().len(), 3);
        assert_eq!(dashboard.feed_health()[&Source::Catalog].snapshots_applied, 1);
    }

    #[test]
    fn test_apply_fragment_recomputes_rotation() {
        let dashboard = Dashboard::default();
        dashboard.apply_fragment(
            Fragment::Books(BookFragment {
                total_books: 8,
                ..Default::default()
            }),
            1,
        );
        dashboard.apply_fragment(
            Fragment::Members(MemberFragment {
                active_loans: 2,
                ..Default::default()
            }),
            1,
        );

        assert_eq!(dashboard.stats().rotation_rate, 25.0);
    }

    #[test]
    fn test_feed_revisions_continue_after_manual_apply() {
        let dashboard = Dashboard::default();
        dashboard.apply_fragment(
            Fragment::Books(BookFragment {
                total_books: 99,
                ..Default::default()
            }),
            10,
        );

        let feed = MemoryFeed::new("BiblioLivres");
        let _handle = dashboard.attach(Source::Catalog, &feed);
        feed.push(catalog(2));

        assert_eq!(dashboard.state().total_books(), 2);
        assert_eq!(dashboard.state().revision(Source::Catalog), 11);
    }

    #[test]
    fn test_detach_stops_delivery() {
        let dashboard = Dashboard::default();
        let feed = MemoryFeed::new("BiblioLivres");
        let handle = dashboard.attach(Source::Catalog, &feed);
        feed.push(catalog(1));

        handle.detach();
        feed.push(catalog(5));

        assert!(!handle.is_attached());
        assert_eq!(feed.listener_count(), 0);
        assert_eq!(dashboard.state().total_books(), 1);
        assert!(!dashboard.feed_health()[&Source::Catalog].attached);
    }

    #[test]
    fn test_config_answer_clears_loading() {
        let dashboard = Dashboard::default();
        let mut events = dashboard.subscribe();
        assert!(dashboard.is_loading());

        let feed = MemoryFeed::new("OrgSettings");
        let _handle = dashboard.attach(Source::Config, &feed);
        assert!(dashboard.is_loading());

        feed.push(Snapshot::Document(Some(json!({"Name": "Bibliothèque Centrale"}))));

        assert!(!dashboard.is_loading());
        assert_eq!(
            dashboard.settings().and_then(|s| s.name().map(str::to_owned)),
            Some("Bibliothèque Centrale".to_string())
        );
        assert!(matches!(events.try_recv(), Ok(DashboardEvent::Updated { source: Source::Config, .. })));
        assert!(matches!(events.try_recv(), Ok(DashboardEvent::Loaded)));
    }

    #[test]
    fn test_config_failure_clears_loading() {
        let dashboard = Dashboard::default();
        let feed = MemoryFeed::new("OrgSettings");
        let _handle = dashboard.attach(Source::Config, &feed);

        feed.fail(FeedError::PermissionDenied("missing claim".into()));

        assert!(!dashboard.is_loading());
        assert_eq!(
            dashboard.feed_health()[&Source::Config].last_error.as_deref(),
            Some("permission denied: missing claim")
        );
    }

    #[test]
    fn test_shape_mismatch_is_recorded() {
        let dashboard = Dashboard::default();
        let feed = MemoryFeed::new("BiblioUser");
        let _handle = dashboard.attach(Source::Members, &feed);

        feed.push(Snapshot::Document(Some(json!({}))));

        let health = &dashboard.feed_health()[&Source::Members];
        assert_eq!(health.snapshots_rejected, 1);
        assert!(health.last_error.is_some());
        assert!(!dashboard.state().has(Source::Members));
    }

    #[test]
    fn test_late_older_catalog_does_not_replace_cross_reference() {
        let dashboard = Dashboard::default();
        let feed = MemoryFeed::new("BiblioLivres");
        let handle = dashboard.attach(Source::Catalog, &feed);

        // revision 2 lands before the slower reduction of revision 1
        assert!(dashboard.shared.apply(Some(handle.attachment.as_ref()), titled("NEW", 1), 2));
        assert!(!dashboard.shared.apply(Some(handle.attachment.as_ref()), titled("OLD", 3), 1));

        let xref = dashboard.cross_reference();
        assert_eq!(dashboard.state().total_books(), 1);
        assert_eq!(xref.lookup("B0").unwrap().title, "NEW 0");
        assert!(xref.lookup("B2").is_none());
        assert_eq!(xref.revision(), 2);
    }

    #[test]
    fn test_no_cross_reference_write_after_detach() {
        let dashboard = Dashboard::default();
        let feed = MemoryFeed::new("BiblioLivres");
        let handle = dashboard.attach(Source::Catalog, &feed);
        handle.detach();

        // a reduction still in flight when detach returned
        assert!(!dashboard.shared.apply(Some(handle.attachment.as_ref()), titled("LATE", 4), 1));

        assert_eq!(dashboard.cross_reference().generation(), 0);
        assert!(dashboard.cross_reference().is_empty());
        assert!(!dashboard.state().has(Source::Catalog));
    }

    #[test]
    fn test_manual_book_fragment_keeps_cross_reference() {
        let dashboard = Dashboard::default();
        let feed = MemoryFeed::new("BiblioLivres");
        let _handle = dashboard.attach(Source::Catalog, &feed);
        feed.push(catalog(2));

        dashboard.apply_fragment(
            Fragment::Books(BookFragment {
                total_books: 40,
                ..Default::default()
            }),
            9,
        );

        assert_eq!(dashboard.state().total_books(), 40);
        assert_eq!(dashboard.cross_reference().len(), 2);
    }
}
