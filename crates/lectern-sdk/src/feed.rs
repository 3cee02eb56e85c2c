//! Change-feed boundary.
//!
//! A feed delivers the entire current state of one collection or document on
//! every change. Subscribing registers a snapshot callback and an error
//! callback; the returned [`Subscription`] stops delivery when dropped or
//! explicitly unsubscribed.

use futures::{Stream, StreamExt};
use lectern_core::Snapshot;
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::runtime::Handle;
use tracing::debug;

/// Terminal failure of one feed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("feed closed")]
    Closed,
}

pub type SnapshotCallback = Arc<dyn Fn(Snapshot) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(FeedError) + Send + Sync>;

/// Handle to an active subscription. Unsubscribes exactly once.
pub struct Subscription {
    cancel: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Mutex::new(Some(Box::new(cancel))),
        }
    }

    /// A subscription with nothing to tear down.
    pub fn noop() -> Self {
        Self {
            cancel: Mutex::new(None),
        }
    }

    pub fn unsubscribe(&self) {
        let cancel = self.cancel.lock().take();
        if let Some(cancel) = cancel {
            cancel();
        }
    }

    pub fn is_active(&self) -> bool {
        self.cancel.lock().is_some()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

/// An external source of full snapshots.
pub trait ChangeFeed: Send + Sync {
    fn subscribe(&self, on_snapshot: SnapshotCallback, on_error: ErrorCallback) -> Subscription;
}

struct Listener {
    on_snapshot: SnapshotCallback,
    on_error: ErrorCallback,
}

struct MemoryFeedInner {
    name: String,
    listeners: RwLock<BTreeMap<u64, Listener>>,
    next_id: AtomicU64,
    last: RwLock<Option<Snapshot>>,
    // held across every delivery so listeners see snapshots in push order
    delivery: ReentrantMutex<()>,
}

/// In-process feed for tests and simulation.
///
/// Like a document-store listener, a new subscriber immediately receives the
/// last pushed snapshot, if any. `push` runs callbacks on the caller's thread,
/// so each feed can be driven from its own thread. Deliveries of one feed are
/// serialized: a replay never lands after a newer push.
#[derive(Clone)]
pub struct MemoryFeed {
    inner: Arc<MemoryFeedInner>,
}

impl MemoryFeed {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(MemoryFeedInner {
                name: name.into(),
                listeners: RwLock::new(BTreeMap::new()),
                next_id: AtomicU64::new(1),
                last: RwLock::new(None),
                delivery: ReentrantMutex::new(()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Deliver a snapshot to every current listener.
    pub fn push(&self, snapshot: Snapshot) {
        let _delivery = self.inner.delivery.lock();
        *self.inner.last.write() = Some(snapshot.clone());
        let callbacks: Vec<SnapshotCallback> = self
            .inner
            .listeners
            .read()
            .values()
            .map(|l| Arc::clone(&l.on_snapshot))
            .collect();
        for callback in callbacks {
            callback(snapshot.clone());
        }
    }

    /// Fail the feed. Every current listener is notified and dropped.
    pub fn fail(&self, error: FeedError) {
        let _delivery = self.inner.delivery.lock();
        let listeners = std::mem::take(&mut *self.inner.listeners.write());
        debug!(feed = %self.inner.name, listeners = listeners.len(), error = %error, "memory feed failed");
        for listener in listeners.into_values() {
            (listener.on_error)(error.clone());
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.read().len()
    }
}

impl ChangeFeed for MemoryFeed {
    fn subscribe(&self, on_snapshot: SnapshotCallback, on_error: ErrorCallback) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let delivery = self.inner.delivery.lock();
        self.inner.listeners.write().insert(
            id,
            Listener {
                on_snapshot: Arc::clone(&on_snapshot),
                on_error,
            },
        );

        let replay = self.inner.last.read().clone();
        if let Some(snapshot) = replay {
            on_snapshot(snapshot);
        }
        drop(delivery);

        let inner = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = inner.upgrade() {
                inner.listeners.write().remove(&id);
            }
        })
    }
}

/// Adapts an async stream of snapshots into a feed.
///
/// Each subscription opens a fresh stream from the factory and drains it on a
/// tokio task. An `Err` item is terminal; unsubscribing aborts the task.
pub struct StreamFeed<F> {
    handle: Handle,
    factory: F,
}

impl<F, S> StreamFeed<F>
where
    F: Fn() -> S + Send + Sync,
    S: Stream<Item = Result<Snapshot, FeedError>> + Send + 'static,
{
    pub fn new(handle: Handle, factory: F) -> Self {
        Self { handle, factory }
    }
}

impl<F, S> ChangeFeed for StreamFeed<F>
where
    F: Fn() -> S + Send + Sync,
    S: Stream<Item = Result<Snapshot, FeedError>> + Send + 'static,
{
    fn subscribe(&self, on_snapshot: SnapshotCallback, on_error: ErrorCallback) -> Subscription {
        let stream = (self.factory)();
        let task = self.handle.spawn(async move {
            let mut stream = Box::pin(stream);
            while let Some(item) = stream.next().await {
                match item {
                    Ok(snapshot) => on_snapshot(snapshot),
                    Err(err) => {
                        on_error(err);
                        return;
                    }
                }
            }
            debug!("stream feed ended");
        });
        Subscription::new(move || task.abort())
    }
}
