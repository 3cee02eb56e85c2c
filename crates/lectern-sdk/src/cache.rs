//! Time-bounded memoization for on-demand statistics.

use crate::error::Result;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Clone, Debug)]
struct CacheEntry {
    value: Value,
    stored_at: Instant,
}

/// Key-value cache with a single time-to-live.
///
/// An entry is served while its age is at most the TTL and evicted by the
/// first lookup after that. Writers overwrite unconditionally.
#[derive(Debug)]
pub struct ResultCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl ResultCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        {
            let entries = self.entries.read();
            let entry = entries.get(key)?;
            if entry.stored_at.elapsed() <= self.ttl {
                return Some(entry.value.clone());
            }
        }
        let mut entries = self.entries.write();
        // re-check: a writer may have refreshed the key in between
        if let Some(entry) = entries.get(key) {
            if entry.stored_at.elapsed() <= self.ttl {
                return Some(entry.value.clone());
            }
            entries.remove(key);
            debug!(key, "cache entry expired");
        }
        None
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.entries.write().insert(
            key.into(),
            CacheEntry {
                value,
                stored_at: Instant::now(),
            },
        );
    }

    /// Typed lookup. An entry that no longer decodes as `T` is a miss.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key)?;
        match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(err) => {
                debug!(key, error = %err, "cached value has unexpected shape");
                None
            }
        }
    }

    pub fn set_from<T: Serialize>(&self, key: impl Into<String>, value: &T) -> Result<()> {
        self.set(key, serde_json::to_value(value)?);
        Ok(())
    }

    /// Number of stored entries, expired ones included until looked up.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}
