//! Engine configuration.

use crate::error::{EngineError, Result};
use lectern_core::ReducerSettings;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration for the aggregation engine and its result cache.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Capacity of the dashboard event channel. Slow subscribers lag past this.
    pub event_capacity: usize,
    /// Time-to-live of memoized statistics, in seconds.
    pub cache_ttl_secs: u64,
    /// Settings handed to every reducer.
    pub reducer: ReducerSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            event_capacity: 100,
            cache_ttl_secs: 5 * 60,
            reducer: ReducerSettings::default(),
        }
    }
}

impl EngineConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Load from a JSON file. Missing keys take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("{}: {}", path.display(), e)))?;
        let config: EngineConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.event_capacity == 0 {
            return Err(EngineError::Config("event_capacity must be at least 1".into()));
        }
        if self.reducer.top_n == 0 {
            return Err(EngineError::Config("reducer.top_n must be at least 1".into()));
        }
        if self.reducer.recent_window_days < 0 {
            return Err(EngineError::Config(
                "reducer.recent_window_days must not be negative".into(),
            ));
        }
        Ok(())
    }
}

/// Builder for engine configuration.
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
        }
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.config.event_capacity = capacity;
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.config.cache_ttl_secs = ttl.as_secs();
        self
    }

    pub fn placeholder_id(mut self, id: impl Into<String>) -> Self {
        self.config.reducer.placeholder_id = id.into();
        self
    }

    pub fn top_n(mut self, n: usize) -> Self {
        self.config.reducer.top_n = n;
        self
    }

    pub fn recent_window_days(mut self, days: i64) -> Self {
        self.config.reducer.recent_window_days = days;
        self
    }

    pub fn build(self) -> EngineConfig {
        self.config
    }
}

impl Default for EngineConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
