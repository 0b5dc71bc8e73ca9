//! # Cache Statistics
//!
//! Read-only projection over the cache store used by the debug panel and by
//! developers poking at a running provider.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::state::{CounterSnapshot, SharedState};
use super::store::CacheItemStats;

/// Snapshot returned by `cache_stats()`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheStatsSnapshot {
    pub total_items: usize,
    pub active_items: usize,
    pub stale_items: usize,
    pub items_list: Vec<CacheItemStats>,

    /// Keys with a request in flight
    pub loading_keys: Vec<String>,

    /// Keys whose last fetch failed, with the message
    pub error_keys: Vec<(String, String)>,

    pub counters: CounterSnapshot,

    pub generated_at: DateTime<Utc>,
}

impl CacheStatsSnapshot {
    /// Share of non-forced reads served from cache
    pub fn hit_ratio(&self) -> f64 {
        let lookups = self.counters.hits + self.counters.misses;
        if lookups == 0 {
            0.0
        } else {
            self.counters.hits as f64 / lookups as f64
        }
    }

    pub fn item(&self, key: &str) -> Option<&CacheItemStats> {
        self.items_list.iter().find(|item| item.key == key)
    }
}

/// Builds [`CacheStatsSnapshot`]s; never mutates state
pub struct StatsReporter<V> {
    state: Arc<SharedState<V>>,
}

impl<V> Clone for StatsReporter<V> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<V: Clone + Send + Sync + 'static> StatsReporter<V> {
    pub fn new(state: Arc<SharedState<V>>) -> Self {
        Self { state }
    }

    pub fn cache_stats(&self) -> CacheStatsSnapshot {
        let items_list = self.state.store.entries();
        let stale_items = items_list.iter().filter(|item| item.is_stale).count();

        let mut loading_keys: Vec<String> = self.state.loading.iter().map(|k| k.key().clone()).collect();
        loading_keys.sort();

        let mut error_keys: Vec<(String, String)> = self
            .state
            .errors
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        error_keys.sort();

        CacheStatsSnapshot {
            total_items: items_list.len(),
            active_items: items_list.len() - stale_items,
            stale_items,
            items_list,
            loading_keys,
            error_keys,
            counters: self.state.counters.snapshot(),
            generated_at: Utc::now(),
        }
    }
}
