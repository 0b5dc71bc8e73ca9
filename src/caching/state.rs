//! Shared state owned by a [`DataProvider`](super::DataProvider) and borrowed by
//! the coordinator, the invalidation engine and the stats reporter.

use dashmap::{DashMap, DashSet};
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::store::{CacheStore, TtlPolicy};
use crate::core::error::ProviderResult;

/// A fetch shared by every caller of the same key
pub type SharedFetch<V> = Shared<BoxFuture<'static, ProviderResult<V>>>;

/// Change notification for subscribers (UI re-render hooks, debug panel)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CacheEvent {
    /// A network fetch started for the key
    Loading { key: String },

    /// A fresh value was stored
    Updated { key: String },

    /// The fetch failed; previously cached data is untouched
    Failed { key: String, message: String },

    /// The fetch finished after the key was invalidated; its value was not stored
    Discarded { key: String },

    /// Keys removed by an invalidation
    Invalidated { keys: Vec<String> },

    /// The whole cache was cleared
    Cleared { count: usize },

    /// Keys dropped by the stale sweep
    Swept { keys: Vec<String> },
}

/// One outstanding fetch
pub(crate) struct InFlightRequest<V> {
    pub id: u64,
    pub future: SharedFetch<V>,
    pub superseded: Arc<AtomicBool>,
    pub started_at: Instant,
}

/// Operation counters
#[derive(Debug, Default)]
pub struct ProviderCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    forced: AtomicU64,
    fetches: AtomicU64,
    joined: AtomicU64,
    failures: AtomicU64,
    discarded: AtomicU64,
    swept: AtomicU64,
}

/// Point-in-time copy of [`ProviderCounters`]
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub forced: u64,
    pub fetches: u64,
    pub joined: u64,
    pub failures: u64,
    pub discarded: u64,
    pub swept: u64,
}

impl ProviderCounters {
    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("data_provider_cache_hits_total").increment(1);
    }

    pub(crate) fn record_miss(&self, force: bool) {
        if force {
            self.forced.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("data_provider_cache_misses_total").increment(1);
        }
    }

    pub(crate) fn record_fetch(&self) {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("data_provider_fetches_total").increment(1);
    }

    pub(crate) fn record_join(&self) {
        self.joined.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("data_provider_fetches_joined_total").increment(1);
    }

    pub(crate) fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("data_provider_fetch_failures_total").increment(1);
    }

    pub(crate) fn record_discard(&self) {
        self.discarded.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("data_provider_results_discarded_total").increment(1);
    }

    pub(crate) fn record_sweep(&self, count: usize) {
        self.swept.fetch_add(count as u64, Ordering::Relaxed);
        metrics::counter!("data_provider_entries_swept_total").increment(count as u64);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            forced: self.forced.load(Ordering::Relaxed),
            fetches: self.fetches.load(Ordering::Relaxed),
            joined: self.joined.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            swept: self.swept.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn reset(&self) {
        for counter in [
            &self.hits,
            &self.misses,
            &self.forced,
            &self.fetches,
            &self.joined,
            &self.failures,
            &self.discarded,
            &self.swept,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Everything the cache layer mutates
pub struct SharedState<V> {
    pub(crate) store: CacheStore<V>,
    pub(crate) loading: DashSet<String>,
    pub(crate) errors: DashMap<String, String>,
    /// Check-and-register and settle-and-store both happen under this lock
    pub(crate) in_flight: Mutex<HashMap<String, InFlightRequest<V>>>,
    pub(crate) counters: ProviderCounters,
    events: broadcast::Sender<CacheEvent>,
    next_request_id: AtomicU64,
}

impl<V: Clone + Send + Sync + 'static> SharedState<V> {
    pub fn new(ttl_policy: TtlPolicy, event_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self {
            store: CacheStore::new(ttl_policy),
            loading: DashSet::new(),
            errors: DashMap::new(),
            in_flight: Mutex::new(HashMap::new()),
            counters: ProviderCounters::default(),
            events,
            next_request_id: AtomicU64::new(1),
        }
    }

    pub fn store(&self) -> &CacheStore<V> {
        &self.store
    }

    pub fn counters(&self) -> &ProviderCounters {
        &self.counters
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    pub(crate) fn publish(&self, event: CacheEvent) {
        // No subscribers is the common case
        let _ = self.events.send(event);
    }

    pub(crate) fn next_request_id(&self) -> u64 {
        self.next_request_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Record the outcome of a fetch and retire its in-flight entry.
    pub(crate) fn settle(&self, key: &str, request_id: u64, result: &ProviderResult<V>) {
        let mut in_flight = self.in_flight.lock();

        let superseded = match in_flight.get(key) {
            Some(request) if request.id == request_id => {
                let superseded = request.superseded.load(Ordering::SeqCst);
                debug!(
                    key,
                    elapsed_ms = request.started_at.elapsed().as_millis() as u64,
                    "Fetch settled"
                );
                in_flight.remove(key);
                self.loading.remove(key);
                superseded
            }
            // Not ours any more; never let it overwrite newer state
            _ => true,
        };

        match result {
            Ok(value) if !superseded => {
                self.store.set(key, value.clone(), None);
                self.errors.remove(key);
                self.publish(CacheEvent::Updated { key: key.to_string() });
            }
            Ok(_) => {
                self.counters.record_discard();
                warn!(key, "Discarding fetch result for a key invalidated while in flight");
                self.publish(CacheEvent::Discarded { key: key.to_string() });
            }
            Err(err) => {
                let message = err.message();
                // Invalidation already cleared this key's error state
                if !superseded {
                    self.errors.insert(key.to_string(), message.clone());
                }
                self.counters.record_failure();
                warn!(key, superseded, error = %err, "Fetch failed");
                self.publish(CacheEvent::Failed {
                    key: key.to_string(),
                    message,
                });
            }
        }
    }
}
