//! # Request Coordinator
//!
//! `fetch_data` is the single entry point UI code uses to read a remote
//! resource. It serves fresh cached values directly, and otherwise makes sure
//! only one network request per key is outstanding: every concurrent caller for
//! the same key awaits the same shared future and observes the same value or
//! the same error.
//!
//! Fetches run as spawned tokio tasks, so a caller giving up on its future
//! never cancels the request for the others.

use futures::future::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::debug;

use super::state::{CacheEvent, InFlightRequest, SharedFetch, SharedState};
use crate::core::error::{ProviderError, ProviderResult};

/// Deduplicating read path over the cache store
pub struct RequestCoordinator<V> {
    state: Arc<SharedState<V>>,
}

impl<V> Clone for RequestCoordinator<V> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<V: Clone + Send + Sync + 'static> RequestCoordinator<V> {
    pub fn new(state: Arc<SharedState<V>>) -> Self {
        Self { state }
    }

    /// Read `key`, fetching it with `fetch_fn` when needed.
    ///
    /// 1. `force == false` and a fresh entry exists: the cached value, no loading state.
    /// 2. A request for `key` is already in flight: join it (even when forced).
    /// 3. Otherwise start `fetch_fn()` and register it as the in-flight request.
    ///
    /// `fetch_fn` is invoked while the in-flight table is locked and must only
    /// build its future; it must not call back into the provider synchronously.
    pub async fn fetch_data<F, Fut>(&self, key: &str, fetch_fn: F, force: bool) -> ProviderResult<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ProviderResult<V>> + Send + 'static,
    {
        if !force {
            if let Some(value) = self.state.store.fresh_value(key) {
                self.state.counters.record_hit();
                debug!(key, "Cache hit");
                return Ok(value);
            }
        }

        let fetch = self.join_or_start(key, fetch_fn, force);
        fetch.await
    }

    /// Same as [`fetch_data`](Self::fetch_data) for an already-built future.
    pub async fn fetch_future<Fut>(&self, key: &str, future: Fut, force: bool) -> ProviderResult<V>
    where
        Fut: Future<Output = ProviderResult<V>> + Send + 'static,
    {
        self.fetch_data(key, move || future, force).await
    }

    /// Whether a request for `key` is outstanding
    pub fn is_in_flight(&self, key: &str) -> bool {
        self.state.in_flight.lock().contains_key(key)
    }

    /// Keys with an outstanding request
    pub fn in_flight_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.state.in_flight.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    fn join_or_start<F, Fut>(&self, key: &str, fetch_fn: F, force: bool) -> SharedFetch<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ProviderResult<V>> + Send + 'static,
    {
        let mut in_flight = self.state.in_flight.lock();

        if let Some(existing) = in_flight.get(key) {
            self.state.counters.record_join();
            debug!(key, force, "Joining in-flight request");
            return existing.future.clone();
        }

        // Build the future first: a synchronous panic here must leave no trace
        let future = fetch_fn();
        let request_id = self.state.next_request_id();

        self.state.counters.record_miss(force);
        self.state.counters.record_fetch();
        self.state.loading.insert(key.to_string());
        self.state.errors.remove(key);
        self.state.publish(CacheEvent::Loading { key: key.to_string() });
        debug!(key, force, "Starting fetch");

        let state = Arc::clone(&self.state);
        let task_key = key.to_string();
        let handle = tokio::spawn(async move {
            let result = match AssertUnwindSafe(future).catch_unwind().await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::internal(format!(
                    "Fetch for '{}' panicked",
                    task_key
                ))),
            };
            state.settle(&task_key, request_id, &result);
            result
        });

        let shared = async move {
            match handle.await {
                Ok(result) => result,
                Err(join_error) => Err(ProviderError::internal(format!(
                    "Fetch task did not complete: {}",
                    join_error
                ))),
            }
        }
        .boxed()
        .shared();

        in_flight.insert(
            key.to_string(),
            InFlightRequest {
                id: request_id,
                future: shared.clone(),
                superseded: Arc::new(AtomicBool::new(false)),
                started_at: Instant::now(),
            },
        );

        shared
    }
}
