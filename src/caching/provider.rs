//! # Data Provider
//!
//! The explicitly constructed context object that owns the cache store, the
//! request coordinator, the invalidation engine and the stats reporter. It is
//! created once at application start, cloned (cheaply, it is `Arc`-backed) into
//! every consumer, cleared with [`DataProvider::reset`] on logout and stopped
//! with [`DataProvider::shutdown`].

use parking_lot::Mutex;
use serde_json::Value;
use std::future::Future;
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::coordinator::RequestCoordinator;
use super::invalidation::{DependencyTable, InvalidationEngine, InvalidationReport, Mutation};
use super::state::{CacheEvent, SharedState};
use super::stats::{CacheStatsSnapshot, StatsReporter};
use super::store::{CacheEntry, TtlPolicy};
use crate::core::config::CacheConfig;
use crate::core::error::ProviderResult;

/// Cache and request-coordination context
pub struct DataProvider<V = Value> {
    state: Arc<SharedState<V>>,
    coordinator: RequestCoordinator<V>,
    invalidation: InvalidationEngine<V>,
    stats: StatsReporter<V>,
    config: Arc<CacheConfig>,
    sweeper: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl<V> Clone for DataProvider<V> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            coordinator: self.coordinator.clone(),
            invalidation: self.invalidation.clone(),
            stats: self.stats.clone(),
            config: Arc::clone(&self.config),
            sweeper: Arc::clone(&self.sweeper),
        }
    }
}

impl<V: Clone + Send + Sync + 'static> DataProvider<V> {
    /// Create a provider with the default resource dependency table
    pub fn new(config: CacheConfig) -> Self {
        Self::with_dependency_table(config, DependencyTable::default())
    }

    pub fn with_dependency_table(config: CacheConfig, table: DependencyTable) -> Self {
        let state = Arc::new(SharedState::new(
            TtlPolicy::from_config(&config),
            config.event_capacity,
        ));

        info!(
            default_ttl_secs = config.default_ttl.as_secs(),
            overrides = config.ttl_overrides.len(),
            "Data provider initialized"
        );

        Self {
            coordinator: RequestCoordinator::new(Arc::clone(&state)),
            invalidation: InvalidationEngine::new(Arc::clone(&state), table),
            stats: StatsReporter::new(Arc::clone(&state)),
            state,
            config: Arc::new(config),
            sweeper: Arc::new(Mutex::new(None)),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn coordinator(&self) -> &RequestCoordinator<V> {
        &self.coordinator
    }

    pub fn invalidation(&self) -> &InvalidationEngine<V> {
        &self.invalidation
    }

    pub fn stats_reporter(&self) -> &StatsReporter<V> {
        &self.stats
    }

    /// See [`RequestCoordinator::fetch_data`]
    pub async fn fetch_data<F, Fut>(&self, key: &str, fetch_fn: F, force: bool) -> ProviderResult<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ProviderResult<V>> + Send + 'static,
    {
        self.coordinator.fetch_data(key, fetch_fn, force).await
    }

    /// See [`RequestCoordinator::fetch_future`]
    pub async fn fetch_future<Fut>(&self, key: &str, future: Fut, force: bool) -> ProviderResult<V>
    where
        Fut: Future<Output = ProviderResult<V>> + Send + 'static,
    {
        self.coordinator.fetch_future(key, future, force).await
    }

    /// See [`InvalidationEngine::invalidate`]
    pub fn invalidate_cache(&self, key: Option<&str>, prefix: Option<&str>) -> InvalidationReport {
        self.invalidation.invalidate(key, prefix)
    }

    /// Dependency-table fan-out for a completed mutation
    pub fn invalidate_mutation(&self, mutation: &Mutation) -> InvalidationReport {
        self.invalidation.invalidate_mutation(mutation)
    }

    pub fn cache_stats(&self) -> CacheStatsSnapshot {
        self.stats.cache_stats()
    }

    /// Cached value, stale or not
    pub fn cached(&self, key: &str) -> Option<V> {
        self.state.store.get(key).map(|entry| entry.value)
    }

    pub fn entry(&self, key: &str) -> Option<CacheEntry<V>> {
        self.state.store.get(key)
    }

    pub fn is_stale(&self, key: &str) -> bool {
        self.state.store.is_stale(key)
    }

    pub fn is_loading(&self, key: &str) -> bool {
        self.state.loading.contains(key)
    }

    /// Message of the last failed fetch for `key`
    pub fn error(&self, key: &str) -> Option<String> {
        self.state.errors.get(key).map(|e| e.value().clone())
    }

    /// Forget the recorded error for `key`, returning it
    pub fn reset_error(&self, key: &str) -> Option<String> {
        self.state.errors.remove(key).map(|(_, message)| message)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.state.subscribe()
    }

    /// Drop entries stale beyond the configured grace multiple of their TTL
    pub fn sweep_stale(&self) -> Vec<String> {
        sweep(&self.state, self.config.sweep.grace_multiple)
    }

    /// Start the periodic stale sweep. Returns false when disabled, when the
    /// interval is zero, or when already running.
    pub fn spawn_sweeper(&self) -> bool {
        if !self.config.sweep.enabled {
            return false;
        }
        if self.config.sweep.interval.is_zero() {
            warn!("Stale sweep interval is zero, not starting the sweeper");
            return false;
        }

        let mut slot = self.sweeper.lock();
        if slot.as_ref().map(|h| !h.is_finished()).unwrap_or(false) {
            return false;
        }

        let state: Weak<SharedState<V>> = Arc::downgrade(&self.state);
        let period = self.config.sweep.interval;
        let grace = self.config.sweep.grace_multiple;

        *slot = Some(tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(state) = state.upgrade() else {
                    debug!("Data provider dropped, stopping stale sweep");
                    break;
                };
                sweep(&state, grace);
            }
        }));

        info!(interval_secs = period.as_secs(), grace_multiple = grace, "Stale sweep started");
        true
    }

    /// Full reset (logout): clears entries, errors and counters. In-flight
    /// requests finish but their results are discarded.
    pub fn reset(&self) -> InvalidationReport {
        let report = self.invalidation.invalidate_all();
        self.state.counters.reset();
        report
    }

    /// Stop background work
    pub fn shutdown(&self) {
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
            info!("Stale sweep stopped");
        }
    }
}

impl Default for DataProvider<Value> {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

fn sweep<V: Clone + Send + Sync + 'static>(state: &SharedState<V>, grace_multiple: u32) -> Vec<String> {
    let swept = state.store.sweep_stale(grace_multiple);
    if !swept.is_empty() {
        state.counters.record_sweep(swept.len());
        state.publish(CacheEvent::Swept { keys: swept.clone() });
    }
    swept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::SweepConfig;
    use crate::core::error::ProviderError;
    use std::time::Duration;
    use tokio::time::advance;

    fn config() -> CacheConfig {
        CacheConfig {
            default_ttl: Duration::from_secs(60),
            sweep: SweepConfig {
                enabled: true,
                interval: Duration::from_secs(30),
                grace_multiple: 2,
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_error_state_lifecycle() {
        let provider: DataProvider<String> = DataProvider::new(config());

        let err = provider
            .fetch_future("users/all", async { Err(ProviderError::forbidden()) }, false)
            .await
            .unwrap_err();
        assert!(err.is_authorization());
        assert_eq!(provider.error("users/all"), Some(err.message()));
        assert_eq!(provider.cached("users/all"), None);
        assert!(!provider.is_loading("users/all"));

        provider
            .fetch_future("users/all", async { Ok("users".to_string()) }, false)
            .await
            .unwrap();
        assert_eq!(provider.error("users/all"), None);
        assert_eq!(provider.cached("users/all").as_deref(), Some("users"));
    }

    #[tokio::test]
    async fn test_reset_error() {
        let provider: DataProvider<String> = DataProvider::new(config());
        let _ = provider
            .fetch_future("tours/all", async { Err(ProviderError::network("offline")) }, false)
            .await;
        assert_eq!(provider.reset_error("tours/all"), Some("Network error: offline".to_string()));
        assert_eq!(provider.error("tours/all"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_sweeper_drops_long_stale_entries() {
        let provider: DataProvider<String> = DataProvider::new(config());
        provider
            .fetch_future("tours/all", async { Ok("tours".to_string()) }, false)
            .await
            .unwrap();
        let mut events = provider.subscribe();

        assert!(provider.spawn_sweeper());
        assert!(!provider.spawn_sweeper());
        // Let the sweeper register its interval at t=0
        tokio::task::yield_now().await;

        // 2 * 60s grace plus one sweep period
        advance(Duration::from_secs(151)).await;
        tokio::task::yield_now().await;

        assert!(provider.cached("tours/all").is_none());
        assert_eq!(
            events.recv().await.unwrap(),
            CacheEvent::Swept { keys: vec!["tours/all".to_string()] }
        );
        assert_eq!(provider.cache_stats().counters.swept, 1);
        provider.shutdown();
    }

    #[tokio::test]
    async fn test_zero_interval_sweeper_is_not_started() {
        let mut config = config();
        config.sweep.interval = Duration::ZERO;
        let provider: DataProvider<String> = DataProvider::new(config);

        assert!(!provider.spawn_sweeper());
        assert!(provider.sweeper.lock().is_none());
        // Manual sweeps still work
        assert!(provider.sweep_stale().is_empty());
    }

    #[tokio::test]
    async fn test_reset_clears_counters() {
        let provider: DataProvider<String> = DataProvider::new(config());
        provider
            .fetch_future("dashboard", async { Ok("stats".to_string()) }, false)
            .await
            .unwrap();
        assert_eq!(provider.cache_stats().counters.fetches, 1);

        let report = provider.reset();
        assert!(report.cleared);
        assert_eq!(report.removed, vec!["dashboard".to_string()]);
        assert_eq!(provider.cache_stats().counters.fetches, 0);
        assert_eq!(provider.cache_stats().total_items, 0);
    }
}
