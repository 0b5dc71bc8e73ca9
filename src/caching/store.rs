//! # Cache Store
//!
//! In-memory mapping from resource key to [`CacheEntry`]. The store is a pure
//! data structure: it never performs I/O and knows nothing about what a key
//! means. Staleness is derived from the entry's fetch instant and TTL.
//!
//! Time is measured with `tokio::time::Instant` so paused-clock tests can
//! drive expiry deterministically.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::core::config::{CacheConfig, TtlRule};

/// Cache entry with metadata
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// The cached payload
    pub value: V,

    /// When the value was fetched (monotonic)
    pub fetched_at: Instant,

    /// When the value was fetched (wall clock, for display)
    pub fetched_at_utc: DateTime<Utc>,

    /// Validity window
    pub ttl: Duration,
}

impl<V> CacheEntry<V> {
    /// Create a new entry stamped with the current time
    pub fn new(value: V, ttl: Duration) -> Self {
        Self {
            value,
            fetched_at: Instant::now(),
            fetched_at_utc: Utc::now(),
            ttl,
        }
    }

    /// Time since the value was fetched
    pub fn age(&self) -> Duration {
        Instant::now().saturating_duration_since(self.fetched_at)
    }

    /// `now - fetched_at > ttl`
    pub fn is_stale(&self) -> bool {
        self.age() > self.ttl
    }

    /// Remaining validity, `None` once stale
    pub fn expires_in(&self) -> Option<Duration> {
        let age = self.age();
        if age > self.ttl {
            None
        } else {
            Some(self.ttl - age)
        }
    }
}

/// Introspection view of a single entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheItemStats {
    pub key: String,

    /// Whole seconds since the last successful fetch
    pub age_secs: u64,

    pub is_stale: bool,

    /// Whole seconds until the entry goes stale; `null` when already stale
    pub expires_in_secs: Option<u64>,

    pub ttl_secs: u64,

    pub fetched_at: DateTime<Utc>,
}

/// Resolves the TTL for a key: longest matching prefix override, else default
#[derive(Debug, Clone)]
pub struct TtlPolicy {
    default_ttl: Duration,
    overrides: Vec<TtlRule>,
}

impl TtlPolicy {
    pub fn new(default_ttl: Duration, mut overrides: Vec<TtlRule>) -> Self {
        // Longest prefix first so the first match is the most specific
        overrides.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));
        Self {
            default_ttl,
            overrides,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.default_ttl, config.ttl_overrides.clone())
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn ttl_for(&self, key: &str) -> Duration {
        self.overrides
            .iter()
            .find(|rule| key.starts_with(&rule.prefix))
            .map(|rule| rule.ttl)
            .unwrap_or(self.default_ttl)
    }
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self::new(CacheConfig::default().default_ttl, Vec::new())
    }
}

/// In-memory cache store
pub struct CacheStore<V> {
    entries: DashMap<String, CacheEntry<V>>,
    ttl_policy: TtlPolicy,
}

impl<V: Clone> CacheStore<V> {
    pub fn new(ttl_policy: TtlPolicy) -> Self {
        Self {
            entries: DashMap::new(),
            ttl_policy,
        }
    }

    pub fn ttl_policy(&self) -> &TtlPolicy {
        &self.ttl_policy
    }

    /// Get a copy of the entry, stale or not
    pub fn get(&self, key: &str) -> Option<CacheEntry<V>> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Get the value only when present and not stale
    pub fn fresh_value(&self, key: &str) -> Option<V> {
        self.entries
            .get(key)
            .filter(|entry| !entry.is_stale())
            .map(|entry| entry.value.clone())
    }

    /// Store a value, always overwriting and stamping the current time
    pub fn set(&self, key: &str, value: V, ttl_override: Option<Duration>) {
        let ttl = ttl_override.unwrap_or_else(|| self.ttl_policy.ttl_for(key));
        self.entries.insert(key.to_string(), CacheEntry::new(value, ttl));
    }

    pub fn has(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Absent keys are stale
    pub fn is_stale(&self, key: &str) -> bool {
        self.entries
            .get(key)
            .map(|entry| entry.is_stale())
            .unwrap_or(true)
    }

    pub fn remove(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Remove every key starting with `prefix`, returning the removed keys
    pub fn remove_by_prefix(&self, prefix: &str) -> Vec<String> {
        let mut removed = Vec::new();
        self.entries.retain(|key, _| {
            if key.starts_with(prefix) {
                removed.push(key.clone());
                false
            } else {
                true
            }
        });
        removed.sort();
        removed
    }

    /// Remove everything, returning how many entries were dropped
    pub fn clear(&self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    /// Drop entries whose age exceeds `grace_multiple * ttl`
    pub fn sweep_stale(&self, grace_multiple: u32) -> Vec<String> {
        let mut removed = Vec::new();
        self.entries.retain(|key, entry| {
            let limit = entry.ttl.saturating_mul(grace_multiple);
            if entry.age() > limit {
                removed.push(key.clone());
                false
            } else {
                true
            }
        });

        if !removed.is_empty() {
            debug!("Swept {} long-stale cache entries", removed.len());
        }
        removed.sort();
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    /// Introspection listing, sorted by key
    pub fn entries(&self) -> Vec<CacheItemStats> {
        let mut items: Vec<CacheItemStats> = self
            .entries
            .iter()
            .map(|item| {
                let entry = item.value();
                CacheItemStats {
                    key: item.key().clone(),
                    age_secs: entry.age().as_secs(),
                    is_stale: entry.is_stale(),
                    expires_in_secs: entry.expires_in().map(|d| d.as_secs()),
                    ttl_secs: entry.ttl.as_secs(),
                    fetched_at: entry.fetched_at_utc,
                }
            })
            .collect();
        items.sort_by(|a, b| a.key.cmp(&b.key));
        items
    }
}

impl<V: Clone> Default for CacheStore<V> {
    fn default() -> Self {
        Self::new(TtlPolicy::default())
    }
}
