//! # Caching System Module
//!
//! Client-side resource cache and request coordination ("data provider").
//!
//! ## Architecture
//! 1. **Cache Store**: key → entry map with TTL and staleness
//! 2. **Request Coordinator**: `fetch_data` with in-flight deduplication
//! 3. **Invalidation Engine**: exact, prefix and dependency-table invalidation
//! 4. **Stats Reporter**: introspection snapshots
//! 5. **Data Provider**: the context object owning all of the above
//! 6. **Admin Interface**: debug panel endpoints
//!
//! ## Usage Example
//! ```rust,no_run
//! use data_provider::caching::DataProvider;
//! use data_provider::core::config::CacheConfig;
//! use serde_json::json;
//!
//! # async fn demo() -> data_provider::ProviderResult<()> {
//! let provider: DataProvider = DataProvider::new(CacheConfig::default());
//!
//! let tours = provider
//!     .fetch_data("tours/all", || async { Ok(json!([{ "id": "t1" }])) }, false)
//!     .await?;
//!
//! // A tour changed somewhere: drop every tours/* view
//! provider.invalidate_cache(None, Some("tours"));
//! # let _ = tours;
//! # Ok(())
//! # }
//! ```

pub mod admin;
pub mod coordinator;
pub mod invalidation;
pub mod provider;
pub mod state;
pub mod stats;
pub mod store;

pub use admin::{CacheAdminRouter, CacheAdminState};
pub use coordinator::RequestCoordinator;
pub use invalidation::{
    DependencyTable, InvalidationEngine, InvalidationReport, InvalidationTarget, KeyPattern,
    Mutation, MutationAction, ResourceKind,
};
pub use provider::DataProvider;
pub use state::{CacheEvent, CounterSnapshot, SharedState};
pub use stats::{CacheStatsSnapshot, StatsReporter};
pub use store::{CacheEntry, CacheItemStats, CacheStore, TtlPolicy};
