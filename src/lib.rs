//! # Data Provider Library
//!
//! Client-side resource cache and request coordination for the storefront
//! REST API. Responses are cached under hierarchical string keys
//! (`tours/all`, `tours/<id>`, `dashboard`), concurrent fetches for one key
//! share a single network request, fresh entries are served without touching
//! the network, and mutations invalidate every dependent view.
//!
//! ## Layout
//! - [`core`]: error type and configuration
//! - [`observability`]: logging setup
//! - [`caching`]: store, coordinator, invalidation, stats and the
//!   [`DataProvider`] context that owns them, plus the debug panel router
//! - [`api`]: REST client, models and the typed resource facade

/// Error type and configuration shared by every other module
pub mod core;

/// Structured logging initialisation
pub mod observability;

/// The cache itself and everything that coordinates access to it
pub mod caching;

/// Remote API access on top of the cache
pub mod api;

pub use api::{ApiClient, Resources};
pub use caching::DataProvider;
pub use core::config::ProviderConfig;
pub use core::error::{ProviderError, ProviderResult};
