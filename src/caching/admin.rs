//! # Cache Admin Interface
//!
//! Debug panel endpoints: stats snapshot, full clear, key/prefix
//! invalidation and per-key inspection. These are consumers of the provider's
//! public contract and add no cache behaviour of their own.

use super::{CacheStatsSnapshot, DataProvider, InvalidationReport};
use crate::core::error::ProviderError;
use axum::{
    extract::{Path, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Cache admin state
#[derive(Clone)]
pub struct CacheAdminState {
    pub provider: DataProvider<Value>,
}

/// Cache admin router
pub struct CacheAdminRouter;

impl CacheAdminRouter {
    /// Create cache admin router
    pub fn create_router(state: CacheAdminState) -> Router {
        Router::new()
            .route("/cache/stats", get(get_cache_stats))
            .route("/cache/health", get(get_cache_health))
            .route("/cache/clear", post(clear_cache))
            .route("/cache/invalidate", post(invalidate_cache))
            .route("/cache/sweep", post(sweep_cache))
            .route("/cache/keys/*key", get(get_cache_key).delete(delete_cache_key))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }
}

/// Cache statistics response
#[derive(Debug, Serialize, Deserialize)]
pub struct CacheStatsResponse {
    pub stats: CacheStatsSnapshot,
    pub hit_ratio: f64,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Cache health response
#[derive(Debug, Serialize, Deserialize)]
pub struct CacheHealthResponse {
    pub healthy: bool,
    pub entries: usize,
    pub in_flight: Vec<String>,
    pub sweeper_enabled: bool,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Single key inspection
#[derive(Debug, Serialize, Deserialize)]
pub struct CacheKeyResponse {
    pub key: String,
    pub exists: bool,
    pub value: Option<Value>,
    pub is_stale: bool,
    pub is_loading: bool,
    pub error: Option<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Cache invalidation request
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CacheInvalidationRequest {
    pub key: Option<String>,
    pub prefix: Option<String>,
}

/// Cache invalidation response
#[derive(Debug, Serialize, Deserialize)]
pub struct CacheInvalidationResponse {
    pub success: bool,
    pub message: String,
    pub invalidated_count: usize,
    pub report: InvalidationReport,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl CacheInvalidationResponse {
    fn from_report(message: String, report: InvalidationReport) -> Self {
        Self {
            success: true,
            message,
            invalidated_count: report.removed_count(),
            report,
            timestamp: chrono::Utc::now(),
        }
    }
}

/// Get cache statistics
pub async fn get_cache_stats(
    State(state): State<CacheAdminState>,
) -> Result<Json<CacheStatsResponse>, ProviderError> {
    let stats = state.provider.cache_stats();
    let hit_ratio = stats.hit_ratio();

    info!(
        "Cache stats requested - entries: {}, stale: {}, hit_ratio: {:.2}%",
        stats.total_items,
        stats.stale_items,
        hit_ratio * 100.0
    );

    Ok(Json(CacheStatsResponse {
        stats,
        hit_ratio,
        timestamp: chrono::Utc::now(),
    }))
}

/// Get cache health status
pub async fn get_cache_health(
    State(state): State<CacheAdminState>,
) -> Result<Json<CacheHealthResponse>, ProviderError> {
    let provider = &state.provider;

    Ok(Json(CacheHealthResponse {
        healthy: true,
        entries: provider.cache_stats().total_items,
        in_flight: provider.coordinator().in_flight_keys(),
        sweeper_enabled: provider.config().sweep.enabled,
        timestamp: chrono::Utc::now(),
    }))
}

/// Clear all cache entries
pub async fn clear_cache(
    State(state): State<CacheAdminState>,
) -> Result<Json<CacheInvalidationResponse>, ProviderError> {
    let report = state.provider.invalidate_cache(None, None);
    info!("Cache cleared via admin API");

    Ok(Json(CacheInvalidationResponse::from_report(
        "Cache cleared successfully".to_string(),
        report,
    )))
}

/// Invalidate by key and/or prefix
pub async fn invalidate_cache(
    State(state): State<CacheAdminState>,
    Json(request): Json<CacheInvalidationRequest>,
) -> Result<Json<CacheInvalidationResponse>, ProviderError> {
    let key = request.key.as_deref().filter(|k| !k.is_empty());
    let prefix = request.prefix.as_deref().filter(|p| !p.is_empty());

    if key.is_none() && prefix.is_none() {
        return Err(ProviderError::config(
            "Provide a key or a prefix; use /cache/clear to drop everything",
        ));
    }

    let report = state.provider.invalidate_cache(key, prefix);
    info!(
        key = key.unwrap_or(""),
        prefix = prefix.unwrap_or(""),
        removed = report.removed_count(),
        "Cache invalidated via admin API"
    );

    Ok(Json(CacheInvalidationResponse::from_report(
        format!("Invalidated {} entries", report.removed_count()),
        report,
    )))
}

/// Run the stale sweep now
pub async fn sweep_cache(
    State(state): State<CacheAdminState>,
) -> Result<Json<CacheInvalidationResponse>, ProviderError> {
    let removed = state.provider.sweep_stale();
    let report = InvalidationReport {
        removed,
        ..Default::default()
    };

    Ok(Json(CacheInvalidationResponse::from_report(
        format!("Swept {} entries", report.removed_count()),
        report,
    )))
}

/// Inspect a cache key
pub async fn get_cache_key(
    State(state): State<CacheAdminState>,
    Path(key): Path<String>,
) -> Result<Json<CacheKeyResponse>, ProviderError> {
    let provider = &state.provider;
    let entry = provider.entry(&key);

    Ok(Json(CacheKeyResponse {
        exists: entry.is_some(),
        is_stale: entry.as_ref().map(|e| e.is_stale()).unwrap_or(true),
        value: entry.map(|e| e.value),
        is_loading: provider.is_loading(&key),
        error: provider.error(&key),
        key,
        timestamp: chrono::Utc::now(),
    }))
}

/// Delete cache key
pub async fn delete_cache_key(
    State(state): State<CacheAdminState>,
    Path(key): Path<String>,
) -> Result<Json<CacheInvalidationResponse>, ProviderError> {
    let report = state.provider.invalidate_cache(Some(&key), None);

    let message = if report.removed_count() > 0 {
        info!("Cache key '{}' deleted via admin API", key);
        format!("Key '{}' deleted successfully", key)
    } else {
        format!("Key '{}' not found", key)
    };

    Ok(Json(CacheInvalidationResponse::from_report(message, report)))
}
