//! # Data Provider - Main Entry Point
//!
//! Loads configuration, initialises logging, builds the provider and the
//! storefront client, warms the configured keys and serves the cache debug
//! panel until SIGINT/SIGTERM.

use futures::future::join_all;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

use data_provider::caching::{CacheAdminRouter, CacheAdminState};
use data_provider::observability::init_logging;
use data_provider::{ApiClient, DataProvider, ProviderConfig, ProviderResult, Resources};

#[tokio::main]
async fn main() -> ProviderResult<()> {
    let config = match ProviderConfig::load().await {
        Ok(config) => config,
        Err(e) => {
            // Logging is not configured yet
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config.logging);
    info!("🚀 Starting data provider v{}", env!("CARGO_PKG_VERSION"));
    info!(api = %config.api.base_url, "📋 Configuration loaded");

    let provider: DataProvider = DataProvider::new(config.cache.clone());
    let client = ApiClient::new(&config.api)?;
    let resources = Resources::new(client, provider.clone());

    if provider.spawn_sweeper() {
        info!("🧹 Stale sweep scheduled");
    }

    warm_cache(&provider, &resources, &config.warm_keys).await;

    if config.admin.enabled {
        serve_admin(&provider, &config.admin.bind_address).await?;
    } else {
        info!("Debug panel disabled, waiting for shutdown signal");
        shutdown_signal().await;
    }

    provider.shutdown();
    info!("✅ Data provider shutdown complete");
    Ok(())
}

/// Prefetch well-known keys concurrently. Failures are logged and recorded in
/// the provider's error state; they never abort startup.
async fn warm_cache(provider: &DataProvider, resources: &Resources, keys: &[String]) {
    if keys.is_empty() {
        return;
    }

    let fetches = keys.iter().filter_map(|key| match resources.fetch_fn_for(key) {
        Some(fetch_fn) => Some(async move { (key, provider.fetch_data(key, fetch_fn, false).await) }),
        None => {
            warn!(key = %key, "No resource serves this key, skipping warm-up");
            None
        }
    });

    let mut warmed = 0;
    for (key, result) in join_all(fetches).await {
        match result {
            Ok(_) => warmed += 1,
            Err(e) => warn!(key = %key, error = %e, "Cache warm-up failed"),
        }
    }
    info!(warmed, requested = keys.len(), "🔥 Cache warm-up finished");
}

async fn serve_admin(provider: &DataProvider, bind_address: &str) -> ProviderResult<()> {
    let router = CacheAdminRouter::create_router(CacheAdminState {
        provider: provider.clone(),
    });

    let listener = TcpListener::bind(bind_address).await.map_err(|e| {
        error!("Failed to bind debug panel to {}: {}", bind_address, e);
        e
    })?;
    info!("⚙️  Debug panel ready on http://{}/cache/stats", bind_address);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

/// Resolves on the first SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("📡 Received SIGINT, shutting down"),
        _ = terminate => info!("📡 Received SIGTERM, shutting down"),
    }
}
