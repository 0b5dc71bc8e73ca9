//! # Structured Logging
//!
//! Installs the process-wide `tracing` subscriber for the data provider binary.
//! `RUST_LOG` takes precedence; otherwise the configured level is used.

use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::observability::config::{LogConfig, LogFormat};

/// Build the filter from `RUST_LOG`, falling back to the configured level
pub fn build_filter(config: &LogConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize the tracing subscriber.
///
/// Returns `false` when a global subscriber was already installed (tests,
/// embedding applications); that is not an error.
pub fn init_logging(config: &LogConfig) -> bool {
    let env_filter = build_filter(config);

    let result = match config.format {
        LogFormat::Json => Registry::default()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true)
                    .with_thread_ids(true),
            )
            .try_init(),
        LogFormat::Text => Registry::default()
            .with(env_filter)
            .with(fmt::layer().with_target(true))
            .try_init(),
    };

    match result {
        Ok(()) => {
            info!(level = %config.level, format = ?config.format, "Logging initialized");
            true
        }
        Err(_) => {
            warn!("Tracing subscriber already initialized, skipping initialization");
            false
        }
    }
}
