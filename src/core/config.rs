//! # Configuration Module
//!
//! Configuration for the data provider and its debug panel.
//!
//! ## Key Features
//! - YAML configuration parsing with serde (durations in humantime form, e.g. `5m`)
//! - Environment variable overrides (`DATA_PROVIDER_*`)
//! - Validation with every problem reported at once

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::core::error::{ProviderError, ProviderResult};
use crate::observability::config::{LogConfig, LogFormat};

/// Environment variable holding the config file path
pub const CONFIG_PATH_ENV: &str = "DATA_PROVIDER_CONFIG";

/// Config file used when `DATA_PROVIDER_CONFIG` is not set
pub const DEFAULT_CONFIG_PATH: &str = "config/data-provider.yaml";

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProviderConfig {
    /// Remote REST API settings
    pub api: ApiConfig,

    /// Cache behaviour
    pub cache: CacheConfig,

    /// Debug panel
    pub admin: AdminConfig,

    /// Logging
    pub logging: LogConfig,

    /// Keys fetched once at startup by the binary
    pub warm_keys: Vec<String>,
}

/// Remote API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL every resource path is joined onto, e.g. `http://localhost:3000/api/v1`
    pub base_url: String,

    /// Per-request timeout; a timeout surfaces as a network error
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Bearer token sent with every request
    pub auth_token: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3000/api/v1".to_string(),
            timeout: Duration::from_secs(10),
            auth_token: None,
        }
    }
}

/// Per-prefix TTL override
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TtlRule {
    /// Keys starting with this prefix use `ttl`
    pub prefix: String,

    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
}

/// Cache behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// TTL applied when no override matches
    #[serde(with = "humantime_serde")]
    pub default_ttl: Duration,

    /// Longest matching prefix wins
    pub ttl_overrides: Vec<TtlRule>,

    /// Periodic removal of long-stale entries
    pub sweep: SweepConfig,

    /// Capacity of the change-notification channel
    pub event_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(300),
            ttl_overrides: Vec::new(),
            sweep: SweepConfig::default(),
            event_capacity: 256,
        }
    }
}

/// Stale sweep settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub enabled: bool,

    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    /// Entries older than `grace_multiple * ttl` are dropped
    pub grace_multiple: u32,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(60),
            grace_multiple: 3,
        }
    }
}

/// Debug panel settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    pub enabled: bool,
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "127.0.0.1:9400".to_string(),
        }
    }
}

impl ProviderConfig {
    /// Load configuration from a YAML file, apply env overrides and validate
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> ProviderResult<Self> {
        let content = tokio::fs::read_to_string(path).await
            .map_err(|e| ProviderError::config(format!("Failed to read config file: {}", e)))?;

        let mut config = Self::from_yaml(&content)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `DATA_PROVIDER_CONFIG` (or the default path); a missing file
    /// yields the defaults with env overrides applied.
    pub async fn load() -> ProviderResult<Self> {
        let path = std::env::var(CONFIG_PATH_ENV)
            .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Self::load_from_file(&path).await;
        }

        let mut config = Self::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse YAML without overrides or validation
    pub fn from_yaml(content: &str) -> ProviderResult<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| ProviderError::config(format!("Failed to parse config: {}", e)))
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) -> ProviderResult<()> {
        use std::env;

        if let Ok(url) = env::var("DATA_PROVIDER_API_URL") {
            self.api.base_url = url;
        }

        if let Ok(token) = env::var("DATA_PROVIDER_API_TOKEN") {
            self.api.auth_token = Some(token).filter(|t| !t.is_empty());
        }

        if let Ok(timeout) = env::var("DATA_PROVIDER_API_TIMEOUT") {
            self.api.timeout = humantime::parse_duration(&timeout)
                .map_err(|e| ProviderError::config(format!("Invalid DATA_PROVIDER_API_TIMEOUT: {}", e)))?;
        }

        if let Ok(ttl) = env::var("DATA_PROVIDER_DEFAULT_TTL") {
            self.cache.default_ttl = humantime::parse_duration(&ttl)
                .map_err(|e| ProviderError::config(format!("Invalid DATA_PROVIDER_DEFAULT_TTL: {}", e)))?;
        }

        if let Ok(level) = env::var("DATA_PROVIDER_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Ok(format) = env::var("DATA_PROVIDER_LOG_FORMAT") {
            self.logging.format = match format.to_lowercase().as_str() {
                "json" => LogFormat::Json,
                "text" => LogFormat::Text,
                other => {
                    return Err(ProviderError::config(format!(
                        "Invalid DATA_PROVIDER_LOG_FORMAT: {}",
                        other
                    )))
                }
            };
        }

        if let Ok(addr) = env::var("DATA_PROVIDER_ADMIN_BIND") {
            self.admin.bind_address = addr;
        }

        Ok(())
    }

    /// Validate the configuration, reporting every problem at once
    pub fn validate(&self) -> ProviderResult<()> {
        let mut errors = Vec::new();

        match Url::parse(&self.api.base_url) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
            Ok(url) => errors.push(format!("api.base_url has unsupported scheme '{}'", url.scheme())),
            Err(e) => errors.push(format!("api.base_url is not a valid URL: {}", e)),
        }

        if self.api.timeout.is_zero() {
            errors.push("api.timeout must be greater than 0".to_string());
        }

        if self.cache.default_ttl.is_zero() {
            errors.push("cache.default_ttl must be greater than 0".to_string());
        }

        for rule in &self.cache.ttl_overrides {
            if rule.prefix.is_empty() {
                errors.push("cache.ttl_overrides entries need a non-empty prefix".to_string());
            }
            if rule.ttl.is_zero() {
                errors.push(format!("TTL override for '{}' must be greater than 0", rule.prefix));
            }
        }

        if self.cache.sweep.enabled {
            if self.cache.sweep.interval.is_zero() {
                errors.push("cache.sweep.interval must be greater than 0".to_string());
            }
            if self.cache.sweep.grace_multiple == 0 {
                errors.push("cache.sweep.grace_multiple must be at least 1".to_string());
            }
        }

        if self.cache.event_capacity == 0 {
            errors.push("cache.event_capacity must be greater than 0".to_string());
        }

        if self.admin.enabled && self.admin.bind_address.parse::<std::net::SocketAddr>().is_err() {
            errors.push(format!("admin.bind_address '{}' is not a socket address", self.admin.bind_address));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProviderError::config(errors.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = ProviderConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cache.default_ttl, Duration::from_secs(300));
        assert_eq!(config.cache.sweep.grace_multiple, 3);
    }

    #[test]
    fn test_parse_yaml_with_humantime_durations() {
        let yaml = r#"
api:
  base_url: "https://api.example.com/api/v1"
  timeout: 3s
cache:
  default_ttl: 2m
  ttl_overrides:
    - prefix: dashboard
      ttl: 30s
  sweep:
    enabled: false
warm_keys: ["tours/all"]
"#;
        let config = ProviderConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.api.timeout, Duration::from_secs(3));
        assert_eq!(config.cache.default_ttl, Duration::from_secs(120));
        assert_eq!(
            config.cache.ttl_overrides,
            vec![TtlRule { prefix: "dashboard".to_string(), ttl: Duration::from_secs(30) }]
        );
        assert!(!config.cache.sweep.enabled);
        assert_eq!(config.warm_keys, vec!["tours/all".to_string()]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_reports_all_problems() {
        let mut config = ProviderConfig::default();
        config.api.base_url = "ftp://example.com".to_string();
        config.cache.default_ttl = Duration::ZERO;
        config.admin.bind_address = "not-an-address".to_string();

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("unsupported scheme"));
        assert!(err.contains("default_ttl"));
        assert!(err.contains("bind_address"));
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "cache:\n  default_ttl: 45s\n  event_capacity: 16").unwrap();

        let config = ProviderConfig::load_from_file(file.path()).await.unwrap();
        assert_eq!(config.cache.event_capacity, 16);
    }

    #[tokio::test]
    async fn test_load_from_missing_file_fails() {
        let result = ProviderConfig::load_from_file("/definitely/not/here.yaml").await;
        assert!(matches!(result, Err(ProviderError::Configuration { .. })));
    }
}
