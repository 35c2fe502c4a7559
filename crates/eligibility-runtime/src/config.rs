//! Runtime configuration.
//!
//! Loaded from YAML. Every section has defaults, so an empty document is a
//! valid configuration apart from the upstream URL and credentials.
//!
//! ```yaml
//! upstream:
//!   base_url: https://eligibility.example.com
//!   request_timeout: 15s
//! auth:
//!   refresh_buffer: 5m
//! cache:
//!   ttl: 15m
//! breakers:
//!   cache_store:
//!     error_threshold_percentage: 75
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::resilience::{BreakerConfig, RetryPolicy};

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid config value for '{field}': {message}")]
    Invalid { field: String, message: String },

    #[error("missing credential: {0}")]
    MissingCredential(String),
}

/// Top-level runtime configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub upstream: UpstreamConfig,
    pub auth: AuthConfig,
    pub cache: CacheConfig,

    /// Retry policy for eligibility data calls
    pub retry: RetryPolicy,

    pub breakers: BreakersConfig,
    pub store: StoreConfig,
}

/// Upstream eligibility provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL of the provider API
    pub base_url: String,

    /// Path of the client-credentials token endpoint
    pub token_path: String,

    /// Path of the eligibility endpoint
    pub eligibility_path: String,

    /// Per-request HTTP timeout
    #[serde(with = "duration_str")]
    pub request_timeout: Duration,

    /// OAuth client id (falls back to `ELIGIBILITY_CLIENT_ID`)
    pub client_id: Option<String>,

    /// OAuth client secret (falls back to `ELIGIBILITY_CLIENT_SECRET`)
    pub client_secret: Option<String>,

    /// Optional OAuth scope
    pub scope: Option<String>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            token_path: "/oauth/token".to_string(),
            eligibility_path: "/eligibility/v3".to_string(),
            request_timeout: Duration::from_secs(15),
            client_id: None,
            client_secret: None,
            scope: None,
        }
    }
}

/// Access-token lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Store key holding the current token
    pub token_key: String,

    /// Renew this long before the token actually expires
    #[serde(with = "duration_str")]
    pub refresh_buffer: Duration,

    /// Lifetime assumed when the provider does not report one
    #[serde(with = "duration_str")]
    pub default_lifetime: Duration,

    /// Retry policy for token acquisition
    pub retry: RetryPolicy,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_key: "eligibility:access_token".to_string(),
            refresh_buffer: Duration::from_secs(5 * 60),
            default_lifetime: Duration::from_secs(60 * 60),
            retry: RetryPolicy::auth(),
        }
    }
}

/// Response cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,

    /// Prepended to every fingerprint: `{key_prefix}:{fingerprint}`
    pub key_prefix: String,

    #[serde(with = "duration_str")]
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            key_prefix: "eligibility:response".to_string(),
            ttl: Duration::from_secs(15 * 60),
        }
    }
}

/// One breaker per upstream dependency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakersConfig {
    pub token: BreakerConfig,
    pub eligibility: BreakerConfig,
    pub cache_store: BreakerConfig,
}

impl Default for BreakersConfig {
    fn default() -> Self {
        Self {
            token: BreakerConfig::token(),
            eligibility: BreakerConfig::eligibility(),
            cache_store: BreakerConfig::cache_store(),
        }
    }
}

/// Which key-value store backs tokens and cached responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Redis,
}

/// Key-value store settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,

    /// Redis URL (required for the redis backend)
    pub redis_url: Option<String>,

    /// Maximum entries held by the memory backend
    pub max_capacity: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            redis_url: None,
            max_capacity: 10_000,
        }
    }
}

impl RuntimeConfig {
    /// Parse a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Read and parse a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&yaml)
    }

    /// Check ranges and cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.upstream.base_url.trim().is_empty() {
            return Err(invalid("upstream.base_url", "must not be empty"));
        }
        if self.upstream.request_timeout.is_zero() {
            return Err(invalid("upstream.request_timeout", "must be greater than zero"));
        }
        if self.auth.default_lifetime <= self.auth.refresh_buffer {
            return Err(invalid(
                "auth.default_lifetime",
                "must be longer than auth.refresh_buffer",
            ));
        }
        if self.cache.enabled && self.cache.ttl.is_zero() {
            return Err(invalid("cache.ttl", "must be greater than zero when caching is enabled"));
        }

        validate_retry("retry", &self.retry)?;
        validate_retry("auth.retry", &self.auth.retry)?;
        validate_breaker("breakers.token", &self.breakers.token)?;
        validate_breaker("breakers.eligibility", &self.breakers.eligibility)?;
        validate_breaker("breakers.cache_store", &self.breakers.cache_store)?;

        if self.store.backend == StoreBackend::Redis && self.store.redis_url.is_none() {
            return Err(invalid("store.redis_url", "required for the redis backend"));
        }
        Ok(())
    }
}

fn invalid(field: &str, message: &str) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_string(),
        message: message.to_string(),
    }
}

fn validate_retry(prefix: &str, policy: &RetryPolicy) -> Result<(), ConfigError> {
    if policy.max_attempts == 0 {
        return Err(invalid(&format!("{prefix}.max_attempts"), "must be at least 1"));
    }
    if policy.base_delay > policy.max_delay {
        return Err(invalid(
            &format!("{prefix}.base_delay"),
            "must not exceed max_delay",
        ));
    }
    if !(0.0..=1.0).contains(&policy.jitter_fraction) {
        return Err(invalid(
            &format!("{prefix}.jitter_fraction"),
            "must be between 0 and 1",
        ));
    }
    Ok(())
}

fn validate_breaker(prefix: &str, config: &BreakerConfig) -> Result<(), ConfigError> {
    if config.buckets == 0 {
        return Err(invalid(&format!("{prefix}.buckets"), "must be at least 1"));
    }
    if config.window.is_zero() {
        return Err(invalid(&format!("{prefix}.window"), "must be greater than zero"));
    }
    if !(0.0..=100.0).contains(&config.error_threshold_percentage) {
        return Err(invalid(
            &format!("{prefix}.error_threshold_percentage"),
            "must be between 0 and 100",
        ));
    }
    if config.call_timeout.is_zero() {
        return Err(invalid(&format!("{prefix}.call_timeout"), "must be greater than zero"));
    }
    Ok(())
}

/// Serde helpers for durations written as humantime strings ("250ms", "10s", "5m").
pub mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}
