//! Shared key-value store for access tokens and cached responses.
//!
//! Providers implement [`KeyValueStore`]. Values are opaque strings (JSON
//! documents in practice) with a per-entry TTL. Writes are last-write-wins.
//!
//! - [`MemoryStore`]: in-process moka cache; not shared between processes
//! - `RedisStore`: shared store behind the `redis` feature
//! - [`GuardedStore`]: wraps any store with the `cache_store` circuit breaker

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::{StoreBackend, StoreConfig};

mod guarded;
mod memory;
#[cfg(feature = "redis")]
mod redis;

pub use guarded::GuardedStore;
pub use memory::MemoryStore;
#[cfg(feature = "redis")]
pub use self::redis::RedisStore;

/// Errors from store operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// The store cannot be reached (connection refused, breaker open, timeout)
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The store answered with an error
    #[error("store backend error: {0}")]
    Backend(String),

    /// A value could not be encoded or decoded
    #[error("store serialization error: {0}")]
    Serialization(String),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Async key-value store with per-entry TTL.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// `Ok(Some(value))` on hit, `Ok(None)` on miss or expiry.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Write `value`, replacing any existing entry, expiring after `ttl`.
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()>;

    async fn delete(&self, key: &str) -> StoreResult<()>;

    async fn health_check(&self) -> StoreResult<bool>;

    fn provider_name(&self) -> &'static str;
}

/// Open the store selected by `config`.
pub async fn connect_store(config: &StoreConfig) -> StoreResult<Arc<dyn KeyValueStore>> {
    match config.backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryStore::new(config.max_capacity))),
        StoreBackend::Redis => connect_redis(config).await,
    }
}

#[cfg(feature = "redis")]
async fn connect_redis(config: &StoreConfig) -> StoreResult<Arc<dyn KeyValueStore>> {
    let url = config
        .redis_url
        .as_deref()
        .ok_or_else(|| StoreError::Unavailable("store.redis_url is not set".to_string()))?;
    Ok(Arc::new(RedisStore::connect(url).await?))
}

#[cfg(not(feature = "redis"))]
async fn connect_redis(_config: &StoreConfig) -> StoreResult<Arc<dyn KeyValueStore>> {
    Err(StoreError::Unavailable(
        "redis backend requested but the `redis` feature is not enabled".to_string(),
    ))
}
