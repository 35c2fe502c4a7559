//! Circuit-breaker protected store.
//!
//! When the store keeps failing or timing out, the `cache_store` breaker
//! opens and operations fail fast with [`StoreError::Unavailable`] instead
//! of paying the timeout on every request. Callers treat that as a miss.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::{KeyValueStore, StoreError, StoreResult};
use crate::resilience::{BreakerError, CircuitBreaker};

/// A store guarded by a circuit breaker.
#[derive(Clone)]
pub struct GuardedStore {
    inner: Arc<dyn KeyValueStore>,
    breaker: Arc<CircuitBreaker>,
}

impl std::fmt::Debug for GuardedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardedStore")
            .field("provider", &self.inner.provider_name())
            .field("breaker", &self.breaker.name())
            .finish()
    }
}

impl GuardedStore {
    pub fn new(inner: Arc<dyn KeyValueStore>, breaker: Arc<CircuitBreaker>) -> Self {
        Self { inner, breaker }
    }

    /// The breaker guarding this store.
    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }
}

fn unguard<T>(result: Result<T, BreakerError<StoreError>>) -> StoreResult<T> {
    result.map_err(|e| match e {
        BreakerError::Open { name } => StoreError::Unavailable(format!("circuit '{}' is open", name)),
        BreakerError::Timeout { timeout, .. } => {
            StoreError::Unavailable(format!("store call timed out after {:?}", timeout))
        }
        BreakerError::Inner(e) => e,
    })
}

#[async_trait]
impl KeyValueStore for GuardedStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        unguard(self.breaker.call(|| self.inner.get(key)).await)
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        unguard(self.breaker.call(|| self.inner.set_with_ttl(key, value, ttl)).await)
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        unguard(self.breaker.call(|| self.inner.delete(key)).await)
    }

    async fn health_check(&self) -> StoreResult<bool> {
        self.inner.health_check().await
    }

    fn provider_name(&self) -> &'static str {
        self.inner.provider_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::{BreakerConfig, BreakerState};
    use crate::store::testing::UnreachableStore;
    use crate::store::MemoryStore;
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn test_passes_through_when_closed() {
        let store = GuardedStore::new(
            Arc::new(MemoryStore::new(10)),
            Arc::new(CircuitBreaker::new("cache_store", BreakerConfig::cache_store())),
        );
        store.set_with_ttl("k", "v", Duration::from_secs(5)).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(store.provider_name(), "memory");
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_and_stops_touching_failing_store() {
        let inner = Arc::new(UnreachableStore::default());
        let breaker = Arc::new(CircuitBreaker::new("cache_store", BreakerConfig::cache_store()));
        let store = GuardedStore::new(inner.clone(), breaker.clone());

        for _ in 0..5 {
            assert!(matches!(store.get("k").await, Err(StoreError::Unavailable(_))));
        }
        assert_eq!(breaker.state(), BreakerState::Open);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 5);

        let err = store.get("k").await.unwrap_err();
        assert!(err.to_string().contains("open"));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 5);
    }
}
