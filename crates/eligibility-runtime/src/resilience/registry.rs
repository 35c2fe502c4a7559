//! Explicit registry of named circuit breakers.
//!
//! Constructed once at startup and shared as `Arc<BreakerRegistry>`; every
//! component that needs a breaker asks the registry by dependency name.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use super::circuit_breaker::{BreakerConfig, BreakerMetrics, CircuitBreaker};

/// Dependency name of the token endpoint.
pub const TOKEN_BREAKER: &str = "token";

/// Dependency name of the eligibility data endpoint.
pub const ELIGIBILITY_BREAKER: &str = "eligibility";

/// Dependency name of the shared token/cache store.
pub const CACHE_STORE_BREAKER: &str = "cache_store";

/// Named breakers, one per upstream dependency.
#[derive(Debug, Default)]
pub struct BreakerRegistry {
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Breaker for `name`, created with `config` on first use.
    ///
    /// Later calls return the existing breaker and ignore `config`.
    pub fn get_or_create(&self, name: &str, config: BreakerConfig) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.read().get(name) {
            return existing.clone();
        }

        self.breakers
            .write()
            .entry(name.to_string())
            .or_insert_with(|| {
                tracing::debug!(breaker = %name, "Registering circuit breaker");
                Arc::new(CircuitBreaker::new(name, config))
            })
            .clone()
    }

    /// Breaker for `name`, if registered.
    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.read().get(name).cloned()
    }

    /// Metrics for every registered breaker, sorted by name.
    pub fn metrics(&self) -> Vec<BreakerMetrics> {
        let mut all: Vec<BreakerMetrics> =
            self.breakers.read().values().map(|b| b.metrics()).collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }
}
