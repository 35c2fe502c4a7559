//! Response cache keyed by request fingerprint.
//!
//! Fail-open: a store that cannot be read behaves like a miss, and a failed
//! write is logged and dropped. Nothing here returns an error to the caller.
//! Expiry is left to the store's own TTL.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use eligibility_core::{EligibilityRequest, EligibilityResult, RequestFingerprint};

use crate::store::KeyValueStore;

/// A cached eligibility result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub fingerprint: String,
    pub payload: EligibilityResult,
    pub cached_at: DateTime<Utc>,
    pub ttl_seconds: u64,
}

/// Cache of normalized eligibility results.
pub struct ResponseCache {
    store: Arc<dyn KeyValueStore>,
    prefix: String,
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("store", &self.store.provider_name())
            .field("prefix", &self.prefix)
            .finish()
    }
}

impl ResponseCache {
    pub fn new(store: Arc<dyn KeyValueStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    /// Store key for `request`: `{prefix}:{fingerprint}`.
    pub fn key_for(&self, request: &EligibilityRequest) -> String {
        self.key(&RequestFingerprint::of(request))
    }

    fn key(&self, fingerprint: &RequestFingerprint) -> String {
        format!("{}:{}", self.prefix, fingerprint)
    }

    /// Cached entry for `request`, if any.
    pub async fn lookup(&self, request: &EligibilityRequest) -> Option<CacheEntry> {
        let key = self.key_for(request);

        let raw = match self.store.get(&key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                tracing::debug!(key = %key, "Cache MISS");
                return None;
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cache unavailable, treating as miss");
                return None;
            }
        };

        match serde_json::from_str::<CacheEntry>(&raw) {
            Ok(entry) => {
                tracing::debug!(key = %key, cached_at = %entry.cached_at, "Cache HIT");
                Some(entry)
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Undecodable cache entry, treating as miss");
                None
            }
        }
    }

    /// Cache `result` for `request`. Best effort.
    pub async fn store(&self, request: &EligibilityRequest, result: &EligibilityResult, ttl: Duration) {
        let fingerprint = RequestFingerprint::of(request);
        let key = self.key(&fingerprint);
        let entry = CacheEntry {
            fingerprint: fingerprint.as_str().to_string(),
            payload: result.clone(),
            cached_at: Utc::now(),
            ttl_seconds: ttl.as_secs(),
        };

        let json = match serde_json::to_string(&entry) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Failed to encode cache entry");
                return;
            }
        };

        match self.store.set_with_ttl(&key, &json, ttl).await {
            Ok(()) => tracing::debug!(key = %key, ttl_secs = ttl.as_secs(), "Cache SET"),
            Err(e) => tracing::warn!(key = %key, error = %e, "Cache write failed, continuing"),
        }
    }
}
