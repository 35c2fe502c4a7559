//! Token manager with proactive refresh.
//!
//! Manages the access-token lifecycle:
//! - Token lookup in the shared store (source of truth across processes)
//! - Refresh `refresh_buffer` before actual expiry
//! - Single-flight refresh within a process
//! - Invalidation when the provider rejects a token
//!
//! # Refresh flow
//!
//! ```text
//! store hit, usable ──────────────────────────────► return
//! miss/expiring ─► lock ─► re-check store/memory ─► return (someone else refreshed)
//!                               │
//!                               └─► breaker(retry(acquire)) ─► persist ─► return
//! ```
//!
//! Store read and write failures are logged and treated as "no cached token"
//! and "not persisted"; they never fail the call on their own. While the
//! store is unreachable the in-memory copy of the last token keeps serving.

use chrono::Utc;
use parking_lot::RwLock;
use secrecy::SecretString;
use std::sync::Arc;

use super::{AccessToken, AuthError};
use crate::config::AuthConfig;
use crate::providers::UpstreamClient;
use crate::resilience::{BreakerError, CircuitBreaker, RetryExecutor};
use crate::store::KeyValueStore;

/// Obtains and caches access tokens for the upstream provider.
pub struct TokenManager {
    client: Arc<dyn UpstreamClient>,
    store: Arc<dyn KeyValueStore>,
    breaker: Arc<CircuitBreaker>,
    retry: RetryExecutor,
    config: AuthConfig,

    /// Last token this process saw; used when the store cannot be read
    current: RwLock<Option<AccessToken>>,

    /// Serializes refreshes
    refresh_lock: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("client", &self.client.name())
            .field("store", &self.store.provider_name())
            .field("breaker", &self.breaker.name())
            .field("token_key", &self.config.token_key)
            .finish()
    }
}

impl TokenManager {
    /// `breaker` guards the token endpoint; `config.retry` tunes retries inside it.
    pub fn new(
        client: Arc<dyn UpstreamClient>,
        store: Arc<dyn KeyValueStore>,
        breaker: Arc<CircuitBreaker>,
        config: AuthConfig,
    ) -> Self {
        let retry = RetryExecutor::new("token", config.retry.clone());
        Self {
            client,
            store,
            breaker,
            retry,
            config,
            current: RwLock::new(None),
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// A usable access token, refreshing it when missing or about to expire.
    ///
    /// # Errors
    /// - [`AuthError::Unavailable`] when the token endpoint's breaker is open
    /// - [`AuthError::Failed`] for any other acquisition failure
    pub async fn get_access_token(&self) -> Result<SecretString, AuthError> {
        if let Some(token) = self.cached_token().await {
            return Ok(token.secret());
        }

        let _guard = self.refresh_lock.lock().await;

        if let Some(token) = self.cached_token().await {
            tracing::debug!("Token refreshed by a concurrent caller");
            return Ok(token.secret());
        }

        let token = self.refresh().await?;
        Ok(token.secret())
    }

    /// Forget the current token, locally and in the shared store.
    pub async fn invalidate(&self) {
        self.current.write().take();
        if let Err(e) = self.store.delete(&self.config.token_key).await {
            tracing::warn!(error = %e, "Failed to delete token from store");
        }
        tracing::info!("Access token invalidated");
    }

    /// The stored token if it is usable, else the in-memory copy when the
    /// store could not be read.
    async fn cached_token(&self) -> Option<AccessToken> {
        let now = Utc::now();
        let buffer = self.config.refresh_buffer;

        match self.store.get(&self.config.token_key).await {
            Ok(Some(raw)) => match serde_json::from_str::<AccessToken>(&raw) {
                Ok(token) if token.is_usable(now, buffer) => {
                    *self.current.write() = Some(token.clone());
                    Some(token)
                }
                Ok(_) => None,
                Err(e) => {
                    tracing::warn!(error = %e, "Stored token is unreadable, ignoring");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, "Token store read failed, using in-memory token");
                self.current
                    .read()
                    .as_ref()
                    .filter(|t| t.is_usable(now, buffer))
                    .cloned()
            }
        }
    }

    async fn refresh(&self) -> Result<AccessToken, AuthError> {
        tracing::debug!(provider = self.client.name(), "Acquiring access token");

        let grant = self
            .breaker
            .call_with_retry(&self.retry, || self.client.acquire_token())
            .await
            .map_err(|e| match e {
                BreakerError::Open { name } => {
                    AuthError::Unavailable(format!("circuit '{}' is open", name))
                }
                BreakerError::Timeout { timeout, .. } => {
                    AuthError::Failed(format!("token request timed out after {:?}", timeout))
                }
                BreakerError::Inner(e) => AuthError::Failed(e.to_string()),
            })?;

        let token = AccessToken::from_grant(&grant, Utc::now(), self.config.default_lifetime);
        let lifetime = token.lifetime();

        match serde_json::to_string(&token) {
            Ok(json) => {
                if let Err(e) = self
                    .store
                    .set_with_ttl(&self.config.token_key, &json, lifetime)
                    .await
                {
                    tracing::warn!(error = %e, "Failed to persist access token");
                }
            }
            Err(e) => tracing::warn!(error = %e, "Failed to encode access token"),
        }

        *self.current.write() = Some(token.clone());
        tracing::info!(
            expires_in_secs = lifetime.as_secs(),
            "Access token refreshed"
        );
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::testing::{grant, status, ScriptedUpstream};
    use crate::resilience::{BreakerConfig, RetryPolicy};
    use crate::store::testing::UnreachableStore;
    use crate::store::MemoryStore;
    use secrecy::ExposeSecret;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn config() -> AuthConfig {
        AuthConfig {
            retry: RetryPolicy {
                base_delay: Duration::from_millis(10),
                max_delay: Duration::from_millis(20),
                ..RetryPolicy::auth()
            },
            ..AuthConfig::default()
        }
    }

    fn manager(upstream: Arc<ScriptedUpstream>, store: Arc<dyn KeyValueStore>) -> TokenManager {
        TokenManager::new(
            upstream,
            store,
            Arc::new(CircuitBreaker::new("token", BreakerConfig::token())),
            config(),
        )
    }

    #[tokio::test]
    async fn test_second_call_uses_cached_token() {
        let upstream = Arc::new(ScriptedUpstream::default());
        let tm = manager(upstream.clone(), Arc::new(MemoryStore::new(10)));

        let first = tm.get_access_token().await.unwrap();
        let second = tm.get_access_token().await.unwrap();

        assert_eq!(first.expose_secret(), "token-1");
        assert_eq!(second.expose_secret(), "token-1");
        assert_eq!(upstream.token_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_token_triggers_one_refresh() {
        let upstream = Arc::new(ScriptedUpstream::default());
        let store = Arc::new(MemoryStore::new(10));
        let stale = AccessToken::new(
            "stale",
            "Bearer",
            Utc::now() - chrono::Duration::hours(2),
            Duration::from_secs(3600),
        );
        store
            .set_with_ttl(
                &config().token_key,
                &serde_json::to_string(&stale).unwrap(),
                Duration::from_secs(600),
            )
            .await
            .unwrap();

        let tm = manager(upstream.clone(), store.clone());
        let token = tm.get_access_token().await.unwrap();

        assert_eq!(token.expose_secret(), "token-1");
        assert_eq!(upstream.token_calls.load(Ordering::SeqCst), 1);

        let stored: AccessToken =
            serde_json::from_str(&store.get(&config().token_key).await.unwrap().unwrap()).unwrap();
        assert_eq!(stored.secret().expose_secret(), "token-1");
    }

    #[tokio::test]
    async fn test_token_within_buffer_is_refreshed() {
        let upstream = Arc::new(ScriptedUpstream::default());
        let store = Arc::new(MemoryStore::new(10));
        // expires in 2 minutes, buffer is 5
        let expiring = AccessToken::new("expiring", "Bearer", Utc::now(), Duration::from_secs(120));
        store
            .set_with_ttl(
                &config().token_key,
                &serde_json::to_string(&expiring).unwrap(),
                Duration::from_secs(120),
            )
            .await
            .unwrap();

        let tm = manager(upstream.clone(), store);
        assert_eq!(tm.get_access_token().await.unwrap().expose_secret(), "token-1");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_share_one_refresh() {
        let upstream = Arc::new(ScriptedUpstream::with_token_delay(Duration::from_millis(50)));
        let tm = Arc::new(manager(upstream.clone(), Arc::new(MemoryStore::new(10))));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tm = tm.clone();
                tokio::spawn(async move { tm.get_access_token().await })
            })
            .collect();

        for handle in handles {
            let token = handle.await.unwrap().unwrap();
            assert_eq!(token.expose_secret(), "token-1");
        }
        assert_eq!(upstream.token_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unreachable_store_degrades_to_memory_copy() {
        let upstream = Arc::new(ScriptedUpstream::default());
        let tm = manager(upstream.clone(), Arc::new(UnreachableStore::default()));

        assert_eq!(tm.get_access_token().await.unwrap().expose_secret(), "token-1");
        assert_eq!(tm.get_access_token().await.unwrap().expose_secret(), "token-1");
        assert_eq!(upstream.token_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_transient_token_failure() {
        let upstream = Arc::new(ScriptedUpstream::default());
        upstream.push_token(Err(status(503)));
        upstream.push_token(Ok(grant("after-retry", Duration::from_secs(3600))));
        let tm = manager(upstream.clone(), Arc::new(MemoryStore::new(10)));

        assert_eq!(tm.get_access_token().await.unwrap().expose_secret(), "after-retry");
        assert_eq!(upstream.token_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_rejected_credentials_fail_without_retry() {
        let upstream = Arc::new(ScriptedUpstream::default());
        upstream.push_token(Err(status(401)));
        let tm = manager(upstream.clone(), Arc::new(MemoryStore::new(10)));

        let err = tm.get_access_token().await.unwrap_err();
        assert!(matches!(err, AuthError::Failed(_)));
        assert_eq!(upstream.token_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_open_breaker_is_unavailable() {
        let upstream = Arc::new(ScriptedUpstream::default());
        let breaker = Arc::new(CircuitBreaker::new("token", BreakerConfig::token()));
        breaker.force_open();
        let tm = TokenManager::new(
            upstream.clone(),
            Arc::new(MemoryStore::new(10)),
            breaker,
            config(),
        );

        let err = tm.get_access_token().await.unwrap_err();
        assert!(matches!(err, AuthError::Unavailable(_)));
        assert_eq!(upstream.token_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_invalidate_forces_new_token() {
        let upstream = Arc::new(ScriptedUpstream::default());
        let tm = manager(upstream.clone(), Arc::new(MemoryStore::new(10)));

        assert_eq!(tm.get_access_token().await.unwrap().expose_secret(), "token-1");
        tm.invalidate().await;
        assert_eq!(tm.get_access_token().await.unwrap().expose_secret(), "token-2");
    }
}
