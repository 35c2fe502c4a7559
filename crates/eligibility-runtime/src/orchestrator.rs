//! Orchestrator for one eligibility check.
//!
//! Pipeline:
//! 1. Validate the request (no network on failure)
//! 2. Look up the response cache; a hit returns immediately
//! 3. Get an access token (cached or refreshed)
//! 4. Call the provider through the `eligibility` breaker, retrying inside it;
//!    the breaker's `call_timeout` bounds each attempt
//! 5. Normalize the payload
//! 6. Cache the result (best effort)
//!
//! Each stage is logged at debug level inside a span carrying the
//! correlation id.

use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;
use uuid::Uuid;

use eligibility_core::{normalize, validate, EligibilityRequest, EligibilityResult};

use crate::auth::TokenManager;
use crate::cache::ResponseCache;
use crate::config::{ConfigError, RuntimeConfig, StoreBackend};
use crate::envelope::ResponseEnvelope;
use crate::error::{EligibilityError, UpstreamError};
use crate::providers::UpstreamClient;
use crate::resilience::{
    BreakerError, BreakerMetrics, BreakerRegistry, CircuitBreaker, RetryError, RetryExecutor,
    CACHE_STORE_BREAKER, ELIGIBILITY_BREAKER, TOKEN_BREAKER,
};
use crate::store::{GuardedStore, KeyValueStore, MemoryStore};

/// Pipeline stages, as they appear in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Validated,
    CacheChecked,
    Authenticated,
    Called,
    Parsed,
    Cached,
    Done,
    Failed,
}

/// Runs eligibility checks end to end.
pub struct EligibilityOrchestrator {
    upstream: Arc<dyn UpstreamClient>,
    tokens: TokenManager,
    cache: Option<ResponseCache>,
    cache_ttl: Duration,
    breaker: Arc<CircuitBreaker>,
    retry: RetryExecutor,
    registry: Arc<BreakerRegistry>,
}

impl std::fmt::Debug for EligibilityOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EligibilityOrchestrator")
            .field("upstream", &self.upstream.name())
            .field("tokens", &self.tokens)
            .field("cache", &self.cache)
            .field("breaker", &self.breaker.name())
            .finish()
    }
}

impl EligibilityOrchestrator {
    /// Start building an orchestrator.
    pub fn builder() -> EligibilityOrchestratorBuilder {
        EligibilityOrchestratorBuilder::new()
    }

    /// Run one check.
    pub async fn check(
        &self,
        request: &EligibilityRequest,
        correlation_id: &str,
    ) -> Result<EligibilityResult, EligibilityError> {
        let span = tracing::info_span!("eligibility_check", correlation_id = %correlation_id);

        async {
            let outcome = self.run(request, correlation_id).await;
            match &outcome {
                Ok(result) => tracing::debug!(
                    stage = ?Stage::Done,
                    eligible = result.eligible,
                    from_cache = result.from_cache,
                    "Eligibility check complete"
                ),
                Err(e) => tracing::warn!(
                    stage = ?Stage::Failed,
                    kind = ?e.kind(),
                    error = %e,
                    "Eligibility check failed"
                ),
            }
            outcome
        }
        .instrument(span)
        .await
    }

    /// Run one check and wrap the outcome in an envelope.
    ///
    /// A missing or blank correlation id is replaced with a UUID v4.
    pub async fn handle(
        &self,
        request: &EligibilityRequest,
        correlation_id: Option<String>,
    ) -> ResponseEnvelope {
        let correlation_id = resolve_correlation_id(correlation_id);
        let started = Instant::now();
        let outcome = self.check(request, &correlation_id).await;
        ResponseEnvelope::from_outcome(outcome, correlation_id, started.elapsed(), Utc::now())
    }

    /// Like [`handle`](Self::handle) for a raw JSON request body.
    ///
    /// Schema violations come back as a validation failure envelope.
    pub async fn handle_json(&self, body: &str, correlation_id: Option<String>) -> ResponseEnvelope {
        match EligibilityRequest::from_json(body) {
            Ok(request) => self.handle(&request, correlation_id).await,
            Err(e) => ResponseEnvelope::from_outcome(
                Err(EligibilityError::from(e)),
                resolve_correlation_id(correlation_id),
                Duration::ZERO,
                Utc::now(),
            ),
        }
    }

    /// Metrics of every breaker in the registry.
    pub fn breaker_metrics(&self) -> Vec<BreakerMetrics> {
        self.registry.metrics()
    }

    /// The breaker registry shared by this orchestrator.
    pub fn registry(&self) -> &Arc<BreakerRegistry> {
        &self.registry
    }

    async fn run(
        &self,
        request: &EligibilityRequest,
        correlation_id: &str,
    ) -> Result<EligibilityResult, EligibilityError> {
        validate(request)?;
        tracing::debug!(stage = ?Stage::Validated, "Request valid");

        if let Some(cache) = &self.cache {
            let hit = cache.lookup(request).await;
            tracing::debug!(stage = ?Stage::CacheChecked, hit = hit.is_some(), "Cache checked");
            if let Some(entry) = hit {
                let mut result = entry.payload;
                result.from_cache = true;
                result.correlation_id = correlation_id.to_string();
                return Ok(result);
            }
        }

        let token = self.tokens.get_access_token().await?;
        tracing::debug!(stage = ?Stage::Authenticated, "Token ready");

        let payload = self
            .breaker
            .call_with_retry(&self.retry, || {
                self.upstream.check_eligibility(&token, request)
            })
            .await;

        let payload = match payload {
            Ok(payload) => payload,
            Err(e) => return Err(self.classify_failure(e).await),
        };
        tracing::debug!(
            stage = ?Stage::Called,
            benefits = payload.benefits_information.len(),
            "Provider answered"
        );

        let result = normalize(request, &payload, correlation_id, Utc::now());
        tracing::debug!(stage = ?Stage::Parsed, eligible = result.eligible, "Payload normalized");

        if let Some(cache) = &self.cache {
            cache.store(request, &result, self.cache_ttl).await;
            tracing::debug!(stage = ?Stage::Cached, "Result cached");
        }

        Ok(result)
    }

    async fn classify_failure(
        &self,
        err: BreakerError<RetryError<UpstreamError>>,
    ) -> EligibilityError {
        match err {
            BreakerError::Open { name } => EligibilityError::CircuitOpen(name),
            BreakerError::Timeout { timeout, .. } => EligibilityError::Timeout(timeout),
            BreakerError::Inner(RetryError::Exhausted { attempts, last }) => {
                EligibilityError::RetriesExhausted { attempts, last }
            }
            BreakerError::Inner(RetryError::Fatal { error, .. }) => {
                if error.is_auth_rejection() {
                    self.tokens.invalidate().await;
                    return EligibilityError::AuthFailed(format!(
                        "provider rejected the access token: {}",
                        error
                    ));
                }
                match error {
                    UpstreamError::Status {
                        status, message, ..
                    } if (400..500).contains(&status) => {
                        EligibilityError::UpstreamRejected { status, message }
                    }
                    other => EligibilityError::Internal(other.to_string()),
                }
            }
        }
    }
}

fn resolve_correlation_id(correlation_id: Option<String>) -> String {
    correlation_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// Builder for [`EligibilityOrchestrator`].
pub struct EligibilityOrchestratorBuilder {
    config: RuntimeConfig,
    upstream: Option<Arc<dyn UpstreamClient>>,
    store: Option<Arc<dyn KeyValueStore>>,
    registry: Option<Arc<BreakerRegistry>>,
}

impl EligibilityOrchestratorBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            config: RuntimeConfig::default(),
            upstream: None,
            store: None,
            registry: None,
        }
    }

    /// Set the configuration.
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the upstream client. Defaults to `HttpUpstream` built from config.
    pub fn upstream(mut self, upstream: Arc<dyn UpstreamClient>) -> Self {
        self.upstream = Some(upstream);
        self
    }

    /// Set the token/cache store. Defaults to an in-memory store.
    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Share an existing breaker registry. Defaults to a fresh one.
    pub fn registry(mut self, registry: Arc<BreakerRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Build the orchestrator.
    pub fn build(self) -> Result<EligibilityOrchestrator, ConfigError> {
        let config = self.config;

        let upstream = match self.upstream {
            Some(upstream) => upstream,
            None => default_upstream(&config)?,
        };

        let store = match self.store {
            Some(store) => store,
            None if config.store.backend == StoreBackend::Memory => {
                Arc::new(MemoryStore::new(config.store.max_capacity))
            }
            None => {
                return Err(ConfigError::Invalid {
                    field: "store.backend".to_string(),
                    message: "a connected store must be supplied for the redis backend"
                        .to_string(),
                })
            }
        };

        let registry = self.registry.unwrap_or_default();
        let token_breaker = registry.get_or_create(TOKEN_BREAKER, config.breakers.token.clone());
        let data_breaker =
            registry.get_or_create(ELIGIBILITY_BREAKER, config.breakers.eligibility.clone());
        let store_breaker =
            registry.get_or_create(CACHE_STORE_BREAKER, config.breakers.cache_store.clone());

        let guarded: Arc<dyn KeyValueStore> = Arc::new(GuardedStore::new(store, store_breaker));

        let tokens = TokenManager::new(
            upstream.clone(),
            guarded.clone(),
            token_breaker,
            config.auth.clone(),
        );

        let cache = config
            .cache
            .enabled
            .then(|| ResponseCache::new(guarded, config.cache.key_prefix.clone()));

        tracing::info!(
            upstream = upstream.name(),
            cache_enabled = cache.is_some(),
            "Eligibility orchestrator ready"
        );

        Ok(EligibilityOrchestrator {
            upstream,
            tokens,
            cache,
            cache_ttl: config.cache.ttl,
            breaker: data_breaker,
            retry: RetryExecutor::new("eligibility", config.retry.clone()),
            registry,
        })
    }
}

impl Default for EligibilityOrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "http")]
fn default_upstream(config: &RuntimeConfig) -> Result<Arc<dyn UpstreamClient>, ConfigError> {
    use crate::providers::{ClientCredentials, HttpUpstream};

    let credentials = ClientCredentials::from_config(&config.upstream)?;
    Ok(Arc::new(HttpUpstream::new(&config.upstream, credentials)?))
}

#[cfg(not(feature = "http"))]
fn default_upstream(_config: &RuntimeConfig) -> Result<Arc<dyn UpstreamClient>, ConfigError> {
    Err(ConfigError::Invalid {
        field: "upstream".to_string(),
        message: "no upstream client set and the `http` feature is disabled".to_string(),
    })
}
