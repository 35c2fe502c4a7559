//! # eligibility-runtime
//!
//! Resilient orchestration of patient eligibility checks against an
//! upstream provider.
//!
//! The deterministic parts (validation, fingerprints, normalization) live in
//! `eligibility-core`. This crate adds everything that waits on the network:
//!
//! - [`TokenManager`]: client-credentials tokens kept in a shared store and
//!   refreshed ahead of expiry
//! - [`ResponseCache`]: fingerprint-keyed results that fail open
//! - [`RetryExecutor`] and [`CircuitBreaker`]: bounded retries inside a
//!   per-dependency breaker
//! - [`EligibilityOrchestrator`]: the pipeline tying them together
//!
//! ## Example
//!
//! ```rust,ignore
//! use eligibility_runtime::{EligibilityOrchestrator, RuntimeConfig};
//!
//! let config = RuntimeConfig::from_file("eligibility.yaml")?;
//! config.validate()?;
//! let orchestrator = EligibilityOrchestrator::builder().config(config).build()?;
//!
//! let envelope = orchestrator.handle(&request, None).await;
//! println!("{}", serde_json::to_string_pretty(&envelope)?);
//! ```
//!
//! ## Features
//!
//! - `http` (default): reqwest-backed [`HttpUpstream`](providers::HttpUpstream)
//! - `redis`: Redis-backed shared store

pub mod auth;
pub mod cache;
pub mod config;
pub mod envelope;
pub mod error;
pub mod orchestrator;
pub mod providers;
pub mod resilience;
pub mod store;

pub use auth::{AccessToken, AuthError, TokenManager};
pub use cache::{CacheEntry, ResponseCache};
pub use config::{ConfigError, RuntimeConfig};
pub use envelope::{ErrorBody, ResponseEnvelope};
pub use error::{EligibilityError, ErrorCategory, ErrorKind, TransportCode, UpstreamError};
pub use orchestrator::{EligibilityOrchestrator, EligibilityOrchestratorBuilder};
pub use providers::{TokenGrant, UpstreamClient};
pub use resilience::{
    BackoffPolicy, BreakerConfig, BreakerError, BreakerRegistry, BreakerState, CircuitBreaker,
    RetryExecutor, RetryPolicy,
};
pub use store::{GuardedStore, KeyValueStore, MemoryStore, StoreError};
