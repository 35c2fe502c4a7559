//! Resilience patterns for eligibility-runtime.
//!
//! This module provides:
//! - Exponential backoff with jitter
//! - Retry executor with failure classification
//! - Rolling-window circuit breaker
//! - Registry of named breakers

mod backoff;
mod circuit_breaker;
mod registry;
mod retry;

pub use backoff::BackoffPolicy;
pub use circuit_breaker::{BreakerConfig, BreakerError, BreakerMetrics, BreakerState, CircuitBreaker};
pub use registry::{BreakerRegistry, CACHE_STORE_BREAKER, ELIGIBILITY_BREAKER, TOKEN_BREAKER};
pub use retry::{
    Classify, FailureTag, FromTimeout, RetryDecision, RetryError, RetryExecutor, RetryPolicy,
};
