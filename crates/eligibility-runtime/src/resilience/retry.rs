//! Bounded retries with exponential backoff.
//!
//! Errors are classified through [`Classify`], which maps an error to a
//! closed [`FailureTag`]. The policy then decides whether the tag is
//! retryable; a 429 is always retryable regardless of configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

use super::backoff::BackoffPolicy;
use crate::config::duration_str;
use crate::error::TransportCode;

/// HTTP status for "Too Many Requests".
pub const RATE_LIMITED: u16 = 429;

/// What kind of failure an error represents, as far as retrying is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureTag {
    /// The request never got a response
    Transport(TransportCode),

    /// The server answered with a non-success status
    Status {
        status: u16,
        retry_after: Option<Duration>,
    },

    /// Anything else (decode failures, configuration problems)
    Other,
}

/// Errors that can be classified for retry decisions.
pub trait Classify {
    /// Tag describing this failure.
    fn failure_tag(&self) -> FailureTag;
}

/// Errors that can stand for an attempt cut off by a deadline.
///
/// [`CircuitBreaker::call_with_retry`](super::CircuitBreaker::call_with_retry)
/// bounds every attempt and reports the expired ones through this.
pub trait FromTimeout {
    /// Error for an attempt abandoned after `after`.
    fn from_timeout(after: Duration) -> Self;
}

/// Outcome of classifying a failure against a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try again, optionally honoring a server-provided delay
    Retry { hint: Option<Duration> },

    /// Give up immediately
    Fatal,
}

/// Retry configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,

    /// Backoff base delay (e.g., "1s")
    #[serde(with = "duration_str")]
    pub base_delay: Duration,

    /// Backoff ceiling (e.g., "10s")
    #[serde(with = "duration_str")]
    pub max_delay: Duration,

    /// Jitter as a fraction of the exponential delay
    pub jitter_fraction: f64,

    /// HTTP statuses worth retrying (429 is implied)
    pub retryable_statuses: BTreeSet<u16>,

    /// Transport failures worth retrying
    pub retryable_transport: BTreeSet<TransportCode>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::data()
    }
}

impl RetryPolicy {
    /// Policy for eligibility data calls.
    pub fn data() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            jitter_fraction: 0.2,
            retryable_statuses: [408, 429, 500, 502, 503, 504].into_iter().collect(),
            retryable_transport: default_transport_codes(),
        }
    }

    /// Policy for token acquisition: fewer, shorter retries.
    pub fn auth() -> Self {
        Self {
            max_attempts: 2,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(2),
            ..Self::data()
        }
    }

    /// Decide whether a failure is worth another attempt.
    pub fn classify(&self, tag: FailureTag) -> RetryDecision {
        match tag {
            FailureTag::Status {
                status: RATE_LIMITED,
                retry_after,
            } => RetryDecision::Retry { hint: retry_after },
            FailureTag::Status {
                status,
                retry_after,
            } if self.retryable_statuses.contains(&status) => {
                RetryDecision::Retry { hint: retry_after }
            }
            FailureTag::Transport(code) if self.retryable_transport.contains(&code) => {
                RetryDecision::Retry { hint: None }
            }
            _ => RetryDecision::Fatal,
        }
    }

    /// Backoff derived from this policy.
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::new(self.base_delay, self.max_delay, self.jitter_fraction)
    }
}

fn default_transport_codes() -> BTreeSet<TransportCode> {
    [
        TransportCode::ConnectionReset,
        TransportCode::ConnectionAborted,
        TransportCode::TimedOut,
        TransportCode::DnsFailure,
    ]
    .into_iter()
    .collect()
}

/// Why a retried operation finally failed.
#[derive(Error, Debug)]
pub enum RetryError<E> {
    /// A non-retryable failure; no further attempts were made
    #[error("{error}")]
    Fatal { attempts: u32, error: E },

    /// Every attempt failed with a retryable error
    #[error("retries exhausted after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },
}

impl<E> RetryError<E> {
    /// The underlying error of the final attempt.
    pub fn last_error(&self) -> &E {
        match self {
            RetryError::Fatal { error, .. } => error,
            RetryError::Exhausted { last, .. } => last,
        }
    }

    /// Consume into the underlying error.
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Fatal { error, .. } => error,
            RetryError::Exhausted { last, .. } => last,
        }
    }

    /// Attempts made before giving up.
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Fatal { attempts, .. } | RetryError::Exhausted { attempts, .. } => {
                *attempts
            }
        }
    }
}

/// Runs an operation under a [`RetryPolicy`].
///
/// The operation may run several times; it must be safe to repeat.
///
/// Built on `tokio::time::sleep` rather than `backon`: delays are additive
/// jitter over `base * 2^attempt`, and a `Retry-After` hint carried by the
/// error replaces the computed delay, neither of which `backon`'s builders
/// express.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    name: String,
    policy: RetryPolicy,
    backoff: BackoffPolicy,
}

impl RetryExecutor {
    /// Create an executor. `name` identifies the operation in logs.
    pub fn new(name: impl Into<String>, policy: RetryPolicy) -> Self {
        let backoff = policy.backoff();
        Self {
            name: name.into(),
            policy,
            backoff,
        }
    }

    /// The policy in effect.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `op` until it succeeds, fails fatally, or attempts run out.
    pub async fn execute<F, Fut, T, E>(&self, mut op: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + fmt::Display,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            let error = match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(operation = %self.name, attempt, "Succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) => e,
            };

            let hint = match self.policy.classify(error.failure_tag()) {
                RetryDecision::Fatal => {
                    tracing::debug!(
                        operation = %self.name,
                        attempt,
                        error = %error,
                        "Non-retryable failure"
                    );
                    return Err(RetryError::Fatal {
                        attempts: attempt,
                        error,
                    });
                }
                RetryDecision::Retry { hint } => hint,
            };

            if attempt >= max_attempts {
                tracing::warn!(
                    operation = %self.name,
                    attempts = attempt,
                    error = %error,
                    "Retries exhausted"
                );
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last: error,
                });
            }

            let delay = self.backoff.delay(attempt - 1, hint);
            tracing::warn!(
                operation = %self.name,
                attempt,
                delay_ms = delay.as_millis() as u64,
                server_hint = hint.is_some(),
                error = %error,
                "Retryable failure, backing off"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
