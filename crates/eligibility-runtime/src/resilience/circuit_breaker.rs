//! Circuit breaker over a rolling failure-rate window.
//!
//! When a dependency keeps failing, the circuit opens and subsequent calls
//! are rejected without touching the dependency until `reset_timeout` has
//! passed. Then a single probe is let through to decide whether to close.
//!
//! # Transitions
//!
//! ```text
//! Closed --(failure % > threshold, volume reached)--> Open
//! Open   --(reset_timeout elapsed)------------------> HalfOpen
//! HalfOpen --(probe succeeds)-----------------------> Closed
//! HalfOpen --(probe fails or times out)-------------> Open
//! ```
//!
//! `force_open` and `force_close` are operator overrides outside this table.
//! A forced-open circuit stays open until `force_close` is called.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

use super::retry::{Classify, FromTimeout, RetryError, RetryExecutor};
use crate::config::duration_str;

/// Current state of a circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    /// Normal operation
    Closed,

    /// Failing fast
    Open,

    /// Waiting on a single probe
    HalfOpen,
}

/// Breaker configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Length of the rolling window (e.g., "10s")
    #[serde(with = "duration_str")]
    pub window: Duration,

    /// Number of buckets the window is divided into
    pub buckets: u32,

    /// Minimum calls in the window before the failure rate is considered
    pub volume_threshold: u32,

    /// Failure percentage that must be exceeded to open
    pub error_threshold_percentage: f64,

    /// Time spent open before a probe is allowed
    #[serde(with = "duration_str")]
    pub reset_timeout: Duration,

    /// Hard bound on every call let through; under `call_with_retry`, on each attempt
    #[serde(with = "duration_str")]
    pub call_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self::eligibility()
    }
}

impl BreakerConfig {
    /// Preset for the token endpoint.
    pub fn token() -> Self {
        Self {
            reset_timeout: Duration::from_secs(60),
            call_timeout: Duration::from_secs(10),
            ..Self::eligibility()
        }
    }

    /// Preset for the eligibility data endpoint.
    pub fn eligibility() -> Self {
        Self {
            window: Duration::from_secs(10),
            buckets: 10,
            volume_threshold: 5,
            error_threshold_percentage: 50.0,
            reset_timeout: Duration::from_secs(30),
            call_timeout: Duration::from_secs(30),
        }
    }

    /// Preset for the shared token/cache store: tolerant and quick to give up.
    pub fn cache_store() -> Self {
        Self {
            error_threshold_percentage: 75.0,
            reset_timeout: Duration::from_secs(10),
            call_timeout: Duration::from_secs(1),
            ..Self::eligibility()
        }
    }
}

/// Why a guarded call did not produce a value.
#[derive(Error, Debug)]
pub enum BreakerError<E> {
    /// Rejected without invoking the operation
    #[error("circuit '{name}' is open")]
    Open { name: String },

    /// The operation exceeded `call_timeout`
    #[error("call through circuit '{name}' timed out after {timeout:?}")]
    Timeout { name: String, timeout: Duration },

    /// The operation itself failed
    #[error("{0}")]
    Inner(E),
}

/// Snapshot of a breaker's rolling window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakerMetrics {
    pub name: String,
    pub state: BreakerState,
    pub forced: bool,

    /// Calls let through (successes + failures + timeouts)
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub timeouts: u64,
    pub rejects: u64,

    /// Failure percentage over the window (timeouts count as failures)
    pub error_percentage: f64,
}

#[derive(Debug, Clone, Copy)]
enum Outcome {
    Success,
    Failure,
    Timeout,
    Reject,
}

#[derive(Debug, Clone, Copy, Default)]
struct Counts {
    successes: u64,
    failures: u64,
    timeouts: u64,
    rejects: u64,
}

impl Counts {
    fn add(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Success => self.successes += 1,
            Outcome::Failure => self.failures += 1,
            Outcome::Timeout => self.timeouts += 1,
            Outcome::Reject => self.rejects += 1,
        }
    }

    fn merge(&mut self, other: &Counts) {
        self.successes += other.successes;
        self.failures += other.failures;
        self.timeouts += other.timeouts;
        self.rejects += other.rejects;
    }

    fn attempts(&self) -> u64 {
        self.successes + self.failures + self.timeouts
    }

    fn error_percentage(&self) -> f64 {
        let attempts = self.attempts();
        if attempts == 0 {
            return 0.0;
        }
        (self.failures + self.timeouts) as f64 * 100.0 / attempts as f64
    }
}

/// Ring of time buckets. Slot `i` holds the bucket with absolute index
/// `tick` where `tick % len == i`; stale slots are cleared on reuse.
#[derive(Debug)]
struct RollingWindow {
    epoch: Instant,
    bucket_span: Duration,
    slots: Vec<(u64, Counts)>,
}

impl RollingWindow {
    fn new(window: Duration, buckets: u32, now: Instant) -> Self {
        let buckets = buckets.max(1);
        let bucket_span = (window / buckets).max(Duration::from_millis(1));
        Self {
            epoch: now,
            bucket_span,
            slots: vec![(0, Counts::default()); buckets as usize],
        }
    }

    fn tick(&self, now: Instant) -> u64 {
        let elapsed = now.saturating_duration_since(self.epoch);
        (elapsed.as_nanos() / self.bucket_span.as_nanos()) as u64
    }

    fn record(&mut self, outcome: Outcome, now: Instant) {
        let tick = self.tick(now);
        let len = self.slots.len() as u64;
        let slot = &mut self.slots[(tick % len) as usize];
        if slot.0 != tick {
            *slot = (tick, Counts::default());
        }
        slot.1.add(outcome);
    }

    fn totals(&self, now: Instant) -> Counts {
        let tick = self.tick(now);
        let len = self.slots.len() as u64;
        let mut totals = Counts::default();
        for (slot_tick, counts) in &self.slots {
            if *slot_tick <= tick && tick - slot_tick < len {
                totals.merge(counts);
            }
        }
        totals
    }

    fn reset(&mut self, now: Instant) {
        self.epoch = now;
        for slot in &mut self.slots {
            *slot = (0, Counts::default());
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    opened_at: Option<Instant>,
    forced: bool,
    probe_in_flight: bool,
    window: RollingWindow,
}

/// Failure-rate circuit breaker for one named dependency.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

/// A call that was let through. Dropping it unsettled (e.g., the caller's
/// future was cancelled) releases a probe slot so HalfOpen cannot wedge.
struct Admission<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
    settled: bool,
}

impl Admission<'_> {
    fn settle(mut self, outcome: Outcome) {
        self.settled = true;
        self.breaker.on_outcome(self.probe, outcome);
    }
}

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        if self.probe && !self.settled {
            self.breaker.inner.lock().probe_in_flight = false;
        }
    }
}

impl CircuitBreaker {
    /// Create a closed breaker.
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        let window = RollingWindow::new(config.window, config.buckets, Instant::now());
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                opened_at: None,
                forced: false,
                probe_in_flight: false,
                window,
            }),
        }
    }

    /// Dependency name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configuration in effect.
    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Run `op` through the breaker.
    ///
    /// Rejects immediately when open. Otherwise runs `op` under
    /// `call_timeout`; errors and timeouts count as failures.
    pub async fn call<F, Fut, T, E>(&self, op: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let admission = self.admit()?;

        match tokio::time::timeout(self.config.call_timeout, op()).await {
            Ok(Ok(value)) => {
                admission.settle(Outcome::Success);
                Ok(value)
            }
            Ok(Err(e)) => {
                admission.settle(Outcome::Failure);
                Err(BreakerError::Inner(e))
            }
            Err(_) => {
                admission.settle(Outcome::Timeout);
                Err(BreakerError::Timeout {
                    name: self.name.clone(),
                    timeout: self.config.call_timeout,
                })
            }
        }
    }

    /// Run `op` under `retry` as one guarded call.
    ///
    /// The whole retry group takes a single admission and records a single
    /// outcome. `call_timeout` bounds each attempt, not the group: an attempt
    /// that runs out of time fails with [`FromTimeout::from_timeout`] and is
    /// retried like any other retryable failure. When the group fails and its
    /// last attempt timed out, the outcome is a timeout and the caller gets
    /// [`BreakerError::Timeout`].
    pub async fn call_with_retry<F, Fut, T, E>(
        &self,
        retry: &RetryExecutor,
        mut op: F,
    ) -> Result<T, BreakerError<RetryError<E>>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + FromTimeout + fmt::Display,
    {
        let admission = self.admit()?;
        let call_timeout = self.config.call_timeout;
        let last_timed_out = AtomicBool::new(false);

        let result = retry
            .execute(|| {
                let attempt = op();
                let last_timed_out = &last_timed_out;
                async move {
                    match tokio::time::timeout(call_timeout, attempt).await {
                        Ok(outcome) => {
                            last_timed_out.store(false, Ordering::Relaxed);
                            outcome
                        }
                        Err(_) => {
                            last_timed_out.store(true, Ordering::Relaxed);
                            Err(E::from_timeout(call_timeout))
                        }
                    }
                }
            })
            .await;

        match result {
            Ok(value) => {
                admission.settle(Outcome::Success);
                Ok(value)
            }
            Err(e) if last_timed_out.load(Ordering::Relaxed) => {
                admission.settle(Outcome::Timeout);
                tracing::warn!(
                    breaker = %self.name,
                    attempts = e.attempts(),
                    timeout_ms = call_timeout.as_millis() as u64,
                    "Guarded call timed out"
                );
                Err(BreakerError::Timeout {
                    name: self.name.clone(),
                    timeout: call_timeout,
                })
            }
            Err(e) => {
                admission.settle(Outcome::Failure);
                Err(BreakerError::Inner(e))
            }
        }
    }

    /// Current state; an elapsed Open circuit reports HalfOpen.
    pub fn state(&self) -> BreakerState {
        let mut inner = self.inner.lock();
        self.maybe_half_open(&mut inner, Instant::now());
        inner.state
    }

    /// Rolling metrics snapshot.
    pub fn metrics(&self) -> BreakerMetrics {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        self.maybe_half_open(&mut inner, now);
        let counts = inner.window.totals(now);

        BreakerMetrics {
            name: self.name.clone(),
            state: inner.state,
            forced: inner.forced,
            attempts: counts.attempts(),
            successes: counts.successes,
            failures: counts.failures,
            timeouts: counts.timeouts,
            rejects: counts.rejects,
            error_percentage: counts.error_percentage(),
        }
    }

    /// Open the circuit and keep it open until [`force_close`](Self::force_close).
    pub fn force_open(&self) {
        let mut inner = self.inner.lock();
        inner.state = BreakerState::Open;
        inner.opened_at = Some(Instant::now());
        inner.forced = true;
        inner.probe_in_flight = false;
        tracing::warn!(breaker = %self.name, "Circuit forced open");
    }

    /// Close the circuit and clear the window.
    pub fn force_close(&self) {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        inner.state = BreakerState::Closed;
        inner.opened_at = None;
        inner.forced = false;
        inner.probe_in_flight = false;
        inner.window.reset(now);
        tracing::info!(breaker = %self.name, "Circuit forced closed");
    }

    fn admit<E>(&self) -> Result<Admission<'_>, BreakerError<E>> {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        self.maybe_half_open(&mut inner, now);

        let probe = match inner.state {
            BreakerState::Closed => false,
            BreakerState::HalfOpen if !inner.probe_in_flight => {
                inner.probe_in_flight = true;
                true
            }
            BreakerState::HalfOpen | BreakerState::Open => {
                inner.window.record(Outcome::Reject, now);
                tracing::debug!(breaker = %self.name, state = ?inner.state, "Call rejected");
                return Err(BreakerError::Open {
                    name: self.name.clone(),
                });
            }
        };

        Ok(Admission {
            breaker: self,
            probe,
            settled: false,
        })
    }

    fn maybe_half_open(&self, inner: &mut Inner, now: Instant) {
        if inner.state != BreakerState::Open || inner.forced {
            return;
        }
        let elapsed = inner
            .opened_at
            .map(|at| now.saturating_duration_since(at) >= self.config.reset_timeout)
            .unwrap_or(true);
        if elapsed {
            inner.state = BreakerState::HalfOpen;
            inner.probe_in_flight = false;
            tracing::info!(breaker = %self.name, "Circuit half-open, allowing a probe");
        }
    }

    fn on_outcome(&self, probe: bool, outcome: Outcome) {
        let now = Instant::now();
        let mut inner = self.inner.lock();

        if probe {
            inner.probe_in_flight = false;
        }

        if probe && inner.state == BreakerState::HalfOpen {
            match outcome {
                Outcome::Success => {
                    inner.state = BreakerState::Closed;
                    inner.opened_at = None;
                    inner.window.reset(now);
                    tracing::info!(breaker = %self.name, "Circuit closed after successful probe");
                }
                _ => {
                    inner.state = BreakerState::Open;
                    inner.opened_at = Some(now);
                    inner.window.record(outcome, now);
                    tracing::warn!(breaker = %self.name, "Circuit reopened after failed probe");
                }
            }
            return;
        }

        inner.window.record(outcome, now);

        if inner.state == BreakerState::Closed && !matches!(outcome, Outcome::Success) {
            let counts = inner.window.totals(now);
            if counts.attempts() >= u64::from(self.config.volume_threshold)
                && counts.error_percentage() > self.config.error_threshold_percentage
            {
                inner.state = BreakerState::Open;
                inner.opened_at = Some(now);
                tracing::warn!(
                    breaker = %self.name,
                    attempts = counts.attempts(),
                    error_percentage = counts.error_percentage(),
                    "Circuit opened after failure rate exceeded threshold"
                );
            }
        }
    }
}
