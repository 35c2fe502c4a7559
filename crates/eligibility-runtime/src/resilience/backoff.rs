//! Exponential backoff with jitter.
//!
//! `delay = min(base * 2^attempt + jitter, max)` where jitter is uniform in
//! `[0, jitter_fraction * base * 2^attempt]`. A server hint (Retry-After)
//! replaces the computed delay, still capped at `max`.

use rand::Rng;
use std::time::Duration;

/// Computes the wait before the next attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the first retry, before jitter
    pub base_delay: Duration,

    /// Upper bound for any delay, hinted or computed
    pub max_delay: Duration,

    /// Fraction of the exponential delay added as random jitter (0.0 - 1.0)
    pub jitter_fraction: f64,
}

impl BackoffPolicy {
    /// Create a backoff policy.
    pub fn new(base_delay: Duration, max_delay: Duration, jitter_fraction: f64) -> Self {
        Self {
            base_delay,
            max_delay,
            jitter_fraction: jitter_fraction.clamp(0.0, 1.0),
        }
    }

    /// Delay after failed attempt `attempt` (0-based), using the thread RNG.
    pub fn delay(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        self.delay_with_rng(attempt, hint, &mut rand::thread_rng())
    }

    /// Delay after failed attempt `attempt` (0-based) with a caller-supplied RNG.
    ///
    /// Deterministic for a seeded RNG.
    pub fn delay_with_rng<R: Rng>(
        &self,
        attempt: u32,
        hint: Option<Duration>,
        rng: &mut R,
    ) -> Duration {
        if let Some(hint) = hint {
            return hint.min(self.max_delay);
        }

        let exponential = self.exponential_ms(attempt);
        let max_ms = duration_ms(self.max_delay);
        if exponential >= max_ms {
            return self.max_delay;
        }

        let jitter_range = (exponential as f64 * self.jitter_fraction) as u64;
        let jitter = if jitter_range > 0 {
            rng.gen_range(0..=jitter_range)
        } else {
            0
        };

        Duration::from_millis(exponential.saturating_add(jitter).min(max_ms))
    }

    /// `base * 2^attempt` in milliseconds, saturating.
    fn exponential_ms(&self, attempt: u32) -> u64 {
        let factor = 2u64.checked_pow(attempt).unwrap_or(u64::MAX);
        duration_ms(self.base_delay).saturating_mul(factor)
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
