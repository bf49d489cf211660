//! Retry backoff: exponential growth, a cap, and jitter.
//!
//! Waiting and randomness both go through [`Clock`], so a test can swap in a
//! clock that records delays instead of sleeping.

use std::{
    fmt,
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use crate::ClientOptions;

/// Time and entropy source used between retry attempts.
pub trait Clock: Send + Sync {
    /// Blocks the calling thread for `duration`.
    fn sleep(&self, duration: Duration);

    /// Returns a value in `[0, 1)` used to jitter the next delay.
    fn jitter(&self) -> f64;
}

/// Wall clock: `std::thread::sleep` and sub-second nanos as entropy.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }

    fn jitter(&self) -> f64 {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.subsec_nanos())
            .unwrap_or(0);
        f64::from(nanos) / 1_000_000_000.0
    }
}

/// Exponential backoff bounded by `max_delay`, scaled by a jitter factor in
/// `[1 - randomization_factor, 1 + randomization_factor]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub randomization_factor: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_secs(60),
            randomization_factor: 0.5,
        }
    }
}

impl BackoffPolicy {
    pub(crate) fn from_options(options: &ClientOptions) -> Self {
        Self {
            base_delay: Duration::from_millis(options.retry_backoff_ms),
            max_delay: Duration::from_millis(options.max_backoff_ms),
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (0-based), given a jitter sample in `[0, 1)`.
    pub fn delay(&self, attempt: u32, jitter: f64) -> Duration {
        let exp = attempt.min(16);
        let multiplier = 1u128 << exp;
        let capped = self
            .base_delay
            .as_millis()
            .saturating_mul(multiplier)
            .min(self.max_delay.as_millis());

        let spread = self.randomization_factor.clamp(0.0, 1.0);
        let factor = 1.0 - spread + jitter.clamp(0.0, 1.0) * 2.0 * spread;
        Duration::from_millis((capped as f64 * factor).round() as u64)
    }
}

/// Per-call retry bookkeeping.
#[derive(Clone)]
pub struct BackoffCounter {
    policy: BackoffPolicy,
    clock: Arc<dyn Clock>,
    attempt: u32,
    max_retries: u32,
}

impl fmt::Debug for BackoffCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackoffCounter")
            .field("policy", &self.policy)
            .field("attempt", &self.attempt)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl BackoffCounter {
    pub fn new(policy: BackoffPolicy, clock: Arc<dyn Clock>, max_retries: u32) -> Self {
        Self {
            policy,
            clock,
            attempt: 0,
            max_retries,
        }
    }

    /// Retries already waited for.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn can_retry(&self) -> bool {
        self.attempt < self.max_retries
    }

    /// Waits before the next attempt and advances the counter.
    ///
    /// A server-provided `retry_after` replaces the computed delay, capped at
    /// the policy's `max_delay`.
    pub fn wait(&mut self, retry_after: Option<Duration>) -> Duration {
        let delay = match retry_after {
            Some(requested) => requested.min(self.policy.max_delay),
            None => self.policy.delay(self.attempt, self.clock.jitter()),
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(
            attempt = self.attempt,
            delay_ms = delay.as_millis() as u64,
            "waiting before retry"
        );

        self.clock.sleep(delay);
        self.attempt += 1;
        delay
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
