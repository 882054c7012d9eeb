//! Backoff policy for retried request/response calls.

use rand::Rng;
use std::time::Duration;

/// Retry/backoff configuration for [`Transport::call`](crate::Transport::call).
///
/// Only transient failures are retried, and never for `POST`: a repeated
/// push can create a second child. Streams are never retried; a failed
/// watch is reported through its event channel and reopening it is up to
/// the caller.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
    /// Number of attempts after the first one. `0` disables retries.
    pub max_retries: u32,
    pub jitter: JitterMode,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            multiplier: 2.0,
            max_retries: 10,
            jitter: JitterMode::Full,
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// A policy that never retries.
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before the first retry.
    pub fn with_initial_backoff(mut self, delay: Duration) -> Self {
        self.initial_backoff = delay;
        self
    }

    /// Upper bound on any single delay.
    pub fn with_max_backoff(mut self, delay: Duration) -> Self {
        self.max_backoff = delay;
        self
    }

    /// Growth factor applied to the delay after each retry.
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Retries allowed after the first attempt.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// How much randomness to add to each delay.
    pub fn with_jitter(mut self, jitter: JitterMode) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay before retry number `retry` (1-based), before jitter.
    pub fn base_delay(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(32) as i32;
        let secs = self.initial_backoff.as_secs_f64() * self.multiplier.powi(exp);
        Duration::try_from_secs_f64(secs)
            .map(|d| d.min(self.max_backoff))
            .unwrap_or(self.max_backoff)
    }

    /// Delay before retry number `retry` (1-based), with jitter applied.
    pub fn delay(&self, retry: u32) -> Duration {
        apply_jitter(self.base_delay(retry), &self.jitter)
    }

    /// Whether another attempt is allowed after `retries` retries so far.
    pub fn should_retry(&self, retries: u32) -> bool {
        retries < self.max_retries
    }
}

/// Jitter mode for retry backoff.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum JitterMode {
    /// Use the exact backoff delay
    None,
    /// Random delay between 0 and the backoff
    #[default]
    Full,
    /// Half fixed, half random
    Equal,
}

/// Apply jitter to a backoff delay.
pub fn apply_jitter(delay: Duration, mode: &JitterMode) -> Duration {
    let mut rng = rand::thread_rng();

    match mode {
        JitterMode::None => delay,
        JitterMode::Full => Duration::from_secs_f64(rng.gen::<f64>() * delay.as_secs_f64()),
        JitterMode::Equal => {
            let half = delay.as_secs_f64() / 2.0;
            Duration::from_secs_f64(half + rng.gen::<f64>() * half)
        }
    }
}
