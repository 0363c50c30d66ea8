//! Backoff strategies and the delay calculator used between retry attempts.

use crate::ErrorKind;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// How the base delay grows with the attempt number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryStrategy {
    Fixed,
    Linear,
    Exponential,
    Fibonacci,
}

/// Retry policy. Immutable once built; share it behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub strategy: RetryStrategy,
    #[serde(with = "secs")]
    pub base_delay: Duration,
    #[serde(with = "secs")]
    pub max_delay: Duration,
    pub multiplier: f64,
    pub jitter: bool,
    pub retry_on_status_codes: BTreeSet<u16>,
    pub retry_on_kinds: BTreeSet<ErrorKind>,
    pub respect_retry_after: bool,
    #[serde(with = "secs")]
    pub max_retry_after: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            strategy: RetryStrategy::Exponential,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            jitter: true,
            retry_on_status_codes: [429, 500, 502, 503, 504].into_iter().collect(),
            retry_on_kinds: [ErrorKind::Connection, ErrorKind::Timeout, ErrorKind::RateLimit]
                .into_iter()
                .collect(),
            respect_retry_after: true,
            max_retry_after: Duration::from_secs(300),
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Values below 1 are raised to 1.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_strategy(mut self, strategy: RetryStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_retry_on_status_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.retry_on_status_codes = codes.into_iter().collect();
        self
    }

    pub fn with_retry_on_kinds(mut self, kinds: impl IntoIterator<Item = ErrorKind>) -> Self {
        self.retry_on_kinds = kinds.into_iter().collect();
        self
    }

    pub fn with_respect_retry_after(mut self, respect: bool) -> Self {
        self.respect_retry_after = respect;
        self
    }

    pub fn with_max_retry_after(mut self, cap: Duration) -> Self {
        self.max_retry_after = cap;
        self
    }

    /// Shorthand for [`RetryCalculator::calculate_delay`].
    pub fn calculate_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        RetryCalculator::calculate_delay(attempt, self, retry_after)
    }
}

/// Computes the wait before the next attempt.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryCalculator;

impl RetryCalculator {
    /// Delay to wait after failed attempt `attempt` (1-based; 0 is treated as 1).
    ///
    /// A server-supplied `retry_after` wins over the strategy when the config
    /// respects it, capped at `max_retry_after`. Otherwise the strategy's base
    /// delay is scaled by a jitter factor in `[0.5, 1.0)` and clamped to
    /// `max_delay`.
    pub fn calculate_delay(
        attempt: u32,
        config: &RetryConfig,
        retry_after: Option<Duration>,
    ) -> Duration {
        if config.respect_retry_after {
            if let Some(ra) = retry_after {
                return ra.min(config.max_retry_after);
            }
        }

        let attempt = attempt.max(1);
        let base = config.base_delay.as_secs_f64();
        let mut delay = match config.strategy {
            RetryStrategy::Fixed => base,
            RetryStrategy::Linear => base * attempt as f64,
            RetryStrategy::Exponential => {
                base * config.multiplier.powi(attempt.saturating_sub(1).min(i32::MAX as u32) as i32)
            }
            RetryStrategy::Fibonacci => base * fibonacci(attempt),
        };

        if config.jitter {
            let factor: f64 = rand::rng().random_range(0.5..1.0);
            delay *= factor;
        }

        if !delay.is_finite() || delay >= config.max_delay.as_secs_f64() {
            return config.max_delay;
        }
        Duration::try_from_secs_f64(delay.max(0.0)).unwrap_or(config.max_delay)
    }
}

/// fib(1) = fib(2) = 1. Saturates to infinity for very large `n`.
fn fibonacci(n: u32) -> f64 {
    let (mut a, mut b) = (1.0_f64, 1.0_f64);
    for _ in 2..n {
        let next = a + b;
        a = b;
        b = next;
        if b.is_infinite() {
            break;
        }
    }
    b
}

/// Serde adapter storing a `Duration` as fractional seconds.
pub(crate) mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let v = f64::deserialize(d)?;
        Duration::try_from_secs_f64(v).map_err(|_| {
            serde::de::Error::custom(format!(
                "duration must be a non-negative number of seconds, got {v}"
            ))
        })
    }
}
