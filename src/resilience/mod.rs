//! # Resilience Module
//!
//! Retry with backoff and circuit breaking for requests to the platform API.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`backoff`] | Retry strategies, [`RetryConfig`] and [`RetryCalculator`] |
//! | [`circuit_breaker`] | Three-state breaker that fails fast while the upstream is unhealthy |
//! | [`policy`] | [`ResilientRequest`], the execution loop combining both |
//!
//! ## Circuit Breaker
//!
//! - **Closed**: Normal operation, requests pass through
//! - **Open**: Failures exceeded threshold, requests fail fast
//! - **Half-Open**: Testing if service has recovered
//!
//! ```rust
//! use langbase::resilience::{CircuitBreaker, CircuitBreakerConfig};
//! use std::time::Duration;
//!
//! let config = CircuitBreakerConfig::new()
//!     .with_failure_threshold(5)
//!     .with_recovery_timeout(Duration::from_secs(30));
//! let breaker = CircuitBreaker::new(config);
//!
//! if breaker.should_allow_request() {
//!     // Make API call...
//!     breaker.record_success();
//! }
//! ```
//!
//! ## Retry
//!
//! ```rust
//! use langbase::resilience::{RetryConfig, RetryStrategy};
//! use std::time::Duration;
//!
//! let retry = RetryConfig::new()
//!     .with_strategy(RetryStrategy::Linear)
//!     .with_base_delay(Duration::from_millis(500))
//!     .with_jitter(false);
//! assert_eq!(retry.calculate_delay(3, None), Duration::from_millis(1500));
//! ```

pub mod backoff;
pub mod circuit_breaker;
pub mod policy;

pub use backoff::{RetryCalculator, RetryConfig, RetryStrategy};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerSnapshot, CircuitState};
pub use policy::ResilientRequest;

use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Serializable bundle of the resilience settings a client is built with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    /// When false, requests are sent once with no retry and no breaker.
    pub enabled: bool,
    pub retry: RetryConfig,
    /// `None` disables the circuit breaker.
    pub circuit_breaker: Option<CircuitBreakerConfig>,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            retry: RetryConfig::default(),
            circuit_breaker: Some(CircuitBreakerConfig::default()),
        }
    }
}

impl ResilienceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Load from YAML. Durations are given in (fractional) seconds.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let cfg: Self = serde_yaml::from_str(yaml)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Apply `LANGBASE_RETRY_MAX_ATTEMPTS`, `LANGBASE_BREAKER_FAILURE_THRESHOLD`
    /// and `LANGBASE_BREAKER_RECOVERY_SECS` on top of `self`.
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Some(n) = env_parse::<u32>("LANGBASE_RETRY_MAX_ATTEMPTS")? {
            self.retry = self.retry.with_max_attempts(n);
        }
        let threshold = env_parse::<u32>("LANGBASE_BREAKER_FAILURE_THRESHOLD")?;
        let recovery = env_parse::<f64>("LANGBASE_BREAKER_RECOVERY_SECS")?;
        if threshold.is_some() || recovery.is_some() {
            let mut cb = self.circuit_breaker.take().unwrap_or_default();
            if let Some(t) = threshold {
                cb = cb.with_failure_threshold(t);
            }
            if let Some(secs) = recovery {
                let timeout = Duration::try_from_secs_f64(secs).map_err(|_| {
                    Error::configuration_with_context(
                        format!("invalid recovery timeout: {secs}"),
                        ErrorContext::new()
                            .with_field_path("LANGBASE_BREAKER_RECOVERY_SECS")
                            .with_source("resilience_config"),
                    )
                })?;
                cb = cb.with_recovery_timeout(timeout);
            }
            self.circuit_breaker = Some(cb);
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(Error::configuration_with_context(
                "max_attempts must be at least 1",
                ErrorContext::new()
                    .with_field_path("retry.max_attempts")
                    .with_source("resilience_config"),
            ));
        }
        if !self.retry.multiplier.is_finite() || self.retry.multiplier <= 0.0 {
            return Err(Error::configuration_with_context(
                "multiplier must be a positive number",
                ErrorContext::new()
                    .with_field_path("retry.multiplier")
                    .with_details(self.retry.multiplier.to_string())
                    .with_source("resilience_config"),
            ));
        }
        if let Some(cb) = &self.circuit_breaker {
            if cb.failure_threshold == 0 || cb.success_threshold == 0 {
                return Err(Error::configuration_with_context(
                    "circuit breaker thresholds must be at least 1",
                    ErrorContext::new()
                        .with_field_path("circuit_breaker")
                        .with_source("resilience_config"),
                ));
            }
        }
        Ok(())
    }

    /// Build the executor, or `None` when resilience is disabled.
    pub fn build(&self) -> Option<ResilientRequest> {
        self.enabled.then(|| {
            ResilientRequest::new(
                self.retry.clone(),
                self.circuit_breaker.clone(),
                self.circuit_breaker.is_some(),
            )
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw.trim().parse::<T>().map(Some).map_err(|_| {
            Error::configuration_with_context(
                format!("{key} is not a valid value"),
                ErrorContext::new()
                    .with_field_path(key)
                    .with_details(raw.clone())
                    .with_source("environment"),
            )
        }),
        _ => Ok(None),
    }
}
