//! Sequential step runner with per-step timeout and retries.
//!
//! ```rust
//! use langbase::workflow::{StepConfig, StepRetry, Workflow};
//! use langbase::RetryStrategy;
//! use std::time::Duration;
//!
//! # async fn demo() -> langbase::Result<()> {
//! let mut wf = Workflow::new();
//! let summary: String = wf
//!     .step(
//!         StepConfig::new("summarize")
//!             .with_timeout(Duration::from_secs(30))
//!             .with_retries(StepRetry::new(2, Duration::from_millis(500), RetryStrategy::Exponential)),
//!         || async { Ok("done".to_string()) },
//!     )
//!     .await?;
//! assert_eq!(wf.output("summarize"), Some(&serde_json::json!(summary)));
//! # Ok(())
//! # }
//! ```

use crate::resilience::{RetryCalculator, RetryConfig, RetryStrategy};
use crate::{Error, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Retry settings for one step. `limit` counts retries after the first attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct StepRetry {
    pub limit: u32,
    pub delay: Duration,
    pub backoff: RetryStrategy,
}

impl StepRetry {
    pub fn new(limit: u32, delay: Duration, backoff: RetryStrategy) -> Self {
        Self {
            limit,
            delay,
            backoff,
        }
    }

    fn retry_config(&self) -> RetryConfig {
        RetryConfig::new()
            .with_max_attempts(self.limit.saturating_add(1))
            .with_strategy(self.backoff)
            .with_base_delay(self.delay)
            .with_max_delay(Duration::MAX)
            .with_multiplier(2.0)
            .with_jitter(false)
            .with_respect_retry_after(false)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepConfig {
    pub id: String,
    pub timeout: Option<Duration>,
    pub retries: Option<StepRetry>,
}

impl StepConfig {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            timeout: None,
            retries: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_retries(mut self, retries: StepRetry) -> Self {
        self.retries = Some(retries);
        self
    }
}

/// Runs steps one after another and keeps each step's output by id.
#[derive(Debug, Default)]
pub struct Workflow {
    debug: bool,
    outputs: HashMap<String, serde_json::Value>,
}

impl Workflow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log step progress at `info` instead of `debug`.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn outputs(&self) -> &HashMap<String, serde_json::Value> {
        &self.outputs
    }

    pub fn output(&self, step_id: &str) -> Option<&serde_json::Value> {
        self.outputs.get(step_id)
    }

    /// Run `op` as step `config.id`.
    ///
    /// Each attempt is bounded by `config.timeout` (a timeout fails the attempt
    /// with [`Error::StepTimeout`] and is retried like any other failure). The
    /// last error is returned once retries are exhausted. On success the
    /// output is stored under the step id, replacing any earlier value.
    pub async fn step<T, F, Fut>(&mut self, config: StepConfig, mut op: F) -> Result<T>
    where
        T: Serialize,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let retry = config.retries.as_ref().map(StepRetry::retry_config);
        let max_attempts = retry.as_ref().map(|r| r.max_attempts).unwrap_or(1);
        self.log_step(&config);

        let mut attempt: u32 = 1;
        let value = loop {
            let result = match config.timeout {
                Some(limit) => match tokio::time::timeout(limit, op()).await {
                    Ok(r) => r,
                    Err(_) => Err(Error::StepTimeout {
                        step_id: config.id.clone(),
                        timeout: limit,
                    }),
                },
                None => op().await,
            };

            match (result, &retry) {
                (Ok(value), _) => break value,
                (Err(err), Some(retry)) if attempt < max_attempts => {
                    let delay = RetryCalculator::calculate_delay(attempt, retry, None);
                    if self.debug {
                        warn!(
                            step = config.id.as_str(),
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %err,
                            "Attempt {} failed, retrying in {}ms",
                            attempt,
                            delay.as_millis()
                        );
                    } else {
                        debug!(step = config.id.as_str(), attempt, error = %err, "step attempt failed");
                    }
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                (Err(err), _) => return Err(err),
            }
        };

        self.outputs
            .insert(config.id.clone(), serde_json::to_value(&value)?);
        if self.debug {
            info!(step = config.id.as_str(), attempts = attempt, "Completed step: {}", config.id);
        }
        Ok(value)
    }

    fn log_step(&self, config: &StepConfig) {
        if !self.debug {
            debug!(step = config.id.as_str(), "starting step");
            return;
        }
        info!(
            step = config.id.as_str(),
            timeout_ms = config.timeout.map(|t| t.as_millis() as u64),
            retry_limit = config.retries.as_ref().map(|r| r.limit),
            "Starting step: {}",
            config.id
        );
    }
}
