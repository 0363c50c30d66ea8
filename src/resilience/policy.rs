//! Retry decision and execution loop combining backoff with the circuit breaker.

use crate::resilience::backoff::{RetryCalculator, RetryConfig};
use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::transport::ResponseMeta;
use crate::{Error, Result};
use reqwest::header::RETRY_AFTER;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Runs an attempt function under a retry policy and an optional circuit breaker.
///
/// Only the final outcome of a call is reported to the breaker: intermediate
/// failures that are retried do not count toward opening it.
#[derive(Debug)]
pub struct ResilientRequest {
    retry_config: Arc<RetryConfig>,
    circuit_breaker: Option<CircuitBreaker>,
}

impl Default for ResilientRequest {
    fn default() -> Self {
        Self::new(RetryConfig::default(), None, true)
    }
}

impl ResilientRequest {
    /// A breaker is created when `enable_circuit_breaker` is set, using
    /// `circuit_breaker_config` or the defaults.
    pub fn new(
        retry_config: RetryConfig,
        circuit_breaker_config: Option<CircuitBreakerConfig>,
        enable_circuit_breaker: bool,
    ) -> Self {
        let circuit_breaker = enable_circuit_breaker
            .then(|| CircuitBreaker::new(circuit_breaker_config.unwrap_or_default()));
        Self {
            retry_config: Arc::new(retry_config),
            circuit_breaker,
        }
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry_config
    }

    pub fn circuit_breaker(&self) -> Option<&CircuitBreaker> {
        self.circuit_breaker.as_ref()
    }

    /// True if the error's kind is retryable, or the response status is.
    pub fn should_retry(&self, err: &Error, response: Option<&ResponseMeta>) -> bool {
        let kind = err.kind();
        if self.retry_config.retry_on_kinds.iter().any(|k| kind.is_a(*k)) {
            return true;
        }
        response
            .map(|r| r.status.as_u16())
            .or_else(|| err.status())
            .map(|status| self.retry_config.retry_on_status_codes.contains(&status))
            .unwrap_or(false)
    }

    /// `Retry-After` as a number of seconds.
    ///
    /// HTTP-date values, negative and non-finite numbers yield `None`.
    pub fn get_retry_after(response: Option<&ResponseMeta>) -> Option<Duration> {
        let raw = response?.header(RETRY_AFTER.as_str())?;
        let secs: f64 = raw.parse().ok()?;
        if !secs.is_finite() || secs < 0.0 {
            return None;
        }
        Duration::try_from_secs_f64(secs).ok()
    }

    /// Execute `attempt_fn` until it succeeds, the error is not retryable, or
    /// attempts are exhausted. The attempt number (starting at 1) is passed in.
    ///
    /// Fails fast with [`Error::CircuitOpen`] when the breaker refuses, without
    /// invoking `attempt_fn`. Exhaustion returns the last error unchanged.
    pub async fn execute<T, F, Fut>(&self, endpoint: &str, mut attempt_fn: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.retry_config.max_attempts.max(1);
        let mut attempt: u32 = 1;

        loop {
            if let Some(cb) = &self.circuit_breaker {
                if !cb.should_allow_request() {
                    warn!(endpoint, attempt, "circuit breaker open, request not attempted");
                    return Err(Error::CircuitOpen {
                        endpoint: endpoint.to_string(),
                    });
                }
            }

            match attempt_fn(attempt).await {
                Ok(value) => {
                    if let Some(cb) = &self.circuit_breaker {
                        cb.record_success();
                    }
                    return Ok(value);
                }
                Err(err) => {
                    let response = err.response();
                    if attempt < max_attempts && self.should_retry(&err, response) {
                        let retry_after = Self::get_retry_after(response);
                        let delay =
                            RetryCalculator::calculate_delay(attempt, &self.retry_config, retry_after);
                        warn!(
                            endpoint,
                            attempt,
                            max_attempts,
                            delay_ms = delay.as_millis() as u64,
                            error_kind = ?err.kind(),
                            error = %err,
                            "request failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }

                    if let Some(cb) = &self.circuit_breaker {
                        cb.record_failure(&err);
                    }
                    debug!(
                        endpoint,
                        attempt,
                        error_kind = ?err.kind(),
                        "request failed, giving up"
                    );
                    return Err(err);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::CircuitState;
    use crate::ErrorKind;
    use reqwest::header::{HeaderMap, HeaderValue};
    use reqwest::StatusCode;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_retry(attempts: u32) -> RetryConfig {
        RetryConfig::new()
            .with_max_attempts(attempts)
            .with_base_delay(Duration::from_millis(1))
            .with_jitter(false)
    }

    fn meta_with_retry_after(value: &'static str) -> ResponseMeta {
        let mut headers = HeaderMap::new();
        headers.insert("Retry-After", HeaderValue::from_static(value));
        ResponseMeta::new(StatusCode::TOO_MANY_REQUESTS, headers)
    }

    #[test]
    fn test_should_retry_by_status_and_kind() {
        let req = ResilientRequest::new(
            RetryConfig::new()
                .with_retry_on_status_codes([429])
                .with_retry_on_kinds([ErrorKind::Connection]),
            None,
            false,
        );

        assert!(req.should_retry(&Error::api(429, "slow down"), None));
        assert!(!req.should_retry(&Error::api(404, "missing"), None));
        assert!(req.should_retry(&Error::connection("reset"), None));
        assert!(req.should_retry(&Error::timeout("slow"), None));

        let resp = meta_with_retry_after("1");
        assert!(req.should_retry(&Error::connection("x"), Some(&resp)));
    }

    #[test]
    fn test_get_retry_after() {
        assert_eq!(
            ResilientRequest::get_retry_after(Some(&meta_with_retry_after("30"))),
            Some(Duration::from_secs(30))
        );
        assert_eq!(
            ResilientRequest::get_retry_after(Some(&meta_with_retry_after("1.5"))),
            Some(Duration::from_millis(1500))
        );
        assert_eq!(
            ResilientRequest::get_retry_after(Some(&meta_with_retry_after(
                "Wed, 21 Oct 2015 07:28:00 GMT"
            ))),
            None
        );
        assert_eq!(
            ResilientRequest::get_retry_after(Some(&meta_with_retry_after("-5"))),
            None
        );
        assert_eq!(ResilientRequest::get_retry_after(None), None);
    }

    #[tokio::test]
    async fn test_execute_retries_then_succeeds() {
        let req = ResilientRequest::new(fast_retry(3), None, true);
        let calls = AtomicU32::new(0);

        let result = req
            .execute("/v1/pipes/run", |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(Error::api(503, "unavailable"))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(result, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(req.circuit_breaker().unwrap().state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_execute_returns_last_error_when_exhausted() {
        let req = ResilientRequest::new(fast_retry(2), None, false);
        let calls = AtomicU32::new(0);

        let err = req
            .execute("/v1/pipes/run", |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Err::<(), _>(Error::api(500, format!("boom {attempt}"))) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(err.status(), Some(500));
        assert_eq!(err.to_string(), "500 boom 2");
    }

    #[tokio::test]
    async fn test_non_retryable_error_is_not_retried() {
        let req = ResilientRequest::new(fast_retry(5), None, false);
        let calls = AtomicU32::new(0);

        let err = req
            .execute("/v1/pipes/run", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(Error::api(400, "bad")) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(err.kind(), ErrorKind::BadRequest);
    }

    #[tokio::test]
    async fn test_open_circuit_fails_fast() {
        let req = ResilientRequest::new(
            fast_retry(1),
            Some(
                CircuitBreakerConfig::new()
                    .with_failure_threshold(2)
                    .with_recovery_timeout(Duration::from_secs(60)),
            ),
            true,
        );
        let calls = AtomicU32::new(0);

        for _ in 0..2 {
            let _ = req
                .execute("/v1/pipes/run", |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err::<(), _>(Error::connection("refused")) }
                })
                .await;
        }
        assert_eq!(req.circuit_breaker().unwrap().state(), CircuitState::Open);

        let err = req
            .execute("/v1/pipes/run", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, Error::CircuitOpen { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
