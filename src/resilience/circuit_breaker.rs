use crate::resilience::backoff::secs;
use crate::{Error, ErrorKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::info;

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation, requests pass through
    Closed,
    /// Failures exceeded threshold, requests fail fast
    Open,
    /// Recovery timeout elapsed, probing whether the upstream recovered
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerSnapshot {
    pub state: CircuitState,
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub failure_count: u32,
    pub success_count: u32,
    /// Remaining open time in ms, if currently open.
    pub open_remaining_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Counted failures that open the circuit
    pub failure_threshold: u32,
    /// Time spent open before a probe is allowed
    #[serde(with = "secs")]
    pub recovery_timeout: Duration,
    /// Successes in half-open needed to close again
    pub success_threshold: u32,
    /// Only errors of these kinds (or their refinements) are counted
    pub failure_kinds: BTreeSet<ErrorKind>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            success_threshold: 2,
            failure_kinds: [ErrorKind::Connection, ErrorKind::Timeout]
                .into_iter()
                .collect(),
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    pub fn with_recovery_timeout(mut self, timeout: Duration) -> Self {
        self.recovery_timeout = timeout;
        self
    }

    pub fn with_success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold.max(1);
        self
    }

    pub fn with_failure_kinds(mut self, kinds: impl IntoIterator<Item = ErrorKind>) -> Self {
        self.failure_kinds = kinds.into_iter().collect();
        self
    }

    /// Whether `err` counts toward opening the circuit.
    pub fn counts(&self, err: &Error) -> bool {
        let kind = err.kind();
        self.failure_kinds.iter().any(|k| kind.is_a(*k))
    }
}

#[derive(Debug)]
struct State {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure: Option<Instant>,
}

/// Three-state circuit breaker.
///
/// - Closed: counts failures of the configured kinds, opens at the threshold
/// - Open: refuses requests until `recovery_timeout` has passed since the last failure
/// - HalfOpen: lets requests through; closes after `success_threshold`
///   successes, re-opens on the first counted failure
///
/// The breaker only advises. Callers consult [`should_allow_request`](Self::should_allow_request)
/// and report outcomes.
#[derive(Debug)]
pub struct CircuitBreaker {
    cfg: CircuitBreakerConfig,
    state: Mutex<State>,
}

impl CircuitBreaker {
    pub fn new(cfg: CircuitBreakerConfig) -> Self {
        Self {
            cfg,
            state: Mutex::new(State {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                last_failure: None,
            }),
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.cfg
    }

    // Every critical section leaves `State` consistent, so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn transition(st: &mut State, to: CircuitState) {
        let from = st.state;
        if from == to {
            return;
        }
        st.state = to;
        match to {
            CircuitState::Closed | CircuitState::HalfOpen => {
                st.failure_count = 0;
                st.success_count = 0;
            }
            CircuitState::Open => {
                st.success_count = 0;
            }
        }
        info!(
            from = from.as_str(),
            to = to.as_str(),
            "Circuit breaker state transition: {} -> {}",
            from,
            to
        );
    }

    /// Whether a request may be attempted now. May move Open to HalfOpen.
    pub fn should_allow_request(&self) -> bool {
        let mut st = self.lock();
        match st.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = st
                    .last_failure
                    .map(|t| t.elapsed() >= self.cfg.recovery_timeout)
                    .unwrap_or(true);
                if elapsed {
                    Self::transition(&mut st, CircuitState::HalfOpen);
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut st = self.lock();
        match st.state {
            CircuitState::Closed => st.failure_count = 0,
            CircuitState::HalfOpen => {
                st.success_count = st.success_count.saturating_add(1);
                if st.success_count >= self.cfg.success_threshold {
                    Self::transition(&mut st, CircuitState::Closed);
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Record a failed attempt. Errors outside `failure_kinds` are ignored.
    pub fn record_failure(&self, err: &Error) {
        if !self.cfg.counts(err) {
            return;
        }
        let mut st = self.lock();
        st.failure_count = st.failure_count.saturating_add(1);
        st.last_failure = Some(Instant::now());
        match st.state {
            CircuitState::HalfOpen => Self::transition(&mut st, CircuitState::Open),
            CircuitState::Closed if st.failure_count >= self.cfg.failure_threshold => {
                Self::transition(&mut st, CircuitState::Open)
            }
            _ => {}
        }
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.lock().failure_count
    }

    pub fn success_count(&self) -> u32 {
        self.lock().success_count
    }

    /// Force the breaker back to Closed with zeroed counters.
    pub fn reset(&self) {
        let mut st = self.lock();
        Self::transition(&mut st, CircuitState::Closed);
        st.failure_count = 0;
        st.success_count = 0;
        st.last_failure = None;
    }

    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        let st = self.lock();
        let open_remaining_ms = match (st.state, st.last_failure) {
            (CircuitState::Open, Some(at)) => self
                .cfg
                .recovery_timeout
                .checked_sub(at.elapsed())
                .filter(|d| !d.is_zero())
                .map(|d| d.as_millis() as u64),
            _ => None,
        };
        CircuitBreakerSnapshot {
            state: st.state,
            failure_threshold: self.cfg.failure_threshold,
            success_threshold: self.cfg.success_threshold,
            failure_count: st.failure_count,
            success_count: st.success_count,
            open_remaining_ms,
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn conn_err() -> Error {
        Error::connection("connection refused")
    }

    fn fast_config() -> CircuitBreakerConfig {
        CircuitBreakerConfig::new()
            .with_failure_threshold(3)
            .with_recovery_timeout(Duration::from_millis(50))
            .with_success_threshold(2)
    }

    #[test]
    fn test_circuit_breaker_config_defaults() {
        let config = CircuitBreakerConfig::default();
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.recovery_timeout, Duration::from_secs(60));
        assert_eq!(config.success_threshold, 2);
        assert!(config.failure_kinds.contains(&ErrorKind::Connection));
    }

    #[test]
    fn test_circuit_breaker_initial_state() {
        let cb = CircuitBreaker::default();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.should_allow_request());

        let snapshot = cb.snapshot();
        assert_eq!(snapshot.failure_count, 0);
        assert!(snapshot.open_remaining_ms.is_none());
    }

    #[test]
    fn test_opens_at_threshold() {
        let cb = CircuitBreaker::new(fast_config());
        cb.record_failure(&conn_err());
        cb.record_failure(&conn_err());
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.failure_count(), 2);

        cb.record_failure(&conn_err());
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.should_allow_request());
        assert!(cb.snapshot().open_remaining_ms.is_some());
    }

    #[test]
    fn test_timeout_is_a_connection_failure() {
        let cb = CircuitBreaker::new(fast_config().with_failure_kinds([ErrorKind::Connection]));
        for _ in 0..3 {
            cb.record_failure(&Error::timeout("read timed out"));
        }
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn test_unconfigured_kinds_are_ignored() {
        let cb = CircuitBreaker::new(fast_config());
        for _ in 0..10 {
            cb.record_failure(&Error::api(404, "not found"));
            cb.record_failure(&Error::api(500, "boom"));
        }
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.failure_count(), 0);
    }

    #[test]
    fn test_success_resets_failures_when_closed() {
        let cb = CircuitBreaker::new(fast_config());
        cb.record_failure(&conn_err());
        cb.record_failure(&conn_err());
        cb.record_success();
        assert_eq!(cb.failure_count(), 0);

        cb.record_failure(&conn_err());
        cb.record_failure(&conn_err());
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_full_recovery_cycle() {
        let cb = CircuitBreaker::new(fast_config());
        for _ in 0..3 {
            cb.record_failure(&conn_err());
        }
        assert_eq!(cb.state(), CircuitState::Open);

        thread::sleep(Duration::from_millis(70));
        assert!(cb.should_allow_request());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert_eq!(cb.success_count(), 0);
        assert_eq!(cb.failure_count(), 0);

        cb.record_success();
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.failure_count(), 0);
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let cb = CircuitBreaker::new(fast_config());
        for _ in 0..3 {
            cb.record_failure(&conn_err());
        }
        thread::sleep(Duration::from_millis(70));
        assert!(cb.should_allow_request());

        cb.record_failure(&conn_err());
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.should_allow_request());
    }

    #[test]
    fn test_success_while_open_is_ignored() {
        let cb = CircuitBreaker::new(fast_config());
        for _ in 0..3 {
            cb.record_failure(&conn_err());
        }
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.success_count(), 0);
    }

    #[test]
    fn test_manual_reset() {
        let cb = CircuitBreaker::new(fast_config());
        for _ in 0..3 {
            cb.record_failure(&conn_err());
        }
        cb.reset();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.should_allow_request());
        assert_eq!(cb.failure_count(), 0);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(CircuitState::HalfOpen.to_string(), "half_open");
        assert_eq!(CircuitState::Open.as_str(), "open");
    }
}
