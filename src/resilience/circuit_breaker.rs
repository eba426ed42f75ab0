//! Circuit breaker for a fragile call path.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: dependency assumed down, calls fail fast
//! - Half-Open: a limited number of trial calls probe for recovery
//!
//! # State Transitions
//! ```text
//! Closed → Open: failure_count >= failure_threshold
//! Open → Half-Open: first call at or after next_attempt_time
//! Half-Open → Closed: a trial call succeeds
//! Half-Open → Open: a trial call fails (next_attempt_time recomputed)
//! ```
//!
//! # Design Decisions
//! - One breaker per protected dependency, not global
//! - The breaker never retries; wrap a retry executor inside it instead
//! - State lives behind a mutex that is never held across an await, so every
//!   read-transition-update step completes between suspension points

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::time::Instant;

use crate::config::CircuitBreakerConfig;
use crate::observability::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a call was refused without running the operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rejection {
    Open,
    CallLimit,
}

#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    /// Circuit is open; the operation was not invoked.
    #[error("Circuit breaker is OPEN")]
    Open { name: String },
    /// Half-open trial budget is used up; the operation was not invoked.
    #[error("Circuit breaker HALF_OPEN call limit exceeded")]
    CallLimitExceeded { name: String },
    /// The operation ran and failed.
    #[error("Operation failed: {0}")]
    Inner(#[source] E),
}

impl<E> CircuitBreakerError<E> {
    /// True when the breaker refused the call rather than the operation failing.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, CircuitBreakerError::Inner(_))
    }

    pub fn into_inner(self) -> Option<E> {
        match self {
            CircuitBreakerError::Inner(e) => Some(e),
            _ => None,
        }
    }
}

/// Point-in-time copy of a breaker's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerSnapshot {
    pub state: CircuitState,
    pub failure_count: u32,
    pub last_failure_time: Option<Instant>,
    pub next_attempt_time: Option<Instant>,
    pub half_open_calls: u32,
}

impl CircuitBreakerSnapshot {
    fn initial() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            last_failure_time: None,
            next_attempt_time: None,
            half_open_calls: 0,
        }
    }
}

/// Cloning shares the underlying state.
#[derive(Clone)]
pub struct CircuitBreaker {
    name: Arc<str>,
    config: CircuitBreakerConfig,
    inner: Arc<Mutex<CircuitBreakerSnapshot>>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let name: String = name.into();
        Self {
            name: Arc::from(name),
            config,
            inner: Arc::new(Mutex::new(CircuitBreakerSnapshot::initial())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        *self.lock()
    }

    fn lock(&self) -> MutexGuard<'_, CircuitBreakerSnapshot> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run `f` under the breaker.
    ///
    /// `f` is only polled when the call is admitted, so a rejected call never
    /// reaches the dependency.
    pub async fn call<F, T, E>(&self, f: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: Future<Output = Result<T, E>>,
    {
        if let Err(rejection) = self.admit() {
            return Err(match rejection {
                Rejection::Open => CircuitBreakerError::Open {
                    name: self.name.to_string(),
                },
                Rejection::CallLimit => CircuitBreakerError::CallLimitExceeded {
                    name: self.name.to_string(),
                },
            });
        }

        match f.await {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(err) => {
                self.on_failure();
                Err(CircuitBreakerError::Inner(err))
            }
        }
    }

    fn admit(&self) -> Result<(), Rejection> {
        let now = Instant::now();
        let mut inner = self.lock();

        if inner.state == CircuitState::Open {
            match inner.next_attempt_time {
                Some(next) if now < next => {
                    metrics::record_circuit_rejection(&self.name, "open");
                    return Err(Rejection::Open);
                }
                _ => {
                    self.transition(&mut inner, CircuitState::HalfOpen);
                    inner.half_open_calls = 0;
                }
            }
        }

        if inner.state == CircuitState::HalfOpen {
            if inner.half_open_calls >= self.config.half_open_max_calls {
                tracing::debug!(
                    circuit_breaker = %self.name,
                    half_open_calls = inner.half_open_calls,
                    "Rejecting call over the half-open trial limit"
                );
                metrics::record_circuit_rejection(&self.name, "half_open_limit");
                return Err(Rejection::CallLimit);
            }
            inner.half_open_calls += 1;
        }

        Ok(())
    }

    fn on_success(&self) {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => inner.failure_count = 0,
            CircuitState::HalfOpen => {
                inner.failure_count = 0;
                self.transition(&mut inner, CircuitState::Closed);
            }
            // A call admitted before the breaker opened; the open decision stands.
            CircuitState::Open => {}
        }
    }

    fn on_failure(&self) {
        let now = Instant::now();
        let mut inner = self.lock();
        inner.failure_count = inner.failure_count.saturating_add(1);
        inner.last_failure_time = Some(now);

        if inner.state == CircuitState::HalfOpen || inner.failure_count >= self.config.failure_threshold {
            inner.next_attempt_time = Some(now + self.config.recovery_timeout());
            if inner.state != CircuitState::Open {
                tracing::warn!(
                    circuit_breaker = %self.name,
                    failure_count = inner.failure_count,
                    failure_threshold = self.config.failure_threshold,
                    recovery_timeout_ms = self.config.recovery_timeout_ms,
                    "Circuit breaker opened"
                );
                self.transition(&mut inner, CircuitState::Open);
            }
        }
    }

    fn transition(&self, inner: &mut CircuitBreakerSnapshot, to: CircuitState) {
        let from = inner.state;
        if from == to {
            return;
        }
        inner.state = to;
        tracing::info!(
            circuit_breaker = %self.name,
            from = from.as_str(),
            to = to.as_str(),
            "Circuit breaker state change"
        );
        metrics::record_circuit_transition(&self.name, from.as_str(), to.as_str());
    }

    /// Force the breaker back to Closed with zeroed counters.
    pub fn reset(&self) {
        let mut inner = self.lock();
        self.transition(&mut inner, CircuitState::Closed);
        *inner = CircuitBreakerSnapshot::initial();
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("snapshot", &self.snapshot())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::sync::oneshot;
    use tokio::time::advance;

    #[derive(Debug, PartialEq)]
    struct TestError;

    impl fmt::Display for TestError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "test error")
        }
    }

    impl std::error::Error for TestError {}

    fn breaker(failure_threshold: u32, recovery_timeout_ms: u64, half_open_max_calls: u32) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            CircuitBreakerConfig {
                failure_threshold,
                recovery_timeout_ms,
                monitoring_period_ms: 60_000,
                half_open_max_calls,
            },
        )
    }

    async fn fail(cb: &CircuitBreaker) -> Result<(), CircuitBreakerError<TestError>> {
        cb.call(async { Err::<(), _>(TestError) }).await
    }

    async fn succeed(cb: &CircuitBreaker) -> Result<u32, CircuitBreakerError<TestError>> {
        cb.call(async { Ok::<u32, TestError>(42) }).await
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_state_is_closed() {
        let cb = breaker(3, 1000, 1);
        assert_eq!(cb.snapshot(), CircuitBreakerSnapshot::initial());
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_to_open_after_threshold() {
        let cb = breaker(3, 1000, 1);

        for _ in 0..2 {
            assert!(matches!(fail(&cb).await, Err(CircuitBreakerError::Inner(TestError))));
        }
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.snapshot().failure_count, 2);

        let _ = fail(&cb).await;
        let snapshot = cb.snapshot();
        assert_eq!(snapshot.state, CircuitState::Open);
        assert_eq!(snapshot.next_attempt_time, Some(Instant::now() + Duration::from_millis(1000)));
        assert_eq!(snapshot.last_failure_time, Some(Instant::now()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_failure_count_while_closed() {
        let cb = breaker(3, 1000, 1);

        let _ = fail(&cb).await;
        let _ = fail(&cb).await;
        assert_eq!(succeed(&cb).await.unwrap(), 42);
        assert_eq!(cb.snapshot().failure_count, 0);

        let _ = fail(&cb).await;
        let _ = fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_rejects_without_invoking() {
        let cb = breaker(2, 5000, 1);
        let _ = fail(&cb).await;
        let _ = fail(&cb).await;

        let invoked = AtomicU32::new(0);
        let result = cb
            .call(async {
                invoked.fetch_add(1, Ordering::SeqCst);
                Ok::<_, TestError>(())
            })
            .await;

        let err = result.unwrap_err();
        assert!(err.is_rejection());
        assert_eq!(err.to_string(), "Circuit breaker is OPEN");
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
        assert_eq!(cb.snapshot().failure_count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovery_timeline_scenario() {
        let cb = breaker(2, 5000, 1);
        let _ = fail(&cb).await;
        let _ = fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Open);

        advance(Duration::from_millis(1000)).await;
        let err = succeed(&cb).await.unwrap_err();
        assert!(matches!(err, CircuitBreakerError::Open { .. }));

        advance(Duration::from_millis(5000)).await;
        let invoked = AtomicU32::new(0);
        let result = cb
            .call(async {
                invoked.fetch_add(1, Ordering::SeqCst);
                Ok::<_, TestError>("probe")
            })
            .await;
        assert_eq!(result.unwrap(), "probe");
        assert_eq!(invoked.load(Ordering::SeqCst), 1);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens_with_new_deadline() {
        let cb = breaker(1, 1000, 1);
        let _ = fail(&cb).await;
        let first_deadline = cb.snapshot().next_attempt_time.unwrap();

        advance(Duration::from_millis(1500)).await;
        assert!(matches!(fail(&cb).await, Err(CircuitBreakerError::Inner(TestError))));

        let snapshot = cb.snapshot();
        assert_eq!(snapshot.state, CircuitState::Open);
        assert_eq!(snapshot.next_attempt_time, Some(Instant::now() + Duration::from_millis(1000)));
        assert!(snapshot.next_attempt_time.unwrap() > first_deadline);
        assert!(matches!(succeed(&cb).await, Err(CircuitBreakerError::Open { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_success_closes_and_resets() {
        let cb = breaker(2, 1000, 1);
        let _ = fail(&cb).await;
        let _ = fail(&cb).await;

        advance(Duration::from_millis(1000)).await;
        assert_eq!(succeed(&cb).await.unwrap(), 42);

        let snapshot = cb.snapshot();
        assert_eq!(snapshot.state, CircuitState::Closed);
        assert_eq!(snapshot.failure_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_call_limit() {
        let cb = breaker(1, 1000, 2);
        let _ = fail(&cb).await;
        advance(Duration::from_millis(1000)).await;

        let mut releases = Vec::new();
        let mut trials = Vec::new();
        for _ in 0..2 {
            let (tx, rx) = oneshot::channel::<()>();
            releases.push(tx);
            let trial_cb = cb.clone();
            trials.push(tokio::spawn(async move {
                trial_cb.call(async move { rx.await.map_err(|_| TestError) }).await
            }));
        }

        for _ in 0..100 {
            if cb.snapshot().half_open_calls == 2 {
                break;
            }
            tokio::task::yield_now().await;
        }
        let before = cb.snapshot();
        assert_eq!(before.state, CircuitState::HalfOpen);
        assert_eq!(before.half_open_calls, 2);

        let invoked = AtomicU32::new(0);
        let err = cb
            .call(async {
                invoked.fetch_add(1, Ordering::SeqCst);
                Ok::<_, TestError>(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CircuitBreakerError::CallLimitExceeded { .. }));
        assert_eq!(err.to_string(), "Circuit breaker HALF_OPEN call limit exceeded");
        assert_eq!(invoked.load(Ordering::SeqCst), 0);

        let after = cb.snapshot();
        assert_eq!(after.failure_count, before.failure_count);
        assert_eq!(after.state, CircuitState::HalfOpen);

        for tx in releases {
            let _ = tx.send(());
        }
        for trial in trials {
            assert!(trial.await.unwrap().is_ok());
        }
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_success_does_not_reset_open_breaker() {
        let cb = breaker(2, 1000, 1);

        let (release, rx) = oneshot::channel::<()>();
        let slow_cb = cb.clone();
        let slow = tokio::spawn(async move { slow_cb.call(async move { rx.await.map_err(|_| TestError) }).await });
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        let _ = fail(&cb).await;
        let _ = fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Open);

        let _ = release.send(());
        assert!(slow.await.unwrap().is_ok());

        let snapshot = cb.snapshot();
        assert_eq!(snapshot.state, CircuitState::Open);
        assert_eq!(snapshot.failure_count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reentering_half_open_resets_trial_count() {
        let cb = breaker(1, 1000, 1);
        let _ = fail(&cb).await;

        advance(Duration::from_millis(1000)).await;
        let _ = fail(&cb).await;
        assert_eq!(cb.snapshot().half_open_calls, 1);

        advance(Duration::from_millis(1000)).await;
        assert!(succeed(&cb).await.is_ok());
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_is_a_copy() {
        let cb = breaker(1, 1000, 1);
        let mut snapshot = cb.snapshot();
        snapshot.failure_count = 99;
        snapshot.state = CircuitState::Open;
        assert_eq!(cb.snapshot(), CircuitBreakerSnapshot::initial());
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_reset() {
        let cb = breaker(1, 60_000, 1);
        let _ = fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Open);

        cb.reset();
        assert_eq!(cb.snapshot(), CircuitBreakerSnapshot::initial());
        assert!(succeed(&cb).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clones_share_state() {
        let cb = breaker(1, 1000, 1);
        let other = cb.clone();
        let _ = fail(&other).await;
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn test_inner_error_keeps_source() {
        let err: CircuitBreakerError<TestError> = CircuitBreakerError::Inner(TestError);
        assert!(std::error::Error::source(&err).is_some());
        assert_eq!(err.into_inner(), Some(TestError));
    }
}
