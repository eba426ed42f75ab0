//! Breaker, retry executor and degradation controller working together.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use grc_resilience::config::{CircuitBreakerConfig, DegradationConfig, RetryConfig};
use grc_resilience::resilience::{
    CircuitBreaker, CircuitBreakerError, CircuitState, DegradationController, ErrorReport,
    RetryExecutor,
};
use grc_resilience::storage::MemoryStore;

fn retry(max_attempts: u32) -> RetryConfig {
    RetryConfig {
        max_attempts,
        initial_delay_ms: 100,
        backoff_multiplier: 2.0,
        max_delay_ms: 1000,
    }
}

fn breaker() -> CircuitBreaker {
    CircuitBreaker::new(
        "incidents",
        CircuitBreakerConfig {
            failure_threshold: 2,
            recovery_timeout_ms: 5000,
            monitoring_period_ms: 30_000,
            half_open_max_calls: 1,
        },
    )
}

#[tokio::test(start_paused = true)]
async fn test_breaker_counts_one_failure_per_exhausted_retry() {
    let cb = breaker();
    let calls = AtomicU32::new(0);

    for round in 1..=2 {
        let executor = RetryExecutor::new(retry(3));
        let result: Result<(), _> = cb
            .call(executor.execute(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ErrorReport::new("backend unavailable")) }
            }))
            .await;
        assert!(matches!(result, Err(CircuitBreakerError::Inner(_))));
        assert_eq!(cb.snapshot().failure_count, round);
    }

    assert_eq!(calls.load(Ordering::SeqCst), 6);
    assert_eq!(cb.state(), CircuitState::Open);
}

#[tokio::test(start_paused = true)]
async fn test_open_breaker_skips_retry_entirely() {
    let cb = breaker();
    for _ in 0..2 {
        let _ = cb.call(async { Err::<(), _>("down") }).await;
    }

    let executor = RetryExecutor::new(retry(3));
    let calls = AtomicU32::new(0);
    let result: Result<(), CircuitBreakerError<&str>> = cb
        .call(executor.execute(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        }))
        .await;

    assert!(matches!(result, Err(CircuitBreakerError::Open { .. })));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(executor.state().attempts, 0);
}

#[tokio::test(start_paused = true)]
async fn test_half_open_trial_gets_full_retry_budget() {
    let cb = breaker();
    for _ in 0..2 {
        let _ = cb.call(async { Err::<(), _>("down") }).await;
    }
    tokio::time::advance(Duration::from_millis(6000)).await;

    let executor = RetryExecutor::new(retry(3));
    let calls = AtomicU32::new(0);
    let result = cb
        .call(executor.execute(|| {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err("still warming up")
                } else {
                    Ok(n)
                }
            }
        }))
        .await;

    assert_eq!(result.unwrap(), 3);
    assert_eq!(cb.state(), CircuitState::Closed);
    assert_eq!(cb.snapshot().failure_count, 0);
}

#[tokio::test(start_paused = true)]
async fn test_unrelated_call_paths_trip_global_degradation() {
    let store = MemoryStore::new();
    let controller = DegradationController::new(DegradationConfig::default(), store);

    for path in ["documents", "incidents", "kri"] {
        let executor = RetryExecutor::new(retry(1)).with_degradation(controller.clone());
        let cb = CircuitBreaker::new(
            path,
            CircuitBreakerConfig {
                failure_threshold: 5,
                recovery_timeout_ms: 1000,
                monitoring_period_ms: 1000,
                half_open_max_calls: 1,
            },
        );
        let _ = cb
            .call(executor.execute(|| async move { Err::<(), _>(format!("{path} failed")) }))
            .await;
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    assert!(controller.is_emergency_mode());
    assert!(controller.fallback_active());

    tokio::time::sleep(Duration::from_millis(15_001)).await;
    assert!(!controller.is_emergency_mode());
}
