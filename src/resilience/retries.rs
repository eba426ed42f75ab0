//! Retry executor.
//!
//! # Responsibilities
//! - Run an operation up to `max_attempts` times
//! - Wait `min(initial_delay * multiplier^(n-1), max_delay)` after failed attempt `n`
//! - Expose attempt count, loading flag and last error to the caller
//! - Notify the user on recovery after retry and on exhaustion
//!
//! # Design Decisions
//! - The last real failure is returned unchanged; nothing is swallowed
//! - No per-attempt timeout and no cancellation of the delay
//! - One executor runs one operation at a time; concurrent reuse is the caller's problem

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::RetryConfig;
use crate::observability::metrics;
use crate::resilience::backoff::delay_for;
use crate::resilience::degradation::DegradationController;
use crate::resilience::notify::{Notifier, Severity, TracingNotifier};
use crate::resilience::report::ErrorReport;

/// Progress of the current (or most recent) execution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetryState {
    pub attempts: u32,
    pub is_loading: bool,
    pub last_error: Option<ErrorReport>,
}

pub struct RetryExecutor {
    config: RetryConfig,
    state: Mutex<RetryState>,
    notifier: Arc<dyn Notifier>,
    degradation: Option<DegradationController>,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            state: Mutex::new(RetryState::default()),
            notifier: Arc::new(TracingNotifier),
            degradation: None,
        }
    }

    pub fn with_notifier<N>(mut self, notifier: N) -> Self
    where
        N: Notifier + 'static,
    {
        self.notifier = Arc::new(notifier);
        self
    }

    /// Report exhausted failures to `controller`.
    pub fn with_degradation(mut self, controller: DegradationController) -> Self {
        self.degradation = Some(controller);
        self
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn state(&self) -> RetryState {
        self.lock().clone()
    }

    /// Back to initial state. An execution still in flight keeps running and
    /// will write its own progress again.
    pub fn reset(&self) {
        *self.lock() = RetryState::default();
    }

    fn lock(&self) -> MutexGuard<'_, RetryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run `operation` until it succeeds or attempts run out.
    pub async fn execute<T, E, F, Fut>(&self, operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        self.run(operation, ErrorReport::from_display::<E>).await
    }

    /// Like [`execute`](Self::execute), but failures keep their `source()`
    /// chain as the report's cause.
    pub async fn execute_with_cause<T, E, F, Fut>(&self, operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error,
    {
        self.run(operation, ErrorReport::from_error::<E>).await
    }

    async fn run<T, E, F, Fut>(&self, mut operation: F, describe: fn(&E) -> ErrorReport) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            {
                let mut state = self.lock();
                state.attempts = attempt;
                state.is_loading = true;
            }
            metrics::record_retry_attempt(attempt);

            let err = match operation().await {
                Ok(value) => {
                    {
                        let mut state = self.lock();
                        state.is_loading = false;
                        state.last_error = None;
                    }
                    if attempt > 1 {
                        tracing::info!(attempts = attempt, "Operation recovered after retry");
                        self.notifier.notify(
                            Severity::Success,
                            &format!("Operation succeeded after {} attempts", attempt),
                        );
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            let report = describe(&err);

            if attempt >= max_attempts {
                {
                    let mut state = self.lock();
                    state.is_loading = false;
                    state.last_error = Some(report.clone());
                }
                tracing::warn!(
                    attempts = attempt,
                    error = %report,
                    "Operation failed after exhausting retries"
                );
                metrics::record_retry_exhausted();
                self.notifier.notify(
                    Severity::Error,
                    &format!("Operation failed after {} attempts: {}", attempt, report),
                );
                if let Some(controller) = &self.degradation {
                    controller.report_error(report);
                }
                return Err(err);
            }

            self.lock().last_error = Some(report);

            let delay = delay_for(&self.config, attempt);
            tracing::debug!(
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Attempt failed, backing off"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

impl fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("config", &self.config)
            .field("state", &self.state())
            .field("reports_degradation", &self.degradation.is_some())
            .finish()
    }
}
