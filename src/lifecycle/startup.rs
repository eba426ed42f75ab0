//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the process-wide services once, from validated configuration
//! - Hand out breakers and retry executors wired to the shared degradation controller
//!
//! # Design Decisions
//! - Services are explicit values passed down, never module-level globals
//! - One degradation controller per process; every executor reports into it

use std::sync::Arc;

use crate::config::AppConfig;
use crate::resilience::{CircuitBreaker, DegradationController, Notifier, RetryExecutor, TracingNotifier};
use crate::storage::DurableStore;

/// Services shared by every call site.
#[derive(Clone)]
pub struct Services {
    config: Arc<AppConfig>,
    degradation: DegradationController,
    notifier: Arc<dyn Notifier>,
}

impl Services {
    pub fn start<S>(config: AppConfig, store: S) -> Self
    where
        S: DurableStore + 'static,
    {
        Self::start_with_notifier(config, store, TracingNotifier)
    }

    pub fn start_with_notifier<S, N>(config: AppConfig, store: S, notifier: N) -> Self
    where
        S: DurableStore + 'static,
        N: Notifier + 'static,
    {
        let degradation = DegradationController::new(config.degradation.clone(), store);
        tracing::info!(
            max_attempts = config.retry.max_attempts,
            breakers = config.breakers.len(),
            emergency_mode = degradation.is_emergency_mode(),
            "Resilience services started"
        );

        Self {
            config: Arc::new(config),
            degradation,
            notifier: Arc::new(notifier),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn degradation(&self) -> &DegradationController {
        &self.degradation
    }

    /// A breaker for the named call path, configured from `[breakers.<name>]`.
    pub fn breaker(&self, name: &str) -> CircuitBreaker {
        CircuitBreaker::new(name, self.config.breaker(name))
    }

    /// A fresh executor that notifies through the shared sink and reports exhaustion.
    pub fn retry_executor(&self) -> RetryExecutor {
        RetryExecutor::new(self.config.retry.clone())
            .with_notifier(self.notifier.clone())
            .with_degradation(self.degradation.clone())
    }
}
