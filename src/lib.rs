//! Client-side resilience core: retry executor, circuit breaker and
//! degradation controller for calls to an unreliable backend.

pub mod config;
pub mod lifecycle;
pub mod monitor;
pub mod observability;
pub mod probe;
pub mod resilience;
pub mod storage;

pub use config::schema::AppConfig;
pub use lifecycle::{Services, Shutdown};
pub use resilience::{
    CircuitBreaker, CircuitBreakerError, CircuitState, DegradationController, DegradationStatus,
    ErrorReport, RetryExecutor, RetryState,
};
