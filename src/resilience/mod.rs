//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to a fragile dependency:
//!     → circuit_breaker.rs (fail fast while the dependency is assumed down)
//!     → retries.rs (bounded attempts, backoff.rs delays between them)
//!     → on exhaustion: notify.rs (user notification)
//!                      degradation.rs (global error accumulator)
//! ```
//!
//! # Design Decisions
//! - Breaker and retry executor compose by wrapping; neither knows about the other
//! - Rejections are distinct from operation failures
//! - Degradation is advisory: it flips flags, it never raises errors

pub mod backoff;
pub mod circuit_breaker;
pub mod degradation;
pub mod notify;
pub mod report;
pub mod retries;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerError, CircuitBreakerSnapshot, CircuitState};
pub use degradation::{DegradationController, DegradationStatus};
pub use notify::{Notifier, RecordingNotifier, Severity, TracingNotifier};
pub use report::ErrorReport;
pub use retries::{RetryExecutor, RetryState};
