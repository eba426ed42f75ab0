//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! retry executor, circuit breakers, degradation controller produce:
//!     → logging.rs (structured log events at every state transition)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured key/value fields for machine parsing
//! - Metrics are cheap (atomic increments) and no-ops without a recorder

pub mod logging;
pub mod metrics;
