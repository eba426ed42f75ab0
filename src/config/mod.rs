//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → AppConfig (validated, immutable)
//!     → sections handed to the retry executor, breakers, degradation controller
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - Every section except circuit breakers has defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, load_or_default, parse_config, ConfigError};
pub use schema::AppConfig;
pub use schema::CircuitBreakerConfig;
pub use schema::DegradationConfig;
pub use schema::ObservabilityConfig;
pub use schema::ProbeConfig;
pub use schema::RetryConfig;
pub use schema::StorageConfig;
