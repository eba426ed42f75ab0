//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the
//! resilience core. All types derive Serde traits for deserialization from
//! config files.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Retry executor settings.
    pub retry: RetryConfig,

    /// Circuit breakers keyed by the call path they protect.
    pub breakers: HashMap<String, CircuitBreakerConfig>,

    /// Degradation controller settings.
    pub degradation: DegradationConfig,

    /// Durable storage for degradation counters.
    pub storage: StorageConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// HTTP probe settings used by the CLI.
    pub probe: ProbeConfig,
}

impl AppConfig {
    /// Breaker settings for `name`, falling back to [`CircuitBreakerConfig::fallback`].
    pub fn breaker(&self, name: &str) -> CircuitBreakerConfig {
        self.breakers
            .get(name)
            .cloned()
            .unwrap_or_else(CircuitBreakerConfig::fallback)
    }
}

/// Retry configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one.
    pub max_attempts: u32,

    /// Delay after the first failed attempt in milliseconds.
    pub initial_delay_ms: u64,

    /// Growth factor applied to the delay after every failed attempt.
    pub backoff_multiplier: f64,

    /// Upper bound for any single delay in milliseconds.
    pub max_delay_ms: u64,
}

impl RetryConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1000,
            backoff_multiplier: 2.0,
            max_delay_ms: 10_000,
        }
    }
}

/// Circuit breaker configuration.
///
/// Every field is required when a breaker is declared in a config file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures in Closed that open the circuit.
    pub failure_threshold: u32,

    /// How long the circuit stays Open before admitting a trial call, in milliseconds.
    pub recovery_timeout_ms: u64,

    /// Reserved for a sliding failure-rate window. Accepted and reported only.
    pub monitoring_period_ms: u64,

    /// Trial calls admitted while HalfOpen.
    pub half_open_max_calls: u32,
}

impl CircuitBreakerConfig {
    /// Settings used by the CLI when the config file declares no breaker
    /// for the probed call path.
    pub fn fallback() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_ms: 30_000,
            monitoring_period_ms: 60_000,
            half_open_max_calls: 1,
        }
    }

    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_millis(self.recovery_timeout_ms)
    }

    pub fn monitoring_period(&self) -> Duration {
        Duration::from_millis(self.monitoring_period_ms)
    }
}

/// Degradation controller configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct DegradationConfig {
    /// Base delay in milliseconds; emergency mode auto-recovers after three times this.
    pub fallback_delay_ms: u64,

    /// Allow consumers to switch to polling while in emergency mode.
    pub enable_polling: bool,

    /// Polling interval consumers should use while degraded, in milliseconds.
    pub polling_interval_ms: u64,
}

impl DegradationConfig {
    pub fn fallback_delay(&self) -> Duration {
        Duration::from_millis(self.fallback_delay_ms)
    }

    pub fn polling_interval(&self) -> Duration {
        Duration::from_millis(self.polling_interval_ms)
    }

    /// Time spent in emergency mode before automatic recovery.
    pub fn recovery_delay(&self) -> Duration {
        self.fallback_delay().saturating_mul(3)
    }
}

impl Default for DegradationConfig {
    fn default() -> Self {
        Self {
            fallback_delay_ms: 5000,
            enable_polling: true,
            polling_interval_ms: 30_000,
        }
    }
}

/// Durable storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// JSON file holding the degradation counters.
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: "grc-resilience-state.json".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// HTTP probe configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Per-request timeout in milliseconds.
    pub request_timeout_ms: u64,

    /// Interval between probes in `monitor` mode while healthy, in milliseconds.
    pub interval_ms: u64,
}

impl ProbeConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 5000,
            interval_ms: 10_000,
        }
    }
}
