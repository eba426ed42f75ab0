//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (attempts >= 1, multiplier >= 1, delays ordered)
//! - Validate every declared circuit breaker
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;

use crate::config::schema::{AppConfig, CircuitBreakerConfig, DegradationConfig, RetryConfig};

/// A single semantic problem, tagged with the offending field path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate the whole configuration tree.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    validate_retry(&config.retry, &mut errors);

    let mut names: Vec<&String> = config.breakers.keys().collect();
    names.sort();
    for name in names {
        validate_breaker(name, &config.breakers[name], &mut errors);
    }

    validate_degradation(&config.degradation, &mut errors);

    if config.storage.path.trim().is_empty() {
        errors.push(ValidationError::new("storage.path", "must not be empty"));
    }
    if config.probe.request_timeout_ms == 0 {
        errors.push(ValidationError::new("probe.request_timeout_ms", "must be > 0"));
    }
    if config.probe.interval_ms == 0 {
        errors.push(ValidationError::new("probe.interval_ms", "must be > 0"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_retry(retry: &RetryConfig, errors: &mut Vec<ValidationError>) {
    if retry.max_attempts == 0 {
        errors.push(ValidationError::new("retry.max_attempts", "must be >= 1"));
    }
    if !retry.backoff_multiplier.is_finite() || retry.backoff_multiplier < 1.0 {
        errors.push(ValidationError::new(
            "retry.backoff_multiplier",
            "must be a finite number >= 1",
        ));
    }
    if retry.max_delay_ms < retry.initial_delay_ms {
        errors.push(ValidationError::new(
            "retry.max_delay_ms",
            "must be >= retry.initial_delay_ms",
        ));
    }
}

fn validate_breaker(name: &str, breaker: &CircuitBreakerConfig, errors: &mut Vec<ValidationError>) {
    if breaker.failure_threshold == 0 {
        errors.push(ValidationError::new(
            format!("breakers.{}.failure_threshold", name),
            "must be >= 1",
        ));
    }
    if breaker.half_open_max_calls == 0 {
        errors.push(ValidationError::new(
            format!("breakers.{}.half_open_max_calls", name),
            "must be >= 1",
        ));
    }
}

fn validate_degradation(degradation: &DegradationConfig, errors: &mut Vec<ValidationError>) {
    if degradation.enable_polling && degradation.polling_interval_ms == 0 {
        errors.push(ValidationError::new(
            "degradation.polling_interval_ms",
            "must be > 0 when polling is enabled",
        ));
    }
}
