//! Exponential backoff.

use std::time::Duration;

use crate::config::RetryConfig;

/// Delay to wait after failed attempt `attempt` (1-indexed) before the next one.
///
/// `min(initial * multiplier^(attempt - 1), max)`. No jitter is applied.
pub fn calculate_backoff(attempt: u32, initial: Duration, multiplier: f64, max: Duration) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
    let factor = multiplier.max(1.0).powi(exponent);
    let delay_ms = initial.as_millis() as f64 * factor;
    let max_ms = max.as_millis() as f64;

    if !delay_ms.is_finite() || delay_ms >= max_ms {
        return max;
    }
    Duration::from_millis(delay_ms.round() as u64)
}

/// [`calculate_backoff`] with the parameters of a [`RetryConfig`].
pub fn delay_for(config: &RetryConfig, attempt: u32) -> Duration {
    calculate_backoff(
        attempt,
        config.initial_delay(),
        config.backoff_multiplier,
        config.max_delay(),
    )
}
