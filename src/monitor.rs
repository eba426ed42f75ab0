//! Backend monitoring.
//!
//! # Data Flow
//! ```text
//! probe_once: breaker.call(retry.execute_with_cause(probe.check)) → ProbeOutcome
//! run:        probe_once → on_outcome → sleep(next_probe_delay) → ... until shutdown
//! ```
//!
//! While the degradation controller asks for polling, the loop slows down to
//! `degradation.polling_interval_ms` instead of `probe.interval_ms`.

use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast;

use crate::lifecycle::Services;
use crate::probe::HttpProbe;
use crate::resilience::{CircuitBreaker, DegradationStatus};

/// Result of one protected probe, as printed by the CLI.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeOutcome {
    pub url: String,
    pub ok: bool,
    pub status: Option<u16>,
    pub error: Option<String>,
    /// The breaker refused the call; the backend was not contacted.
    pub rejected: bool,
    pub attempts: u32,
    pub circuit: &'static str,
    pub degradation: DegradationStatus,
}

/// Probe once through `breaker` and a fresh retry executor.
pub async fn probe_once(services: &Services, breaker: &CircuitBreaker, probe: &HttpProbe) -> ProbeOutcome {
    let executor = services.retry_executor();
    let result = breaker.call(executor.execute_with_cause(|| probe.check())).await;

    let (ok, status, error, rejected) = match result {
        Ok(status) => (true, Some(status.as_u16()), None, false),
        Err(e) => (false, None, Some(e.to_string()), e.is_rejection()),
    };

    ProbeOutcome {
        url: probe.url().to_string(),
        ok,
        status,
        error,
        rejected,
        attempts: if rejected { 0 } else { executor.state().attempts },
        circuit: breaker.state().as_str(),
        degradation: services.degradation().status(),
    }
}

pub fn next_probe_delay(services: &Services) -> Duration {
    let degradation = services.degradation();
    if degradation.should_use_polling() {
        degradation.polling_interval()
    } else {
        services.config().probe.interval()
    }
}

/// Probe repeatedly until `stop` fires, handing each outcome to `on_outcome`.
pub async fn run<F>(
    services: &Services,
    breaker: &CircuitBreaker,
    probe: &HttpProbe,
    mut stop: broadcast::Receiver<()>,
    mut on_outcome: F,
) where
    F: FnMut(&ProbeOutcome),
{
    loop {
        let outcome = probe_once(services, breaker, probe).await;
        on_outcome(&outcome);

        let interval = next_probe_delay(services);
        tracing::debug!(interval_ms = interval.as_millis() as u64, "Next probe scheduled");

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = stop.recv() => {
                tracing::info!("Monitor stopping");
                break;
            }
        }
    }
}
