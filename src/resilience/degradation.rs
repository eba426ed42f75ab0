//! Degradation controller.
//!
//! # Responsibilities
//! - Accumulate failures reported from anywhere in the application
//! - Switch the whole application into emergency mode when they pile up
//! - Recover automatically after `3 × fallback_delay`
//! - Persist counters so a reload that follows a burst of errors starts degraded
//!
//! # Trip Rules
//! ```text
//! report_error:  count before this report >= 2  (the 3rd report trips)
//! startup:       stored count > 3 AND last error < 5 minutes ago
//! ```
//! The two thresholds disagree. Both are kept as-is.
//!
//! # Design Decisions
//! - Blunt and global: error sources are not distinguished
//! - Advisory only: storage problems are logged, never returned to reporters
//! - An explicit handle over an injected store; clones share one state

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::DegradationConfig;
use crate::observability::metrics;
use crate::resilience::report::ErrorReport;
use crate::storage::DurableStore;

pub const ERROR_COUNT_KEY: &str = "app_error_count";
pub const LAST_ERROR_TIME_KEY: &str = "app_last_error_time";

/// Prior reports needed before the next one trips emergency mode.
const REPORT_TRIP_PRIOR_COUNT: u64 = 2;
/// Stored count that must be exceeded at startup.
const STARTUP_TRIP_COUNT: u64 = 3;
const STARTUP_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Observable state of the controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DegradationStatus {
    pub error_count: u64,
    /// Milliseconds since the Unix epoch.
    pub last_error_time: Option<u64>,
    pub is_emergency_mode: bool,
    pub fallback_active: bool,
}

#[derive(Default)]
struct Flags {
    is_emergency_mode: bool,
    fallback_active: bool,
    /// Bumped on every entry into emergency mode; stale recovery timers compare against it.
    episode: u64,
    recovery: Option<JoinHandle<()>>,
}

struct Inner {
    config: DegradationConfig,
    store: Box<dyn DurableStore>,
    flags: Mutex<Flags>,
    status_tx: watch::Sender<DegradationStatus>,
}

#[derive(Clone)]
pub struct DegradationController {
    inner: Arc<Inner>,
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

impl DegradationController {
    /// Build a controller over `store`, entering emergency mode right away
    /// when the stored counters say the previous session was failing.
    ///
    /// Auto-recovery timers are spawned on the current tokio runtime; without
    /// one, emergency mode only ends through [`clear_emergency_mode`](Self::clear_emergency_mode).
    pub fn new<S>(config: DegradationConfig, store: S) -> Self
    where
        S: DurableStore + 'static,
    {
        let (status_tx, _) = watch::channel(DegradationStatus::default());
        let controller = Self {
            inner: Arc::new(Inner {
                config,
                store: Box::new(store),
                flags: Mutex::new(Flags::default()),
                status_tx,
            }),
        };

        let stored = controller.stored_counters();
        let now = now_millis();
        let recent = stored
            .last_error_time
            .map(|last| Duration::from_millis(now.saturating_sub(last)) < STARTUP_WINDOW)
            .unwrap_or(false);

        if stored.error_count > STARTUP_TRIP_COUNT && recent {
            tracing::warn!(
                error_count = stored.error_count,
                last_error_time = ?stored.last_error_time,
                "Recent failures from a previous session, starting in emergency mode"
            );
            let mut flags = controller.lock();
            controller.enter_emergency(&mut flags);
        }

        controller.publish();
        controller
    }

    pub fn config(&self) -> &DegradationConfig {
        &self.inner.config
    }

    fn lock(&self) -> MutexGuard<'_, Flags> {
        self.inner.flags.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn stored_counters(&self) -> DegradationStatus {
        let store = &self.inner.store;
        DegradationStatus {
            error_count: store
                .get(ERROR_COUNT_KEY)
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            last_error_time: store.get(LAST_ERROR_TIME_KEY).and_then(|v| v.parse().ok()),
            ..DegradationStatus::default()
        }
    }

    /// Record one failure. The third report in a row (without clearing) trips emergency mode.
    pub fn report_error(&self, report: impl Into<ErrorReport>) {
        let report = report.into();
        let mut flags = self.lock();

        let current = self.stored_counters().error_count;
        let count = current.saturating_add(1);
        let now = now_millis();

        let store = &self.inner.store;
        if let Err(e) = store.set(ERROR_COUNT_KEY, &count.to_string()) {
            tracing::warn!(error = %e, "Failed to persist error count");
        }
        if let Err(e) = store.set(LAST_ERROR_TIME_KEY, &now.to_string()) {
            tracing::warn!(error = %e, "Failed to persist last error time");
        }

        metrics::record_reported_error();
        tracing::warn!(
            error_count = count,
            message = %report.message,
            cause = ?report.cause,
            "Error reported"
        );

        if current >= REPORT_TRIP_PRIOR_COUNT {
            self.enter_emergency(&mut flags);
        }

        drop(flags);
        self.publish();
    }

    /// Leave emergency mode now and forget every stored error.
    pub fn clear_emergency_mode(&self) {
        let mut flags = self.lock();
        if let Some(timer) = flags.recovery.take() {
            timer.abort();
        }
        self.exit_emergency(&mut flags);
        drop(flags);

        tracing::info!("Emergency mode cleared");
        self.publish();
    }

    pub fn is_emergency_mode(&self) -> bool {
        self.lock().is_emergency_mode
    }

    pub fn fallback_active(&self) -> bool {
        self.lock().fallback_active
    }

    /// Consumers should fall back to polling: polling is enabled and the application is degraded.
    pub fn should_use_polling(&self) -> bool {
        self.inner.config.enable_polling && self.is_emergency_mode()
    }

    pub fn polling_interval(&self) -> Duration {
        self.inner.config.polling_interval()
    }

    pub fn status(&self) -> DegradationStatus {
        let flags = self.lock();
        DegradationStatus {
            is_emergency_mode: flags.is_emergency_mode,
            fallback_active: flags.fallback_active,
            ..self.stored_counters()
        }
    }

    /// Receive every status change.
    pub fn subscribe(&self) -> watch::Receiver<DegradationStatus> {
        self.inner.status_tx.subscribe()
    }

    fn publish(&self) {
        self.inner.status_tx.send_replace(self.status());
    }

    fn enter_emergency(&self, flags: &mut Flags) {
        flags.fallback_active = true;
        if flags.is_emergency_mode {
            return;
        }

        flags.is_emergency_mode = true;
        flags.episode += 1;
        metrics::record_emergency_mode(true);

        let delay = self.inner.config.recovery_delay();
        tracing::warn!(recovery_in_ms = delay.as_millis() as u64, "Entering emergency mode");

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let weak = Arc::downgrade(&self.inner);
                flags.recovery = Some(handle.spawn(recover_after(weak, flags.episode, delay)));
            }
            Err(_) => {
                tracing::warn!("No async runtime, emergency mode will not recover automatically");
            }
        }
    }

    fn exit_emergency(&self, flags: &mut Flags) {
        let was_emergency = flags.is_emergency_mode;
        flags.is_emergency_mode = false;
        flags.fallback_active = false;
        flags.recovery = None;

        for key in [ERROR_COUNT_KEY, LAST_ERROR_TIME_KEY] {
            if let Err(e) = self.inner.store.remove(key) {
                tracing::warn!(key, error = %e, "Failed to clear stored error counter");
            }
        }

        if was_emergency {
            metrics::record_emergency_mode(false);
        }
    }
}

async fn recover_after(inner: Weak<Inner>, episode: u64, delay: Duration) {
    tokio::time::sleep(delay).await;

    let Some(inner) = inner.upgrade() else {
        return;
    };
    let controller = DegradationController { inner };

    let mut flags = controller.lock();
    if flags.episode != episode || !flags.is_emergency_mode {
        return;
    }
    controller.exit_emergency(&mut flags);
    drop(flags);

    tracing::info!("Emergency mode auto-recovered");
    controller.publish();
}

impl fmt::Debug for DegradationController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DegradationController")
            .field("config", &self.inner.config)
            .field("status", &self.status())
            .finish()
    }
}
