//! Background sync loop for the vault backend.
//!
//! One poller per backend instance drives periodic synchronization,
//! skipping any cycle that would race a just-completed local write,
//! and reports status transitions (only transitions — no flicker from
//! redundant signals) to an optional observer.

use std::env;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend::{BackendStatus, Syncer};
use crate::vault::VaultBackend;

/// Compiled default poll interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Environment variable overriding the poll interval, as a duration
/// string like `"30s"` or `"5m"`. Invalid or absent values fall back
/// to [`DEFAULT_POLL_INTERVAL`].
pub const POLL_INTERVAL_ENV: &str = "HOSTVAULT_POLL_INTERVAL";

/// A sync cycle is skipped when a local write happened within this
/// window, so the poller never clobbers a fresh write with stale data.
pub const WRITE_DEBOUNCE: Duration = Duration::from_secs(10);

/// Upper bound on a single sync pass; a hung external call must not
/// wedge the loop.
pub const SYNC_TIMEOUT: Duration = Duration::from_secs(5);

/// Callback invoked with the new status on every observed transition.
pub type StatusObserver = Arc<dyn Fn(BackendStatus) + Send + Sync>;

/// Parses a duration string: integer plus `ms`/`s`/`m`/`h` suffix, or
/// a bare integer meaning seconds.
#[must_use]
pub fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    let (number, unit) = match value.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) => value.split_at(idx),
        None => (value, "s"),
    };
    let count: u64 = number.parse().ok()?;
    match unit {
        "ms" => Some(Duration::from_millis(count)),
        "s" => Some(Duration::from_secs(count)),
        "m" => Some(Duration::from_secs(count.checked_mul(60)?)),
        "h" => Some(Duration::from_secs(count.checked_mul(3600)?)),
        _ => None,
    }
}

/// Resolves the poll interval from the environment, falling back to
/// the compiled default.
#[must_use]
pub fn poll_interval_from_env() -> Duration {
    match env::var(POLL_INTERVAL_ENV) {
        Ok(value) => parse_duration(&value).unwrap_or_else(|| {
            warn!(
                value,
                "invalid {POLL_INTERVAL_ENV}, using {}s default",
                DEFAULT_POLL_INTERVAL.as_secs()
            );
            DEFAULT_POLL_INTERVAL
        }),
        Err(_) => DEFAULT_POLL_INTERVAL,
    }
}

struct RunningLoop {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Periodic sync driver for one [`VaultBackend`] instance.
///
/// At most one loop runs per poller: starting again stops the old
/// loop first, and [`Poller::stop`] blocks until the loop has fully
/// exited, so a restart or shutdown never races an in-flight tick.
pub struct Poller {
    backend: Arc<VaultBackend>,
    interval: Duration,
    observer: Option<StatusObserver>,
    running: Option<RunningLoop>,
}

impl Poller {
    /// Creates a poller with the interval taken from the environment
    /// (or the compiled default).
    #[must_use]
    pub fn new(backend: Arc<VaultBackend>) -> Self {
        Self::with_interval(backend, poll_interval_from_env())
    }

    /// Creates a poller with an explicit interval.
    #[must_use]
    pub fn with_interval(backend: Arc<VaultBackend>, interval: Duration) -> Self {
        Self {
            backend,
            interval,
            observer: None,
            running: None,
        }
    }

    /// Registers the status observer. Replaces any previous one;
    /// applies from the next `start`.
    pub fn set_observer(&mut self, observer: impl Fn(BackendStatus) + Send + Sync + 'static) {
        self.observer = Some(Arc::new(observer));
    }

    /// Returns the configured interval.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns true if a loop is currently running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }

    /// Starts the background loop, stopping any previous one first.
    pub async fn start(&mut self) {
        self.stop().await;

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let backend = Arc::clone(&self.backend);
        let observer = self.observer.clone();
        let interval = self.interval;

        let handle = tokio::spawn(async move {
            info!(interval_ms = interval.as_millis() as u64, "poller started");
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = stop_rx.changed() => {
                        info!("poller stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        run_cycle(&backend, observer.as_ref()).await;
                    }
                }
            }
        });

        self.running = Some(RunningLoop { stop_tx, handle });
    }

    /// Stops the background loop and waits for it to exit.
    pub async fn stop(&mut self) {
        if let Some(running) = self.running.take() {
            let _ = running.stop_tx.send(true);
            if let Err(err) = running.handle.await {
                warn!(%err, "poller task ended abnormally");
            }
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        // Graceful shutdown goes through `stop`; dropping a running
        // poller can only abort the task.
        if let Some(running) = self.running.take() {
            running.handle.abort();
        }
    }
}

/// One poll cycle: debounce check, bounded sync, transition report.
async fn run_cycle(backend: &Arc<VaultBackend>, observer: Option<&StatusObserver>) {
    if let Some(elapsed) = backend.last_write_elapsed() {
        if elapsed < WRITE_DEBOUNCE {
            debug!(
                elapsed_ms = elapsed.as_millis() as u64,
                "skipping sync: local write within debounce window"
            );
            return;
        }
    }

    let before = backend.status();
    match tokio::time::timeout(SYNC_TIMEOUT, backend.sync()).await {
        // The sync classified its own outcome; the error itself is
        // already reflected in the status.
        Ok(_) => {}
        Err(_) => {
            debug!("sync timed out");
            backend.set_status(BackendStatus::Unavailable);
        }
    }

    let after = backend.status();
    if before != after {
        info!(from = before.as_str(), to = after.as_str(), "backend status changed");
        if let Some(observer) = observer {
            observer(after);
        }
    }
}
