//! Periodic auto-sync scheduler.
//!
//! Sweeps every auto-sync application on a fixed interval, starting
//! immediately, and also on demand through [`AutoSyncScheduler::trigger_sweep`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::error::SyncError;
use super::orchestrator::SyncEngine;

/// Counts from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

struct RunningLoop {
    shutdown: Arc<AtomicBool>,
    wake: Arc<Notify>,
    trigger_tx: broadcast::Sender<()>,
    handle: JoinHandle<()>,
}

/// Owns the background sweep task. `start` and `stop` are idempotent.
pub struct AutoSyncScheduler {
    engine: Arc<SyncEngine>,
    interval: Duration,
    running: Mutex<Option<RunningLoop>>,
}

impl AutoSyncScheduler {
    pub fn new(engine: Arc<SyncEngine>, interval: Duration) -> Self {
        Self {
            engine,
            interval,
            running: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.lock_running().is_some()
    }

    /// Starts the sweep loop on the current tokio runtime. The first sweep
    /// runs immediately. Calling `start` while running only logs.
    pub fn start(&self) {
        let mut running = self.lock_running();
        if running.is_some() {
            log::info!("Auto-sync scheduler already running");
            return;
        }

        let shutdown = Arc::new(AtomicBool::new(false));
        let wake = Arc::new(Notify::new());
        let (trigger_tx, trigger_rx) = broadcast::channel(16);

        let handle = tokio::spawn(sweep_loop(
            Arc::clone(&self.engine),
            self.interval,
            Arc::clone(&shutdown),
            Arc::clone(&wake),
            trigger_rx,
        ));

        log::info!(
            "Auto-sync scheduler started (interval {} ms)",
            self.interval.as_millis()
        );
        *running = Some(RunningLoop {
            shutdown,
            wake,
            trigger_tx,
            handle,
        });
    }

    /// Signals the loop to stop. A sweep already in progress finishes its
    /// current application first. Calling `stop` while stopped is a no-op.
    pub fn stop(&self) -> Option<JoinHandle<()>> {
        let running = self.lock_running().take()?;
        running.shutdown.store(true, Ordering::Release);
        running.wake.notify_one();
        log::info!("Auto-sync scheduler stopped");
        Some(running.handle)
    }

    /// Requests an out-of-schedule sweep. Returns false when not running.
    pub fn trigger_sweep(&self) -> bool {
        match self.lock_running().as_ref() {
            Some(running) => running.trigger_tx.send(()).is_ok(),
            None => false,
        }
    }

    fn lock_running(&self) -> std::sync::MutexGuard<'_, Option<RunningLoop>> {
        self.running.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for AutoSyncScheduler {
    fn drop(&mut self) {
        if let Some(running) = self.lock_running().take() {
            running.shutdown.store(true, Ordering::Release);
            running.wake.notify_one();
        }
    }
}

async fn sweep_loop(
    engine: Arc<SyncEngine>,
    interval: Duration,
    shutdown: Arc<AtomicBool>,
    wake: Arc<Notify>,
    mut trigger_rx: broadcast::Receiver<()>,
) {
    let mut interval_timer = tokio::time::interval(interval);
    interval_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval_timer.tick() => {},
            Ok(()) = trigger_rx.recv() => {
                log::info!("Manual auto-sync sweep triggered");
            },
            _ = wake.notified() => {},
        }

        if shutdown.load(Ordering::Acquire) {
            break;
        }

        run_sweep(&engine, &shutdown).await;
    }
}

/// Syncs every auto-sync application once, sequentially.
///
/// A failing application does not stop the sweep. If the application list
/// cannot be read the sweep is skipped.
pub async fn sweep(engine: &SyncEngine) -> SweepSummary {
    run_sweep(engine, &AtomicBool::new(false)).await
}

async fn run_sweep(engine: &SyncEngine, shutdown: &AtomicBool) -> SweepSummary {
    let apps = match engine.registry().list_auto_sync_enabled() {
        Ok(apps) => apps,
        Err(e) => {
            log::error!("Auto-sync sweep skipped: failed to list applications: {}", e);
            return SweepSummary::default();
        }
    };

    let mut summary = SweepSummary::default();
    for app in apps {
        if shutdown.load(Ordering::Acquire) {
            break;
        }
        summary.attempted += 1;
        match engine.run(&app).await {
            Ok(result) => {
                if result.failed_count() == 0 {
                    summary.succeeded += 1;
                } else {
                    summary.failed += 1;
                }
            }
            Err(SyncError::InProgress(_)) => {
                summary.failed += 1;
            }
            Err(e) => {
                log::error!("Auto-sync of app {} failed: {}", app.id, e);
                summary.failed += 1;
            }
        }
    }

    log::info!(
        "Auto-sync sweep complete: {} attempted, {} succeeded, {} failed",
        summary.attempted,
        summary.succeeded,
        summary.failed
    );
    summary
}
