//! Background sweep of expired entries.
//!
//! [`TieredCache::start_sweeper`] spawns a task that calls
//! [`TieredCache::clear_expired`] every `sweep_interval`. The first sweep
//! runs one interval after start. The task stops when its
//! [`SweeperHandle`] is stopped or dropped.
//!
//! ```ignore
//! let sweeper = cache.start_sweeper();
//! // ...
//! let snapshot = sweeper.stop().await;
//! tracing::info!(removed = snapshot.entries_removed, "Sweeper stopped");
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::tiered::TieredCache;

/// Counters for sweep activity.
#[derive(Debug, Default)]
pub struct SweepMetrics {
    /// Sweep cycles completed
    pub cycles: AtomicU64,
    /// Memory entries removed across all cycles
    pub entries_removed: AtomicU64,
}

impl SweepMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> SweepSnapshot {
        SweepSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            entries_removed: self.entries_removed.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of sweep metrics at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSnapshot {
    pub cycles: u64,
    pub entries_removed: u64,
}

/// Owner of a running sweep task.
///
/// Dropping the handle signals the task to stop without waiting for it.
#[derive(Debug)]
pub struct SweeperHandle {
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
    metrics: Arc<SweepMetrics>,
}

impl SweeperHandle {
    /// Current sweep counters.
    pub fn metrics(&self) -> SweepSnapshot {
        self.metrics.snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Signal the task to stop and wait for it to exit.
    ///
    /// A sweep already in progress runs to completion first.
    pub async fn stop(mut self) -> SweepSnapshot {
        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Cache sweeper task ended abnormally");
            }
        }
        self.metrics.snapshot()
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl TieredCache {
    /// Spawn a periodic sweep of expired entries on the current runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn start_sweeper(&self) -> SweeperHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let metrics = Arc::new(SweepMetrics::new());
        let task = tokio::spawn(sweep_task(self.clone(), Arc::clone(&metrics), shutdown_rx));

        SweeperHandle {
            shutdown_tx,
            task: Some(task),
            metrics,
        }
    }
}

async fn sweep_task(
    cache: TieredCache,
    metrics: Arc<SweepMetrics>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let period = cache.config().sweep_interval;
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        namespace = %cache.config().namespace,
        interval_secs = period.as_secs(),
        "Cache sweeper started"
    );

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }

            _ = ticker.tick() => {
                let removed = cache.clear_expired().await;
                metrics.cycles.fetch_add(1, Ordering::Relaxed);
                metrics
                    .entries_removed
                    .fetch_add(removed as u64, Ordering::Relaxed);
                if removed == 0 {
                    tracing::trace!("Cache sweep found no expired entries");
                }
            }
        }
    }

    let snapshot = metrics.snapshot();
    tracing::info!(
        cycles = snapshot.cycles,
        entries_removed = snapshot.entries_removed,
        "Cache sweeper stopped"
    );
}
