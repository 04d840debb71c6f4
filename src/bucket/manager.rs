//! Frame Manager
//!
//! The manager is the single consumer of the frame bucket. It runs as a
//! background Tokio task that takes frames out one at a time, dispatches
//! them, and drops them once the handler returns.
//!
//! ## Loop
//!
//! ```text
//!        ┌──────────── frame ────────────┐
//!        ▼                               │
//!   ┌─────────┐   bucket empty    ┌─────────────┐
//!   │  Idle   │ ────────────────> │ Dispatching │
//!   └─────────┘ <──────────────── └─────────────┘
//!     wait for enqueue            dispatch, then drop
//!     (or idle_interval)
//! ```
//!
//! The manager sleeps on the bucket's wake-up rather than on a timer, so a
//! frame is picked up as soon as it is queued. `idle_interval` only bounds
//! how long it sleeps before looking at the bucket again anyway.
//!
//! A handler that panics loses its frame, nothing else: the panic is caught
//! and logged and the loop moves on to the next frame.

use crate::bucket::FrameBucket;
use crate::commands::{Dispatch, DispatchTable};
use crate::protocol::Frame;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace};

/// Configuration for the frame manager.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Longest the manager sleeps on an empty bucket before polling it again
    pub idle_interval: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            idle_interval: Duration::from_secs(1),
        }
    }
}

/// Counters kept by the manager.
#[derive(Debug, Default)]
pub struct ManagerStats {
    /// Frames a handler ran for
    pub handled: AtomicU64,
    /// Frames for recognized commands without a handler
    pub unimplemented: AtomicU64,
    /// Frames matching no command
    pub unknown: AtomicU64,
    /// Frames whose handler panicked
    pub failed: AtomicU64,
}

impl ManagerStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total frames taken out of the bucket.
    pub fn processed(&self) -> u64 {
        self.handled.load(Ordering::Relaxed)
            + self.unimplemented.load(Ordering::Relaxed)
            + self.unknown.load(Ordering::Relaxed)
            + self.failed.load(Ordering::Relaxed)
    }

    fn record(&self, outcome: Option<Dispatch>) {
        let counter = match outcome {
            Some(Dispatch::Handled(_)) => &self.handled,
            Some(Dispatch::Unimplemented(_)) => &self.unimplemented,
            Some(Dispatch::Unknown) => &self.unknown,
            None => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// A handle to the running frame manager.
///
/// Dropping the handle stops the manager.
#[derive(Debug)]
pub struct Manager {
    /// Sender to signal shutdown
    shutdown_tx: watch::Sender<bool>,
    stats: Arc<ManagerStats>,
    task: JoinHandle<()>,
}

impl Manager {
    /// Starts the manager on the given runtime.
    ///
    /// # Arguments
    ///
    /// * `runtime` - Runtime the manager task is spawned on
    /// * `bucket` - The bucket to consume
    /// * `table` - Dispatch table frames are routed through
    /// * `config` - Configuration for the manager
    pub fn start(
        runtime: &Handle,
        bucket: Arc<FrameBucket>,
        table: Arc<DispatchTable>,
        config: ManagerConfig,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let stats = Arc::new(ManagerStats::new());

        let task = runtime.spawn(manager_loop(
            bucket,
            table,
            config,
            Arc::clone(&stats),
            shutdown_rx,
        ));

        info!("Frame manager started");

        Self {
            shutdown_tx,
            stats,
            task,
        }
    }

    /// Signals the manager to stop. A frame being dispatched is finished
    /// first; frames still queued stay in the bucket.
    pub fn stop(&self) {
        if !*self.shutdown_tx.borrow() {
            let _ = self.shutdown_tx.send(true);
            info!("Frame manager stopped");
        }
    }

    /// Returns true once the manager task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn stats(&self) -> &Arc<ManagerStats> {
        &self.stats
    }
}

impl Drop for Manager {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Dispatches one frame, then drops it.
fn process(table: &DispatchTable, frame: Frame, stats: &ManagerStats) {
    let connection = frame.connection().id();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| table.dispatch(&frame))).ok();

    if outcome.is_none() {
        error!(
            connection = %connection,
            command = %frame.command(),
            "Frame handler panicked, frame dropped"
        );
    }

    stats.record(outcome);
    drop(frame);
}

/// The main manager loop.
async fn manager_loop(
    bucket: Arc<FrameBucket>,
    table: Arc<DispatchTable>,
    config: ManagerConfig,
    stats: Arc<ManagerStats>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        if *shutdown_rx.borrow() {
            debug!("Frame manager received shutdown signal");
            return;
        }

        if let Some(frame) = bucket.dequeue() {
            process(&table, frame, &stats);
            continue;
        }

        tokio::select! {
            _ = bucket.wait() => {
                trace!("Frame manager woken by enqueue");
            }
            _ = tokio::time::sleep(config.idle_interval) => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("Frame manager received shutdown signal");
                    return;
                }
            }
        }
    }
}
