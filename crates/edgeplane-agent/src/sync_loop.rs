//! # Sync Loop Runtime
//!
//! Drives one [`SyncAction`] on a fixed cadence until shutdown.
//!
//! ## Cycle Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Sync Loop Cycle                                │
//! │                                                                         │
//! │   ┌──────────┐    ┌─────────────┐    ┌──────────────┐                  │
//! │   │  tick()  │───►│ run_cycle() │───►│ record result│──┐               │
//! │   └──────────┘    └─────────────┘    └──────────────┘  │               │
//! │        ▲            Ok  → last_success, reset streak   │               │
//! │        │            Err → log, count, skip             │               │
//! │        │            panic → CyclePanicked, skip        │               │
//! │        └───────────────────────────────────────────────┘               │
//! │                                                                         │
//! │  • First tick fires immediately                                        │
//! │  • Cycles never overlap: a slow cycle delays the next tick             │
//! │  • A failing cycle never ends the loop                                 │
//! │  • Shutdown interrupts both the wait and an in-flight cycle            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::error::{AgentError, AgentResult};

/// One unit of periodic work.
#[async_trait]
pub trait SyncAction: Send + Sync + 'static {
    /// Short name used in logs and status.
    fn name(&self) -> &'static str;

    /// Executes a single cycle.
    async fn run_cycle(&self) -> AgentResult<()>;
}

// =============================================================================
// Shutdown Signal
// =============================================================================

/// Cancellation observed by every loop's wait step.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

/// Fires a [`ShutdownSignal`].
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

/// Creates a linked trigger and signal.
pub fn shutdown_channel() -> (ShutdownTrigger, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, ShutdownSignal { rx })
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

impl ShutdownSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_, signal) = shutdown_channel();
        signal
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown is triggered. Pends forever if the trigger
    /// is dropped without firing.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

// =============================================================================
// Loop Status
// =============================================================================

/// Counters published after every cycle.
#[derive(Debug, Clone, Default)]
pub struct LoopStatus {
    /// Completed cycles, successful or not.
    pub cycles: u64,
    /// Failed cycles.
    pub failures: u64,
    /// Failures since the last success.
    pub consecutive_failures: u64,
    /// Message of the most recent failure, cleared on success.
    pub last_error: Option<String>,
    /// When the most recent successful cycle finished.
    pub last_success: Option<DateTime<Utc>>,
}

// =============================================================================
// Sync Loop
// =============================================================================

/// Handle to a spawned loop.
pub struct SyncLoopHandle {
    name: &'static str,
    status: watch::Receiver<LoopStatus>,
    task: JoinHandle<()>,
}

impl SyncLoopHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the latest status snapshot.
    pub fn status(&self) -> LoopStatus {
        self.status.borrow().clone()
    }

    /// Subscribes to status updates.
    pub fn subscribe(&self) -> watch::Receiver<LoopStatus> {
        self.status.clone()
    }

    /// Waits for the loop task to finish.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            error!(sync_loop = self.name, ?e, "Sync loop task failed");
        }
    }
}

/// Periodic driver for one action.
pub struct SyncLoop {
    action: Arc<dyn SyncAction>,
    period: Duration,
    shutdown: ShutdownSignal,
    status: watch::Sender<LoopStatus>,
}

impl SyncLoop {
    /// Spawns the loop on the current runtime.
    pub fn spawn(action: Arc<dyn SyncAction>, period: Duration, shutdown: ShutdownSignal) -> SyncLoopHandle {
        let name = action.name();
        let (status, status_rx) = watch::channel(LoopStatus::default());

        let sync_loop = SyncLoop {
            action,
            period,
            shutdown,
            status,
        };

        SyncLoopHandle {
            name,
            status: status_rx,
            task: tokio::spawn(sync_loop.run()),
        }
    }

    async fn run(mut self) {
        let name = self.action.name();
        info!(sync_loop = name, period = ?self.period, "Sync loop starting");

        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let outcome = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                outcome = AssertUnwindSafe(self.action.run_cycle()).catch_unwind() => outcome,
            };

            let result = outcome.unwrap_or(Err(AgentError::CyclePanicked { sync_loop: name }));
            self.record(result);
        }

        info!(sync_loop = name, "Sync loop stopped");
    }

    fn record(&self, result: AgentResult<()>) {
        let name = self.action.name();

        self.status.send_modify(|status| {
            status.cycles += 1;
            match result {
                Ok(()) => {
                    if status.consecutive_failures > 0 {
                        info!(
                            sync_loop = name,
                            failures = status.consecutive_failures,
                            "Sync loop recovered"
                        );
                    }
                    status.consecutive_failures = 0;
                    status.last_error = None;
                    status.last_success = Some(Utc::now());
                }
                Err(e) => {
                    status.failures += 1;
                    status.consecutive_failures += 1;

                    warn!(
                        sync_loop = name,
                        error = %e,
                        consecutive = status.consecutive_failures,
                        retryable = e.is_retryable(),
                        "Sync cycle failed, skipping"
                    );
                    status.last_error = Some(e.to_string());
                }
            }
        });
    }
}
