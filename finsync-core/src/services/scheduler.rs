//! Background tasks driving automatic sync cycles
//!
//! Two tasks share one shutdown broadcast:
//! - the debounce task waits for local changes to go quiet, then runs an
//!   upload-first cycle
//! - the poll task checks the relay for newer data on a fixed interval
//!
//! Both are owned by a [`SchedulerHandle`]; stopping it signals shutdown and
//! waits for the tasks to exit. Disabling sync only signals.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::orchestrator::SyncOrchestrator;

/// Running background tasks
pub(crate) struct SchedulerHandle {
    shutdown_tx: broadcast::Sender<()>,
    tasks: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    pub(crate) fn spawn(orchestrator: Arc<SyncOrchestrator>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        let debounce = DebounceTask {
            changes: orchestrator.local().subscribe_changes(),
            shutdown_rx: shutdown_tx.subscribe(),
            orchestrator: Arc::clone(&orchestrator),
        };
        let poll = PollTask {
            shutdown_rx: shutdown_tx.subscribe(),
            orchestrator,
        };

        info!("Starting sync scheduler");
        Self {
            tasks: vec![
                tokio::spawn(async move { debounce.run().await }),
                tokio::spawn(async move { poll.run().await }),
            ],
            shutdown_tx,
        }
    }

    pub(crate) async fn stop(self) {
        let _ = self.shutdown_tx.send(());
        for task in self.tasks {
            if let Err(e) = task.await {
                debug!(error = %e, "Scheduler task ended abnormally");
            }
        }
        info!("Sync scheduler stopped");
    }

    /// Signal shutdown without waiting. A cycle in flight finishes on its
    /// own, then both tasks exit.
    pub(crate) fn signal_stop(self) {
        let _ = self.shutdown_tx.send(());
        info!("Sync scheduler stopping");
    }
}

/// Runs a cycle once local changes have been quiet for the debounce window
struct DebounceTask {
    orchestrator: Arc<SyncOrchestrator>,
    changes: watch::Receiver<u64>,
    shutdown_rx: broadcast::Receiver<()>,
}

impl DebounceTask {
    async fn run(mut self) {
        let debounce = self.orchestrator.timings().debounce;

        loop {
            tokio::select! {
                _ = self.shutdown_rx.recv() => break,
                changed = self.changes.changed() => {
                    if changed.is_err() {
                        debug!("Change feed closed, stopping debounce task");
                        break;
                    }
                }
            }

            // Every further change restarts the window
            loop {
                tokio::select! {
                    _ = self.shutdown_rx.recv() => return,
                    changed = self.changes.changed() => {
                        if changed.is_err() {
                            return;
                        }
                    }
                    _ = tokio::time::sleep(debounce) => break,
                }
            }

            debug!("Local changes settled");
            self.orchestrator.run_automatic_cycle().await;
        }
    }
}

/// Periodically pulls newer remote data
struct PollTask {
    orchestrator: Arc<SyncOrchestrator>,
    shutdown_rx: broadcast::Receiver<()>,
}

impl PollTask {
    async fn run(mut self) {
        let mut interval = tokio::time::interval(self.orchestrator.timings().poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately
        interval.tick().await;

        loop {
            tokio::select! {
                _ = self.shutdown_rx.recv() => break,
                _ = interval.tick() => {
                    self.orchestrator.poll_once().await;
                }
            }
        }
    }
}
