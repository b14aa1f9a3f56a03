//! RetentionActor - periodic pruning of probe history
//!
//! Runs once on startup and then every `cleanup_interval` (daily by default).
//! Only `service_checks` and `service_metrics` are pruned.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, instrument, trace};

use crate::storage::StorageBackend;
use crate::storage::error::StorageResult;

use super::messages::RetentionCommand;

/// Run retention cleanup daily
pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

pub struct RetentionActor {
    store: Arc<dyn StorageBackend>,
    retention_days: u32,
    cleanup_interval: Duration,
    command_rx: mpsc::Receiver<RetentionCommand>,
    total_deleted: u64,
}

impl RetentionActor {
    pub fn new(
        store: Arc<dyn StorageBackend>,
        retention_days: u32,
        cleanup_interval: Duration,
        command_rx: mpsc::Receiver<RetentionCommand>,
    ) -> Self {
        Self {
            store,
            retention_days,
            cleanup_interval,
            command_rx,
            total_deleted: 0,
        }
    }

    #[instrument(skip(self), fields(retention_days = self.retention_days))]
    pub async fn run(mut self) {
        debug!("starting retention actor");

        // The first tick fires immediately, which doubles as the startup cleanup
        let mut ticker = interval(self.cleanup_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    // Don't crash the actor; cleanup is retried on the next tick
                    if let Err(e) = self.run_cleanup().await {
                        error!("retention cleanup failed: {}", e);
                    }
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        RetentionCommand::CleanupNow { respond_to } => {
                            let _ = respond_to.send(self.run_cleanup().await);
                        }
                        RetentionCommand::Shutdown => {
                            debug!("received shutdown command");
                            break;
                        }
                    }
                }

                else => break,
            }
        }

        debug!("retention actor stopped");
    }

    async fn run_cleanup(&mut self) -> StorageResult<usize> {
        let cutoff = Utc::now() - chrono::Duration::days(self.retention_days as i64);
        trace!("deleting probe history before {cutoff}");

        let deleted = self.store.cleanup_history(cutoff).await?;
        self.total_deleted += deleted as u64;

        if deleted > 0 {
            info!(
                "retention cleanup deleted {} rows (total: {})",
                deleted, self.total_deleted
            );
        }
        Ok(deleted)
    }
}

/// Handle for controlling a RetentionActor
#[derive(Clone)]
pub struct RetentionHandle {
    sender: mpsc::Sender<RetentionCommand>,
}

impl RetentionHandle {
    pub fn spawn(store: Arc<dyn StorageBackend>, retention_days: u32, cleanup_interval: Duration) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        tokio::spawn(RetentionActor::new(store, retention_days, cleanup_interval, cmd_rx).run());
        Self { sender: cmd_tx }
    }

    pub async fn cleanup_now(&self) -> anyhow::Result<usize> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RetentionCommand::CleanupNow { respond_to: tx })
            .await?;
        Ok(rx.await??)
    }

    pub async fn shutdown(self) {
        let _ = self.sender.send(RetentionCommand::Shutdown).await;
    }
}
