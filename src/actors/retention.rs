//! RetentionActor - deletes notifications past the retention window
//!
//! Runs one pass at startup and then once per cleanup interval (daily by
//! default). A failed pass is logged and retried on the next interval; it
//! never stops the actor.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::interval;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::clock::Clock;
use crate::storage::{MonitorStore, StorageResult};

use super::messages::{RetentionCommand, RetentionStats};

/// Cleanup interval - run retention cleanup daily
pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

pub struct RetentionActor {
    store: Arc<dyn MonitorStore>,
    clock: Arc<dyn Clock>,
    cleanup_interval: Duration,
    command_rx: mpsc::Receiver<RetentionCommand>,
    stats: RetentionStats,
}

impl RetentionActor {
    pub fn new(
        store: Arc<dyn MonitorStore>,
        clock: Arc<dyn Clock>,
        retention_days: u32,
        cleanup_interval: Duration,
        command_rx: mpsc::Receiver<RetentionCommand>,
    ) -> Self {
        Self {
            store,
            clock,
            cleanup_interval,
            command_rx,
            stats: RetentionStats {
                retention_days,
                ..Default::default()
            },
        }
    }

    #[instrument(skip(self), fields(retention_days = self.stats.retention_days))]
    pub async fn run(mut self) {
        debug!("starting retention actor");

        // first tick fires immediately, giving the startup pass
        let mut ticker = interval(self.cleanup_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.cleanup().await {
                        error!("failed to clean up old notifications: {e}");
                    }
                }

                cmd = self.command_rx.recv() => {
                    let Some(cmd) = cmd else {
                        warn!("command channel closed, shutting down");
                        break;
                    };

                    match cmd {
                        RetentionCommand::CleanupNow { respond_to } => {
                            let _ = respond_to.send(self.cleanup().await);
                        }
                        RetentionCommand::GetStats { respond_to } => {
                            let _ = respond_to.send(self.stats.clone());
                        }
                        RetentionCommand::Shutdown => {
                            debug!("received shutdown command");
                            break;
                        }
                    }
                }
            }
        }

        debug!("retention actor stopped");
    }

    async fn cleanup(&mut self) -> StorageResult<usize> {
        let cutoff = self.clock.now() - chrono::Duration::days(i64::from(self.stats.retention_days));
        debug!("running retention cleanup (deleting notifications before {cutoff})");

        let deleted = self.store.cleanup_old_notifications(cutoff).await?;

        self.stats.last_cleanup_time = Some(self.clock.now());
        self.stats.total_notifications_deleted += deleted as u64;

        if deleted > 0 {
            info!("retention cleanup complete: deleted {deleted} old notifications");
        } else {
            trace!("retention cleanup: no old notifications to delete");
        }

        Ok(deleted)
    }
}

/// Handle for controlling the RetentionActor
#[derive(Clone)]
pub struct RetentionHandle {
    sender: mpsc::Sender<RetentionCommand>,
}

impl RetentionHandle {
    pub fn spawn(store: Arc<dyn MonitorStore>, clock: Arc<dyn Clock>, retention_days: u32) -> Self {
        Self::spawn_with_interval(store, clock, retention_days, CLEANUP_INTERVAL)
    }

    pub fn spawn_with_interval(
        store: Arc<dyn MonitorStore>,
        clock: Arc<dyn Clock>,
        retention_days: u32,
        cleanup_interval: Duration,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(8);

        let actor = RetentionActor::new(store, clock, retention_days, cleanup_interval, cmd_rx);
        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    /// Run a cleanup pass and return how many notifications it deleted
    pub async fn cleanup_now(&self) -> anyhow::Result<usize> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RetentionCommand::CleanupNow { respond_to: tx })
            .await?;

        Ok(rx.await??)
    }

    pub async fn stats(&self) -> anyhow::Result<RetentionStats> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RetentionCommand::GetStats { respond_to: tx })
            .await?;

        Ok(rx.await?)
    }

    pub async fn shutdown(self) {
        let _ = self.sender.send(RetentionCommand::Shutdown).await;
    }
}
