//! SchedulerActor - decides when each monitor is checked
//!
//! Owns the due-set (one entry per active monitor) and the set of monitors
//! with a check in flight. Checks themselves run on spawned worker tasks,
//! bounded by a semaphore, so a slow site never stalls the actor loop.
//!
//! ## Message Flow
//!
//! ```text
//! Timer tick ─┐
//! Tick cmd ───┴→ due monitors (oldest first) → permit? → spawn CheckRunner::run
//!                                                              │
//!      due-set / running set  ←──────── CheckFinished ─────────┘
//!          ↑
//!          └─── Commands (Register, Unregister, RunNow, ListDue, Status, Shutdown)
//! ```
//!
//! ## Guarantees
//!
//! - At most one check per monitor is in flight at any time
//! - At most `max_concurrent_checks` checks run at once
//! - Inactive or deleted monitors are never started by a tick

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot, OwnedSemaphorePermit, Semaphore};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, instrument, trace, warn};

use crate::clock::Clock;
use crate::config::SchedulerConfig;
use crate::error::{MonitorError, MonitorResult};
use crate::identity::{Caller, OwnerId};
use crate::monitor::{is_due, Monitor, MonitorId};
use crate::storage::MonitorStore;

use super::check::CheckRunner;
use super::messages::{
    CheckFinished, CheckOutcome, CheckReport, DueMonitor, SchedulerCommand, SchedulerStatus,
};

/// What the scheduler remembers about an active monitor
#[derive(Debug, Clone)]
struct ScheduleEntry {
    owner: OwnerId,
    name: String,
    url: String,
    interval_secs: u64,
    last_checked: Option<DateTime<Utc>>,
}

pub struct SchedulerActor {
    config: SchedulerConfig,
    runner: Arc<CheckRunner>,
    clock: Arc<dyn Clock>,

    due_set: HashMap<MonitorId, ScheduleEntry>,

    /// Monitors with a check in flight, whether started by a tick or RunNow
    running: HashSet<MonitorId>,

    permits: Arc<Semaphore>,

    command_rx: mpsc::Receiver<SchedulerCommand>,

    done_tx: mpsc::UnboundedSender<CheckFinished>,
    done_rx: mpsc::UnboundedReceiver<CheckFinished>,
}

impl SchedulerActor {
    pub fn new(
        config: SchedulerConfig,
        runner: Arc<CheckRunner>,
        command_rx: mpsc::Receiver<SchedulerCommand>,
    ) -> Self {
        let (done_tx, done_rx) = mpsc::unbounded_channel();

        Self {
            permits: Arc::new(Semaphore::new(config.max_concurrent_checks.max(1))),
            clock: runner.clock().clone(),
            config,
            runner,
            due_set: HashMap::new(),
            running: HashSet::new(),
            command_rx,
            done_tx,
            done_rx,
        }
    }

    /// Run the actor's main loop
    ///
    /// Runs until a Shutdown command is received or every handle is dropped.
    /// Checks already in flight are left to finish on their own.
    #[instrument(skip(self), fields(max_concurrent = self.config.max_concurrent_checks))]
    pub async fn run(mut self) {
        info!("starting scheduler");

        let period = self.config.tick_interval();
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                // Completions first, so a RunNow right after a finished check
                // never sees a stale "in progress"
                Some(done) = self.done_rx.recv() => self.on_check_finished(done),

                cmd = self.command_rx.recv() => {
                    let Some(cmd) = cmd else {
                        warn!("command channel closed, shutting down");
                        break;
                    };
                    if !self.handle_command(cmd) {
                        break;
                    }
                }

                _ = ticker.tick() => {
                    let started = self.start_due_checks();
                    if started > 0 {
                        debug!(started, "tick started checks");
                    }
                }
            }
        }

        info!(in_flight = self.running.len(), "scheduler stopped");
    }

    /// Returns `false` when the actor should stop
    fn handle_command(&mut self, cmd: SchedulerCommand) -> bool {
        match cmd {
            SchedulerCommand::Register {
                monitor,
                respond_to,
            } => {
                self.register(*monitor);
                let _ = respond_to.send(());
            }

            SchedulerCommand::Unregister {
                monitor_id,
                respond_to,
            } => {
                if self.due_set.remove(&monitor_id).is_some() {
                    debug!(%monitor_id, "monitor unscheduled");
                }
                let _ = respond_to.send(());
            }

            SchedulerCommand::RunNow {
                caller,
                monitor_id,
                respond_to,
            } => self.run_now(caller, monitor_id, respond_to),

            SchedulerCommand::Tick { respond_to } => {
                let _ = respond_to.send(self.start_due_checks());
            }

            SchedulerCommand::ListDue { respond_to } => {
                let _ = respond_to.send(self.list_due());
            }

            SchedulerCommand::Status { respond_to } => {
                let _ = respond_to.send(SchedulerStatus {
                    scheduled_monitors: self.due_set.len(),
                    in_flight_checks: self.running.len(),
                    max_concurrent_checks: self.config.max_concurrent_checks,
                });
            }

            SchedulerCommand::Shutdown => {
                debug!("received shutdown command");
                return false;
            }
        }

        true
    }

    fn register(&mut self, monitor: Monitor) {
        if !monitor.is_active {
            if self.due_set.remove(&monitor.id).is_some() {
                debug!(monitor_id = %monitor.id, "inactive monitor unscheduled");
            }
            return;
        }

        // A check may have finished after the caller loaded its copy
        let known = self.due_set.get(&monitor.id).and_then(|e| e.last_checked);
        let last_checked = known.max(monitor.state.last_checked);

        trace!(monitor_id = %monitor.id, "monitor scheduled");
        self.due_set.insert(
            monitor.id,
            ScheduleEntry {
                owner: monitor.owner,
                name: monitor.name,
                url: monitor.url,
                interval_secs: monitor.check_interval_secs,
                last_checked,
            },
        );
    }

    /// Start every due check that fits under the concurrency cap
    fn start_due_checks(&mut self) -> usize {
        let now = self.clock.now();

        let mut due: Vec<(MonitorId, Option<DateTime<Utc>>)> = self
            .due_set
            .iter()
            .filter(|(id, _)| !self.running.contains(*id))
            .filter(|(_, entry)| is_due(entry.last_checked, entry.interval_secs, now))
            .map(|(id, entry)| (*id, entry.last_checked))
            .collect();

        // never-checked first, then longest waiting
        due.sort_by_key(|(_, last_checked)| *last_checked);

        let mut started = 0;
        for (monitor_id, _) in &due {
            let Ok(permit) = self.permits.clone().try_acquire_owned() else {
                debug!(
                    deferred = due.len() - started,
                    "concurrency cap reached, deferring remaining checks"
                );
                break;
            };

            self.running.insert(*monitor_id);
            tokio::spawn(scheduled_check(
                self.runner.clone(),
                *monitor_id,
                permit,
                self.done_tx.clone(),
            ));
            started += 1;
        }

        started
    }

    fn run_now(
        &mut self,
        caller: Caller,
        monitor_id: MonitorId,
        respond_to: oneshot::Sender<MonitorResult<CheckOutcome>>,
    ) {
        if self.running.contains(&monitor_id) {
            let _ = respond_to.send(Err(MonitorError::AlreadyInProgress(monitor_id)));
            return;
        }

        self.running.insert(monitor_id);
        tokio::spawn(interactive_check(
            self.runner.clone(),
            self.permits.clone(),
            caller,
            monitor_id,
            respond_to,
            self.done_tx.clone(),
        ));
    }

    fn on_check_finished(&mut self, done: CheckFinished) {
        self.running.remove(&done.monitor_id);

        if done.drop_from_schedule {
            if self.due_set.remove(&done.monitor_id).is_some() {
                debug!(monitor_id = %done.monitor_id, "monitor gone, unscheduled");
            }
            return;
        }

        if let (Some(entry), Some(checked_at)) =
            (self.due_set.get_mut(&done.monitor_id), done.checked_at)
        {
            entry.last_checked = entry.last_checked.max(Some(checked_at));
        }
    }

    fn list_due(&self) -> Vec<DueMonitor> {
        let now = self.clock.now();

        let mut due: Vec<DueMonitor> = self
            .due_set
            .iter()
            .filter(|(_, entry)| is_due(entry.last_checked, entry.interval_secs, now))
            .map(|(id, entry)| DueMonitor {
                monitor_id: *id,
                owner: entry.owner.clone(),
                name: entry.name.clone(),
                url: entry.url.clone(),
                last_checked: entry.last_checked,
                check_interval_secs: entry.interval_secs,
                running: self.running.contains(id),
            })
            .collect();

        due.sort_by_key(|d| d.last_checked);
        due
    }
}

/// Worker for a tick-started check
async fn scheduled_check(
    runner: Arc<CheckRunner>,
    monitor_id: MonitorId,
    permit: OwnedSemaphorePermit,
    done_tx: mpsc::UnboundedSender<CheckFinished>,
) {
    let finished = match runner.load(monitor_id).await {
        Ok(Some(monitor)) if monitor.is_active => {
            let report = runner.run(monitor).await;
            finished_from(&report)
        }
        Ok(_) => CheckFinished {
            monitor_id,
            checked_at: None,
            drop_from_schedule: true,
        },
        Err(e) => {
            error!(%monitor_id, "failed to load monitor for check: {e}");
            // back off for a full interval rather than retrying every tick
            CheckFinished {
                monitor_id,
                checked_at: Some(runner.clock().now()),
                drop_from_schedule: false,
            }
        }
    };

    drop(permit);
    let _ = done_tx.send(finished);
}

/// Worker for RunNow: waits for a permit instead of being refused
async fn interactive_check(
    runner: Arc<CheckRunner>,
    permits: Arc<Semaphore>,
    caller: Caller,
    monitor_id: MonitorId,
    respond_to: oneshot::Sender<MonitorResult<CheckOutcome>>,
    done_tx: mpsc::UnboundedSender<CheckFinished>,
) {
    let (finished, result) = match authorized_run(&runner, permits, &caller, monitor_id).await {
        Ok(report) => (finished_from(&report), report.result.map_err(MonitorError::from)),
        Err(e) => {
            let finished = CheckFinished {
                monitor_id,
                checked_at: None,
                drop_from_schedule: matches!(e, MonitorError::NotFound(_)),
            };
            (finished, Err(e))
        }
    };

    // completion is recorded before the caller hears back
    let _ = done_tx.send(finished);
    let _ = respond_to.send(result);
}

async fn authorized_run(
    runner: &CheckRunner,
    permits: Arc<Semaphore>,
    caller: &Caller,
    monitor_id: MonitorId,
) -> MonitorResult<CheckReport> {
    let _permit = permits
        .acquire_owned()
        .await
        .map_err(|_| MonitorError::SchedulerUnavailable)?;

    let monitor = runner
        .load(monitor_id)
        .await?
        .ok_or(MonitorError::NotFound(monitor_id))?;
    caller.authorize(&monitor.owner)?;

    Ok(runner.run(monitor).await)
}

fn finished_from(report: &CheckReport) -> CheckFinished {
    CheckFinished {
        monitor_id: report.monitor_id,
        checked_at: Some(report.checked_at),
        drop_from_schedule: matches!(report.result, Ok(CheckOutcome::Discarded)),
    }
}

/// Handle for controlling the SchedulerActor
#[derive(Clone)]
pub struct SchedulerHandle {
    sender: mpsc::Sender<SchedulerCommand>,
}

impl SchedulerHandle {
    /// Spawn a new scheduler actor
    pub fn spawn(config: SchedulerConfig, runner: Arc<CheckRunner>) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(64);

        let actor = SchedulerActor::new(config, runner, cmd_rx);
        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    /// Whether the actor is still accepting commands
    pub fn is_running(&self) -> bool {
        !self.sender.is_closed()
    }

    /// Schedule (or refresh) a monitor; inactive monitors are unscheduled
    pub async fn register(&self, monitor: &Monitor) -> MonitorResult<()> {
        let monitor = Box::new(monitor.clone());
        self.request(|respond_to| SchedulerCommand::Register {
            monitor,
            respond_to,
        })
        .await
    }

    pub async fn unregister(&self, monitor_id: MonitorId) -> MonitorResult<()> {
        self.request(|respond_to| SchedulerCommand::Unregister {
            monitor_id,
            respond_to,
        })
        .await
    }

    /// Check a monitor now and wait for the outcome
    pub async fn run_now(&self, caller: Caller, monitor_id: MonitorId) -> MonitorResult<CheckOutcome> {
        self.request(|respond_to| SchedulerCommand::RunNow {
            caller,
            monitor_id,
            respond_to,
        })
        .await?
    }

    /// Trigger a tick immediately, returning how many checks it started
    pub async fn tick(&self) -> MonitorResult<usize> {
        self.request(|respond_to| SchedulerCommand::Tick { respond_to })
            .await
    }

    pub async fn list_due(&self) -> MonitorResult<Vec<DueMonitor>> {
        self.request(|respond_to| SchedulerCommand::ListDue { respond_to })
            .await
    }

    pub async fn status(&self) -> MonitorResult<SchedulerStatus> {
        self.request(|respond_to| SchedulerCommand::Status { respond_to })
            .await
    }

    /// Schedule every active monitor in `store`
    pub async fn load_from_store(&self, store: &dyn MonitorStore) -> MonitorResult<usize> {
        let monitors = store.list_active_monitors().await?;
        for monitor in &monitors {
            self.register(monitor).await?;
        }

        info!(count = monitors.len(), "scheduled monitors from storage");
        Ok(monitors.len())
    }

    /// Shut down the scheduler
    pub async fn shutdown(self) {
        let _ = self.sender.send(SchedulerCommand::Shutdown).await;
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> SchedulerCommand,
    ) -> MonitorResult<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(command(tx))
            .await
            .map_err(|_| MonitorError::SchedulerUnavailable)?;

        rx.await.map_err(|_| MonitorError::SchedulerUnavailable)
    }
}

// ============================================================================
// Tests
// ============================================================================
