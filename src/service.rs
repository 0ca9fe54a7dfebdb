//! Operations exposed to the CRUD surfaces
//!
//! Every operation takes the [`Caller`] explicitly and checks ownership
//! before reading or writing a record. Monitor mutations keep the
//! scheduler's due-set in sync before they return, so a deleted or
//! deactivated monitor is never started by a later tick.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Duration;
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::actors::{CheckOutcome, DueMonitor, SchedulerHandle};
use crate::broadcast::{BroadcastHub, SystemStatus};
use crate::clock::Clock;
use crate::config::SchedulerConfig;
use crate::error::{MonitorError, MonitorResult};
use crate::identity::Caller;
use crate::monitor::{Monitor, MonitorId, MonitorPatch, NewMonitor, Strategy};
use crate::notification::{Notification, NotificationId, NotificationQuery, NotificationStats};
use crate::storage::{HealthStatus, MonitorStore};

/// Window for "recently changed" in [`MonitorStats`]
const CHANGED_WINDOW_HOURS: i64 = 24;

/// Window for "recent" in [`NotificationStats`]
const RECENT_NOTIFICATION_DAYS: i64 = 7;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitorStats {
    pub total: usize,
    pub active: usize,
    pub inactive: usize,
    pub by_strategy: BTreeMap<String, usize>,
    pub changed_24h: usize,
    /// Active monitors without a recent successful check
    pub stale: usize,
    pub scheduler_running: bool,
}

#[derive(Clone)]
pub struct MonitorService {
    store: Arc<dyn MonitorStore>,
    scheduler: SchedulerHandle,
    hub: BroadcastHub,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
}

impl MonitorService {
    pub fn new(
        store: Arc<dyn MonitorStore>,
        scheduler: SchedulerHandle,
        hub: BroadcastHub,
        clock: Arc<dyn Clock>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            scheduler,
            hub,
            clock,
            config,
        }
    }

    #[instrument(skip(self, request), fields(owner = %caller.owner))]
    pub async fn create_monitor(&self, caller: &Caller, request: NewMonitor) -> MonitorResult<Monitor> {
        let existing = self.store.count_monitors(&caller.owner).await?;
        if existing >= self.config.max_monitors_per_owner {
            return Err(MonitorError::LimitReached(self.config.max_monitors_per_owner));
        }

        let monitor = Monitor::from_request(caller.owner.clone(), request, &self.config, self.clock.now())
            .map_err(MonitorError::InvalidConfig)?;

        self.store.insert_monitor(&monitor).await?;
        self.scheduler.register(&monitor).await?;

        info!(monitor_id = %monitor.id, strategy = %monitor.strategy, "monitor created");
        Ok(monitor)
    }

    pub async fn get_monitor(&self, caller: &Caller, id: MonitorId) -> MonitorResult<Monitor> {
        let monitor = self
            .store
            .load_monitor(id)
            .await?
            .ok_or(MonitorError::NotFound(id))?;

        caller.authorize(&monitor.owner)?;
        Ok(monitor)
    }

    /// The caller's monitors, oldest first
    pub async fn list_monitors(&self, caller: &Caller) -> MonitorResult<Vec<Monitor>> {
        Ok(self.store.list_monitors(&caller.owner).await?)
    }

    #[instrument(skip(self, patch), fields(owner = %caller.owner))]
    pub async fn update_monitor(
        &self,
        caller: &Caller,
        id: MonitorId,
        patch: MonitorPatch,
    ) -> MonitorResult<Monitor> {
        let mut monitor = self.get_monitor(caller, id).await?;

        let baseline_reset = monitor
            .apply_patch(patch, &self.config, self.clock.now())
            .map_err(MonitorError::InvalidConfig)?;

        let monitor = self.save_config(monitor).await?;
        if baseline_reset {
            self.store.reset_baseline(id).await?;
            debug!(monitor_id = %id, "extraction settings changed, baseline cleared");
        }
        Ok(monitor)
    }

    /// Flip the active flag; deactivation takes the monitor out of the schedule
    pub async fn toggle_active(&self, caller: &Caller, id: MonitorId) -> MonitorResult<Monitor> {
        let mut monitor = self.get_monitor(caller, id).await?;

        let patch = MonitorPatch {
            is_active: Some(!monitor.is_active),
            ..Default::default()
        };
        monitor
            .apply_patch(patch, &self.config, self.clock.now())
            .map_err(MonitorError::InvalidConfig)?;

        debug!(monitor_id = %id, active = monitor.is_active, "monitor toggled");
        self.save_config(monitor).await
    }

    #[instrument(skip(self), fields(owner = %caller.owner))]
    pub async fn delete_monitor(&self, caller: &Caller, id: MonitorId) -> MonitorResult<()> {
        self.get_monitor(caller, id).await?;

        // unscheduled first, so no tick can start it between the two steps
        self.scheduler.unregister(id).await?;
        if !self.store.delete_monitor(id).await? {
            return Err(MonitorError::NotFound(id));
        }

        info!(monitor_id = %id, "monitor deleted");
        Ok(())
    }

    /// Check a monitor now, also when it is inactive
    pub async fn run_now(&self, caller: &Caller, id: MonitorId) -> MonitorResult<CheckOutcome> {
        self.get_monitor(caller, id).await?;
        self.scheduler.run_now(caller.clone(), id).await
    }

    /// The caller's monitors that are due right now
    pub async fn list_due(&self, caller: &Caller) -> MonitorResult<Vec<DueMonitor>> {
        let due = self.scheduler.list_due().await?;
        Ok(due.into_iter().filter(|d| d.owner == caller.owner).collect())
    }

    pub async fn stats(&self, caller: &Caller) -> MonitorResult<MonitorStats> {
        let monitors = self.store.list_monitors(&caller.owner).await?;
        let now = self.clock.now();
        let changed_since = now - Duration::hours(CHANGED_WINDOW_HOURS);

        let mut stats = MonitorStats {
            total: monitors.len(),
            active: 0,
            inactive: 0,
            by_strategy: Strategy::ALL
                .iter()
                .map(|s| (s.as_str().to_string(), 0))
                .collect(),
            changed_24h: 0,
            stale: 0,
            scheduler_running: self.scheduler.is_running(),
        };

        for monitor in &monitors {
            if monitor.is_active {
                stats.active += 1;
            } else {
                stats.inactive += 1;
            }
            *stats
                .by_strategy
                .entry(monitor.strategy.as_str().to_string())
                .or_default() += 1;
            if monitor.state.last_changed.is_some_and(|at| at >= changed_since) {
                stats.changed_24h += 1;
            }
            if monitor.is_stale(now, self.config.stale_after_intervals) {
                stats.stale += 1;
            }
        }

        Ok(stats)
    }

    pub async fn system_status(&self) -> SystemStatus {
        let scheduler = self.scheduler.status().await.ok();

        SystemStatus {
            scheduler_running: scheduler.is_some(),
            active_monitors: scheduler.as_ref().map_or(0, |s| s.scheduled_monitors),
            in_flight_checks: scheduler.as_ref().map_or(0, |s| s.in_flight_checks),
            connections: self.hub.connection_count(),
            timestamp: self.clock.now(),
        }
    }

    pub async fn storage_health(&self) -> MonitorResult<HealthStatus> {
        Ok(self.store.health_check().await?)
    }

    /// Push a status snapshot to every live connection
    pub async fn broadcast_system_status(&self) -> usize {
        let status = self.system_status().await;
        self.hub.broadcast_system_status(status)
    }

    async fn save_config(&self, monitor: Monitor) -> MonitorResult<Monitor> {
        if !self.store.update_monitor(&monitor).await? {
            return Err(MonitorError::NotFound(monitor.id));
        }

        // unschedules the monitor when it is now inactive
        self.scheduler.register(&monitor).await?;
        Ok(monitor)
    }
}

#[derive(Clone)]
pub struct NotificationService {
    store: Arc<dyn MonitorStore>,
    clock: Arc<dyn Clock>,
}

impl NotificationService {
    pub fn new(store: Arc<dyn MonitorStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// The caller's notifications, newest first
    pub async fn list(&self, caller: &Caller, query: &NotificationQuery) -> MonitorResult<Vec<Notification>> {
        Ok(self.store.list_notifications(&caller.owner, query).await?)
    }

    pub async fn get(&self, caller: &Caller, id: NotificationId) -> MonitorResult<Notification> {
        let notification = self
            .store
            .load_notification(id)
            .await?
            .ok_or(MonitorError::NotificationNotFound(id))?;

        caller.authorize(&notification.owner)?;
        Ok(notification)
    }

    /// Mark notifications read; nothing is written unless the caller owns all of them
    #[instrument(skip(self, ids), fields(owner = %caller.owner, count = ids.len()))]
    pub async fn mark_read(&self, caller: &Caller, ids: &[NotificationId]) -> MonitorResult<usize> {
        for id in ids {
            self.get(caller, *id).await?;
        }

        Ok(self.store.mark_read(ids, self.clock.now()).await?)
    }

    pub async fn mark_all_read(&self, caller: &Caller) -> MonitorResult<usize> {
        Ok(self.store.mark_all_read(&caller.owner, self.clock.now()).await?)
    }

    pub async fn delete(&self, caller: &Caller, id: NotificationId) -> MonitorResult<()> {
        self.get(caller, id).await?;

        if !self.store.delete_notification(id).await? {
            return Err(MonitorError::NotificationNotFound(id));
        }
        Ok(())
    }

    /// Delete the caller's notifications, only the read ones when `read_only`
    #[instrument(skip(self), fields(owner = %caller.owner))]
    pub async fn delete_all(&self, caller: &Caller, read_only: bool) -> MonitorResult<usize> {
        let deleted = self
            .store
            .delete_all_notifications(&caller.owner, read_only)
            .await?;

        info!(deleted, read_only, "notifications deleted");
        Ok(deleted)
    }

    pub async fn stats(&self, caller: &Caller) -> MonitorResult<NotificationStats> {
        let all = self
            .store
            .list_notifications(&caller.owner, &NotificationQuery::default())
            .await?;

        let recent_since = self.clock.now() - Duration::days(RECENT_NOTIFICATION_DAYS);
        Ok(NotificationStats::tally(&all, recent_since))
    }

    pub async fn unread_count(&self, caller: &Caller) -> MonitorResult<usize> {
        let query = NotificationQuery {
            unread_only: true,
            ..Default::default()
        };
        Ok(self.store.list_notifications(&caller.owner, &query).await?.len())
    }
}
