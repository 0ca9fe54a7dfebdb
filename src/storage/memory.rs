//! In-memory storage backend (no persistence)
//!
//! Useful for:
//! - Testing without database dependencies
//! - The `none` storage backend (everything is lost on restart)
//!
//! Notifications are kept in insertion order so listings are stable for
//! records created within the same millisecond.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use super::backend::{HealthStatus, MonitorStore};
use super::error::StorageResult;
use crate::identity::OwnerId;
use crate::monitor::{Monitor, MonitorId, MonitorState};
use crate::notification::{Notification, NotificationId, NotificationQuery};

#[derive(Default)]
struct Tables {
    monitors: HashMap<MonitorId, Monitor>,
    notifications: Vec<Notification>,
}

/// In-memory storage backend
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MonitorStore for MemoryStore {
    async fn insert_monitor(&self, monitor: &Monitor) -> StorageResult<()> {
        self.tables
            .write()
            .await
            .monitors
            .insert(monitor.id, monitor.clone());
        Ok(())
    }

    async fn load_monitor(&self, id: MonitorId) -> StorageResult<Option<Monitor>> {
        Ok(self.tables.read().await.monitors.get(&id).cloned())
    }

    async fn list_monitors(&self, owner: &OwnerId) -> StorageResult<Vec<Monitor>> {
        let tables = self.tables.read().await;
        let mut monitors: Vec<Monitor> = tables
            .monitors
            .values()
            .filter(|m| &m.owner == owner)
            .cloned()
            .collect();
        monitors.sort_by_key(|m| (m.created_at, m.id));
        Ok(monitors)
    }

    async fn list_active_monitors(&self) -> StorageResult<Vec<Monitor>> {
        let tables = self.tables.read().await;
        let mut monitors: Vec<Monitor> = tables
            .monitors
            .values()
            .filter(|m| m.is_active)
            .cloned()
            .collect();
        monitors.sort_by_key(|m| (m.created_at, m.id));
        Ok(monitors)
    }

    async fn count_monitors(&self, owner: &OwnerId) -> StorageResult<usize> {
        let tables = self.tables.read().await;
        Ok(tables.monitors.values().filter(|m| &m.owner == owner).count())
    }

    async fn update_monitor(&self, monitor: &Monitor) -> StorageResult<bool> {
        let mut tables = self.tables.write().await;

        let Some(stored) = tables.monitors.get_mut(&monitor.id) else {
            return Ok(false);
        };

        let state = std::mem::take(&mut stored.state);
        *stored = Monitor {
            state,
            ..monitor.clone()
        };
        Ok(true)
    }

    async fn delete_monitor(&self, id: MonitorId) -> StorageResult<bool> {
        Ok(self.tables.write().await.monitors.remove(&id).is_some())
    }

    async fn reset_baseline(&self, id: MonitorId) -> StorageResult<bool> {
        let mut tables = self.tables.write().await;

        let Some(stored) = tables.monitors.get_mut(&id) else {
            return Ok(false);
        };
        stored.state.current_value = None;
        stored.state.previous_value = None;
        Ok(true)
    }

    async fn commit_check(
        &self,
        id: MonitorId,
        state: &MonitorState,
        notification: Option<&Notification>,
    ) -> StorageResult<bool> {
        let mut tables = self.tables.write().await;

        let Some(stored) = tables.monitors.get_mut(&id) else {
            debug!(monitor_id = %id, "monitor gone, check result discarded");
            return Ok(false);
        };
        stored.state = state.clone();

        if let Some(notification) = notification {
            tables.notifications.push(notification.clone());
        }
        Ok(true)
    }

    async fn list_notifications(
        &self,
        owner: &OwnerId,
        query: &NotificationQuery,
    ) -> StorageResult<Vec<Notification>> {
        let tables = self.tables.read().await;

        let mut matching: Vec<Notification> = tables
            .notifications
            .iter()
            .rev()
            .filter(|n| &n.owner == owner && query.matches(n))
            .cloned()
            .collect();
        // stable: equal timestamps keep newest-inserted first
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matching.truncate(query.limit.unwrap_or(usize::MAX));

        Ok(matching)
    }

    async fn load_notification(&self, id: NotificationId) -> StorageResult<Option<Notification>> {
        let tables = self.tables.read().await;
        Ok(tables.notifications.iter().find(|n| n.id == id).cloned())
    }

    async fn mark_read(&self, ids: &[NotificationId], at: DateTime<Utc>) -> StorageResult<usize> {
        let mut tables = self.tables.write().await;
        let mut changed = 0;

        for n in tables
            .notifications
            .iter_mut()
            .filter(|n| !n.is_read && ids.contains(&n.id))
        {
            n.is_read = true;
            n.read_at = Some(at);
            changed += 1;
        }

        Ok(changed)
    }

    async fn mark_all_read(&self, owner: &OwnerId, at: DateTime<Utc>) -> StorageResult<usize> {
        let mut tables = self.tables.write().await;
        let mut changed = 0;

        for n in tables
            .notifications
            .iter_mut()
            .filter(|n| !n.is_read && &n.owner == owner)
        {
            n.is_read = true;
            n.read_at = Some(at);
            changed += 1;
        }

        Ok(changed)
    }

    async fn delete_notification(&self, id: NotificationId) -> StorageResult<bool> {
        let mut tables = self.tables.write().await;
        let before = tables.notifications.len();
        tables.notifications.retain(|n| n.id != id);
        Ok(tables.notifications.len() != before)
    }

    async fn delete_all_notifications(&self, owner: &OwnerId, read_only: bool) -> StorageResult<usize> {
        let mut tables = self.tables.write().await;
        let count = tables.notifications.len();
        tables
            .notifications
            .retain(|n| &n.owner != owner || (read_only && !n.is_read));
        Ok(count - tables.notifications.len())
    }

    async fn cleanup_old_notifications(&self, before: DateTime<Utc>) -> StorageResult<usize> {
        let mut tables = self.tables.write().await;
        let count = tables.notifications.len();
        tables.notifications.retain(|n| n.created_at >= before);
        Ok(count - tables.notifications.len())
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        let tables = self.tables.read().await;

        Ok(HealthStatus {
            healthy: true,
            message: "In-memory storage operational".to_string(),
            metadata: HashMap::from([
                ("backend".to_string(), "memory".to_string()),
                ("monitors".to_string(), tables.monitors.len().to_string()),
                (
                    "notifications".to_string(),
                    tables.notifications.len().to_string(),
                ),
            ]),
        })
    }

    async fn close(&self) -> StorageResult<()> {
        debug!("closing in-memory backend (no-op)");
        Ok(())
    }
}
