//! Storage backend trait definition
//!
//! [`MonitorStore`] is the read/write contract the engine needs from a
//! persistence engine. Monitors and notifications are both authoritative
//! here; everything the scheduler keeps in memory can be rebuilt from it.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::StorageResult;
use crate::identity::OwnerId;
use crate::monitor::{Monitor, MonitorId, MonitorState};
use crate::notification::{Notification, NotificationId, NotificationQuery};

/// Health status of the storage backend
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Is the backend operational?
    pub healthy: bool,

    /// Human-readable status message
    pub message: String,

    /// Additional backend-specific metadata
    pub metadata: HashMap<String, String>,
}

/// Persistence contract for monitors and notifications
///
/// Implementations must be `Send + Sync`; they are shared between the
/// scheduler's worker tasks and the service layer.
#[async_trait]
pub trait MonitorStore: Send + Sync {
    async fn insert_monitor(&self, monitor: &Monitor) -> StorageResult<()>;

    async fn load_monitor(&self, id: MonitorId) -> StorageResult<Option<Monitor>>;

    /// All monitors of `owner`, oldest first
    async fn list_monitors(&self, owner: &OwnerId) -> StorageResult<Vec<Monitor>>;

    /// Every active monitor across owners, used to seed the scheduler
    async fn list_active_monitors(&self) -> StorageResult<Vec<Monitor>>;

    async fn count_monitors(&self, owner: &OwnerId) -> StorageResult<usize>;

    /// Overwrite the configuration columns of an existing monitor
    ///
    /// Observed state is left alone so a concurrent check is never
    /// clobbered by a CRUD edit. Returns `false` when the monitor is gone.
    async fn update_monitor(&self, monitor: &Monitor) -> StorageResult<bool>;

    async fn delete_monitor(&self, id: MonitorId) -> StorageResult<bool>;

    /// Clear the current and previous values so the next check is a baseline
    async fn reset_baseline(&self, id: MonitorId) -> StorageResult<bool>;

    /// Persist the outcome of one check
    ///
    /// Writes the observed state and, when present, inserts the notification
    /// as a single atomic step. Returns `false` (and writes nothing) when the
    /// monitor was deleted while the check ran.
    async fn commit_check(
        &self,
        id: MonitorId,
        state: &MonitorState,
        notification: Option<&Notification>,
    ) -> StorageResult<bool>;

    /// Notifications of `owner` matching `query`, newest first
    async fn list_notifications(
        &self,
        owner: &OwnerId,
        query: &NotificationQuery,
    ) -> StorageResult<Vec<Notification>>;

    async fn load_notification(&self, id: NotificationId) -> StorageResult<Option<Notification>>;

    /// Mark the given notifications read, returning how many changed
    async fn mark_read(&self, ids: &[NotificationId], at: DateTime<Utc>) -> StorageResult<usize>;

    async fn mark_all_read(&self, owner: &OwnerId, at: DateTime<Utc>) -> StorageResult<usize>;

    async fn delete_notification(&self, id: NotificationId) -> StorageResult<bool>;

    /// Delete the notifications of `owner`, only read ones when `read_only`
    async fn delete_all_notifications(&self, owner: &OwnerId, read_only: bool) -> StorageResult<usize>;

    /// Delete notifications created before `before`
    ///
    /// Used for retention policy enforcement. Returns the number deleted.
    async fn cleanup_old_notifications(&self, before: DateTime<Utc>) -> StorageResult<usize>;

    /// Performs a lightweight operation to verify the backend is operational
    async fn health_check(&self) -> StorageResult<HealthStatus>;

    /// Close the backend and release resources
    async fn close(&self) -> StorageResult<()>;
}
