//! SQLite storage backend implementation
//!
//! ## Features
//!
//! - **Embedded**: No separate database server required
//! - **WAL mode**: Better concurrency for reads during writes
//! - **Connection pooling**: Efficient resource usage
//! - **Migrations**: Automatic schema versioning with sqlx
//!
//! A check's state update and its notification insert share one transaction,
//! so a crash can never leave a notification without the state that caused it
//! (or the reverse).

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Pool, QueryBuilder, Row, Sqlite};
use tracing::{debug, info, instrument, warn};

use super::backend::{HealthStatus, MonitorStore};
use super::error::{StorageError, StorageResult};
use super::schema::{MonitorRecord, NotificationRecord, StateColumns, to_millis};
use crate::identity::OwnerId;
use crate::monitor::{Monitor, MonitorId, MonitorState};
use crate::notification::{Notification, NotificationId, NotificationQuery};

const MONITOR_COLUMNS: &str = "id, owner, name, url, strategy, selector, item_name, item_type, \
     check_interval_secs, notification_enabled, is_active, metadata, current_value, \
     previous_value, last_checked, last_changed, last_success, consecutive_failures, \
     last_error, created_at, updated_at";

const NOTIFICATION_COLUMNS: &str = "id, owner, title, message, kind, priority, monitor_id, \
     strategy, is_read, read_at, created_at, data";

/// SQLite storage backend
pub struct SqliteStore {
    pool: Pool<Sqlite>,
    db_path: String,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `db_path` and run migrations
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let db_path_str = db_path.as_ref().to_string_lossy().to_string();

        info!("initializing SQLite backend at: {}", db_path_str);

        let options = SqliteConnectOptions::new()
            .filename(&db_path_str)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        debug!("running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("database migrations complete");

        Ok(Self {
            pool,
            db_path: db_path_str,
        })
    }

    fn monitor_from_row(row: &SqliteRow) -> StorageResult<Monitor> {
        let record = MonitorRecord {
            id: row.try_get("id")?,
            owner: row.try_get("owner")?,
            name: row.try_get("name")?,
            url: row.try_get("url")?,
            strategy: row.try_get("strategy")?,
            selector: row.try_get("selector")?,
            item_name: row.try_get("item_name")?,
            item_type: row.try_get("item_type")?,
            check_interval_secs: row.try_get("check_interval_secs")?,
            notification_enabled: row.try_get("notification_enabled")?,
            is_active: row.try_get("is_active")?,
            metadata: row.try_get("metadata")?,
            current_value: row.try_get("current_value")?,
            previous_value: row.try_get("previous_value")?,
            last_checked: row.try_get("last_checked")?,
            last_changed: row.try_get("last_changed")?,
            last_success: row.try_get("last_success")?,
            consecutive_failures: row.try_get("consecutive_failures")?,
            last_error: row.try_get("last_error")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        };

        Monitor::try_from(record)
    }

    fn notification_from_row(row: &SqliteRow) -> StorageResult<Notification> {
        let record = NotificationRecord {
            id: row.try_get("id")?,
            owner: row.try_get("owner")?,
            title: row.try_get("title")?,
            message: row.try_get("message")?,
            kind: row.try_get("kind")?,
            priority: row.try_get("priority")?,
            monitor_id: row.try_get("monitor_id")?,
            strategy: row.try_get("strategy")?,
            is_read: row.try_get("is_read")?,
            read_at: row.try_get("read_at")?,
            created_at: row.try_get("created_at")?,
            data: row.try_get("data")?,
        };

        Notification::try_from(record)
    }

    async fn fetch_monitors(
        &self,
        sql: &str,
        bind: Option<&str>,
    ) -> StorageResult<Vec<Monitor>> {
        let mut query = sqlx::query(sql);
        if let Some(value) = bind {
            query = query.bind(value);
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(Self::monitor_from_row).collect()
    }
}

#[async_trait]
impl MonitorStore for SqliteStore {
    #[instrument(skip(self, monitor), fields(monitor_id = %monitor.id))]
    async fn insert_monitor(&self, monitor: &Monitor) -> StorageResult<()> {
        let r = MonitorRecord::try_from(monitor)?;

        sqlx::query(&format!(
            "INSERT INTO monitors ({MONITOR_COLUMNS}) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(r.id)
        .bind(r.owner)
        .bind(r.name)
        .bind(r.url)
        .bind(r.strategy)
        .bind(r.selector)
        .bind(r.item_name)
        .bind(r.item_type)
        .bind(r.check_interval_secs)
        .bind(r.notification_enabled)
        .bind(r.is_active)
        .bind(r.metadata)
        .bind(r.current_value)
        .bind(r.previous_value)
        .bind(r.last_checked)
        .bind(r.last_changed)
        .bind(r.last_success)
        .bind(r.consecutive_failures)
        .bind(r.last_error)
        .bind(r.created_at)
        .bind(r.updated_at)
        .execute(&self.pool)
        .await?;

        debug!("monitor inserted");
        Ok(())
    }

    async fn load_monitor(&self, id: MonitorId) -> StorageResult<Option<Monitor>> {
        let row = sqlx::query(&format!("SELECT {MONITOR_COLUMNS} FROM monitors WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::monitor_from_row).transpose()
    }

    async fn list_monitors(&self, owner: &OwnerId) -> StorageResult<Vec<Monitor>> {
        self.fetch_monitors(
            &format!(
                "SELECT {MONITOR_COLUMNS} FROM monitors WHERE owner = ? ORDER BY created_at, id"
            ),
            Some(owner.as_str()),
        )
        .await
    }

    async fn list_active_monitors(&self) -> StorageResult<Vec<Monitor>> {
        self.fetch_monitors(
            &format!(
                "SELECT {MONITOR_COLUMNS} FROM monitors WHERE is_active = 1 ORDER BY created_at, id"
            ),
            None,
        )
        .await
    }

    async fn count_monitors(&self, owner: &OwnerId) -> StorageResult<usize> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM monitors WHERE owner = ?")
            .bind(owner.as_str())
            .fetch_one(&self.pool)
            .await?;

        Ok(row.0 as usize)
    }

    #[instrument(skip(self, monitor), fields(monitor_id = %monitor.id))]
    async fn update_monitor(&self, monitor: &Monitor) -> StorageResult<bool> {
        let r = MonitorRecord::try_from(monitor)?;

        let result = sqlx::query(
            r#"
            UPDATE monitors SET
                name = ?, selector = ?, item_name = ?, item_type = ?,
                check_interval_secs = ?, notification_enabled = ?, is_active = ?,
                metadata = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(r.name)
        .bind(r.selector)
        .bind(r.item_name)
        .bind(r.item_type)
        .bind(r.check_interval_secs)
        .bind(r.notification_enabled)
        .bind(r.is_active)
        .bind(r.metadata)
        .bind(r.updated_at)
        .bind(r.id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn delete_monitor(&self, id: MonitorId) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM monitors WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn reset_baseline(&self, id: MonitorId) -> StorageResult<bool> {
        let result = sqlx::query(
            "UPDATE monitors SET current_value = NULL, previous_value = NULL WHERE id = ?",
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, state, notification), fields(notify = notification.is_some()))]
    async fn commit_check(
        &self,
        id: MonitorId,
        state: &MonitorState,
        notification: Option<&Notification>,
    ) -> StorageResult<bool> {
        let s = StateColumns::from(state);
        let notification = notification.map(NotificationRecord::try_from).transpose()?;

        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE monitors SET
                current_value = ?, previous_value = ?, last_checked = ?, last_changed = ?,
                last_success = ?, consecutive_failures = ?, last_error = ?
            WHERE id = ?
            "#,
        )
        .bind(s.current_value)
        .bind(s.previous_value)
        .bind(s.last_checked)
        .bind(s.last_changed)
        .bind(s.last_success)
        .bind(s.consecutive_failures)
        .bind(s.last_error)
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            debug!("monitor gone, check result discarded");
            tx.rollback().await?;
            return Ok(false);
        }

        if let Some(n) = notification {
            sqlx::query(&format!(
                "INSERT INTO notifications ({NOTIFICATION_COLUMNS}) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
            ))
            .bind(n.id)
            .bind(n.owner)
            .bind(n.title)
            .bind(n.message)
            .bind(n.kind)
            .bind(n.priority)
            .bind(n.monitor_id)
            .bind(n.strategy)
            .bind(n.is_read)
            .bind(n.read_at)
            .bind(n.created_at)
            .bind(n.data)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn list_notifications(
        &self,
        owner: &OwnerId,
        query: &NotificationQuery,
    ) -> StorageResult<Vec<Notification>> {
        let mut sql = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE owner = "
        ));
        sql.push_bind(owner.as_str());

        if query.unread_only {
            sql.push(" AND is_read = 0");
        }
        if let Some(kind) = query.kind {
            sql.push(" AND kind = ").push_bind(kind.as_str());
        }
        sql.push(" ORDER BY created_at DESC, rowid DESC");
        if let Some(limit) = query.limit {
            sql.push(" LIMIT ").push_bind(limit as i64);
        }

        let rows = sql.build().fetch_all(&self.pool).await?;
        rows.iter().map(Self::notification_from_row).collect()
    }

    async fn load_notification(&self, id: NotificationId) -> StorageResult<Option<Notification>> {
        let row = sqlx::query(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::notification_from_row).transpose()
    }

    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn mark_read(&self, ids: &[NotificationId], at: DateTime<Utc>) -> StorageResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut sql =
            QueryBuilder::<Sqlite>::new("UPDATE notifications SET is_read = 1, read_at = ");
        sql.push_bind(to_millis(at));
        sql.push(" WHERE is_read = 0 AND id IN (");
        let mut separated = sql.separated(", ");
        for id in ids {
            separated.push_bind(id.to_string());
        }
        separated.push_unseparated(")");

        let result = sql.build().execute(&self.pool).await?;
        Ok(result.rows_affected() as usize)
    }

    #[instrument(skip(self))]
    async fn mark_all_read(&self, owner: &OwnerId, at: DateTime<Utc>) -> StorageResult<usize> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = 1, read_at = ? WHERE owner = ? AND is_read = 0",
        )
        .bind(to_millis(at))
        .bind(owner.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() as usize)
    }

    #[instrument(skip(self))]
    async fn delete_notification(&self, id: NotificationId) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn delete_all_notifications(&self, owner: &OwnerId, read_only: bool) -> StorageResult<usize> {
        let mut sql = QueryBuilder::<Sqlite>::new("DELETE FROM notifications WHERE owner = ");
        sql.push_bind(owner.as_str());
        if read_only {
            sql.push(" AND is_read = 1");
        }

        let result = sql.build().execute(&self.pool).await?;
        Ok(result.rows_affected() as usize)
    }

    #[instrument(skip(self), fields(before = %before))]
    async fn cleanup_old_notifications(&self, before: DateTime<Utc>) -> StorageResult<usize> {
        info!("cleaning up notifications older than {}", before);

        let result = sqlx::query("DELETE FROM notifications WHERE created_at < ?")
            .bind(to_millis(before))
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected() as usize;
        info!("deleted {} old notifications", deleted);

        Ok(deleted)
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> StorageResult<HealthStatus> {
        match sqlx::query("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => Ok(HealthStatus {
                healthy: true,
                message: "SQLite backend operational".to_string(),
                metadata: HashMap::from([
                    ("backend".to_string(), "sqlite".to_string()),
                    ("db_path".to_string(), self.db_path.clone()),
                ]),
            }),
            Err(e) => {
                warn!("health check failed: {}", e);
                Ok(HealthStatus {
                    healthy: false,
                    message: format!("health check failed: {}", e),
                    metadata: HashMap::new(),
                })
            }
        }
    }

    async fn close(&self) -> StorageResult<()> {
        info!("closing SQLite backend");
        self.pool.close().await;
        Ok(())
    }
}
