//! Row shapes for the relational backends
//!
//! Records hold only column-friendly primitives: ids and enums as text,
//! timestamps as unix milliseconds, JSON payloads (notification data,
//! monitor metadata) as text.
//! Conversions back into domain types are fallible, since a row written by a
//! newer version (or edited by hand) may not parse.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::error::{StorageError, StorageResult};
use crate::identity::OwnerId;
use crate::monitor::{Monitor, MonitorState};
use crate::notification::{Notification, NotificationSource};

/// One row of the `monitors` table
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorRecord {
    pub id: String,
    pub owner: String,
    pub name: String,
    pub url: String,
    pub strategy: String,
    pub selector: Option<String>,
    pub item_name: Option<String>,
    pub item_type: Option<String>,
    pub check_interval_secs: i64,
    pub notification_enabled: bool,
    pub is_active: bool,
    pub metadata: Option<String>,
    pub current_value: Option<String>,
    pub previous_value: Option<String>,
    pub last_checked: Option<i64>,
    pub last_changed: Option<i64>,
    pub last_success: Option<i64>,
    pub consecutive_failures: i64,
    pub last_error: Option<String>,
    pub created_at: i64,
    pub updated_at: Option<i64>,
}

impl TryFrom<&Monitor> for MonitorRecord {
    type Error = StorageError;

    fn try_from(m: &Monitor) -> StorageResult<Self> {
        let state = StateColumns::from(&m.state);

        Ok(Self {
            id: m.id.to_string(),
            owner: m.owner.to_string(),
            name: m.name.clone(),
            url: m.url.clone(),
            strategy: m.strategy.as_str().to_string(),
            selector: m.selector.clone(),
            item_name: m.item_name.clone(),
            item_type: m.item_type.map(|t| t.as_str().to_string()),
            check_interval_secs: m.check_interval_secs as i64,
            notification_enabled: m.notification_enabled,
            is_active: m.is_active,
            metadata: m.metadata.as_ref().map(serde_json::to_string).transpose()?,
            current_value: state.current_value,
            previous_value: state.previous_value,
            last_checked: state.last_checked,
            last_changed: state.last_changed,
            last_success: state.last_success,
            consecutive_failures: state.consecutive_failures,
            last_error: state.last_error,
            created_at: to_millis(m.created_at),
            updated_at: m.updated_at.map(to_millis),
        })
    }
}

impl TryFrom<MonitorRecord> for Monitor {
    type Error = StorageError;

    fn try_from(r: MonitorRecord) -> StorageResult<Self> {
        Ok(Monitor {
            id: parse_uuid(&r.id)?,
            owner: OwnerId::new(r.owner),
            name: r.name,
            url: r.url,
            strategy: r.strategy.parse().map_err(StorageError::SerializationError)?,
            selector: r.selector,
            item_name: r.item_name,
            item_type: r
                .item_type
                .map(|t| t.parse())
                .transpose()
                .map_err(StorageError::SerializationError)?,
            check_interval_secs: non_negative(r.check_interval_secs, "check_interval_secs")?,
            notification_enabled: r.notification_enabled,
            is_active: r.is_active,
            metadata: r
                .metadata
                .as_deref()
                .map(serde_json::from_str::<serde_json::Value>)
                .transpose()?,
            state: MonitorState {
                current_value: r.current_value,
                previous_value: r.previous_value,
                last_checked: r.last_checked.map(from_millis).transpose()?,
                last_changed: r.last_changed.map(from_millis).transpose()?,
                last_success: r.last_success.map(from_millis).transpose()?,
                consecutive_failures: u32::try_from(r.consecutive_failures).map_err(|_| {
                    StorageError::SerializationError(format!(
                        "consecutive_failures out of range: {}",
                        r.consecutive_failures
                    ))
                })?,
                last_error: r.last_error,
            },
            created_at: from_millis(r.created_at)?,
            updated_at: r.updated_at.map(from_millis).transpose()?,
        })
    }
}

/// The observed-state columns written by a check
#[derive(Debug, Clone, PartialEq)]
pub struct StateColumns {
    pub current_value: Option<String>,
    pub previous_value: Option<String>,
    pub last_checked: Option<i64>,
    pub last_changed: Option<i64>,
    pub last_success: Option<i64>,
    pub consecutive_failures: i64,
    pub last_error: Option<String>,
}

impl From<&MonitorState> for StateColumns {
    fn from(s: &MonitorState) -> Self {
        Self {
            current_value: s.current_value.clone(),
            previous_value: s.previous_value.clone(),
            last_checked: s.last_checked.map(to_millis),
            last_changed: s.last_changed.map(to_millis),
            last_success: s.last_success.map(to_millis),
            consecutive_failures: i64::from(s.consecutive_failures),
            last_error: s.last_error.clone(),
        }
    }
}

/// One row of the `notifications` table
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationRecord {
    pub id: String,
    pub owner: String,
    pub title: String,
    pub message: String,
    pub kind: String,
    pub priority: String,
    pub monitor_id: String,
    pub strategy: String,
    pub is_read: bool,
    pub read_at: Option<i64>,
    pub created_at: i64,
    pub data: Option<String>,
}

impl TryFrom<&Notification> for NotificationRecord {
    type Error = StorageError;

    fn try_from(n: &Notification) -> StorageResult<Self> {
        Ok(Self {
            id: n.id.to_string(),
            owner: n.owner.to_string(),
            title: n.title.clone(),
            message: n.message.clone(),
            kind: n.kind.as_str().to_string(),
            priority: n.priority.as_str().to_string(),
            monitor_id: n.source.monitor_id.to_string(),
            strategy: n.source.strategy.as_str().to_string(),
            is_read: n.is_read,
            read_at: n.read_at.map(to_millis),
            created_at: to_millis(n.created_at),
            data: n.data.as_ref().map(serde_json::to_string).transpose()?,
        })
    }
}

impl TryFrom<NotificationRecord> for Notification {
    type Error = StorageError;

    fn try_from(r: NotificationRecord) -> StorageResult<Self> {
        Ok(Notification {
            id: parse_uuid(&r.id)?,
            owner: OwnerId::new(r.owner),
            title: r.title,
            message: r.message,
            kind: r.kind.parse().map_err(StorageError::SerializationError)?,
            priority: r.priority.parse().map_err(StorageError::SerializationError)?,
            source: NotificationSource {
                monitor_id: parse_uuid(&r.monitor_id)?,
                strategy: r.strategy.parse().map_err(StorageError::SerializationError)?,
            },
            is_read: r.is_read,
            read_at: r.read_at.map(from_millis).transpose()?,
            created_at: from_millis(r.created_at)?,
            data: r
                .data
                .as_deref()
                .map(serde_json::from_str::<serde_json::Value>)
                .transpose()?,
        })
    }
}

/// Timestamp to Unix milliseconds
pub fn to_millis(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

/// Unix milliseconds back to a timestamp
pub fn from_millis(millis: i64) -> StorageResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| StorageError::SerializationError(format!("timestamp out of range: {millis}")))
}

fn parse_uuid(value: &str) -> StorageResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| StorageError::SerializationError(format!("invalid id '{value}': {e}")))
}

fn non_negative(value: i64, column: &str) -> StorageResult<u64> {
    u64::try_from(value)
        .map_err(|_| StorageError::SerializationError(format!("{column} is negative: {value}")))
}
