//! Notification entity: one change event surfaced to a monitor's owner

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::identity::OwnerId;
use crate::monitor::{MonitorId, Strategy};

pub type NotificationId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Info,
    Warning,
    Error,
    Success,
}

impl NotificationKind {
    pub const ALL: [NotificationKind; 4] = [
        NotificationKind::Info,
        NotificationKind::Warning,
        NotificationKind::Error,
        NotificationKind::Success,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Info => "info",
            NotificationKind::Warning => "warning",
            NotificationKind::Error => "error",
            NotificationKind::Success => "success",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(NotificationKind::Info),
            "warning" => Ok(NotificationKind::Warning),
            "error" => Ok(NotificationKind::Error),
            "success" => Ok(NotificationKind::Success),
            other => Err(format!("unknown notification type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
}

impl Priority {
    pub const ALL: [Priority; 4] = [
        Priority::Low,
        Priority::Normal,
        Priority::High,
        Priority::Urgent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Priority::Low),
            "normal" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            "urgent" => Ok(Priority::Urgent),
            other => Err(format!("unknown priority '{other}'")),
        }
    }
}

/// Which monitor (and strategy) produced a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationSource {
    pub monitor_id: MonitorId,
    pub strategy: Strategy,
}

/// A durable change event
///
/// Immutable after creation except for `is_read` / `read_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub owner: OwnerId,
    pub title: String,
    pub message: String,
    #[serde(rename = "notification_type")]
    pub kind: NotificationKind,
    pub priority: Priority,
    pub source: NotificationSource,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub data: Option<serde_json::Value>,
}

/// Filter for listing an owner's notifications
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread_only: bool,
    pub kind: Option<NotificationKind>,
    pub limit: Option<usize>,
}

impl NotificationQuery {
    pub fn matches(&self, notification: &Notification) -> bool {
        (!self.unread_only || !notification.is_read)
            && self.kind.is_none_or(|kind| kind == notification.kind)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationStats {
    pub total: usize,
    pub unread: usize,
    pub recent: usize,
    pub by_kind: BTreeMap<NotificationKind, usize>,
    pub by_priority: BTreeMap<Priority, usize>,
}

impl NotificationStats {
    /// Tally `notifications`, counting those created at or after `recent_since` as recent
    pub fn tally<'a>(
        notifications: impl IntoIterator<Item = &'a Notification>,
        recent_since: DateTime<Utc>,
    ) -> Self {
        let mut stats = NotificationStats {
            by_kind: NotificationKind::ALL.iter().map(|k| (*k, 0)).collect(),
            by_priority: Priority::ALL.iter().map(|p| (*p, 0)).collect(),
            ..Default::default()
        };

        for n in notifications {
            stats.total += 1;
            if !n.is_read {
                stats.unread += 1;
            }
            if n.created_at >= recent_since {
                stats.recent += 1;
            }
            *stats.by_kind.entry(n.kind).or_default() += 1;
            *stats.by_priority.entry(n.priority).or_default() += 1;
        }

        stats
    }
}
