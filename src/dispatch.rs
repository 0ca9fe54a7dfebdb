//! Turn a detected change into exactly one durable, owner-scoped notification
//!
//! The notification is persisted in the same atomic step as the check's
//! state, and only published to live connections once that commit succeeded.
//! A failed commit therefore never reaches a client.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::broadcast::{BroadcastHub, ClientEvent};
use crate::clock::Clock;
use crate::detect::{Change, ChangeKind, Detection};
use crate::monitor::{Monitor, MonitorState};
use crate::notification::{Notification, NotificationKind, NotificationSource, Priority};
use crate::storage::{MonitorStore, StorageResult};

/// What happened to a check's result
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    /// State saved; carries the notification stored and published, if any
    Committed(Option<Notification>),
    /// The monitor was deleted while the check ran; nothing was written
    MonitorGone,
}

pub struct NotificationDispatcher {
    store: Arc<dyn MonitorStore>,
    hub: BroadcastHub,
    clock: Arc<dyn Clock>,
}

impl NotificationDispatcher {
    pub fn new(store: Arc<dyn MonitorStore>, hub: BroadcastHub, clock: Arc<dyn Clock>) -> Self {
        Self { store, hub, clock }
    }

    /// Commit `state` for `monitor`, with a notification when `detection` is a change
    #[instrument(skip_all, fields(monitor_id = %monitor.id))]
    pub async fn dispatch(
        &self,
        monitor: &Monitor,
        detection: &Detection,
        state: &MonitorState,
    ) -> StorageResult<Dispatch> {
        let notification = match detection {
            Detection::Changed(change) if monitor.notification_enabled => {
                Some(build_notification(monitor, change, self.clock.now()))
            }
            Detection::Changed(_) => {
                debug!("change detected, notifications disabled");
                None
            }
            _ => None,
        };

        if !self
            .store
            .commit_check(monitor.id, state, notification.as_ref())
            .await?
        {
            return Ok(Dispatch::MonitorGone);
        }

        if let Some(n) = &notification {
            let delivered = self
                .hub
                .publish(&n.owner, ClientEvent::Notification(n.clone()));
            debug!(notification_id = %n.id, delivered, "notification dispatched");
        }

        Ok(Dispatch::Committed(notification))
    }
}

/// The notification for one detected change of `monitor`
pub fn build_notification(monitor: &Monitor, change: &Change, now: DateTime<Utc>) -> Notification {
    let kind = match change.kind {
        ChangeKind::PriceIncrease => NotificationKind::Success,
        ChangeKind::PriceDecrease => NotificationKind::Warning,
        ChangeKind::ValueChange => NotificationKind::Info,
    };

    Notification {
        id: Uuid::new_v4(),
        owner: monitor.owner.clone(),
        title: format!("Change detected: {}", monitor.name),
        message: change.summary.clone(),
        kind,
        priority: Priority::Normal,
        source: NotificationSource {
            monitor_id: monitor.id,
            strategy: monitor.strategy,
        },
        is_read: false,
        read_at: None,
        created_at: now,
        data: Some(json!({
            "url": monitor.url,
            "monitor_name": monitor.name,
            "previous_value": change.old,
            "current_value": change.new,
            "diff": change.summary,
            "change_type": change.kind.as_str(),
        })),
    }
}
