//! Message types for actor communication
//!
//! ## Design Principles
//!
//! 1. **Commands**: Request/response messages sent to specific actors via mpsc
//! 2. **Acknowledged mutations**: due-set changes answer on a oneshot, so a
//!    caller knows the change is in effect before the next tick
//! 3. **Reports**: what one check did, for logs and interactive callers
//! 4. **Housekeeping**: retention commands and stats

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::oneshot;

use crate::error::{CheckError, MonitorResult};
use crate::identity::{Caller, OwnerId};
use crate::monitor::{Monitor, MonitorId};
use crate::notification::NotificationId;
use crate::storage::StorageResult;

/// Commands that can be sent to the SchedulerActor
#[derive(Debug)]
pub enum SchedulerCommand {
    /// Add or refresh a monitor in the due-set
    ///
    /// Inactive monitors are removed instead.
    Register {
        monitor: Box<Monitor>,
        respond_to: oneshot::Sender<()>,
    },

    /// Remove a monitor from the due-set
    ///
    /// An in-flight check is not cancelled; it runs to completion.
    Unregister {
        monitor_id: MonitorId,
        respond_to: oneshot::Sender<()>,
    },

    /// Check a monitor immediately on behalf of `caller`
    RunNow {
        caller: Caller,
        monitor_id: MonitorId,
        respond_to: oneshot::Sender<MonitorResult<CheckOutcome>>,
    },

    /// Start every due check that fits under the concurrency cap
    ///
    /// Responds with the number of checks started.
    Tick { respond_to: oneshot::Sender<usize> },

    ListDue {
        respond_to: oneshot::Sender<Vec<DueMonitor>>,
    },

    Status {
        respond_to: oneshot::Sender<SchedulerStatus>,
    },

    /// Gracefully shut down the scheduler
    ///
    /// In-flight checks keep running to completion.
    Shutdown,
}

/// Sent by a worker task back to the scheduler when its check is over
#[derive(Debug)]
pub struct CheckFinished {
    pub monitor_id: MonitorId,

    /// When the check ran; `None` if it never got to fetch
    pub checked_at: Option<DateTime<Utc>>,

    /// The monitor turned out to be deleted or inactive
    pub drop_from_schedule: bool,
}

/// A due-set entry reported by [`SchedulerCommand::ListDue`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DueMonitor {
    pub monitor_id: MonitorId,
    pub owner: OwnerId,
    pub name: String,
    pub url: String,
    pub last_checked: Option<DateTime<Utc>>,
    pub check_interval_secs: u64,
    /// A check for this monitor is in flight right now
    pub running: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchedulerStatus {
    pub scheduled_monitors: usize,
    pub in_flight_checks: usize,
    pub max_concurrent_checks: usize,
}

/// Result of a check that produced an observation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CheckOutcome {
    /// First observation, stored silently
    Baseline { value: String },

    Unchanged { value: String },

    Changed {
        previous: String,
        current: String,
        summary: String,
        /// `None` when notifications are disabled for the monitor
        notification_id: Option<NotificationId>,
    },

    /// The monitor was deleted while the check ran
    Discarded,
}

/// What one run of the check pipeline did
#[derive(Debug)]
pub struct CheckReport {
    pub monitor_id: MonitorId,
    pub checked_at: DateTime<Utc>,
    pub result: Result<CheckOutcome, CheckError>,
}

/// Commands that can be sent to the RetentionActor
#[derive(Debug)]
pub enum RetentionCommand {
    /// Run a cleanup pass now instead of waiting for the next period
    CleanupNow {
        respond_to: oneshot::Sender<StorageResult<usize>>,
    },

    GetStats {
        respond_to: oneshot::Sender<RetentionStats>,
    },

    Shutdown,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RetentionStats {
    pub retention_days: u32,
    pub last_cleanup_time: Option<DateTime<Utc>>,
    pub total_notifications_deleted: u64,
}
