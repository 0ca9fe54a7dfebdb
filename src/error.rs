//! Engine-level error taxonomy
//!
//! Leaf errors live next to the code that raises them (`FetchError` in
//! [`crate::fetcher`], `ExtractError` in [`crate::extract`], `StorageError` in
//! [`crate::storage`]); this module ties them together for the check pipeline
//! and the service layer.

use thiserror::Error;

use crate::extract::ExtractError;
use crate::fetcher::FetchError;
use crate::identity::OwnerId;
use crate::monitor::MonitorId;
use crate::notification::NotificationId;
use crate::storage::StorageError;

/// A caller tried to touch a record owned by someone else
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("caller {caller} is not allowed to access this resource")]
pub struct AuthorizationError {
    pub caller: OwnerId,
}

/// Why a single check did not produce an observation
#[derive(Debug, Error)]
pub enum CheckError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl CheckError {
    /// Actionable text for an interactive caller
    pub fn user_hint(&self) -> String {
        match self {
            CheckError::Fetch(e) => e.user_hint(),
            CheckError::Extract(e) => e.user_hint(),
            CheckError::Storage(_) => {
                "the check ran but its result could not be saved; try again shortly".to_string()
            }
        }
    }
}

/// Errors surfaced by the service layer to CRUD callers
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("monitor {0} not found")]
    NotFound(MonitorId),

    #[error("notification {0} not found")]
    NotificationNotFound(NotificationId),

    #[error(transparent)]
    Unauthorized(#[from] AuthorizationError),

    #[error("invalid monitor configuration: {0}")]
    InvalidConfig(String),

    #[error("maximum number of monitors ({0}) reached")]
    LimitReached(usize),

    #[error("a check for monitor {0} is already in progress")]
    AlreadyInProgress(MonitorId),

    #[error("check failed: {0}")]
    Check(#[from] CheckError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("scheduler is not running")]
    SchedulerUnavailable,
}

pub type MonitorResult<T> = Result<T, MonitorError>;
