//! Request and response bodies that are not domain types

use serde::{Deserialize, Serialize};

use crate::notification::NotificationId;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub storage: String,
}

/// Body of `POST /notifications/read`
#[derive(Debug, Deserialize)]
pub struct MarkReadRequest {
    pub ids: Vec<NotificationId>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdatedResponse {
    pub updated: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeletedResponse {
    pub deleted: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UnreadCountResponse {
    pub unread_count: usize,
}

/// Query of `DELETE /notifications`
#[derive(Debug, Default, Deserialize)]
pub struct DeleteAllQuery {
    /// Only delete notifications already marked read
    #[serde(default)]
    pub read_only: bool,
}
