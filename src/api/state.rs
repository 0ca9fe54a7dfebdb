//! API shared state containing service handles

use std::sync::Arc;

use crate::broadcast::BroadcastHub;
use crate::identity::IdentityResolver;
use crate::service::{MonitorService, NotificationService};

/// Shared state passed to all API handlers
#[derive(Clone)]
pub struct ApiState {
    pub monitors: MonitorService,

    pub notifications: NotificationService,

    /// Live connection registry for the stream endpoint
    pub hub: BroadcastHub,

    /// Maps bearer tokens to callers
    pub resolver: Arc<dyn IdentityResolver>,
}

impl ApiState {
    pub fn new(
        monitors: MonitorService,
        notifications: NotificationService,
        hub: BroadcastHub,
        resolver: Arc<dyn IdentityResolver>,
    ) -> Self {
        Self {
            monitors,
            notifications,
            hub,
            resolver,
        }
    }
}
