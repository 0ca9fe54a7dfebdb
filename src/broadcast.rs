//! Live connection registry and event fan-out
//!
//! Each registered connection owns a bounded queue. [`BroadcastHub::publish`]
//! never waits: a connection whose queue is full or whose receiver is gone is
//! dropped from the registry on the spot, which closes its stream. Nothing is
//! buffered for owners without connections.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, trace, warn};

use crate::identity::OwnerId;
use crate::monitor::{Monitor, MonitorId};
use crate::notification::Notification;

pub type ConnectionId = u64;

/// Envelope pushed to clients: `{"type": ..., "data": ...}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    Notification(Notification),
    MonitorUpdate(MonitorUpdate),
    SystemStatus(SystemStatus),
}

/// Observed state of a monitor after one check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorUpdate {
    pub monitor_id: MonitorId,
    pub name: String,
    pub url: String,
    pub current_value: Option<String>,
    pub last_checked: Option<DateTime<Utc>>,
    /// Present only when this check produced a change
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_changed: Option<DateTime<Utc>>,
    pub has_changed: bool,
    /// Present only when this check failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MonitorUpdate {
    pub fn new(monitor: &Monitor, has_changed: bool, error: Option<String>) -> Self {
        Self {
            monitor_id: monitor.id,
            name: monitor.name.clone(),
            url: monitor.url.clone(),
            current_value: monitor.state.current_value.clone(),
            last_checked: monitor.state.last_checked,
            last_changed: monitor.state.last_changed.filter(|_| has_changed),
            has_changed,
            error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemStatus {
    pub scheduler_running: bool,
    pub active_monitors: usize,
    pub in_flight_checks: usize,
    pub connections: usize,
    pub timestamp: DateTime<Utc>,
}

struct Connection {
    id: ConnectionId,
    sender: mpsc::Sender<Arc<ClientEvent>>,
}

/// Receiving half of a registered connection
pub struct Subscription {
    pub id: ConnectionId,
    pub owner: OwnerId,
    receiver: mpsc::Receiver<Arc<ClientEvent>>,
}

impl Subscription {
    /// Next event, or `None` once the hub dropped this connection
    pub async fn recv(&mut self) -> Option<Arc<ClientEvent>> {
        self.receiver.recv().await
    }

    /// Non-waiting variant of [`Subscription::recv`]
    pub fn try_recv(&mut self) -> Option<Arc<ClientEvent>> {
        self.receiver.try_recv().ok()
    }
}

/// Registry of live connections keyed by owner
#[derive(Clone)]
pub struct BroadcastHub {
    connections: Arc<Mutex<HashMap<OwnerId, Vec<Connection>>>>,
    next_id: Arc<AtomicU64>,
    buffer: usize,
}

impl BroadcastHub {
    pub fn new(buffer: usize) -> Self {
        Self {
            connections: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            buffer: buffer.max(1),
        }
    }

    /// Register a new connection for `owner`
    pub fn register(&self, owner: &OwnerId) -> Subscription {
        let (sender, receiver) = mpsc::channel(self.buffer);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        self.lock()
            .entry(owner.clone())
            .or_default()
            .push(Connection { id, sender });

        debug!(%owner, connection = id, "connection registered");

        Subscription {
            id,
            owner: owner.clone(),
            receiver,
        }
    }

    /// Remove a connection; unknown ids are ignored
    pub fn unregister(&self, owner: &OwnerId, id: ConnectionId) {
        let mut connections = self.lock();

        if let Some(list) = connections.get_mut(owner) {
            list.retain(|c| c.id != id);
            if list.is_empty() {
                connections.remove(owner);
            }
            debug!(%owner, connection = id, "connection unregistered");
        }
    }

    /// Deliver `event` to every connection of `owner`, returning how many accepted it
    pub fn publish(&self, owner: &OwnerId, event: ClientEvent) -> usize {
        let mut connections = self.lock();

        let Some(list) = connections.get_mut(owner) else {
            trace!(%owner, "no live connections, event dropped");
            return 0;
        };

        let event = Arc::new(event);
        let delivered = fan_out(owner, list, &event);

        if list.is_empty() {
            connections.remove(owner);
        }

        delivered
    }

    /// Send a status snapshot to every connected owner
    pub fn broadcast_system_status(&self, status: SystemStatus) -> usize {
        let mut connections = self.lock();
        let event = Arc::new(ClientEvent::SystemStatus(status));

        let mut delivered = 0;
        for (owner, list) in connections.iter_mut() {
            delivered += fan_out(owner, list, &event);
        }
        connections.retain(|_, list| !list.is_empty());

        delivered
    }

    /// Live connections across all owners
    pub fn connection_count(&self) -> usize {
        self.lock().values().map(Vec::len).sum()
    }

    pub fn connections_for(&self, owner: &OwnerId) -> usize {
        self.lock().get(owner).map_or(0, Vec::len)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<OwnerId, Vec<Connection>>> {
        self.connections.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(crate::config::BroadcastConfig::default().connection_buffer)
    }
}

fn fan_out(owner: &OwnerId, list: &mut Vec<Connection>, event: &Arc<ClientEvent>) -> usize {
    let mut delivered = 0;

    list.retain(|connection| match connection.sender.try_send(Arc::clone(event)) {
        Ok(()) => {
            delivered += 1;
            true
        }
        Err(TrySendError::Full(_)) => {
            warn!(%owner, connection = connection.id, "connection too slow, disconnecting");
            false
        }
        Err(TrySendError::Closed(_)) => {
            debug!(%owner, connection = connection.id, "connection closed, removing");
            false
        }
    });

    delivered
}
