//! Open pages the worker can control and notify.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Cache-state notifications broadcast to every open client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Notification {
    CacheUpdated,
    CacheCleared,
}

pub type ClientId = u64;

type Controllers = Arc<Mutex<HashMap<ClientId, Option<String>>>>;

fn lock(controllers: &Controllers) -> MutexGuard<'_, HashMap<ClientId, Option<String>>> {
    controllers.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A connected page. Receives every notification sent after it connected
/// and leaves the registry when dropped.
pub struct ClientHandle {
    pub id: ClientId,
    receiver: broadcast::Receiver<Notification>,
    controllers: Controllers,
}

impl ClientHandle {
    pub async fn recv(&mut self) -> Option<Notification> {
        loop {
            match self.receiver.recv().await {
                Ok(notification) => return Some(notification),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(client = self.id, skipped, "client lagged behind notifications");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next pending notification without waiting.
    pub fn try_recv(&mut self) -> Option<Notification> {
        loop {
            match self.receiver.try_recv() {
                Ok(notification) => return Some(notification),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}

impl Drop for ClientHandle {
    fn drop(&mut self) {
        if lock(&self.controllers).remove(&self.id).is_some() {
            tracing::debug!(client = self.id, "client disconnected");
        }
    }
}

/// Registry of open clients and which worker version controls each.
pub struct Clients {
    controllers: Controllers,
    next_id: AtomicU64,
    sender: broadcast::Sender<Notification>,
}

impl Clients {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { controllers: Arc::default(), next_id: AtomicU64::new(1), sender }
    }

    /// Register a new, uncontrolled client.
    pub fn connect(&self) -> ClientHandle {
        self.connect_controlled(None)
    }

    /// Register a client that opened while `controller` was serving.
    pub fn connect_controlled(&self, controller: Option<&str>) -> ClientHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let receiver = self.sender.subscribe();
        lock(&self.controllers).insert(id, controller.map(str::to_string));
        tracing::debug!(client = id, ?controller, "client connected");
        ClientHandle { id, receiver, controllers: Arc::clone(&self.controllers) }
    }

    pub fn disconnect(&self, id: ClientId) -> bool {
        lock(&self.controllers).remove(&id).is_some()
    }

    /// Put every open client under `version`. Returns how many were claimed.
    pub fn claim(&self, version: &str) -> usize {
        let mut controllers = lock(&self.controllers);
        for controller in controllers.values_mut() {
            *controller = Some(version.to_string());
        }
        controllers.len()
    }

    pub fn controller(&self, id: ClientId) -> Option<String> {
        lock(&self.controllers).get(&id).cloned().flatten()
    }

    pub fn count(&self) -> usize {
        lock(&self.controllers).len()
    }

    /// Broadcast to every open client. Returns how many receivers got it.
    pub fn post_message(&self, notification: Notification) -> usize {
        self.sender.send(notification).unwrap_or(0)
    }
}
