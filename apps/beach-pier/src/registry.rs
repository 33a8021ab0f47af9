use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

use crate::error::DeliveryError;
use crate::protocol::ServerMessage;

/// Client-chosen name for a participant. Never validated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EndpointId(String);

impl EndpointId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EndpointId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for EndpointId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Delivery handle for one live transport connection.
///
/// The handle only holds the sending half of the connection's outbound queue;
/// the transport task owns the socket. Two handles are equal when they refer
/// to the same connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    tx: mpsc::Sender<ServerMessage>,
}

impl ConnectionHandle {
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let handle = Self {
            id: ConnectionId::generate(),
            tx,
        };
        (handle, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Enqueue a message for the connection's writer without waiting.
    pub fn deliver(&self, message: ServerMessage) -> Result<(), DeliveryError> {
        self.tx.try_send(message).map_err(|err| match err {
            TrySendError::Full(_) => DeliveryError::QueueFull,
            TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl PartialEq for ConnectionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ConnectionHandle {}

impl Hash for ConnectionHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Maps endpoint identifiers to the connection currently representing them.
///
/// At most one connection is bound to an identifier; the latest registration
/// wins. Cloning shares the same table.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    entries: Arc<DashMap<EndpointId, ConnectionHandle>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `id` to `connection`, returning whatever was bound to `id` before.
    ///
    /// A replaced connection stays open but is no longer reachable by `id`.
    /// The previous binding may be `connection` itself.
    pub fn register(
        &self,
        id: EndpointId,
        connection: ConnectionHandle,
    ) -> Option<ConnectionHandle> {
        self.entries.insert(id, connection)
    }

    pub fn resolve(&self, id: &EndpointId) -> Option<ConnectionHandle> {
        self.entries.get(id).map(|entry| entry.value().clone())
    }

    /// Drop every entry bound to `connection` and return the identifiers freed.
    ///
    /// Calling this for a connection with no entries is a no-op.
    pub fn remove_by_connection(&self, connection: &ConnectionHandle) -> Vec<EndpointId> {
        let mut removed = Vec::new();
        self.entries.retain(|id, handle| {
            if handle == connection {
                removed.push(id.clone());
                false
            } else {
                true
            }
        });
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
