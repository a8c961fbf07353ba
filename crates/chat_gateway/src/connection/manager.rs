//! Registry of live connections and their outbound queues.

use dashmap::DashMap;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use super::ConnectionId;
use crate::error::GatewayError;

/// Manages the outbound side of every live client connection.
///
/// Each registered connection owns a bounded queue drained by its bridge.
/// Nothing here waits for queue space. Replies to a bridge's own client
/// fail when the queue is full; lines addressed to *other* connections go
/// through [`try_deliver`] and are dropped, so one stalled client cannot
/// hold up another.
///
/// [`try_deliver`]: ConnectionManager::try_deliver
#[derive(Debug, Default)]
pub struct ConnectionManager {
    connections: DashMap<ConnectionId, mpsc::Sender<String>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection and returns the receiving end of its queue.
    ///
    /// # Arguments
    ///
    /// * `id` - The new connection
    /// * `capacity` - Queue depth; values below one are raised to one
    ///
    /// # Returns
    ///
    /// The receiver the connection's bridge drains into its WebSocket.
    pub fn register(&self, id: ConnectionId, capacity: usize) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        self.connections.insert(id, tx);
        rx
    }

    /// Forgets a connection. Returns `false` if it was already gone.
    pub fn remove(&self, id: ConnectionId) -> bool {
        self.connections.remove(&id).is_some()
    }

    /// Whether `id` is registered and not yet torn down.
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    /// Queues a reply for `id` on behalf of its own bridge.
    ///
    /// The bridge is the only reader of its queue, so this never waits: a
    /// full queue means the client has stopped keeping up and is an error.
    pub fn send_to_connection(&self, id: ConnectionId, line: String) -> Result<(), GatewayError> {
        let sender = self
            .connections
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| GatewayError::Network(format!("Connection {id} not found")))?;

        sender.try_send(line).map_err(|e| match e {
            TrySendError::Full(_) => {
                GatewayError::Network(format!("Outbound queue full for connection {id}"))
            }
            TrySendError::Closed(_) => GatewayError::Network(format!("Connection {id} closed")),
        })
    }

    /// Queues a line for another connection without waiting.
    ///
    /// # Arguments
    ///
    /// * `id` - Recipient connection
    /// * `line` - Complete protocol line, without a trailing newline
    ///
    /// # Returns
    ///
    /// `true` if the line was queued. `false` if the recipient is unknown,
    /// already closed, or has a full queue; a full queue is logged.
    pub fn try_deliver(&self, id: ConnectionId, line: String) -> bool {
        let Some(sender) = self.connections.get(&id).map(|entry| entry.value().clone()) else {
            debug!("Dropping line for unknown connection {}", id);
            return false;
        };

        match sender.try_send(line) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("Outbound queue full for connection {}, dropping line", id);
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Connection {} closed before delivery", id);
                false
            }
        }
    }

    /// Number of registered connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}
