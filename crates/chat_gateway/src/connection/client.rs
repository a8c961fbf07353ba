//! Client connection representation.

use std::net::SocketAddr;
use std::time::{Duration, SystemTime};

use super::ConnectionId;

/// Metadata about one accepted client connection.
///
/// # Fields
///
/// * `id` - Handle used by the registries to refer to this connection
/// * `remote_addr` - The network address of the connected client
/// * `connected_at` - Timestamp when the connection was accepted
#[derive(Debug, Clone)]
pub struct ClientConnection {
    pub id: ConnectionId,
    pub remote_addr: SocketAddr,
    pub connected_at: SystemTime,
}

impl ClientConnection {
    /// Creates a connection record stamped with the current time and a fresh
    /// ID.
    pub fn new(remote_addr: SocketAddr) -> Self {
        Self {
            id: ConnectionId::new(),
            remote_addr,
            connected_at: SystemTime::now(),
        }
    }

    /// How long the connection has been open.
    pub fn uptime(&self) -> Duration {
        self.connected_at.elapsed().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_connections_get_distinct_ids() {
        let addr: SocketAddr = "127.0.0.1:4000".parse().unwrap();
        let a = ClientConnection::new(addr);
        let b = ClientConnection::new(addr);
        assert_ne!(a.id, b.id);
        assert_eq!(a.remote_addr, addr);
        assert!(a.uptime() < Duration::from_secs(5));
    }
}
