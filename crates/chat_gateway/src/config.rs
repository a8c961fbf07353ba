//! Gateway configuration types and defaults.
//!
//! This module contains the configuration structure used to initialize the
//! gateway: where to listen for clients, where the backend lives, where the
//! account table is stored, and the per-connection resource limits.

use std::net::SocketAddr;
use std::path::PathBuf;

/// Configuration structure for the gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// The socket address client WebSocket connections are accepted on
    pub bind_address: SocketAddr,

    /// Address of the backend session transport; one TCP connection is
    /// opened to it for every accepted client
    pub backend_address: SocketAddr,

    /// Path of the JSON account table
    pub accounts_path: PathBuf,

    /// Maximum number of concurrent client connections allowed
    pub max_connections: usize,

    /// Capacity of each connection's outbound message queue
    pub outbound_queue_capacity: usize,

    /// Longest backend line (in bytes) accepted before the bridge is torn down
    pub max_line_len: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 3001)),
            backend_address: SocketAddr::from(([127, 0, 0, 1], 8080)),
            accounts_path: PathBuf::from("users.json"),
            max_connections: 1000,
            outbound_queue_capacity: 256,
            max_line_len: 1024 * 1024,
        }
    }
}
