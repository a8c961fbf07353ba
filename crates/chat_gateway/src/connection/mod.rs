//! Connection management for client connections.
//!
//! This module tracks live client connections and owns the outbound queue of
//! each one, so any bridge can deliver a line to any other connection.

pub mod client;
pub mod manager;

pub use client::ClientConnection;
pub use manager::ConnectionManager;

use std::fmt;

use uuid::Uuid;

/// Unique identifier of a client connection.
///
/// Connection IDs are what the presence registry maps usernames to; they are
/// never reused, so a stale ID simply stops resolving once its connection is
/// gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
