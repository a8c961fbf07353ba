//! Presence tracking: which live connection speaks for which username.
//!
//! Binding is last-write-wins. A connection that gets displaced by a newer
//! bind for the same username is not notified; it simply stops being the
//! target of lookups.

use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::debug;

use crate::connection::ConnectionId;

#[derive(Debug, Default)]
struct PresenceMaps {
    by_user: HashMap<String, ConnectionId>,
    by_connection: HashMap<ConnectionId, String>,
}

/// Bidirectional username <-> connection registry.
///
/// Both directions live behind one lock so a lookup never observes a
/// half-applied rebind. A username maps to at most one connection and a
/// connection to at most one username.
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    maps: RwLock<PresenceMaps>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps `username` to `connection`, replacing any previous mapping in
    /// either direction.
    ///
    /// # Arguments
    ///
    /// * `username` - Name announced by `LOGIN` or a snooped `HELLO`
    /// * `connection` - The connection that now speaks for `username`
    ///
    /// If `connection` was bound to another name, that name's entry is
    /// dropped too, but only while it still points at `connection`.
    pub async fn bind(&self, username: &str, connection: ConnectionId) {
        let mut maps = self.maps.write().await;

        if let Some(previous) = maps.by_connection.insert(connection, username.to_owned()) {
            if previous != username && maps.by_user.get(&previous) == Some(&connection) {
                maps.by_user.remove(&previous);
            }
        }

        if let Some(displaced) = maps.by_user.insert(username.to_owned(), connection) {
            if displaced != connection {
                debug!("{} rebound from {} to {}", username, displaced, connection);
            }
        }
    }

    /// Returns the connection currently bound to `username`.
    ///
    /// # Returns
    ///
    /// `Some(id)` for the most recent binder, `None` when nobody holds the
    /// name.
    pub async fn resolve(&self, username: &str) -> Option<ConnectionId> {
        self.maps.read().await.by_user.get(username).copied()
    }

    /// Returns the username this connection last bound.
    pub async fn username_of(&self, connection: ConnectionId) -> Option<String> {
        self.maps.read().await.by_connection.get(&connection).cloned()
    }

    /// Drops both directions of the mapping for `connection`.
    ///
    /// Returns the username only when this connection still held its live
    /// presence; a displaced connection going away leaves the newer holder
    /// untouched. Calling it twice is harmless.
    pub async fn unbind(&self, connection: ConnectionId) -> Option<String> {
        let mut maps = self.maps.write().await;
        let username = maps.by_connection.remove(&connection)?;
        if maps.by_user.get(&username) == Some(&connection) {
            maps.by_user.remove(&username);
            Some(username)
        } else {
            None
        }
    }

    /// Number of usernames with a live connection.
    pub async fn online_count(&self) -> usize {
        self.maps.read().await.by_user.len()
    }
}
