//! Room membership as observed from snooped `JOIN` / `LEAVE` commands.
//!
//! Rooms spring into existence on first join and are never removed, even
//! when their last member leaves.

use std::collections::{HashMap, HashSet};

use tokio::sync::RwLock;

/// Room name -> member usernames.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: RwLock<HashMap<String, HashSet<String>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `username` to `room`, creating the room if needed.
    ///
    /// # Arguments
    ///
    /// * `room` - Room name taken from a snooped `JOIN`
    /// * `username` - Member to add; joining twice is a no-op
    pub async fn join(&self, room: &str, username: &str) {
        self.rooms
            .write()
            .await
            .entry(room.to_owned())
            .or_default()
            .insert(username.to_owned());
    }

    /// Removes `username` from `room` if both exist.
    pub async fn leave(&self, room: &str, username: &str) {
        if let Some(members) = self.rooms.write().await.get_mut(room) {
            members.remove(username);
        }
    }

    /// Members of `room`; empty when the room is unknown.
    pub async fn members(&self, room: &str) -> HashSet<String> {
        self.snapshot(room).await.unwrap_or_default()
    }

    /// Membership snapshot that tells an unknown room (`None`) apart from an
    /// empty one.
    ///
    /// # Returns
    ///
    /// A copy of the member set taken under the read lock. Later joins and
    /// leaves do not affect it, which makes it safe to fan out over.
    pub async fn snapshot(&self, room: &str) -> Option<HashSet<String>> {
        self.rooms.read().await.get(room).cloned()
    }

    /// Drops `username` from every room.
    ///
    /// Called from bridge teardown. Rooms left empty are kept.
    pub async fn remove_member_everywhere(&self, username: &str) {
        for members in self.rooms.write().await.values_mut() {
            members.remove(username);
        }
    }

    /// Number of rooms ever joined, empty ones included.
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}
