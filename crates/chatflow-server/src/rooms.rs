//! Named broadcast rooms: the general room, one room per hotspot network,
//! and one per durable group. Membership is per-connection and in-memory.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::Mutex;

use chatflow_shared::types::ConnectionId;

#[derive(Clone, Default)]
pub struct Rooms {
    inner: Arc<Mutex<HashMap<String, HashSet<ConnectionId>>>>,
}

impl Rooms {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the connection to the room, creating it if needed. Returns false
    /// when the connection was already a member.
    pub async fn join(&self, room: &str, conn_id: ConnectionId) -> bool {
        let mut rooms = self.inner.lock().await;
        rooms.entry(room.to_string()).or_default().insert(conn_id)
    }

    pub async fn leave(&self, room: &str, conn_id: ConnectionId) -> bool {
        let mut rooms = self.inner.lock().await;
        let Some(members) = rooms.get_mut(room) else {
            return false;
        };
        let removed = members.remove(&conn_id);
        if members.is_empty() {
            rooms.remove(room);
        }
        removed
    }

    /// Drop the connection from every room it joined. Run on disconnect.
    pub async fn leave_all(&self, conn_id: ConnectionId) {
        let mut rooms = self.inner.lock().await;
        rooms.retain(|_, members| {
            members.remove(&conn_id);
            !members.is_empty()
        });
    }

    pub async fn members(&self, room: &str) -> Vec<ConnectionId> {
        let rooms = self.inner.lock().await;
        rooms
            .get(room)
            .map(|m| m.iter().copied().collect())
            .unwrap_or_default()
    }

    pub async fn contains(&self, room: &str, conn_id: ConnectionId) -> bool {
        let rooms = self.inner.lock().await;
        rooms.get(room).is_some_and(|m| m.contains(&conn_id))
    }
}
