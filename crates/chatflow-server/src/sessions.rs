//! The in-memory session registry: the source of truth for "who is online".
//!
//! A [`Session`] binds one live connection to one authenticated user. Users
//! may hold several concurrent sessions (multi-device); the online-users
//! snapshot de-duplicates them. Sessions are owned exclusively by the
//! registry and vanish with the process.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use chatflow_shared::protocol::{OnlineUser, ServerEvent};
use chatflow_shared::types::ConnectionId;

/// Outbound capacity per connection. A slow consumer that falls this far
/// behind starts losing events rather than stalling the handlers.
const OUTBOUND_BUFFER: usize = 64;

/// One live, authenticated connection.
#[derive(Debug, Clone)]
pub struct Session {
    pub conn_id: ConnectionId,
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    /// Derived network id, once detection has run.
    pub network_id: Option<String>,
    /// Hotspot display color assigned within the network group.
    pub color: Option<String>,
    tx: mpsc::Sender<ServerEvent>,
}

impl Session {
    pub fn new(
        conn_id: ConnectionId,
        user_id: Uuid,
        username: &str,
        email: &str,
    ) -> (Self, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_BUFFER);
        let session = Self {
            conn_id,
            user_id,
            username: username.to_string(),
            email: email.to_string(),
            network_id: None,
            color: None,
            tx,
        };
        (session, rx)
    }

    pub fn online_user(&self) -> OnlineUser {
        OnlineUser {
            id: self.user_id,
            username: self.username.clone(),
            email: self.email.clone(),
        }
    }
}

/// Connection -> session mapping for the whole process.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<Mutex<HashMap<ConnectionId, Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the mapping. Multiple simultaneous connections per identity
    /// are expected.
    pub async fn register(&self, session: Session) {
        let mut sessions = self.inner.lock().await;
        tracing::debug!(conn = %session.conn_id.short(), user = %session.email, "session registered");
        sessions.insert(session.conn_id, session);
    }

    /// Remove the mapping, returning the removed session so the caller can
    /// run disconnect notifications.
    pub async fn unregister(&self, conn_id: ConnectionId) -> Option<Session> {
        let mut sessions = self.inner.lock().await;
        let removed = sessions.remove(&conn_id);
        if let Some(session) = &removed {
            tracing::debug!(conn = %conn_id.short(), user = %session.email, "session unregistered");
        }
        removed
    }

    pub async fn get(&self, conn_id: ConnectionId) -> Option<Session> {
        self.inner.lock().await.get(&conn_id).cloned()
    }

    /// Record the network assignment made by the grouping engine.
    pub async fn set_network(&self, conn_id: ConnectionId, network_id: &str, color: &str) {
        let mut sessions = self.inner.lock().await;
        if let Some(session) = sessions.get_mut(&conn_id) {
            session.network_id = Some(network_id.to_string());
            session.color = Some(color.to_string());
        }
    }

    /// Snapshot of distinct online identities. A user with several live
    /// connections appears exactly once.
    pub async fn online_users(&self) -> Vec<OnlineUser> {
        let sessions = self.inner.lock().await;
        let mut seen: HashMap<Uuid, OnlineUser> = HashMap::new();
        for session in sessions.values() {
            seen.entry(session.user_id)
                .or_insert_with(|| session.online_user());
        }
        seen.into_values().collect()
    }

    /// All connection ids currently held by the given email.
    pub async fn connections_for_email(&self, email: &str) -> Vec<ConnectionId> {
        let sessions = self.inner.lock().await;
        sessions
            .values()
            .filter(|s| s.email == email)
            .map(|s| s.conn_id)
            .collect()
    }

    /// Whether the identity still holds any other connection.
    pub async fn has_other_connections(&self, user_id: Uuid, except: ConnectionId) -> bool {
        let sessions = self.inner.lock().await;
        sessions
            .values()
            .any(|s| s.user_id == user_id && s.conn_id != except)
    }

    /// Send an event to one connection. Errors (gone or saturated peer)
    /// are dropped: receipts and notifications are fire-and-forget.
    pub async fn send_to(&self, conn_id: ConnectionId, event: ServerEvent) {
        let tx = {
            let sessions = self.inner.lock().await;
            sessions.get(&conn_id).map(|s| s.tx.clone())
        };
        if let Some(tx) = tx {
            if tx.send(event).await.is_err() {
                tracing::debug!(conn = %conn_id.short(), "dropping event for closed connection");
            }
        }
    }

    /// Send an event to every registered connection.
    pub async fn broadcast(&self, event: ServerEvent) {
        let txs: Vec<_> = {
            let sessions = self.inner.lock().await;
            sessions.values().map(|s| s.tx.clone()).collect()
        };
        for tx in txs {
            let _ = tx.send(event.clone()).await;
        }
    }

    /// Broadcast the current online-users snapshot to everyone. Called on
    /// every register and unregister.
    pub async fn broadcast_online_users(&self) {
        let users = self.online_users().await;
        tracing::debug!(count = users.len(), "broadcasting online users");
        self.broadcast(ServerEvent::OnlineUsersUpdated(users)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(user_id: Uuid, email: &str) -> (Session, mpsc::Receiver<ServerEvent>) {
        Session::new(ConnectionId::new(), user_id, "user", email)
    }

    #[tokio::test]
    async fn online_once_despite_multiple_connections() {
        let registry = SessionRegistry::new();
        let user_id = Uuid::new_v4();

        let (s1, _rx1) = session(user_id, "a@x.com");
        let (s2, _rx2) = session(user_id, "a@x.com");
        registry.register(s1).await;
        registry.register(s2).await;

        let online = registry.online_users().await;
        assert_eq!(online.len(), 1);
        assert_eq!(online[0].email, "a@x.com");
    }

    #[tokio::test]
    async fn unregister_removes_identity_when_last_connection_closes() {
        let registry = SessionRegistry::new();
        let user_id = Uuid::new_v4();

        let (s1, _rx1) = session(user_id, "a@x.com");
        let (s2, _rx2) = session(user_id, "a@x.com");
        let (c1, c2) = (s1.conn_id, s2.conn_id);
        registry.register(s1).await;
        registry.register(s2).await;

        registry.unregister(c1).await;
        assert!(registry.has_other_connections(user_id, c1).await);
        assert_eq!(registry.online_users().await.len(), 1);

        registry.unregister(c2).await;
        assert!(!registry.has_other_connections(user_id, c2).await);
        assert!(registry.online_users().await.is_empty());
    }

    #[tokio::test]
    async fn send_to_delivers_and_tolerates_gone_peers() {
        let registry = SessionRegistry::new();
        let (s, mut rx) = session(Uuid::new_v4(), "a@x.com");
        let conn = s.conn_id;
        registry.register(s).await;

        registry
            .send_to(conn, ServerEvent::JoinedGeneralChat)
            .await;
        assert_eq!(rx.recv().await, Some(ServerEvent::JoinedGeneralChat));

        drop(rx);
        // Must not panic or error.
        registry
            .send_to(conn, ServerEvent::JoinedGeneralChat)
            .await;
    }

    #[tokio::test]
    async fn connections_for_email_filters() {
        let registry = SessionRegistry::new();
        let (a, _ra) = session(Uuid::new_v4(), "a@x.com");
        let (b, _rb) = session(Uuid::new_v4(), "b@x.com");
        let a_conn = a.conn_id;
        registry.register(a).await;
        registry.register(b).await;

        let conns = registry.connections_for_email("a@x.com").await;
        assert_eq!(conns, vec![a_conn]);
    }
}
