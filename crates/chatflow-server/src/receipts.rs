//! Read-receipt relay.
//!
//! Reading happens when the recipient fetches the conversation over HTTP;
//! the socket's `message-read` event only carries the fact back to the
//! original sender's live sessions. Receipts are fire-and-forget: a sender
//! with no live session simply misses them, and clients re-emit on every
//! conversation activation to cover that.

use uuid::Uuid;

use chatflow_shared::protocol::{ReadReceipt, ServerEvent};

use crate::sessions::Session;
use crate::state::AppState;

/// Relay a read receipt to every session of the original sender.
///
/// `reader` is the session that read the message; `sender_email` is the
/// address the original message came from.
pub async fn relay_read(
    state: &AppState,
    reader: &Session,
    sender_email: &str,
    message_id: Uuid,
) {
    let receipt = ReadReceipt {
        from: reader.email.clone(),
        message_id,
    };
    let conns = state.registry.connections_for_email(sender_email).await;
    if conns.is_empty() {
        tracing::debug!(sender = sender_email, "read receipt dropped, sender offline");
        return;
    }
    for conn in conns {
        state
            .registry
            .send_to(conn, ServerEvent::MessageReadReceipt(receipt.clone()))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatflow_shared::types::ConnectionId;

    #[tokio::test]
    async fn receipt_reaches_every_sender_session() {
        let state = AppState::for_tests();
        let sender_id = Uuid::new_v4();
        let (s1, mut rx1) = Session::new(ConnectionId::new(), sender_id, "alice", "a@x.com");
        let (s2, mut rx2) = Session::new(ConnectionId::new(), sender_id, "alice", "a@x.com");
        state.registry.register(s1).await;
        state.registry.register(s2).await;

        let (reader, _reader_rx) =
            Session::new(ConnectionId::new(), Uuid::new_v4(), "bob", "b@x.com");
        state.registry.register(reader.clone()).await;

        let message_id = Uuid::new_v4();
        relay_read(&state, &reader, "a@x.com", message_id).await;

        for rx in [&mut rx1, &mut rx2] {
            match rx.recv().await {
                Some(ServerEvent::MessageReadReceipt(r)) => {
                    assert_eq!(r.from, "b@x.com");
                    assert_eq!(r.message_id, message_id);
                }
                other => panic!("expected read receipt, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn offline_sender_is_a_no_op() {
        let state = AppState::for_tests();
        let (reader, mut reader_rx) =
            Session::new(ConnectionId::new(), Uuid::new_v4(), "bob", "b@x.com");
        state.registry.register(reader.clone()).await;

        relay_read(&state, &reader, "gone@x.com", Uuid::new_v4()).await;
        assert!(reader_rx.try_recv().is_err());
    }
}
