//! The message pipeline: validation, persistence, and fan-out for every
//! message class, plus the edit/delete/react mutations shared by the
//! socket and HTTP surfaces.

use chrono::Utc;
use uuid::Uuid;

use chatflow_shared::constants::{
    GENERAL_ROOM, GROUP_REPLAY_LIMIT, MAX_FILE_BYTES, MAX_GROUP_NAME_LEN, MAX_MESSAGE_LEN,
    TOMBSTONE_CONTENT,
};
use chatflow_shared::protocol::{
    ChatMessagePayload, DeliveredReceipt, GroupMessageKind, GroupMessagePayload, GroupSummary,
    HotspotMessagePayload, PrivateMessagePayload, ServerEvent,
};
use chatflow_shared::types::FileAttachment;
use chatflow_shared::DeliveryStatus;
use chatflow_store::{Group, GroupMessage, Message, MessageKind, Reaction, StoreError, User};

use crate::error::ServerError;
use crate::hotspot::hotspot_room;
use crate::sessions::Session;
use crate::state::AppState;

/// Room carrying the realtime stream of one durable group.
pub fn group_room(group_id: Uuid) -> String {
    format!("group-{group_id}")
}

/// Reject content that is empty (unless a file rides along) or over the
/// length cap.
pub fn validate_content(message: &str, file: Option<&FileAttachment>) -> Result<(), ServerError> {
    if message.trim().is_empty() && file.is_none() {
        return Err(ServerError::Validation("message content is required".into()));
    }
    if message.chars().count() > MAX_MESSAGE_LEN {
        return Err(ServerError::Validation(format!(
            "message exceeds {MAX_MESSAGE_LEN} characters"
        )));
    }
    if let Some(file) = file {
        let decoded = file
            .decoded_len()
            .ok_or_else(|| ServerError::Validation("file data is not valid base64".into()))?;
        if decoded > MAX_FILE_BYTES {
            return Err(ServerError::Validation(format!(
                "file exceeds {MAX_FILE_BYTES} bytes"
            )));
        }
    }
    Ok(())
}

/// Deliver an event to every connection in a room.
pub async fn emit_to_room(state: &AppState, room: &str, event: ServerEvent) {
    for conn in state.rooms.members(room).await {
        state.registry.send_to(conn, event.clone()).await;
    }
}

// ---------------------------------------------------------------------------
// Sending
// ---------------------------------------------------------------------------

/// Persist a general-room message and broadcast it to the room, sender
/// included.
pub async fn send_general(
    state: &AppState,
    session: &Session,
    content: &str,
    file: Option<FileAttachment>,
) -> Result<(), ServerError> {
    validate_content(content, file.as_ref())?;

    let mut record = Message::new(
        session.user_id,
        &session.username,
        &session.email,
        content,
        MessageKind::General,
    );
    record.file = file;

    {
        let db = state.db.lock().await;
        db.insert_message(&record)?;
    }
    tracing::debug!(id = %record.id, sender = %session.email, "general message");

    let payload = ChatMessagePayload {
        id: record.id,
        username: record.sender_username,
        email: record.sender_email,
        message: record.content,
        timestamp: record.created_at,
        file: record.file,
    };
    emit_to_room(state, GENERAL_ROOM, ServerEvent::NewMessage(payload)).await;
    Ok(())
}

/// Persist a private message and deliver it to every session of both ends.
///
/// The sender always receives a `private-message-sent` ack; a delivered
/// receipt is attached only when the recipient holds at least one live
/// connection at send time. An unknown recipient is reported back on the
/// sender's own connection rather than as an error.
pub async fn send_private(
    state: &AppState,
    session: &Session,
    to_email: &str,
    content: &str,
    file: Option<FileAttachment>,
) -> Result<(), ServerError> {
    validate_content(content, file.as_ref())?;

    let recipient = {
        let db = state.db.lock().await;
        db.find_user_by_email(to_email)
    };
    let recipient = match recipient {
        Ok(user) => user,
        Err(StoreError::NotFound) => {
            state
                .registry
                .send_to(
                    session.conn_id,
                    ServerEvent::UserNotFound {
                        email: to_email.to_string(),
                    },
                )
                .await;
            return Ok(());
        }
        Err(other) => return Err(other.into()),
    };

    let mut record = Message::new(
        session.user_id,
        &session.username,
        &session.email,
        content,
        MessageKind::Private,
    );
    record.recipient_id = Some(recipient.id);
    record.recipient_email = Some(recipient.email.clone());
    record.file = file;

    {
        let db = state.db.lock().await;
        db.insert_message(&record)?;
    }

    let payload = PrivateMessagePayload {
        id: record.id,
        from: session.username.clone(),
        from_email: session.email.clone(),
        to: recipient.email.clone(),
        message: record.content.clone(),
        status: DeliveryStatus::Sent,
        timestamp: record.created_at,
        file: record.file.clone(),
    };

    let recipient_conns = state.registry.connections_for_email(&recipient.email).await;
    let delivered = !recipient_conns.is_empty();
    for conn in recipient_conns {
        state
            .registry
            .send_to(conn, ServerEvent::NewPrivateMessage(payload.clone()))
            .await;
    }

    state
        .registry
        .send_to(session.conn_id, ServerEvent::PrivateMessageSent(payload))
        .await;
    if delivered {
        state
            .registry
            .send_to(
                session.conn_id,
                ServerEvent::MessageDeliveredReceipt(DeliveredReceipt {
                    to: recipient.email,
                    message_id: record.id,
                    timestamp: Utc::now(),
                }),
            )
            .await;
    }
    Ok(())
}

/// Append a message to a group's stream and broadcast it to the group
/// room. Non-members are dropped silently: the event is acked nowhere and
/// nothing is persisted.
pub async fn send_group(
    state: &AppState,
    session: &Session,
    group_id: Uuid,
    content: &str,
    file: Option<FileAttachment>,
) -> Result<(), ServerError> {
    validate_content(content, file.as_ref())?;

    let record = {
        let db = state.db.lock().await;
        let group = db.find_group_by_id(group_id)?;
        if !group.is_member(&session.email) {
            tracing::debug!(group = %group_id, sender = %session.email, "dropping message from non-member");
            return Ok(());
        }
        let record = GroupMessage {
            id: Uuid::new_v4(),
            group_id,
            sender: session.email.clone(),
            sender_name: session.username.clone(),
            content: content.to_string(),
            kind: GroupMessageKind::Text,
            file,
            timestamp: Utc::now(),
        };
        db.insert_group_message(&record)?;
        db.touch_group_activity(group_id, record.timestamp)?;
        record
    };

    emit_to_room(
        state,
        &group_room(group_id),
        ServerEvent::GroupMessage(group_message_payload(&record)),
    )
    .await;
    Ok(())
}

/// Broadcast a hotspot message to the sender's network room, sender
/// included. Hotspot traffic is never persisted.
pub async fn send_hotspot(
    state: &AppState,
    session: &Session,
    content: &str,
    file: Option<FileAttachment>,
) -> Result<(), ServerError> {
    validate_content(content, file.as_ref())?;

    let (Some(network_id), Some(color)) = (&session.network_id, &session.color) else {
        return Err(ServerError::Validation(
            "not a member of a hotspot group".into(),
        ));
    };

    let payload = HotspotMessagePayload {
        id: Uuid::new_v4(),
        color: color.clone(),
        message: content.to_string(),
        timestamp: Utc::now(),
        file,
    };
    emit_to_room(
        state,
        &hotspot_room(network_id),
        ServerEvent::NewHotspotMessage(payload),
    )
    .await;
    Ok(())
}

// ---------------------------------------------------------------------------
// Groups
// ---------------------------------------------------------------------------

/// Create a durable group, announce it with a system notice, and pull the
/// creator plus every connected member into the group room.
pub async fn create_group(
    state: &AppState,
    session: &Session,
    name: &str,
    members: Vec<String>,
) -> Result<GroupSummary, ServerError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ServerError::Validation("group name is required".into()));
    }
    if name.chars().count() > MAX_GROUP_NAME_LEN {
        return Err(ServerError::Validation(format!(
            "group name exceeds {MAX_GROUP_NAME_LEN} characters"
        )));
    }
    if members.is_empty() {
        return Err(ServerError::Validation(
            "a group needs at least one member".into(),
        ));
    }

    // Creator is always a member, listed first.
    let mut all_members = vec![session.email.clone()];
    for email in members {
        if !all_members.contains(&email) {
            all_members.push(email);
        }
    }

    let now = Utc::now();
    let group = Group {
        id: Uuid::new_v4(),
        name: name.to_string(),
        members: all_members,
        created_by: session.email.clone(),
        created_at: now,
        last_activity: now,
    };
    let notice = GroupMessage {
        id: Uuid::new_v4(),
        group_id: group.id,
        sender: "system".to_string(),
        sender_name: "System".to_string(),
        content: format!("{} created the group \"{}\"", session.username, group.name),
        kind: GroupMessageKind::System,
        file: None,
        timestamp: now,
    };

    {
        let db = state.db.lock().await;
        db.create_group(&group)?;
        db.insert_group_message(&notice)?;
    }
    tracing::info!(group = %group.id, name = %group.name, members = group.members.len(), "group created");

    let summary = group_summary(&group);
    let room = group_room(group.id);
    for email in &group.members {
        for conn in state.registry.connections_for_email(email).await {
            state.rooms.join(&room, conn).await;
            state
                .registry
                .send_to(conn, ServerEvent::GroupCreated(summary.clone()))
                .await;
        }
    }
    emit_to_room(
        state,
        &room,
        ServerEvent::GroupMessage(group_message_payload(&notice)),
    )
    .await;
    Ok(summary)
}

/// The caller's groups, most recently active first.
pub async fn list_groups(state: &AppState, email: &str) -> Result<Vec<GroupSummary>, ServerError> {
    let groups = {
        let db = state.db.lock().await;
        db.find_groups_by_member_email(email)?
    };
    Ok(groups.iter().map(group_summary).collect())
}

/// Join a group's realtime room and replay its recent history.
///
/// Unknown groups and non-members are ignored without a reply, so probing
/// for group ids learns nothing.
pub async fn join_group(
    state: &AppState,
    session: &Session,
    group_id: Uuid,
) -> Result<(), ServerError> {
    let recent = {
        let db = state.db.lock().await;
        let group = match db.find_group_by_id(group_id) {
            Ok(group) => group,
            Err(StoreError::NotFound) => return Ok(()),
            Err(other) => return Err(other.into()),
        };
        if !group.is_member(&session.email) {
            return Ok(());
        }
        db.recent_group_messages(group_id, GROUP_REPLAY_LIMIT)?
    };

    state.rooms.join(&group_room(group_id), session.conn_id).await;
    let replay = recent.iter().map(group_message_payload).collect();
    state
        .registry
        .send_to(session.conn_id, ServerEvent::GroupMessages(replay))
        .await;
    Ok(())
}

fn group_summary(group: &Group) -> GroupSummary {
    GroupSummary {
        id: group.id,
        name: group.name.clone(),
        members: group.members.clone(),
        created_by: group.created_by.clone(),
        last_activity: group.last_activity,
    }
}

fn group_message_payload(record: &GroupMessage) -> GroupMessagePayload {
    GroupMessagePayload {
        id: record.id,
        group_id: record.group_id,
        sender: record.sender.clone(),
        sender_name: record.sender_name.clone(),
        message: record.content.clone(),
        kind: record.kind,
        timestamp: record.timestamp,
        file: record.file.clone(),
    }
}

// ---------------------------------------------------------------------------
// Mutations
// ---------------------------------------------------------------------------

/// Replace a message's content. Only the sender may edit, and a deleted
/// message stays deleted.
pub async fn edit_message(
    state: &AppState,
    user_id: Uuid,
    message_id: Uuid,
    content: &str,
) -> Result<Message, ServerError> {
    validate_content(content, None)?;

    let db = state.db.lock().await;
    let message = db.get_message(message_id)?;
    if message.sender_id != user_id {
        return Err(ServerError::Forbidden(
            "only the sender may edit a message".into(),
        ));
    }
    if message.is_deleted {
        return Err(ServerError::AlreadyDeleted);
    }
    db.apply_edit(message_id, content, Utc::now())?;
    let updated = db.get_message(message_id)?;
    Ok(updated)
}

/// Soft-delete a message, replacing its content with the tombstone text.
/// Reactions and metadata are kept.
pub async fn delete_message(
    state: &AppState,
    user_id: Uuid,
    message_id: Uuid,
) -> Result<Message, ServerError> {
    let db = state.db.lock().await;
    let message = db.get_message(message_id)?;
    if message.sender_id != user_id {
        return Err(ServerError::Forbidden(
            "only the sender may delete a message".into(),
        ));
    }
    if message.is_deleted {
        return Err(ServerError::AlreadyDeleted);
    }
    db.apply_soft_delete(message_id, TOMBSTONE_CONTENT, Utc::now())?;
    let updated = db.get_message(message_id)?;
    Ok(updated)
}

/// Toggle a reaction: a second identical (user, emoji) pair removes the
/// first. Anyone may react; deleted messages may not gain reactions.
pub async fn toggle_reaction(
    state: &AppState,
    user: &User,
    message_id: Uuid,
    emoji: &str,
) -> Result<Message, ServerError> {
    if emoji.is_empty() {
        return Err(ServerError::Validation("emoji is required".into()));
    }

    let db = state.db.lock().await;
    let message = db.get_message(message_id)?;
    if message.is_deleted {
        return Err(ServerError::AlreadyDeleted);
    }

    let mut reactions = message.reactions;
    let existing = reactions
        .iter()
        .position(|r| r.user_id == user.id && r.emoji == emoji);
    match existing {
        Some(index) => {
            reactions.remove(index);
        }
        None => reactions.push(Reaction {
            user_id: user.id,
            username: user.username.clone(),
            emoji: emoji.to_string(),
            created_at: Utc::now(),
        }),
    }
    db.set_reactions(message_id, &reactions)?;
    let updated = db.get_message(message_id)?;
    Ok(updated)
}

/// Remove one specific reaction without toggling. Removing a reaction the
/// user never placed is a no-op.
pub async fn remove_reaction(
    state: &AppState,
    user_id: Uuid,
    message_id: Uuid,
    emoji: &str,
) -> Result<Message, ServerError> {
    let db = state.db.lock().await;
    let message = db.get_message(message_id)?;

    let mut reactions = message.reactions;
    let before = reactions.len();
    reactions.retain(|r| !(r.user_id == user_id && r.emoji == emoji));
    if reactions.len() != before {
        db.set_reactions(message_id, &reactions)?;
    }
    let updated = db.get_message(message_id)?;
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatflow_shared::types::ConnectionId;
    use chatflow_store::Database;

    fn seed_user(db: &Database, username: &str, email: &str) -> User {
        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            email: email.to_string(),
            password_hash: Some("x".into()),
            google_id: None,
            is_online: false,
            last_seen: Utc::now(),
            created_at: Utc::now(),
        };
        db.create_user(&user).unwrap();
        user
    }

    async fn connect(state: &AppState, user: &User) -> (Session, tokio::sync::mpsc::Receiver<ServerEvent>) {
        let (session, rx) = Session::new(ConnectionId::new(), user.id, &user.username, &user.email);
        state.registry.register(session.clone()).await;
        (session, rx)
    }

    #[test]
    fn content_validation() {
        assert!(validate_content("hello", None).is_ok());
        assert!(validate_content("  ", None).is_err());
        // A file can carry an empty caption.
        let file = FileAttachment {
            data: "aGk=".into(),
            kind: "text/plain".into(),
            name: "hi.txt".into(),
            size: 2,
        };
        assert!(validate_content("", Some(&file)).is_ok());
        let long = "x".repeat(MAX_MESSAGE_LEN + 1);
        assert!(validate_content(&long, None).is_err());

        let garbage = FileAttachment {
            data: "!!not base64!!".into(),
            kind: "image".into(),
            name: "x.png".into(),
            size: 10,
        };
        assert!(validate_content("caption", Some(&garbage)).is_err());
    }

    #[tokio::test]
    async fn general_message_reaches_room_members_including_sender() {
        let state = AppState::for_tests();
        let (alice, bob) = {
            let db = state.db.lock().await;
            (seed_user(&db, "alice", "a@x.com"), seed_user(&db, "bob", "b@x.com"))
        };
        let (alice_s, mut alice_rx) = connect(&state, &alice).await;
        let (bob_s, mut bob_rx) = connect(&state, &bob).await;
        state.rooms.join(GENERAL_ROOM, alice_s.conn_id).await;
        state.rooms.join(GENERAL_ROOM, bob_s.conn_id).await;

        send_general(&state, &alice_s, "hello room", None).await.unwrap();

        for rx in [&mut alice_rx, &mut bob_rx] {
            match rx.recv().await {
                Some(ServerEvent::NewMessage(payload)) => {
                    assert_eq!(payload.message, "hello room");
                    assert_eq!(payload.email, "a@x.com");
                }
                other => panic!("expected new-message, got {other:?}"),
            }
        }

        let db = state.db.lock().await;
        let page = db.general_messages(1, 50).unwrap();
        assert_eq!(page.items.len(), 1);
    }

    #[tokio::test]
    async fn private_message_delivers_acks_and_receipts() {
        let state = AppState::for_tests();
        let (alice, bob) = {
            let db = state.db.lock().await;
            (seed_user(&db, "alice", "a@x.com"), seed_user(&db, "bob", "b@x.com"))
        };
        let (alice_s, mut alice_rx) = connect(&state, &alice).await;
        let (_bob_s, mut bob_rx) = connect(&state, &bob).await;

        send_private(&state, &alice_s, "b@x.com", "psst", None).await.unwrap();

        match bob_rx.recv().await {
            Some(ServerEvent::NewPrivateMessage(p)) => {
                assert_eq!(p.from_email, "a@x.com");
                assert_eq!(p.message, "psst");
            }
            other => panic!("expected new-private-message, got {other:?}"),
        }
        assert!(matches!(
            alice_rx.recv().await,
            Some(ServerEvent::PrivateMessageSent(_))
        ));
        // Bob was online, so a delivered receipt follows the ack.
        match alice_rx.recv().await {
            Some(ServerEvent::MessageDeliveredReceipt(r)) => assert_eq!(r.to, "b@x.com"),
            other => panic!("expected delivered receipt, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn offline_recipient_gets_no_delivered_receipt() {
        let state = AppState::for_tests();
        let (alice, _bob) = {
            let db = state.db.lock().await;
            (seed_user(&db, "alice", "a@x.com"), seed_user(&db, "bob", "b@x.com"))
        };
        let (alice_s, mut alice_rx) = connect(&state, &alice).await;

        send_private(&state, &alice_s, "b@x.com", "anyone home?", None)
            .await
            .unwrap();

        assert!(matches!(
            alice_rx.recv().await,
            Some(ServerEvent::PrivateMessageSent(_))
        ));
        assert!(alice_rx.try_recv().is_err(), "no delivered receipt expected");

        // The message is still persisted for later pickup.
        let db = state.db.lock().await;
        let bob = db.find_user_by_email("b@x.com").unwrap();
        assert_eq!(db.unread_count(bob.id).unwrap(), 1);
    }

    #[tokio::test]
    async fn unknown_recipient_reports_user_not_found() {
        let state = AppState::for_tests();
        let alice = {
            let db = state.db.lock().await;
            seed_user(&db, "alice", "a@x.com")
        };
        let (alice_s, mut alice_rx) = connect(&state, &alice).await;

        send_private(&state, &alice_s, "ghost@x.com", "hello?", None)
            .await
            .unwrap();

        match alice_rx.recv().await {
            Some(ServerEvent::UserNotFound { email }) => assert_eq!(email, "ghost@x.com"),
            other => panic!("expected user-not-found, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn group_flow_create_send_replay() {
        let state = AppState::for_tests();
        let (alice, bob) = {
            let db = state.db.lock().await;
            (seed_user(&db, "alice", "a@x.com"), seed_user(&db, "bob", "b@x.com"))
        };
        let (alice_s, mut alice_rx) = connect(&state, &alice).await;
        let (bob_s, mut bob_rx) = connect(&state, &bob).await;

        let summary = create_group(&state, &alice_s, "Team", vec!["b@x.com".into()])
            .await
            .unwrap();
        assert_eq!(summary.members, vec!["a@x.com", "b@x.com"]);

        // Both connected members were pulled into the room and told.
        assert!(matches!(alice_rx.recv().await, Some(ServerEvent::GroupCreated(_))));
        assert!(matches!(bob_rx.recv().await, Some(ServerEvent::GroupCreated(_))));
        // Creation system notice reaches the room.
        match alice_rx.recv().await {
            Some(ServerEvent::GroupMessage(p)) => {
                assert_eq!(p.kind, GroupMessageKind::System);
                assert_eq!(p.sender, "system");
            }
            other => panic!("expected system notice, got {other:?}"),
        }
        let _ = bob_rx.recv().await;

        send_group(&state, &bob_s, summary.id, "hi team", None).await.unwrap();
        match alice_rx.recv().await {
            Some(ServerEvent::GroupMessage(p)) => assert_eq!(p.message, "hi team"),
            other => panic!("expected group-message, got {other:?}"),
        }

        // A re-join replays the stream oldest-first: notice then message.
        join_group(&state, &alice_s, summary.id).await.unwrap();
        match alice_rx.recv().await {
            Some(ServerEvent::GroupMessages(items)) => {
                assert_eq!(items.len(), 2);
                assert_eq!(items[0].kind, GroupMessageKind::System);
                assert_eq!(items[1].message, "hi team");
            }
            other => panic!("expected group-messages replay, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_member_group_sends_are_dropped_silently() {
        let state = AppState::for_tests();
        let (alice, eve) = {
            let db = state.db.lock().await;
            (seed_user(&db, "alice", "a@x.com"), seed_user(&db, "eve", "e@x.com"))
        };
        let (alice_s, _alice_rx) = connect(&state, &alice).await;
        let (eve_s, mut eve_rx) = connect(&state, &eve).await;

        let summary = create_group(&state, &alice_s, "Private club", vec!["a@x.com".into()])
            .await
            .unwrap();

        send_group(&state, &eve_s, summary.id, "let me in", None)
            .await
            .unwrap();
        assert!(eve_rx.try_recv().is_err(), "no reply to a dropped send");

        let db = state.db.lock().await;
        // Only the creation notice exists.
        assert_eq!(db.count_group_messages(summary.id).unwrap(), 1);
    }

    #[tokio::test]
    async fn group_creation_rejects_bad_names() {
        let state = AppState::for_tests();
        let alice = {
            let db = state.db.lock().await;
            seed_user(&db, "alice", "a@x.com")
        };
        let (alice_s, _rx) = connect(&state, &alice).await;

        let err = create_group(&state, &alice_s, "  ", vec!["b@x.com".into()]).await;
        assert!(matches!(err, Err(ServerError::Validation(_))));

        let long = "g".repeat(MAX_GROUP_NAME_LEN + 1);
        let err = create_group(&state, &alice_s, &long, vec!["b@x.com".into()]).await;
        assert!(matches!(err, Err(ServerError::Validation(_))));

        let err = create_group(&state, &alice_s, "Team", vec![]).await;
        assert!(matches!(err, Err(ServerError::Validation(_))));
    }

    #[tokio::test]
    async fn hotspot_sends_stay_in_memory() {
        let state = AppState::for_tests();
        let alice = {
            let db = state.db.lock().await;
            seed_user(&db, "alice", "a@x.com")
        };
        let (mut alice_s, mut alice_rx) = connect(&state, &alice).await;

        let membership = state.networks.join("192.168.1", alice_s.conn_id).await;
        alice_s.network_id = Some(membership.network_id.clone());
        alice_s.color = Some(membership.color.clone());
        state
            .rooms
            .join(&hotspot_room("192.168.1"), alice_s.conn_id)
            .await;

        send_hotspot(&state, &alice_s, "anyone on this wifi?", None)
            .await
            .unwrap();
        match alice_rx.recv().await {
            Some(ServerEvent::NewHotspotMessage(p)) => {
                assert_eq!(p.color, membership.color);
                assert_eq!(p.message, "anyone on this wifi?");
            }
            other => panic!("expected hotspot message echo, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn edit_is_sender_only_and_respects_tombstones() {
        let state = AppState::for_tests();
        let (alice, bob) = {
            let db = state.db.lock().await;
            (seed_user(&db, "alice", "a@x.com"), seed_user(&db, "bob", "b@x.com"))
        };
        let message = {
            let db = state.db.lock().await;
            let m = Message::new(alice.id, "alice", "a@x.com", "first", MessageKind::General);
            db.insert_message(&m).unwrap();
            m
        };

        let err = edit_message(&state, bob.id, message.id, "hijack").await;
        assert!(matches!(err, Err(ServerError::Forbidden(_))));

        let updated = edit_message(&state, alice.id, message.id, "second").await.unwrap();
        assert_eq!(updated.content, "second");
        assert!(updated.is_edited);

        let deleted = delete_message(&state, alice.id, message.id).await.unwrap();
        assert_eq!(deleted.content, TOMBSTONE_CONTENT);
        assert!(deleted.is_deleted);

        let err = edit_message(&state, alice.id, message.id, "third").await;
        assert!(matches!(err, Err(ServerError::AlreadyDeleted)));
        let err = delete_message(&state, alice.id, message.id).await;
        assert!(matches!(err, Err(ServerError::AlreadyDeleted)));
    }

    #[tokio::test]
    async fn reactions_toggle_per_user_and_emoji() {
        let state = AppState::for_tests();
        let (alice, bob) = {
            let db = state.db.lock().await;
            (seed_user(&db, "alice", "a@x.com"), seed_user(&db, "bob", "b@x.com"))
        };
        let message = {
            let db = state.db.lock().await;
            let m = Message::new(alice.id, "alice", "a@x.com", "react to me", MessageKind::General);
            db.insert_message(&m).unwrap();
            m
        };

        let m = toggle_reaction(&state, &bob, message.id, "👍").await.unwrap();
        assert_eq!(m.reactions.len(), 1);
        let m = toggle_reaction(&state, &alice, message.id, "👍").await.unwrap();
        assert_eq!(m.reactions.len(), 2);
        // Same pair again removes it.
        let m = toggle_reaction(&state, &bob, message.id, "👍").await.unwrap();
        assert_eq!(m.reactions.len(), 1);
        assert_eq!(m.reactions[0].user_id, alice.id);

        // Explicit removal of a reaction never placed is a no-op.
        let m = remove_reaction(&state, bob.id, message.id, "🔥").await.unwrap();
        assert_eq!(m.reactions.len(), 1);
        let m = remove_reaction(&state, alice.id, message.id, "👍").await.unwrap();
        assert!(m.reactions.is_empty());
    }
}
