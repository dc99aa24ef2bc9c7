//! The WebSocket surface: upgrade, authentication handshake, the
//! per-connection event loop, and disconnect cleanup.
//!
//! Frames are JSON objects `{"event": "...", "data": ...}` in both
//! directions. The first inbound frame must be `authenticate` and must
//! arrive within the configured deadline; everything else closes the
//! connection.

use std::net::{IpAddr, SocketAddr};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use uuid::Uuid;

use chatflow_shared::constants::GENERAL_ROOM;
use chatflow_shared::protocol::{
    ClientEvent, HotspotNotice, HotspotStatus, RoomNotice, ServerEvent,
};
use chatflow_shared::types::{ConnectionId, FileAttachment};

use crate::error::ServerError;
use crate::hotspot::{self, hotspot_room};
use crate::pipeline;
use crate::receipts;
use crate::sessions::Session;
use crate::state::AppState;

/// `GET /ws` upgrade endpoint.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    headers: HeaderMap,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> impl IntoResponse {
    let client_ip = forwarded_ip(&headers).unwrap_or_else(|| addr.ip());
    ws.on_upgrade(move |socket| handle_socket(socket, state, client_ip))
}

/// First hop of `X-Forwarded-For`, when a reverse proxy fronts the server.
fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get("x-forwarded-for")?
        .to_str()
        .ok()?
        .split(',')
        .next()?
        .trim()
        .parse()
        .ok()
}

fn frame(event: &ServerEvent) -> Option<Message> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Message::Text(json)),
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize server event");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Socket lifecycle
// ---------------------------------------------------------------------------

async fn handle_socket(socket: WebSocket, state: AppState, client_ip: IpAddr) {
    let conn_id = ConnectionId::new();
    let (mut ws_sender, mut ws_receiver) = socket.split();
    tracing::info!(conn = %conn_id.short(), ip = %client_ip, "websocket connected");

    // Handshake: the first frame decides whether the connection lives.
    let deadline = tokio::time::Instant::now() + state.config.auth_timeout;
    let user = loop {
        let next = match tokio::time::timeout_at(deadline, ws_receiver.next()).await {
            Ok(next) => next,
            Err(_) => {
                tracing::warn!(conn = %conn_id.short(), "authentication deadline passed");
                send_direct(
                    &mut ws_sender,
                    &ServerEvent::AuthError {
                        message: "authentication timed out".into(),
                    },
                )
                .await;
                return;
            }
        };
        let text = match next {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
            _ => return,
        };
        let token = match serde_json::from_str::<ClientEvent>(&text) {
            Ok(ClientEvent::Authenticate { token }) => token,
            _ => {
                send_direct(
                    &mut ws_sender,
                    &ServerEvent::AuthError {
                        message: "authentication required".into(),
                    },
                )
                .await;
                return;
            }
        };
        let authenticated = {
            let db = state.db.lock().await;
            crate::auth::authenticate(&db, &token, &state.config.jwt_secret)
        };
        match authenticated {
            Ok(user) => break user,
            Err(e) => {
                tracing::warn!(conn = %conn_id.short(), error = %e, "authentication failed");
                send_direct(
                    &mut ws_sender,
                    &ServerEvent::AuthError {
                        message: e.to_string(),
                    },
                )
                .await;
                return;
            }
        }
    };

    let (mut session, mut outbound) = Session::new(conn_id, user.id, &user.username, &user.email);
    tracing::info!(conn = %conn_id.short(), user = %user.email, "authenticated");
    send_direct(&mut ws_sender, &ServerEvent::AuthOk(session.online_user())).await;

    // Forward task: drains the session's outbound channel into the socket.
    let forward_task = tokio::spawn(async move {
        while let Some(event) = outbound.recv().await {
            let Some(msg) = frame(&event) else { continue };
            if ws_sender.send(msg).await.is_err() {
                break;
            }
        }
        let _ = ws_sender.close().await;
    });

    state.registry.register(session.clone()).await;
    {
        let db = state.db.lock().await;
        if let Err(e) = db.set_user_online(user.id, true, chrono::Utc::now()) {
            tracing::error!(user = %user.email, error = %e, "failed to mark user online");
        }
    }
    state.registry.broadcast_online_users().await;

    // Hotspot availability from the connection address.
    if let Some(network_id) = hotspot::network_id_from_ip(client_ip) {
        announce_network(&state, &mut session, &network_id).await;
    }

    // Main receive loop.
    while let Some(next) = ws_receiver.next().await {
        let text = match next {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };
        let event = match serde_json::from_str::<ClientEvent>(&text) {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!(conn = %conn_id.short(), error = %e, "unparseable frame");
                state
                    .registry
                    .send_to(
                        conn_id,
                        ServerEvent::Error {
                            message: "unrecognized event".into(),
                        },
                    )
                    .await;
                continue;
            }
        };
        dispatch(&state, &mut session, event).await;
    }

    disconnect(&state, conn_id).await;
    forward_task.abort();
}

/// Serialize and send outside the forward task; used only before the
/// session channel exists or for handshake failures.
async fn send_direct(ws_sender: &mut SplitSink<WebSocket, Message>, event: &ServerEvent) {
    if let Some(msg) = frame(event) {
        let _ = ws_sender.send(msg).await;
    }
}

// ---------------------------------------------------------------------------
// Event dispatch
// ---------------------------------------------------------------------------

async fn dispatch(state: &AppState, session: &mut Session, event: ClientEvent) {
    let result = match event {
        ClientEvent::Authenticate { .. } => Ok(()), // handshake already done
        ClientEvent::JoinGeneralChat => {
            join_general(state, session).await;
            Ok(())
        }
        ClientEvent::SendMessage { message, file } => {
            pipeline::send_general(state, session, &message, file).await
        }
        ClientEvent::DetectNetwork { network_id } => {
            switch_network(state, session, &network_id).await;
            Ok(())
        }
        ClientEvent::JoinHotspotGroup => {
            join_hotspot(state, session).await;
            Ok(())
        }
        ClientEvent::SendHotspotMessage { message, file } => {
            pipeline::send_hotspot(state, session, &message, file).await
        }
        ClientEvent::SendPrivateMessage { to, message, file } => {
            pipeline::send_private(state, session, &to, &message, file).await
        }
        ClientEvent::SendFileMessage { to, file } => {
            send_file(state, session, &to, file).await
        }
        ClientEvent::MessageRead {
            from, message_id, ..
        } => {
            receipts::relay_read(state, session, &from, message_id).await;
            Ok(())
        }
        ClientEvent::CreateGroup { name, members, .. } => {
            match pipeline::create_group(state, session, &name, members).await {
                Ok(_) => Ok(()),
                Err(e) => {
                    state
                        .registry
                        .send_to(
                            session.conn_id,
                            ServerEvent::GroupCreationError {
                                message: e.to_string(),
                            },
                        )
                        .await;
                    Ok(())
                }
            }
        }
        ClientEvent::GetGroups => list_groups(state, session).await,
        ClientEvent::JoinGroup { group_id } => {
            pipeline::join_group(state, session, group_id).await
        }
        ClientEvent::SendGroupMessage {
            group_id,
            message,
            file,
        } => pipeline::send_group(state, session, group_id, &message, file).await,
        ClientEvent::GetGroupMessages { group_id } => {
            replay_group(state, session, group_id).await
        }
    };

    if let Err(e) = result {
        tracing::debug!(conn = %session.conn_id.short(), error = %e, "event rejected");
        state
            .registry
            .send_to(
                session.conn_id,
                ServerEvent::Error {
                    message: e.to_string(),
                },
            )
            .await;
    }
}

async fn join_general(state: &AppState, session: &Session) {
    let fresh = state.rooms.join(GENERAL_ROOM, session.conn_id).await;
    state
        .registry
        .send_to(session.conn_id, ServerEvent::JoinedGeneralChat)
        .await;
    if !fresh {
        return;
    }
    let notice = ServerEvent::UserJoined(RoomNotice {
        username: session.username.clone(),
        message: format!("{} joined the chat", session.username),
    });
    for conn in state.rooms.members(GENERAL_ROOM).await {
        if conn != session.conn_id {
            state.registry.send_to(conn, notice.clone()).await;
        }
    }
}

/// Private file transfer rides the private pipeline with an empty caption.
async fn send_file(
    state: &AppState,
    session: &Session,
    to: &str,
    file: FileAttachment,
) -> Result<(), ServerError> {
    pipeline::send_private(state, session, to, "", Some(file)).await
}

async fn list_groups(state: &AppState, session: &Session) -> Result<(), ServerError> {
    let groups = pipeline::list_groups(state, &session.email).await?;
    // Membership in a group means membership in its realtime room.
    for group in &groups {
        state
            .rooms
            .join(&pipeline::group_room(group.id), session.conn_id)
            .await;
    }
    state
        .registry
        .send_to(session.conn_id, ServerEvent::GroupsList(groups))
        .await;
    Ok(())
}

async fn replay_group(
    state: &AppState,
    session: &Session,
    group_id: Uuid,
) -> Result<(), ServerError> {
    // Same silent-membership semantics and replay as an explicit join.
    pipeline::join_group(state, session, group_id).await
}

// ---------------------------------------------------------------------------
// Hotspot membership
// ---------------------------------------------------------------------------

/// Assign the connection to a network group and tell it a hotspot exists.
async fn announce_network(state: &AppState, session: &mut Session, network_id: &str) {
    let membership = state.networks.join(network_id, session.conn_id).await;
    session.network_id = Some(membership.network_id.clone());
    session.color = Some(membership.color.clone());
    state
        .registry
        .set_network(session.conn_id, &membership.network_id, &membership.color)
        .await;
    state
        .registry
        .send_to(
            session.conn_id,
            ServerEvent::HotspotGroupAvailable(HotspotStatus {
                network_id: membership.network_id,
                assigned_color: membership.color,
                user_count: membership.user_count,
            }),
        )
        .await;
}

/// Client-requested re-detection with its own view of the network.
async fn switch_network(state: &AppState, session: &mut Session, network_id: &str) {
    if session.network_id.as_deref() == Some(network_id) {
        return;
    }
    if session.network_id.is_some() {
        leave_hotspot(state, session.conn_id, &session.clone()).await;
        session.network_id = None;
        session.color = None;
    }
    announce_network(state, session, network_id).await;
}

/// Subscribe to the hotspot room and announce the new member by color.
async fn join_hotspot(state: &AppState, session: &Session) {
    let (Some(network_id), Some(color)) = (&session.network_id, &session.color) else {
        state
            .registry
            .send_to(
                session.conn_id,
                ServerEvent::Error {
                    message: "no hotspot network detected".into(),
                },
            )
            .await;
        return;
    };

    let room = hotspot_room(network_id);
    let fresh = state.rooms.join(&room, session.conn_id).await;
    let user_count = state.networks.member_count(network_id).await;
    state
        .registry
        .send_to(
            session.conn_id,
            ServerEvent::JoinedHotspotGroup(HotspotStatus {
                network_id: network_id.clone(),
                assigned_color: color.clone(),
                user_count,
            }),
        )
        .await;
    if !fresh {
        return;
    }
    let notice = ServerEvent::UserJoinedHotspot(HotspotNotice {
        color: color.clone(),
        message: format!("{color} joined the hotspot"),
    });
    for conn in state.rooms.members(&room).await {
        if conn != session.conn_id {
            state.registry.send_to(conn, notice.clone()).await;
        }
    }
}

/// Release the color, dissolve an empty group, and tell the remaining room.
async fn leave_hotspot(state: &AppState, conn_id: ConnectionId, session: &Session) {
    let Some(network_id) = &session.network_id else {
        return;
    };
    let released = state.networks.leave(network_id, conn_id).await;
    let room = hotspot_room(network_id);
    state.rooms.leave(&room, conn_id).await;
    if let Some(color) = released {
        let notice = ServerEvent::UserLeftHotspot(HotspotNotice {
            message: format!("{color} left the hotspot"),
            color,
        });
        pipeline::emit_to_room(state, &room, notice).await;
    }
}

// ---------------------------------------------------------------------------
// Disconnect
// ---------------------------------------------------------------------------

async fn disconnect(state: &AppState, conn_id: ConnectionId) {
    let Some(session) = state.registry.unregister(conn_id).await else {
        return;
    };
    tracing::info!(conn = %conn_id.short(), user = %session.email, "websocket disconnected");

    leave_hotspot(state, conn_id, &session).await;

    if state.rooms.leave(GENERAL_ROOM, conn_id).await {
        let notice = ServerEvent::UserLeft(RoomNotice {
            username: session.username.clone(),
            message: format!("{} left the chat", session.username),
        });
        pipeline::emit_to_room(state, GENERAL_ROOM, notice).await;
    }
    state.rooms.leave_all(conn_id).await;

    // Only the final session flips the identity offline.
    if !state
        .registry
        .has_other_connections(session.user_id, conn_id)
        .await
    {
        let db = state.db.lock().await;
        if let Err(e) = db.set_user_online(session.user_id, false, chrono::Utc::now()) {
            tracing::error!(user = %session.email, error = %e, "failed to mark user offline");
        }
    }
    state.registry.broadcast_online_users().await;
}
