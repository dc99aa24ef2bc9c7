//! JSON wire protocol between clients and the server.
//!
//! Every frame is an adjacently tagged object `{"event": "...", "data": ...}`
//! where the tag is the kebab-case event name. Payloads are validated at the
//! connection boundary by serde before any handler runs; a frame that does
//! not match a known event deserializes to an error and is answered with an
//! `error` event instead of reaching the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::delivery::DeliveryStatus;
use crate::types::FileAttachment;

// ---------------------------------------------------------------------------
// Client -> server
// ---------------------------------------------------------------------------

/// Operations a client connection may issue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// Handshake frame; must arrive first, within the auth timeout.
    Authenticate { token: String },
    JoinGeneralChat,
    SendMessage {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file: Option<FileAttachment>,
    },
    /// Manual network re-detection with a caller-supplied network id.
    DetectNetwork {
        #[serde(rename = "networkId")]
        network_id: String,
    },
    JoinHotspotGroup,
    SendHotspotMessage {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file: Option<FileAttachment>,
    },
    SendPrivateMessage {
        to: String,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file: Option<FileAttachment>,
    },
    /// Private file transfer; the attachment is mandatory here.
    SendFileMessage {
        to: String,
        #[serde(rename = "fileData")]
        file: FileAttachment,
    },
    /// Recipient opened the conversation; `from` is the original sender.
    MessageRead {
        from: String,
        to: String,
        #[serde(rename = "messageId")]
        message_id: Uuid,
    },
    CreateGroup {
        name: String,
        members: Vec<String>,
        #[serde(rename = "createdBy")]
        created_by: String,
    },
    GetGroups,
    JoinGroup {
        #[serde(rename = "groupId")]
        group_id: Uuid,
    },
    SendGroupMessage {
        #[serde(rename = "groupId")]
        group_id: Uuid,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file: Option<FileAttachment>,
    },
    GetGroupMessages {
        #[serde(rename = "groupId")]
        group_id: Uuid,
    },
}

// ---------------------------------------------------------------------------
// Server -> client
// ---------------------------------------------------------------------------

/// Notifications the server emits to client connections.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    AuthOk(OnlineUser),
    AuthError {
        message: String,
    },
    JoinedGeneralChat,
    NewMessage(ChatMessagePayload),
    UserJoined(RoomNotice),
    UserLeft(RoomNotice),
    HotspotGroupAvailable(HotspotStatus),
    JoinedHotspotGroup(HotspotStatus),
    NewHotspotMessage(HotspotMessagePayload),
    UserJoinedHotspot(HotspotNotice),
    UserLeftHotspot(HotspotNotice),
    OnlineUsersUpdated(Vec<OnlineUser>),
    NewPrivateMessage(PrivateMessagePayload),
    PrivateMessageSent(PrivateMessagePayload),
    MessageDeliveredReceipt(DeliveredReceipt),
    MessageReadReceipt(ReadReceipt),
    GroupCreated(GroupSummary),
    GroupsList(Vec<GroupSummary>),
    GroupCreationError {
        message: String,
    },
    GroupMessage(GroupMessagePayload),
    GroupMessages(Vec<GroupMessagePayload>),
    UserNotFound {
        email: String,
    },
    Error {
        message: String,
    },
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// A user visible in the online list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OnlineUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
}

/// Join/leave notice for the general room. Not persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoomNotice {
    pub username: String,
    pub message: String,
}

/// A general-room message as broadcast to the room.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessagePayload {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<FileAttachment>,
}

/// Hotspot availability / membership snapshot sent to one connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HotspotStatus {
    pub network_id: String,
    pub assigned_color: String,
    pub user_count: usize,
}

/// Join/leave notice inside a hotspot group. Members stay anonymous; only
/// the assigned color is shown.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HotspotNotice {
    pub color: String,
    pub message: String,
}

/// A hotspot message. Never persisted; the id only disambiguates within a
/// session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HotspotMessagePayload {
    pub id: Uuid,
    pub color: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<FileAttachment>,
}

/// A private message as seen by either end.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PrivateMessagePayload {
    pub id: Uuid,
    pub from: String,
    pub from_email: String,
    pub to: String,
    pub message: String,
    /// Always `Sent` when emitted; receipts move it forward client-side.
    pub status: DeliveryStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<FileAttachment>,
}

/// Delivered receipt relayed to the sender at send time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeliveredReceipt {
    pub to: String,
    pub message_id: Uuid,
    pub timestamp: DateTime<Utc>,
}

/// Read receipt relayed to the original sender. `from` is the reader.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceipt {
    pub from: String,
    pub message_id: Uuid,
}

/// A durable named group as listed to its members.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GroupSummary {
    pub id: Uuid,
    pub name: String,
    pub members: Vec<String>,
    pub created_by: String,
    pub last_activity: DateTime<Utc>,
}

/// A group-stream message (user text or system notice).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GroupMessagePayload {
    pub id: Uuid,
    pub group_id: Uuid,
    pub sender: String,
    pub sender_name: String,
    pub message: String,
    pub kind: GroupMessageKind,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<FileAttachment>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GroupMessageKind {
    Text,
    System,
}
