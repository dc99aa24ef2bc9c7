//! Domain model structs persisted in the SQLite database.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! directly to the HTTP layer as JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use chatflow_shared::protocol::GroupMessageKind;
use chatflow_shared::types::FileAttachment;

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A registered user identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    /// Unique, lowercased.
    pub email: String,
    /// Opaque to the core; `None` for external-auth accounts.
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    /// External-auth linkage, if the account came from an OAuth provider.
    pub google_id: Option<String>,
    pub is_online: bool,
    pub last_seen: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// Message class. `Hotspot` exists for records created through the HTTP
/// endpoint; the realtime pipeline never persists hotspot traffic.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    General,
    Private,
    Group,
    Hotspot,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::General => "general",
            MessageKind::Private => "private",
            MessageKind::Group => "group",
            MessageKind::Hotspot => "hotspot",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "general" => Some(MessageKind::General),
            "private" => Some(MessageKind::Private),
            "group" => Some(MessageKind::Group),
            "hotspot" => Some(MessageKind::Hotspot),
            _ => None,
        }
    }
}

/// One reaction on a message. Stored inside the message's JSON `reactions`
/// column, ordered by creation time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    pub user_id: Uuid,
    pub username: String,
    pub emoji: String,
    pub created_at: DateTime<Utc>,
}

/// A single persisted chat message (general, private, or group).
///
/// The sender's username and email are denormalized snapshots taken at send
/// time, so a deleted account leaves readable history behind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub sender_username: String,
    pub sender_email: String,
    pub content: String,
    pub kind: MessageKind,
    pub recipient_id: Option<Uuid>,
    pub recipient_email: Option<String>,
    pub group_id: Option<Uuid>,
    pub group_name: Option<String>,
    pub is_read: bool,
    pub is_edited: bool,
    pub edited_at: Option<DateTime<Utc>>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub reactions: Vec<Reaction>,
    pub file: Option<FileAttachment>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// A fresh message record with generated id and current timestamp.
    pub fn new(
        sender_id: Uuid,
        sender_username: &str,
        sender_email: &str,
        content: &str,
        kind: MessageKind,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender_id,
            sender_username: sender_username.to_string(),
            sender_email: sender_email.to_string(),
            content: content.to_string(),
            kind,
            recipient_id: None,
            recipient_email: None,
            group_id: None,
            group_name: None,
            is_read: false,
            is_edited: false,
            edited_at: None,
            is_deleted: false,
            deleted_at: None,
            reactions: Vec::new(),
            file: None,
            created_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Group
// ---------------------------------------------------------------------------

/// A durable named group. Membership is a list of email addresses and may
/// include people who have not registered yet; it is immutable after
/// creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: Uuid,
    pub name: String,
    pub members: Vec<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Group {
    pub fn is_member(&self, email: &str) -> bool {
        self.members.iter().any(|m| m == email)
    }
}

// ---------------------------------------------------------------------------
// Group message
// ---------------------------------------------------------------------------

/// A message in a group's append-only stream. Senders are identified by
/// email; system notices use the literal sender `system`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GroupMessage {
    pub id: Uuid,
    pub group_id: Uuid,
    pub sender: String,
    pub sender_name: String,
    pub content: String,
    pub kind: GroupMessageKind,
    pub file: Option<FileAttachment>,
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Pagination
// ---------------------------------------------------------------------------

/// One page of history, oldest-first, with an approximate `has_more` flag.
///
/// `has_more` is true exactly when the underlying query returned a full
/// page. A total count that is an exact multiple of the page size therefore
/// reports `has_more = true` for its final page; callers discover the end
/// on the next (empty) fetch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub has_more: bool,
}

impl<T> Page<T> {
    /// Build a page from a newest-first query result, re-ordering it
    /// oldest-first for display.
    pub fn from_desc(mut items: Vec<T>, page: u32, limit: u32) -> Self {
        let has_more = items.len() as u32 == limit;
        items.reverse();
        Self {
            items,
            page,
            has_more,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_reverses_and_flags_full_pages() {
        let page = Page::from_desc(vec![3, 2, 1], 1, 3);
        assert_eq!(page.items, vec![1, 2, 3]);
        assert!(page.has_more);

        let short = Page::from_desc(vec![2, 1], 1, 3);
        assert!(!short.has_more);
    }

    #[test]
    fn message_kind_round_trip() {
        for kind in [
            MessageKind::General,
            MessageKind::Private,
            MessageKind::Group,
            MessageKind::Hotspot,
        ] {
            assert_eq!(MessageKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(MessageKind::parse("broadcast"), None);
    }

    #[test]
    fn group_membership_by_email() {
        let group = Group {
            id: Uuid::new_v4(),
            name: "Team".into(),
            members: vec!["a@x.com".into(), "b@x.com".into()],
            created_by: "a@x.com".into(),
            created_at: Utc::now(),
            last_activity: Utc::now(),
        };
        assert!(group.is_member("b@x.com"));
        assert!(!group.is_member("c@x.com"));
    }
}
