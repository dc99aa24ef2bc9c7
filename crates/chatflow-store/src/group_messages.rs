//! The append-only [`GroupMessage`] stream.
//!
//! Separate from the unified `messages` table: group-room traffic sent over
//! the socket lands here, keyed by group id and identified by sender email.
//! No edit or delete operations exist for this stream.

use rusqlite::params;
use uuid::Uuid;

use chatflow_shared::protocol::GroupMessageKind;

use crate::database::Database;
use crate::error::Result;
use crate::models::{GroupMessage, Page};
use crate::users::{parse_ts, parse_uuid};

const GROUP_MESSAGE_COLUMNS: &str = "id, group_id, sender, sender_name, content, kind, file, timestamp";

impl Database {
    pub fn insert_group_message(&self, message: &GroupMessage) -> Result<()> {
        self.conn().execute(
            "INSERT INTO group_messages (id, group_id, sender, sender_name, content, kind,
                                         file, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                message.id.to_string(),
                message.group_id.to_string(),
                message.sender,
                message.sender_name,
                message.content,
                kind_str(message.kind),
                message
                    .file
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
                message.timestamp.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// The most recent `limit` messages of a group, oldest first. Used for
    /// the join-group replay.
    pub fn recent_group_messages(&self, group_id: Uuid, limit: u32) -> Result<Vec<GroupMessage>> {
        Ok(self.group_messages(group_id, 1, limit)?.items)
    }

    /// One page of a group's stream, oldest first.
    pub fn group_messages(&self, group_id: Uuid, page: u32, limit: u32) -> Result<Page<GroupMessage>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {GROUP_MESSAGE_COLUMNS} FROM group_messages
             WHERE group_id = ?1
             ORDER BY timestamp DESC
             LIMIT ?2 OFFSET ?3"
        ))?;

        let offset = page.saturating_sub(1).saturating_mul(limit);
        let rows = stmt.query_map(
            params![group_id.to_string(), limit, offset],
            row_to_group_message,
        )?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(Page::from_desc(messages, page, limit))
    }

    /// Total number of messages in a group's stream.
    pub fn count_group_messages(&self, group_id: Uuid) -> Result<i64> {
        let count = self.conn().query_row(
            "SELECT COUNT(*) FROM group_messages WHERE group_id = ?1",
            params![group_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

fn kind_str(kind: GroupMessageKind) -> &'static str {
    match kind {
        GroupMessageKind::Text => "text",
        GroupMessageKind::System => "system",
    }
}

/// Map a `rusqlite::Row` to a [`GroupMessage`].
fn row_to_group_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<GroupMessage> {
    let id_str: String = row.get(0)?;
    let group_str: String = row.get(1)?;
    let sender: String = row.get(2)?;
    let sender_name: String = row.get(3)?;
    let content: String = row.get(4)?;
    let kind_str: String = row.get(5)?;
    let file_json: Option<String> = row.get(6)?;
    let ts_str: String = row.get(7)?;

    let kind = match kind_str.as_str() {
        "system" => GroupMessageKind::System,
        _ => GroupMessageKind::Text,
    };

    let file = file_json
        .map(|json| serde_json::from_str(&json))
        .transpose()
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(GroupMessage {
        id: parse_uuid(&id_str, 0)?,
        group_id: parse_uuid(&group_str, 1)?,
        sender,
        sender_name,
        content,
        kind,
        file,
        timestamp: parse_ts(&ts_str, 7)?,
    })
}
