//! CRUD and history queries for the unified [`Message`] record.
//!
//! All history reads query newest-first and hand the raw list to
//! [`Page::from_desc`], which re-orders it oldest-first for display.
//! Mutations (edit, soft delete, reactions) update the row in place; a
//! message row is never hard-deleted.

use chrono::{DateTime, Utc};
use rusqlite::params;
use uuid::Uuid;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{Message, MessageKind, Page, Reaction};
use crate::users::{parse_ts, parse_uuid};

const MESSAGE_COLUMNS: &str = "id, sender_id, sender_username, sender_email, content, kind, \
     recipient_id, recipient_email, group_id, group_name, is_read, is_edited, edited_at, \
     is_deleted, deleted_at, reactions, file, created_at";

impl Database {
    pub fn insert_message(&self, message: &Message) -> Result<()> {
        self.conn().execute(
            "INSERT INTO messages (id, sender_id, sender_username, sender_email, content, kind,
                                   recipient_id, recipient_email, group_id, group_name,
                                   is_read, is_edited, edited_at, is_deleted, deleted_at,
                                   reactions, file, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10,
                     ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
            params![
                message.id.to_string(),
                message.sender_id.to_string(),
                message.sender_username,
                message.sender_email,
                message.content,
                message.kind.as_str(),
                message.recipient_id.map(|id| id.to_string()),
                message.recipient_email,
                message.group_id.map(|id| id.to_string()),
                message.group_name,
                message.is_read as i64,
                message.is_edited as i64,
                message.edited_at.map(|t| t.to_rfc3339()),
                message.is_deleted as i64,
                message.deleted_at.map(|t| t.to_rfc3339()),
                serde_json::to_string(&message.reactions)?,
                message
                    .file
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
                message.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_message(&self, id: Uuid) -> Result<Message> {
        self.conn()
            .query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                params![id.to_string()],
                row_to_message,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => other.into(),
            })
    }

    /// Replace the content and set the edit flag/timestamp.
    pub fn apply_edit(&self, id: Uuid, content: &str, at: DateTime<Utc>) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE messages SET content = ?1, is_edited = 1, edited_at = ?2 WHERE id = ?3",
            params![content, at.to_rfc3339(), id.to_string()],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Tombstone the message: replace content, set the delete flag.
    /// Reactions and metadata are retained.
    pub fn apply_soft_delete(&self, id: Uuid, tombstone: &str, at: DateTime<Utc>) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE messages SET content = ?1, is_deleted = 1, deleted_at = ?2 WHERE id = ?3",
            params![tombstone, at.to_rfc3339(), id.to_string()],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Overwrite the full reaction list of a message.
    pub fn set_reactions(&self, id: Uuid, reactions: &[Reaction]) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE messages SET reactions = ?1 WHERE id = ?2",
            params![serde_json::to_string(reactions)?, id.to_string()],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // History
    // ------------------------------------------------------------------

    /// One page of general-room history.
    pub fn general_messages(&self, page: u32, limit: u32) -> Result<Page<Message>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE kind = 'general'
             ORDER BY created_at DESC
             LIMIT ?1 OFFSET ?2"
        ))?;
        let rows = stmt.query_map(params![limit, offset(page, limit)], row_to_message)?;
        collect_page(rows, page, limit)
    }

    /// One page of the private conversation between two users, either
    /// direction.
    pub fn private_messages(
        &self,
        user_a: Uuid,
        user_b: Uuid,
        page: u32,
        limit: u32,
    ) -> Result<Page<Message>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE kind = 'private'
               AND ((sender_id = ?1 AND recipient_id = ?2)
                 OR (sender_id = ?2 AND recipient_id = ?1))
             ORDER BY created_at DESC
             LIMIT ?3 OFFSET ?4"
        ))?;
        let rows = stmt.query_map(
            params![
                user_a.to_string(),
                user_b.to_string(),
                limit,
                offset(page, limit)
            ],
            row_to_message,
        )?;
        collect_page(rows, page, limit)
    }

    /// One page of group-kind history for records created through the HTTP
    /// endpoint (the realtime group stream lives in `group_messages`).
    pub fn group_kind_messages(
        &self,
        group_id: Uuid,
        page: u32,
        limit: u32,
    ) -> Result<Page<Message>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE kind = 'group' AND group_id = ?1
             ORDER BY created_at DESC
             LIMIT ?2 OFFSET ?3"
        ))?;
        let rows = stmt.query_map(
            params![group_id.to_string(), limit, offset(page, limit)],
            row_to_message,
        )?;
        collect_page(rows, page, limit)
    }

    // ------------------------------------------------------------------
    // Read state
    // ------------------------------------------------------------------

    /// Mark every unread private message from `sender` to `recipient` as
    /// read. Returns the number of rows updated.
    pub fn mark_private_read(&self, sender: Uuid, recipient: Uuid) -> Result<usize> {
        let affected = self.conn().execute(
            "UPDATE messages SET is_read = 1
             WHERE kind = 'private' AND sender_id = ?1 AND recipient_id = ?2 AND is_read = 0",
            params![sender.to_string(), recipient.to_string()],
        )?;
        Ok(affected)
    }

    /// Count unread incoming private messages for a user.
    pub fn unread_count(&self, recipient: Uuid) -> Result<i64> {
        let count = self.conn().query_row(
            "SELECT COUNT(*) FROM messages
             WHERE kind = 'private' AND recipient_id = ?1 AND is_read = 0",
            params![recipient.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // ------------------------------------------------------------------
    // Search
    // ------------------------------------------------------------------

    /// Substring match over non-deleted message content, newest first.
    ///
    /// When `kind` is `Private` the results are restricted to conversations
    /// involving `requester`; other scopes search the full stream.
    pub fn search_messages(
        &self,
        query: &str,
        kind: Option<MessageKind>,
        requester: Uuid,
        limit: u32,
    ) -> Result<Vec<Message>> {
        let pattern = format!("%{}%", like_escape(query));

        let mut sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE is_deleted = 0 AND content LIKE ?1 ESCAPE '\\'"
        );
        if let Some(k) = kind {
            sql.push_str(&format!(" AND kind = '{}'", k.as_str()));
        }
        if kind == Some(MessageKind::Private) {
            sql.push_str(" AND (sender_id = ?3 OR recipient_id = ?3)");
        }
        sql.push_str(" ORDER BY created_at DESC LIMIT ?2");

        let mut stmt = self.conn().prepare(&sql)?;
        let mut messages = Vec::new();
        if kind == Some(MessageKind::Private) {
            let rows = stmt.query_map(
                params![pattern, limit, requester.to_string()],
                row_to_message,
            )?;
            for row in rows {
                messages.push(row?);
            }
        } else {
            let rows = stmt.query_map(params![pattern, limit], row_to_message)?;
            for row in rows {
                messages.push(row?);
            }
        }
        Ok(messages)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

// Saturates rather than overflowing on absurd page numbers; the query then
// just returns an empty page.
fn offset(page: u32, limit: u32) -> u32 {
    page.saturating_sub(1).saturating_mul(limit)
}

fn collect_page(
    rows: impl Iterator<Item = rusqlite::Result<Message>>,
    page: u32,
    limit: u32,
) -> Result<Page<Message>> {
    let mut messages = Vec::new();
    for row in rows {
        messages.push(row?);
    }
    Ok(Page::from_desc(messages, page, limit))
}

/// Escape LIKE wildcards in user-supplied search text.
fn like_escape(query: &str) -> String {
    query
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Map a `rusqlite::Row` to a [`Message`].
fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let id_str: String = row.get(0)?;
    let sender_str: String = row.get(1)?;
    let sender_username: String = row.get(2)?;
    let sender_email: String = row.get(3)?;
    let content: String = row.get(4)?;
    let kind_str: String = row.get(5)?;
    let recipient_str: Option<String> = row.get(6)?;
    let recipient_email: Option<String> = row.get(7)?;
    let group_str: Option<String> = row.get(8)?;
    let group_name: Option<String> = row.get(9)?;
    let is_read: i64 = row.get(10)?;
    let is_edited: i64 = row.get(11)?;
    let edited_str: Option<String> = row.get(12)?;
    let is_deleted: i64 = row.get(13)?;
    let deleted_str: Option<String> = row.get(14)?;
    let reactions_json: String = row.get(15)?;
    let file_json: Option<String> = row.get(16)?;
    let created_str: String = row.get(17)?;

    let kind = MessageKind::parse(&kind_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            5,
            rusqlite::types::Type::Text,
            format!("unknown message kind: {kind_str}").into(),
        )
    })?;

    let reactions: Vec<Reaction> = serde_json::from_str(&reactions_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(15, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let file = file_json
        .map(|json| serde_json::from_str(&json))
        .transpose()
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(16, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(Message {
        id: parse_uuid(&id_str, 0)?,
        sender_id: parse_uuid(&sender_str, 1)?,
        sender_username,
        sender_email,
        content,
        kind,
        recipient_id: recipient_str.map(|s| parse_uuid(&s, 6)).transpose()?,
        recipient_email,
        group_id: group_str.map(|s| parse_uuid(&s, 8)).transpose()?,
        group_name,
        is_read: is_read != 0,
        is_edited: is_edited != 0,
        edited_at: edited_str.map(|s| parse_ts(&s, 12)).transpose()?,
        is_deleted: is_deleted != 0,
        deleted_at: deleted_str.map(|s| parse_ts(&s, 14)).transpose()?,
        reactions,
        file,
        created_at: parse_ts(&created_str, 17)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn message_at(sender: Uuid, content: &str, at: DateTime<Utc>) -> Message {
        let mut m = Message::new(sender, "alice", "a@x.com", content, MessageKind::General);
        m.created_at = at;
        m
    }

    #[test]
    fn insert_and_get_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let msg = Message::new(
            Uuid::new_v4(),
            "alice",
            "a@x.com",
            "hello",
            MessageKind::General,
        );
        db.insert_message(&msg).unwrap();

        let loaded = db.get_message(msg.id).unwrap();
        assert_eq!(loaded.content, "hello");
        assert_eq!(loaded.kind, MessageKind::General);
        assert!(loaded.reactions.is_empty());
    }

    #[test]
    fn edit_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let msg = Message::new(
            Uuid::new_v4(),
            "alice",
            "a@x.com",
            "first",
            MessageKind::General,
        );
        db.insert_message(&msg).unwrap();

        db.apply_edit(msg.id, "new text", Utc::now()).unwrap();
        let loaded = db.get_message(msg.id).unwrap();
        assert_eq!(loaded.content, "new text");
        assert!(loaded.is_edited);
        assert!(loaded.edited_at.is_some());
    }

    #[test]
    fn soft_delete_keeps_reactions() {
        let db = Database::open_in_memory().unwrap();
        let msg = Message::new(
            Uuid::new_v4(),
            "alice",
            "a@x.com",
            "secret",
            MessageKind::General,
        );
        db.insert_message(&msg).unwrap();

        let reaction = Reaction {
            user_id: Uuid::new_v4(),
            username: "bob".into(),
            emoji: "🔥".into(),
            created_at: Utc::now(),
        };
        db.set_reactions(msg.id, &[reaction]).unwrap();
        db.apply_soft_delete(msg.id, "This message was deleted", Utc::now())
            .unwrap();

        let loaded = db.get_message(msg.id).unwrap();
        assert!(loaded.is_deleted);
        assert_eq!(loaded.content, "This message was deleted");
        assert_eq!(loaded.reactions.len(), 1);
    }

    #[test]
    fn general_pagination_oldest_first_with_has_more() {
        let db = Database::open_in_memory().unwrap();
        let sender = Uuid::new_v4();
        let base = Utc::now();
        for i in 0..5 {
            db.insert_message(&message_at(
                sender,
                &format!("m{i}"),
                base + Duration::seconds(i),
            ))
            .unwrap();
        }

        let page1 = db.general_messages(1, 2).unwrap();
        assert_eq!(
            page1.items.iter().map(|m| &m.content).collect::<Vec<_>>(),
            vec!["m3", "m4"]
        );
        assert!(page1.has_more);

        let page3 = db.general_messages(3, 2).unwrap();
        assert_eq!(page3.items.len(), 1);
        assert_eq!(page3.items[0].content, "m0");
        assert!(!page3.has_more);
    }

    #[test]
    fn private_history_covers_both_directions() {
        let db = Database::open_in_memory().unwrap();
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        for (from, to, text) in [(a, b, "a->b"), (b, a, "b->a"), (a, c, "a->c")] {
            let mut m = Message::new(from, "u", "u@x.com", text, MessageKind::Private);
            m.recipient_id = Some(to);
            m.recipient_email = Some("r@x.com".into());
            db.insert_message(&m).unwrap();
        }

        let page = db.private_messages(a, b, 1, 50).unwrap();
        let contents: Vec<_> = page.items.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents.len(), 2);
        assert!(contents.contains(&"a->b") && contents.contains(&"b->a"));
    }

    #[test]
    fn unread_count_and_mark_read() {
        let db = Database::open_in_memory().unwrap();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        for _ in 0..3 {
            let mut m = Message::new(a, "alice", "a@x.com", "ping", MessageKind::Private);
            m.recipient_id = Some(b);
            m.recipient_email = Some("b@x.com".into());
            db.insert_message(&m).unwrap();
        }
        assert_eq!(db.unread_count(b).unwrap(), 3);

        let updated = db.mark_private_read(a, b).unwrap();
        assert_eq!(updated, 3);
        assert_eq!(db.unread_count(b).unwrap(), 0);
    }

    #[test]
    fn search_skips_deleted_and_respects_private_scope() {
        let db = Database::open_in_memory().unwrap();
        let (a, b, stranger) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        let visible = Message::new(a, "alice", "a@x.com", "project update", MessageKind::General);
        db.insert_message(&visible).unwrap();

        let deleted = Message::new(a, "alice", "a@x.com", "project secret", MessageKind::General);
        db.insert_message(&deleted).unwrap();
        db.apply_soft_delete(deleted.id, "This message was deleted", Utc::now())
            .unwrap();

        let mut private = Message::new(a, "alice", "a@x.com", "project plan", MessageKind::Private);
        private.recipient_id = Some(b);
        private.recipient_email = Some("b@x.com".into());
        db.insert_message(&private).unwrap();

        let general = db
            .search_messages("project", Some(MessageKind::General), a, 20)
            .unwrap();
        assert_eq!(general.len(), 1);
        assert_eq!(general[0].content, "project update");

        let mine = db
            .search_messages("project", Some(MessageKind::Private), a, 20)
            .unwrap();
        assert_eq!(mine.len(), 1);

        let theirs = db
            .search_messages("project", Some(MessageKind::Private), stranger, 20)
            .unwrap();
        assert!(theirs.is_empty());
    }

    #[test]
    fn search_escapes_like_wildcards() {
        let db = Database::open_in_memory().unwrap();
        let sender = Uuid::new_v4();
        db.insert_message(&Message::new(
            sender,
            "alice",
            "a@x.com",
            "100% done",
            MessageKind::General,
        ))
        .unwrap();
        db.insert_message(&Message::new(
            sender,
            "alice",
            "a@x.com",
            "1000 done",
            MessageKind::General,
        ))
        .unwrap();

        let hits = db.search_messages("100%", None, sender, 20).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content, "100% done");
    }

    #[test]
    fn huge_page_numbers_yield_an_empty_page() {
        let db = Database::open_in_memory().unwrap();
        let sender = Uuid::new_v4();
        db.insert_message(&message_at(sender, "only one", Utc::now()))
            .unwrap();

        // The offset saturates instead of overflowing.
        let page = db.general_messages(u32::MAX, 100).unwrap();
        assert!(page.items.is_empty());
        assert!(!page.has_more);

        let page = db.private_messages(sender, Uuid::new_v4(), u32::MAX, u32::MAX).unwrap();
        assert!(page.items.is_empty());
    }
}
