//! v001 -- Initial schema creation.
//!
//! Creates the four durable tables: `users`, `messages`, `groups`, and
//! `group_messages`. Sessions and hotspot groups are never persisted.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id            TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    username      TEXT NOT NULL,
    email         TEXT NOT NULL UNIQUE,
    password_hash TEXT,                        -- NULL for external-auth users
    google_id     TEXT UNIQUE,                 -- external-auth linkage
    is_online     INTEGER NOT NULL DEFAULT 0,  -- boolean 0/1
    last_seen     TEXT NOT NULL,               -- ISO-8601 / RFC-3339
    created_at    TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_users_username ON users(username);
CREATE INDEX IF NOT EXISTS idx_users_is_online ON users(is_online);

-- ----------------------------------------------------------------
-- Messages (unified general/private/group record)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id              TEXT PRIMARY KEY NOT NULL, -- UUID v4
    sender_id       TEXT NOT NULL,             -- reference -> users(id), no FK:
                                               -- orphans tolerated at read time
    sender_username TEXT NOT NULL,             -- denormalized snapshot
    sender_email    TEXT NOT NULL,
    content         TEXT NOT NULL,
    kind            TEXT NOT NULL,             -- general|private|group|hotspot
    recipient_id    TEXT,                      -- private only
    recipient_email TEXT,                      -- private only
    group_id        TEXT,                      -- group only
    group_name      TEXT,                      -- group only
    is_read         INTEGER NOT NULL DEFAULT 0,
    is_edited       INTEGER NOT NULL DEFAULT 0,
    edited_at       TEXT,
    is_deleted      INTEGER NOT NULL DEFAULT 0,
    deleted_at      TEXT,
    reactions       TEXT NOT NULL DEFAULT '[]', -- JSON array
    file            TEXT,                       -- JSON attachment, nullable
    created_at      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_messages_kind_ts ON messages(kind, created_at DESC);
CREATE INDEX IF NOT EXISTS idx_messages_sender_recipient ON messages(sender_id, recipient_id);
CREATE INDEX IF NOT EXISTS idx_messages_is_deleted ON messages(is_deleted);

-- ----------------------------------------------------------------
-- Groups (durable named groups; membership by email)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS groups (
    id            TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    name          TEXT NOT NULL,
    members       TEXT NOT NULL,               -- JSON array of emails
    created_by    TEXT NOT NULL,               -- creator email
    created_at    TEXT NOT NULL,
    last_activity TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_groups_last_activity ON groups(last_activity DESC);

-- ----------------------------------------------------------------
-- Group messages (separate append-only stream)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS group_messages (
    id          TEXT PRIMARY KEY NOT NULL,     -- UUID v4
    group_id    TEXT NOT NULL,                 -- reference -> groups(id)
    sender      TEXT NOT NULL,                 -- sender email, or 'system'
    sender_name TEXT NOT NULL,
    content     TEXT NOT NULL,
    kind        TEXT NOT NULL DEFAULT 'text',  -- text|system
    file        TEXT,                          -- JSON attachment, nullable
    timestamp   TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_group_messages_group_ts
    ON group_messages(group_id, timestamp DESC);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
