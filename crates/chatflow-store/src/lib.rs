//! # chatflow-store
//!
//! SQLite persistence for the ChatFlow server. The crate exposes a
//! synchronous [`Database`] handle that wraps a `rusqlite::Connection` and
//! provides typed CRUD helpers for every durable domain model: users,
//! unified messages, named groups, and the separate group-message stream.
//!
//! Hotspot messages are deliberately absent: they are broadcast-only and
//! never reach this crate.

pub mod database;
pub mod group_messages;
pub mod groups;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod users;

mod error;

pub use database::Database;
pub use error::StoreError;
pub use models::*;
