/// Application name reported by diagnostic endpoints.
pub const APP_NAME: &str = "ChatFlow";

/// Name of the single global broadcast room.
pub const GENERAL_ROOM: &str = "general";

/// Maximum message content length in characters.
pub const MAX_MESSAGE_LEN: usize = 1000;

/// Maximum group name length in characters.
pub const MAX_GROUP_NAME_LEN: usize = 50;

/// Content stored in place of a soft-deleted message.
pub const TOMBSTONE_CONTENT: &str = "This message was deleted";

/// Maximum decoded size of an inline file attachment, in bytes.
pub const MAX_FILE_BYTES: usize = 10 * 1024 * 1024;

/// Default page size for history reads.
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Number of recent group messages replayed on `join-group`.
pub const GROUP_REPLAY_LIMIT: u32 = 50;

/// Minimum length of a full-text search query.
pub const MIN_SEARCH_QUERY_LEN: usize = 2;

/// Hotspot display color palette. Within one network group each member gets
/// a distinct entry until the palette is exhausted.
pub const HOTSPOT_COLORS: [&str; 10] = [
    "Red", "Blue", "Green", "Purple", "Orange", "Pink", "Cyan", "Yellow", "Lime", "Indigo",
];

/// Default HTTP/WebSocket listen port.
pub const DEFAULT_HTTP_PORT: u16 = 3002;

/// Seconds a new connection may remain unauthenticated before it is closed.
pub const DEFAULT_AUTH_TIMEOUT_SECS: u64 = 5;
