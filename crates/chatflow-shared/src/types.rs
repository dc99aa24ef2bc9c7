use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier for one live connection. A user holding several devices gets
/// one `ConnectionId` per socket.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Inline file payload carried on a message. The bytes travel base64-encoded
/// inside `data`; the server treats them as opaque.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileAttachment {
    /// Base64-encoded file bytes.
    pub data: String,
    /// Declared category, e.g. `image` or `document`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Original file name.
    pub name: String,
    /// Declared size in bytes.
    pub size: u64,
}

impl FileAttachment {
    /// Actual decoded payload length, or `None` when `data` is not valid
    /// base64. The declared `size` is client-supplied and not trusted.
    pub fn decoded_len(&self) -> Option<usize> {
        STANDARD.decode(&self.data).ok().map(|bytes| bytes.len())
    }
}
