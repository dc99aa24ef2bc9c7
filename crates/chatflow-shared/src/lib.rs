//! # chatflow-shared
//!
//! Types shared between the ChatFlow server and its clients: the JSON wire
//! protocol (tagged client/server event enums), common id newtypes, the
//! delivery-status state machine, and protocol constants.

pub mod constants;
pub mod delivery;
pub mod protocol;
pub mod types;

pub use delivery::DeliveryStatus;
pub use protocol::{ClientEvent, ServerEvent};
pub use types::{ConnectionId, FileAttachment};
