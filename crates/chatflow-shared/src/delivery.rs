//! Per-message delivery status and its legal transitions.
//!
//! The server sets `Sent` at persistence time, emits a delivered receipt
//! when the recipient holds a live connection at send time, and relays a
//! read receipt every time the recipient activates the conversation.
//! `Failed` is a client-local terminal state for outbound sends that never
//! reached the server; it is never produced server-side.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Sent,
    Delivered,
    Read,
    Failed,
}

impl DeliveryStatus {
    /// Whether moving from `self` to `next` is a legal transition.
    ///
    /// Receipts are fire-and-forget, so a lost `delivered` receipt means a
    /// `read` receipt may arrive while still in `Sent`; that skip is legal.
    /// Re-reads are also legal: the recipient re-emits `read` on every
    /// conversation activation.
    pub fn can_transition(self, next: DeliveryStatus) -> bool {
        use DeliveryStatus::*;
        match (self, next) {
            (Sent, Delivered) | (Sent, Read) | (Delivered, Read) => true,
            (Read, Read) => true,
            (Sent, Failed) => true,
            _ => false,
        }
    }

    /// Apply a receipt, ignoring illegal (stale) transitions.
    pub fn apply(self, next: DeliveryStatus) -> DeliveryStatus {
        if self.can_transition(next) {
            next
        } else {
            self
        }
    }
}
