use crate::domain::message::Message;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Notification payload derived from a message transitioning to deleted.
///
/// Ephemeral: never persisted, delivered at-least-once, and consumers must
/// apply it idempotently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevocationNotice {
    pub message_id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl RevocationNotice {
    /// Derives the notice from a freshly tombstoned message.
    #[must_use]
    pub fn from_tombstone(message: &Message, timestamp: OffsetDateTime) -> Self {
        Self {
            message_id: message.id,
            sender_id: message.sender_id,
            receiver_id: message.receiver_id,
            timestamp,
        }
    }
}

/// Push events sent to connected clients as tagged JSON text frames.
///
/// Tags match the original browser client's event names, so payloads look
/// like `{"event":"newMessage","data":{...}}` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    NewMessage(Message),
    MessageRevoked(RevocationNotice),
    GetOnlineUsers(Vec<Uuid>),
}
