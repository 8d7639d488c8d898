use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// One unit of communication between two users.
///
/// A message is created once and mutated only by revocation, which flips
/// `deleted` and clears the content in the same step. Rows are never
/// physically removed, so a client holding a stale id always resolves it to
/// a tombstone instead of a not-found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub text: String,
    pub images: Vec<String>,
    pub deleted: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Message {
    /// Whether the given pair of users is this message's conversation,
    /// in either direction.
    #[must_use]
    pub fn is_between(&self, user_a: Uuid, user_b: Uuid) -> bool {
        (self.sender_id == user_a && self.receiver_id == user_b)
            || (self.sender_id == user_b && self.receiver_id == user_a)
    }

    /// Clears the content in place, leaving identity and timestamps intact.
    pub fn apply_tombstone(&mut self) {
        self.deleted = true;
        self.text.clear();
        self.images.clear();
    }
}
