use crate::domain::message::Message;
use crate::error::{AppError, Result};
use sqlx::PgPool;
use uuid::Uuid;

const MESSAGE_COLUMNS: &str = "id, sender_id, receiver_id, text, images, deleted, created_at";

#[derive(Clone, Debug)]
pub struct MessageRepository {
    pool: PgPool,
}

impl MessageRepository {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Persists a new message and returns it with its server-assigned id.
    ///
    /// Ids are UUIDv7 so they sort by creation time within a conversation.
    pub async fn create(
        &self,
        sender_id: Uuid,
        receiver_id: Uuid,
        text: String,
        images: Vec<String>,
    ) -> Result<Message> {
        let message = sqlx::query_as::<_, Message>(&format!(
            r#"
            INSERT INTO messages (id, sender_id, receiver_id, text, images)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {MESSAGE_COLUMNS}
            "#,
        ))
        .bind(Uuid::now_v7())
        .bind(sender_id)
        .bind(receiver_id)
        .bind(text)
        .bind(images)
        .fetch_one(&self.pool)
        .await?;

        Ok(message)
    }

    pub async fn find_by_id(&self, message_id: Uuid) -> Result<Message> {
        sqlx::query_as::<_, Message>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1",
        ))
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::NotFound)
    }

    /// All messages between the pair in creation order, tombstones included.
    pub async fn find_conversation(&self, user_a: Uuid, user_b: Uuid) -> Result<Vec<Message>> {
        let messages = sqlx::query_as::<_, Message>(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS}
            FROM messages
            WHERE (sender_id = $1 AND receiver_id = $2)
               OR (sender_id = $2 AND receiver_id = $1)
            ORDER BY created_at ASC, id ASC
            "#,
        ))
        .bind(user_a)
        .bind(user_b)
        .fetch_all(&self.pool)
        .await?;

        Ok(messages)
    }

    /// Tombstones a message if and only if the requester is its sender.
    ///
    /// Permission check and mutation happen in one conditional UPDATE, so
    /// there is no window between them. Re-revoking an already-tombstoned
    /// message by its sender re-applies the (empty) tombstone and succeeds.
    ///
    /// # Errors
    /// Returns `AppError::Forbidden` if the message exists but the requester
    /// is not the sender, `AppError::NotFound` if no such message exists.
    pub async fn mark_deleted(&self, message_id: Uuid, requester_id: Uuid) -> Result<Message> {
        let updated = sqlx::query_as::<_, Message>(&format!(
            r#"
            UPDATE messages
            SET deleted = TRUE, text = '', images = '{{}}'
            WHERE id = $1 AND sender_id = $2
            RETURNING {MESSAGE_COLUMNS}
            "#,
        ))
        .bind(message_id)
        .bind(requester_id)
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(message) => Ok(message),
            // The update matched nothing; a follow-up read only classifies
            // the error, the mutation itself stays atomic.
            None => {
                let exists: bool =
                    sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM messages WHERE id = $1)")
                        .bind(message_id)
                        .fetch_one(&self.pool)
                        .await?;
                if exists { Err(AppError::Forbidden) } else { Err(AppError::NotFound) }
            }
        }
    }
}
