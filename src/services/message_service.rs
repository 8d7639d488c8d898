use crate::config::MessagingConfig;
use crate::domain::event::RevocationNotice;
use crate::domain::message::Message;
use crate::domain::user::User;
use crate::error::{AppError, Result};
use crate::services::router::DeliveryRouter;
use crate::storage::message_repo::MessageRepository;
use crate::storage::user_repo::UserRepository;
use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram},
};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Clone, Debug)]
struct Metrics {
    sent_total: Counter<u64>,
    revoked_total: Counter<u64>,
    conversation_size: Histogram<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("parley-server");
        Self {
            sent_total: meter
                .u64_counter("parley_messages_sent_total")
                .with_description("Total messages accepted for delivery")
                .build(),
            revoked_total: meter
                .u64_counter("parley_messages_revoked_total")
                .with_description("Total messages tombstoned")
                .build(),
            conversation_size: meter
                .u64_histogram("parley_conversation_fetch_size")
                .with_description("Number of messages returned by a conversation fetch")
                .build(),
        }
    }
}

/// Orchestrates the message lifecycle: validate, persist, then hand the
/// domain event to the router. Persistence is the durability boundary; the
/// push leg is best-effort and never rolls an operation back.
#[derive(Clone, Debug)]
pub struct MessageService {
    repo: MessageRepository,
    users: UserRepository,
    router: DeliveryRouter,
    config: MessagingConfig,
    metrics: Metrics,
}

impl MessageService {
    #[must_use]
    pub fn new(
        repo: MessageRepository,
        users: UserRepository,
        router: DeliveryRouter,
        config: MessagingConfig,
    ) -> Self {
        Self { repo, users, router, config, metrics: Metrics::new() }
    }

    /// Sends a message to a receiver, persisting it and pushing it to the
    /// receiver's live connection when present.
    ///
    /// # Errors
    /// Returns `AppError::BadRequest` for an empty send or too many images,
    /// `AppError::NotFound` if the receiver does not exist, and
    /// `AppError::Database` if the message cannot be stored.
    #[tracing::instrument(
        err(level = "warn"),
        skip(self, text, images),
        fields(sender_id = %sender_id, receiver_id = %receiver_id)
    )]
    pub async fn send(
        &self,
        sender_id: Uuid,
        receiver_id: Uuid,
        text: String,
        images: Vec<String>,
    ) -> Result<Message> {
        if text.is_empty() && images.is_empty() {
            return Err(AppError::BadRequest("Message must contain text or images".to_string()));
        }
        if images.len() > self.config.max_images_per_message {
            return Err(AppError::BadRequest(format!(
                "A message can carry at most {} images",
                self.config.max_images_per_message
            )));
        }
        if !self.users.exists(receiver_id).await? {
            return Err(AppError::NotFound);
        }

        match self.repo.create(sender_id, receiver_id, text, images).await {
            Ok(message) => {
                tracing::debug!(message_id = %message.id, "Message stored");
                self.metrics.sent_total.add(1, &[KeyValue::new("status", "success")]);

                self.router.message_created(&message);
                Ok(message)
            }
            Err(e) => {
                self.metrics.sent_total.add(1, &[KeyValue::new("status", "failure")]);
                Err(e)
            }
        }
    }

    /// Revokes a message on behalf of its sender.
    ///
    /// The store performs the permission check and the tombstone write as a
    /// single conditional update; only after that commits is the revocation
    /// announced to connected clients.
    ///
    /// # Errors
    /// Returns `AppError::Forbidden` if the requester is not the sender and
    /// `AppError::NotFound` if the message does not exist.
    #[tracing::instrument(
        err(level = "warn"),
        skip(self),
        fields(message_id = %message_id, requester_id = %requester_id)
    )]
    pub async fn revoke(&self, message_id: Uuid, requester_id: Uuid) -> Result<Message> {
        let message = self.repo.mark_deleted(message_id, requester_id).await?;
        self.metrics.revoked_total.add(1, &[]);

        let notice = RevocationNotice::from_tombstone(&message, OffsetDateTime::now_utc());
        self.router.message_revoked(&notice);

        Ok(message)
    }

    /// The conversation between two users in creation order, tombstones
    /// included so client timelines stay stable.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(err(level = "warn"), skip(self), fields(user_id = %user_id, peer_id = %peer_id))]
    pub async fn conversation(&self, user_id: Uuid, peer_id: Uuid) -> Result<Vec<Message>> {
        let messages = self.repo.find_conversation(user_id, peer_id).await?;
        self.metrics.conversation_size.record(messages.len() as u64, &[]);
        Ok(messages)
    }

    /// Every other user, for the conversation sidebar.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(err(level = "warn"), skip(self), fields(user_id = %user_id))]
    pub async fn sidebar_users(&self, user_id: Uuid) -> Result<Vec<User>> {
        self.users.list_others(user_id).await
    }
}
