use crate::domain::event::ServerEvent;
use crate::domain::message::Message;
use crate::domain::user::User;
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

/// The REST surface the agent synchronizes against.
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn fetch_users(&self) -> anyhow::Result<Vec<User>>;
    async fn fetch_conversation(&self, peer_id: Uuid) -> anyhow::Result<Vec<Message>>;
    async fn send_message(
        &self,
        receiver_id: Uuid,
        text: String,
        images: Vec<String>,
    ) -> anyhow::Result<Message>;
    async fn revoke_message(&self, message_id: Uuid) -> anyhow::Result<Message>;
}

/// `ChatApi` over HTTP against a running server.
#[derive(Debug, Clone)]
pub struct HttpChatApi {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpChatApi {
    #[must_use]
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self { http: reqwest::Client::new(), base_url: base_url.into(), token: token.into() }
    }
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn fetch_users(&self) -> anyhow::Result<Vec<User>> {
        let users = self
            .http
            .get(format!("{}/messages/users", self.base_url))
            .bearer_auth(&self.token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(users)
    }

    async fn fetch_conversation(&self, peer_id: Uuid) -> anyhow::Result<Vec<Message>> {
        let messages = self
            .http
            .get(format!("{}/messages/{peer_id}", self.base_url))
            .bearer_auth(&self.token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(messages)
    }

    async fn send_message(
        &self,
        receiver_id: Uuid,
        text: String,
        images: Vec<String>,
    ) -> anyhow::Result<Message> {
        let message = self
            .http
            .post(format!("{}/messages/send/{receiver_id}", self.base_url))
            .bearer_auth(&self.token)
            .json(&json!({ "text": text, "images": images }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(message)
    }

    async fn revoke_message(&self, message_id: Uuid) -> anyhow::Result<Message> {
        let message = self
            .http
            .delete(format!("{}/messages/delete/{message_id}", self.base_url))
            .bearer_auth(&self.token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(message)
    }
}

/// Revocation lifecycle of one locally held message.
///
/// `PendingRevoke` keeps the pre-revoke message so a failed remote call can
/// restore the exact prior state instead of leaving a stale tombstone.
#[derive(Debug, Clone, PartialEq)]
pub enum RevokeState {
    Pristine,
    PendingRevoke { original: Message },
    Revoked,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocalMessage {
    pub message: Message,
    pub revoke_state: RevokeState,
}

impl LocalMessage {
    fn from_snapshot(message: Message) -> Self {
        let revoke_state = if message.deleted { RevokeState::Revoked } else { RevokeState::Pristine };
        Self { message, revoke_state }
    }
}

/// Local mirror of one user's view: sidebar, presence and the currently
/// open conversation.
#[derive(Debug)]
pub struct ChatStore<A> {
    api: Arc<A>,
    user_id: Uuid,
    selected_peer: Option<Uuid>,
    messages: Vec<LocalMessage>,
    users: Vec<User>,
    online_users: HashSet<Uuid>,
}

impl<A: ChatApi> ChatStore<A> {
    #[must_use]
    pub fn new(api: Arc<A>, user_id: Uuid) -> Self {
        Self {
            api,
            user_id,
            selected_peer: None,
            messages: Vec::new(),
            users: Vec::new(),
            online_users: HashSet::new(),
        }
    }

    /// Refreshes the sidebar listing.
    pub async fn refresh_users(&mut self) -> anyhow::Result<()> {
        self.users = self.api.fetch_users().await?;
        Ok(())
    }

    /// Opens a conversation, replacing any local list with a full snapshot.
    pub async fn open_conversation(&mut self, peer_id: Uuid) -> anyhow::Result<()> {
        let snapshot = self.api.fetch_conversation(peer_id).await?;
        self.selected_peer = Some(peer_id);
        self.messages = snapshot.into_iter().map(LocalMessage::from_snapshot).collect();
        Ok(())
    }

    pub fn close_conversation(&mut self) {
        self.selected_peer = None;
        self.messages.clear();
    }

    /// Applies one push event. Safe against duplicates and reordering:
    /// creation events are deduplicated by id, revocations are idempotent,
    /// and presence arrives as a full snapshot.
    pub fn apply_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::NewMessage(message) => self.apply_new_message(message),
            ServerEvent::MessageRevoked(notice) => self.apply_revocation(notice.message_id),
            ServerEvent::GetOnlineUsers(online) => {
                self.online_users = online.into_iter().collect();
            }
        }
    }

    fn apply_new_message(&mut self, message: Message) {
        let Some(peer_id) = self.selected_peer else {
            return;
        };
        if !message.is_between(self.user_id, peer_id) {
            return;
        }
        if self.messages.iter().any(|local| local.message.id == message.id) {
            return;
        }
        self.messages.push(LocalMessage::from_snapshot(message));
    }

    fn apply_revocation(&mut self, message_id: Uuid) {
        let Some(local) = self.messages.iter_mut().find(|local| local.message.id == message_id)
        else {
            return;
        };
        if local.revoke_state == RevokeState::Revoked {
            return;
        }
        local.message.apply_tombstone();
        local.revoke_state = RevokeState::Revoked;
    }

    /// Sends a message in the open conversation and appends the persisted
    /// record returned by the server.
    ///
    /// # Errors
    /// Fails when no conversation is open or the remote call fails; nothing
    /// is appended in either case.
    pub async fn send_message(&mut self, text: String, images: Vec<String>) -> anyhow::Result<Message> {
        let peer_id =
            self.selected_peer.ok_or_else(|| anyhow::anyhow!("no conversation selected"))?;
        let message = self.api.send_message(peer_id, text, images).await?;
        if !self.messages.iter().any(|local| local.message.id == message.id) {
            self.messages.push(LocalMessage::from_snapshot(message.clone()));
        }
        Ok(message)
    }

    /// Revokes one of the caller's messages with optimistic local mutation:
    /// the tombstone is applied immediately and restored exactly if the
    /// remote call fails.
    ///
    /// Revoking an already-revoked message is a no-op.
    pub async fn revoke_message(&mut self, message_id: Uuid) -> anyhow::Result<()> {
        let index = self
            .messages
            .iter()
            .position(|local| local.message.id == message_id)
            .ok_or_else(|| anyhow::anyhow!("message {message_id} not in the open conversation"))?;

        if self.messages[index].revoke_state == RevokeState::Revoked {
            return Ok(());
        }

        let original = self.messages[index].message.clone();
        self.messages[index].message.apply_tombstone();
        self.messages[index].revoke_state = RevokeState::PendingRevoke { original: original.clone() };

        match self.api.revoke_message(message_id).await {
            Ok(_) => {
                self.messages[index].revoke_state = RevokeState::Revoked;
                Ok(())
            }
            Err(e) => {
                self.messages[index].message = original;
                self.messages[index].revoke_state = RevokeState::Pristine;
                Err(e)
            }
        }
    }

    #[must_use]
    pub fn messages(&self) -> &[LocalMessage] {
        &self.messages
    }

    #[must_use]
    pub fn users(&self) -> &[User] {
        &self.users
    }

    #[must_use]
    pub const fn selected_peer(&self) -> Option<Uuid> {
        self.selected_peer
    }

    #[must_use]
    pub fn is_online(&self, user_id: Uuid) -> bool {
        self.online_users.contains(&user_id)
    }

    #[must_use]
    pub const fn online_users(&self) -> &HashSet<Uuid> {
        &self.online_users
    }
}
