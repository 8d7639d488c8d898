use crate::api::AppState;
use crate::api::middleware::AuthUser;
use crate::domain::message::Message;
use crate::domain::user::User;
use crate::error::Result;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub images: Vec<String>,
}

/// Lists every other user for the conversation sidebar.
pub async fn sidebar_users(auth_user: AuthUser, State(state): State<AppState>) -> Result<Json<Vec<User>>> {
    let users = state.message_service.sidebar_users(auth_user.user_id).await?;
    Ok(Json(users))
}

/// Returns the conversation with a peer in creation order, tombstones
/// included.
pub async fn get_conversation(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(peer_id): Path<Uuid>,
) -> Result<Json<Vec<Message>>> {
    let messages = state.message_service.conversation(auth_user.user_id, peer_id).await?;
    Ok(Json(messages))
}

/// Sends a message to a receiver.
///
/// # Errors
/// Returns `AppError::BadRequest` if the message is empty or carries too
/// many images, and `AppError::NotFound` if the receiver does not exist.
pub async fn send_message(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(receiver_id): Path<Uuid>,
    Json(body): Json<SendMessageRequest>,
) -> Result<impl IntoResponse> {
    let message =
        state.message_service.send(auth_user.user_id, receiver_id, body.text, body.images).await?;

    Ok((StatusCode::CREATED, Json(message)))
}

/// Revokes a message the caller previously sent, returning the tombstone.
///
/// # Errors
/// Returns `AppError::Forbidden` if the caller is not the sender and
/// `AppError::NotFound` if the message does not exist.
pub async fn revoke_message(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
) -> Result<Json<Message>> {
    let message = state.message_service.revoke(message_id, auth_user.user_id).await?;
    Ok(Json(message))
}
