// SPDX-FileCopyrightText: 2026 Parlo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Widget-side chat handlers.
//!
//! No authentication: possession of a conversation public id is the
//! capability. `POST /chat/open` mints that capability; everything else
//! resolves it and fails with 1404 on garbage ids. The ask-close route
//! lives here too but is mounted behind the operator auth layer.

use axum::extract::{Path, State};
use axum::{Extension, Json};
use parlo_core::error::ParloError;
use parlo_core::types::{Conversation, MessageContent, Operator, ParticipantRole};
use parlo_relay::notify::message_json;
use serde::Deserialize;
use serde_json::json;

use crate::envelope::{ApiError, ok};
use crate::server::GatewayState;

#[derive(Debug, Deserialize)]
pub struct OpenChatRequest {
    /// Widget-chosen stable client identifier.
    pub client_id: String,
    /// Preferred language; unknown codes fall back to the default.
    #[serde(default)]
    pub language: Option<String>,
    /// Opening question, stored as the first client message.
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SendChatRequest {
    /// Plain text shorthand.
    #[serde(default)]
    pub text: Option<String>,
    /// Full structured content; takes precedence over `text`.
    #[serde(default)]
    pub content: Option<MessageContent>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CloseChatRequest {
    #[serde(default)]
    pub rating: Option<u8>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReadChatRequest {
    /// Which side is reading; defaults to the client.
    #[serde(default)]
    pub reader: Option<ParticipantRole>,
    /// Watermark message public id; everything up to and including it is
    /// marked read. Absent means all.
    #[serde(default)]
    pub until: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CloseAnswerRequest {
    pub accept: bool,
}

/// The externally visible projection of a conversation. Numeric row ids
/// never cross the process boundary.
pub(crate) fn conversation_json(conversation: &Conversation) -> serde_json::Value {
    json!({
        "id": conversation.public_id,
        "status": conversation.status,
        "language": conversation.language,
        "rating": conversation.rating,
        "created_at": conversation.created_at,
        "closed_at": conversation.closed_at,
    })
}

/// POST /chat/open
pub async fn open_chat(
    State(state): State<GatewayState>,
    Json(body): Json<OpenChatRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (conversation, opening) = state
        .relay
        .open_web_conversation(&body.client_id, body.language.as_deref(), body.text.as_deref())
        .await?;
    Ok(ok(json!({
        "conversation": conversation_json(&conversation),
        "message": opening.as_ref().map(message_json),
    })))
}

/// POST /chat/{id}
pub async fn send_chat(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    Json(body): Json<SendChatRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let content = match (body.content, body.text) {
        (Some(content), _) => content,
        (None, Some(text)) if !text.trim().is_empty() => MessageContent::Text { text },
        _ => {
            return Err(ParloError::InvalidInput("message body is empty".to_string()).into());
        }
    };
    let stored = state.relay.client_send(&id, content).await?;
    Ok(ok(message_json(&stored)))
}

/// PUT /chat/close/{id}
pub async fn close_chat(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    body: Option<Json<CloseChatRequest>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let rating = body.map(|Json(b)| b.rating).unwrap_or_default();
    let closed = state
        .relay
        .close_conversation(&id, rating, ParticipantRole::Client)
        .await?;
    Ok(ok(conversation_json(&closed)))
}

/// PUT /chat/read/{id}
pub async fn read_chat(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    body: Option<Json<ReadChatRequest>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let reader = body.reader.unwrap_or(ParticipantRole::Client);
    let flipped = state.relay.mark_read(&id, reader, body.until.as_deref()).await?;
    Ok(ok(json!({"read": flipped})))
}

/// POST /chat/ask-close/{id} (operator auth)
pub async fn ask_close(
    State(state): State<GatewayState>,
    Extension(operator): Extension<Operator>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let stored = state.relay.ask_to_close(&operator, &id).await?;
    Ok(ok(message_json(&stored)))
}

/// PUT /chat/is-close/{id}
///
/// `{id}` is the public id of the pending `ask_close` message.
pub async fn answer_close(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    Json(body): Json<CloseAnswerRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.relay.answer_close_request(&id, body.accept).await?;
    Ok(ok(json!({"accept": body.accept})))
}
