// SPDX-FileCopyrightText: 2026 Parlo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Operator dashboard handlers.
//!
//! The operator auth layer resolves the bearer token and injects the
//! matched [`Operator`] record; everything here delegates to the relay
//! operations, which enforce ownership and lifecycle rules.

use axum::extract::{Path, State};
use axum::{Extension, Json};
use parlo_core::types::{Operator, ParticipantRole};
use parlo_relay::notify::message_json;
use serde::Deserialize;
use serde_json::json;

use crate::chat::conversation_json;
use crate::envelope::{ApiError, ok};
use crate::server::GatewayState;

#[derive(Debug, Deserialize)]
pub struct SendMsgRequest {
    /// Conversation public id.
    pub session_id: String,
    pub text: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct EndSessionRequest {
    /// Rating recorded on the client's behalf, 1-5.
    #[serde(default)]
    pub rating: Option<u8>,
}

/// GET /operator/get-sessions
///
/// Every WAITING conversation (claimable by anyone) plus the caller's own
/// BUSY ones, with unread counts and last-activity times.
pub async fn get_sessions(
    State(state): State<GatewayState>,
    Extension(operator): Extension<Operator>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let sessions = state.store.list_sessions(operator.id).await?;
    Ok(ok(json!(sessions)))
}

/// POST /operator/send-msg
///
/// Sending to a WAITING conversation claims it for the caller first.
pub async fn send_msg(
    State(state): State<GatewayState>,
    Extension(operator): Extension<Operator>,
    Json(body): Json<SendMsgRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let stored = state
        .relay
        .operator_send(&operator, &body.session_id, &body.text)
        .await?;
    Ok(ok(message_json(&stored)))
}

/// POST /operator/end-session/{id}
pub async fn end_session(
    State(state): State<GatewayState>,
    Extension(_operator): Extension<Operator>,
    Path(id): Path<String>,
    body: Option<Json<EndSessionRequest>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let rating = body.map(|Json(b)| b.rating).unwrap_or_default();
    let closed = state
        .relay
        .close_conversation(&id, rating, ParticipantRole::Support)
        .await?;
    Ok(ok(conversation_json(&closed)))
}
