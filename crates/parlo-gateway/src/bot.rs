// SPDX-FileCopyrightText: 2026 Parlo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Admin handlers for channel (bot) management.
//!
//! All routes here sit behind the admin bearer token. Registration
//! persists the channel record, builds an adapter through the factory,
//! and hands it to the registry; tokens go into storage only and never
//! appear in responses.

use axum::Json;
use axum::extract::{Path, State};
use parlo_core::error::ParloError;
use parlo_core::types::{Channel, ChannelKind, NewChannel};
use serde::Deserialize;
use serde_json::json;

use crate::envelope::{ApiError, ok};
use crate::server::GatewayState;

#[derive(Debug, Deserialize)]
pub struct RegisterBotRequest {
    /// Backend token (e.g. a Telegram Bot API token).
    pub token: String,
    /// Channel kind; defaults to `telegram`.
    #[serde(default)]
    pub kind: Option<ChannelKind>,
}

/// The admin-facing projection of a channel record.
pub(crate) fn channel_json(channel: &Channel, running: bool) -> serde_json::Value {
    json!({
        "id": channel.public_id,
        "kind": channel.kind,
        "username": channel.username,
        "active": channel.active,
        "running": running,
        "created_at": channel.created_at,
    })
}

/// POST /bot
pub async fn register_bot(
    State(state): State<GatewayState>,
    Json(body): Json<RegisterBotRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let kind = body.kind.unwrap_or(ChannelKind::Telegram);
    if kind == ChannelKind::Web {
        return Err(ParloError::InvalidInput(
            "the web channel is built in and cannot be registered".to_string(),
        )
        .into());
    }
    if body.token.trim().is_empty() {
        return Err(ParloError::InvalidInput("token is required".to_string()).into());
    }

    let record = state
        .store
        .create_channel(&NewChannel {
            kind,
            token: body.token.clone(),
            username: None,
        })
        .await?;

    let spawn = async {
        let adapter = state.factory.create(&record, body.token).await?;
        state.registry.register(record.clone(), adapter).await
    };
    if let Err(e) = spawn.await {
        // Connect failed; drop the record so a bad token leaves no trace.
        let _ = state.store.delete_channel(record.id).await;
        return Err(e.into());
    }

    let mut record = record;
    if let Some(adapter) = state.registry.lookup(record.id)
        && let Some(username) = adapter.username()
    {
        state.store.set_channel_username(record.id, &username).await?;
        record.username = Some(username);
    }
    tracing::info!(channel = %record.public_id, kind = %record.kind, "channel registered via admin api");
    Ok(ok(channel_json(&record, true)))
}

/// Resolve a channel public id, treating soft-deleted rows as missing.
async fn resolve_channel(state: &GatewayState, public_id: &str) -> Result<Channel, ParloError> {
    state
        .store
        .find_channel_by_public_id(public_id)
        .await?
        .filter(|c| !c.deleted)
        .ok_or(ParloError::NotFound("channel"))
}

/// GET /bot/{id}
pub async fn get_bot(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let channel = resolve_channel(&state, &id).await?;
    let running = state.registry.is_running(channel.id);
    Ok(ok(channel_json(&channel, running)))
}

/// DELETE /bot/{id}
pub async fn delete_bot(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let channel = resolve_channel(&state, &id).await?;
    if channel.kind == ChannelKind::Web {
        return Err(ParloError::InvalidInput(
            "the web channel cannot be deleted".to_string(),
        )
        .into());
    }
    state.registry.deregister(channel.id).await;
    state.store.delete_channel(channel.id).await?;
    tracing::info!(channel = %channel.public_id, "channel deleted via admin api");
    Ok(ok(json!({"id": channel.public_id, "deleted": true})))
}

/// POST /bot/stop/{id}
///
/// Stops the running adapter and deactivates the record; the channel is
/// kept and can be respawned by re-registering or at next startup after
/// reactivation.
pub async fn stop_bot(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let channel = resolve_channel(&state, &id).await?;
    if channel.kind == ChannelKind::Web {
        return Err(ParloError::InvalidInput(
            "the web channel cannot be stopped".to_string(),
        )
        .into());
    }
    state.registry.deregister(channel.id).await;
    state.store.set_channel_active(channel.id, false).await?;
    let channel = state.store.get_channel(channel.id).await?;
    tracing::info!(channel = %channel.public_id, "channel stopped via admin api");
    Ok(ok(channel_json(&channel, false)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_request_defaults_to_telegram() {
        let req: RegisterBotRequest = serde_json::from_str(r#"{"token": "123:abc"}"#).unwrap();
        assert_eq!(req.token, "123:abc");
        assert!(req.kind.is_none());
    }

    #[test]
    fn register_request_accepts_explicit_kind() {
        let req: RegisterBotRequest =
            serde_json::from_str(r#"{"token": "123:abc", "kind": "telegram"}"#).unwrap();
        assert_eq!(req.kind, Some(ChannelKind::Telegram));
    }

    #[test]
    fn channel_json_never_carries_a_token() {
        let channel = Channel {
            id: 1,
            public_id: "ch1".to_string(),
            kind: ChannelKind::Telegram,
            username: Some("support_bot".to_string()),
            active: true,
            deleted: false,
            created_at: "2026-01-01T00:00:00Z".to_string(),
        };
        let json = channel_json(&channel, true);
        assert_eq!(json["id"], "ch1");
        assert_eq!(json["kind"], "telegram");
        assert_eq!(json["running"], true);
        assert!(json.get("token").is_none());
    }
}
