// SPDX-FileCopyrightText: 2026 Parlo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WebSocket endpoint for live event push.
//!
//! A socket starts with no subscriptions and sends subscribe commands,
//! one per message:
//!
//! ```json
//! {"subscribe": {"chat": "<conversation_public_id>"}}
//! {"subscribe": {"user": "<client_id>"}}
//! {"subscribe": {"operator": "<bearer_token>"}}
//! ```
//!
//! `chat` follows the capability model of the REST surface (possession of
//! the public id); `user` receives the web channel's adapter sends;
//! `operator` is verified against operator records and subscribes the
//! operator's own topic. The server confirms each subscription with
//! `{"event": "subscribed", "topic": ...}` and pushes hub events as-is.

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;

use crate::server::GatewayState;

#[derive(Debug, Deserialize)]
struct WsIncoming {
    subscribe: WsSubscribe,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum WsSubscribe {
    /// Subscribe a conversation's live events by public id.
    Chat(String),
    /// Subscribe the web channel's direct sends for a client id.
    User(String),
    /// Subscribe an operator's events; the value is the bearer token.
    Operator(String),
}

/// GET /ws
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<GatewayState>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Resolve a subscribe command to a hub topic, or an error message.
async fn resolve_topic(state: &GatewayState, subscribe: WsSubscribe) -> Result<String, String> {
    match subscribe {
        WsSubscribe::Chat(public_id) => {
            match state.store.find_conversation_by_public_id(&public_id).await {
                Ok(Some(conversation)) => {
                    Ok(parlo_relay::notify::chat_topic(&conversation.public_id))
                }
                Ok(None) => Err("conversation not found".to_string()),
                Err(e) => {
                    tracing::error!(error = %e, "ws subscribe lookup failed");
                    Err("internal error".to_string())
                }
            }
        }
        WsSubscribe::User(client_id) => {
            if client_id.trim().is_empty() {
                return Err("client id is empty".to_string());
            }
            Ok(crate::user_topic(&client_id))
        }
        WsSubscribe::Operator(token) => match state.store.find_operator_by_token(&token).await {
            Ok(Some(operator)) => Ok(parlo_relay::notify::op_topic(&operator.public_id)),
            Ok(None) => Err("unknown operator token".to_string()),
            Err(e) => {
                tracing::error!(error = %e, "ws subscribe lookup failed");
                Err("internal error".to_string())
            }
        },
    }
}

async fn handle_socket(socket: WebSocket, state: GatewayState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let subscriber = state.hub.subscriber_id();

    let (tx, mut rx) = mpsc::channel::<String>(64);
    let sender_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if ws_sender.send(Message::Text(event.into())).await.is_err() {
                break;
            }
        }
    });

    let mut topics: Vec<String> = Vec::new();
    while let Some(Ok(message)) = ws_receiver.next().await {
        match message {
            Message::Text(text) => {
                let incoming: WsIncoming = match serde_json::from_str(&text) {
                    Ok(v) => v,
                    Err(e) => {
                        let _ = tx
                            .send(json!({"event": "error", "message": format!("invalid command: {e}")}).to_string())
                            .await;
                        continue;
                    }
                };
                match resolve_topic(&state, incoming.subscribe).await {
                    Ok(topic) => {
                        if !topics.contains(&topic) {
                            state.hub.attach(&topic, subscriber, tx.clone());
                            topics.push(topic.clone());
                        }
                        let _ = tx
                            .send(json!({"event": "subscribed", "topic": topic}).to_string())
                            .await;
                    }
                    Err(message) => {
                        let _ = tx
                            .send(json!({"event": "error", "message": message}).to_string())
                            .await;
                    }
                }
            }
            Message::Close(_) => break,
            // Ping/pong is handled by the protocol layer; binary is ignored.
            _ => {}
        }
    }

    for topic in &topics {
        state.hub.detach(topic, subscriber);
    }
    sender_task.abort();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_chat_deserializes() {
        let cmd: WsIncoming = serde_json::from_str(r#"{"subscribe": {"chat": "c1"}}"#).unwrap();
        assert!(matches!(cmd.subscribe, WsSubscribe::Chat(id) if id == "c1"));
    }

    #[test]
    fn subscribe_operator_deserializes() {
        let cmd: WsIncoming =
            serde_json::from_str(r#"{"subscribe": {"operator": "tok-1"}}"#).unwrap();
        assert!(matches!(cmd.subscribe, WsSubscribe::Operator(t) if t == "tok-1"));
    }

    #[test]
    fn subscribe_user_deserializes() {
        let cmd: WsIncoming = serde_json::from_str(r#"{"subscribe": {"user": "w-9"}}"#).unwrap();
        assert!(matches!(cmd.subscribe, WsSubscribe::User(id) if id == "w-9"));
    }

    #[test]
    fn unknown_commands_are_rejected() {
        assert!(serde_json::from_str::<WsIncoming>(r#"{"publish": "x"}"#).is_err());
        assert!(serde_json::from_str::<WsIncoming>(r#"{"subscribe": {"room": "x"}}"#).is_err());
    }
}
