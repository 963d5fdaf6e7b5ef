// SPDX-FileCopyrightText: 2026 Parlo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Route map (all `{id}` parameters are public ids):
//! - unauthenticated: `GET /health`, `GET /metrics`, `GET /ws`, `/chat/*`
//!   (possession of a conversation public id is the capability)
//! - admin bearer token: `POST /bot`, `GET /bot/{id}`, `DELETE /bot/{id}`,
//!   `POST /bot/stop/{id}`
//! - operator bearer token: `GET /operator/get-sessions`,
//!   `POST /operator/send-msg`, `POST /operator/end-session/{id}`,
//!   `POST /chat/ask-close/{id}`

use std::sync::Arc;
use std::time::Instant;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router, middleware as axum_middleware};
use parlo_core::error::ParloError;
use parlo_core::traits::store::ConversationStore;
use parlo_relay::{AdapterFactory, ChannelRegistry, Relay};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

use crate::auth::{self, AuthState};
use crate::hub::PushHub;
use crate::{bot, chat, operator, ws};

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub relay: Arc<Relay>,
    pub store: Arc<dyn ConversationStore>,
    pub registry: Arc<ChannelRegistry>,
    pub hub: Arc<PushHub>,
    pub factory: Arc<dyn AdapterFactory>,
    /// Process start time for uptime reporting.
    pub start_time: Instant,
    /// Prometheus render function, when a recorder is installed.
    pub prometheus_render: Option<Arc<dyn Fn() -> String + Send + Sync>>,
}

/// Gateway server configuration (mirrors `GatewayConfig` from parlo-config).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    /// Admin bearer token. `None` disables the `/bot/*` surface.
    pub admin_token: Option<String>,
}

/// Assemble the full gateway router.
pub fn build_router(config: &ServerConfig, state: GatewayState) -> Router {
    let auth_state = AuthState {
        admin_token: config.admin_token.clone(),
        store: Arc::clone(&state.store),
    };

    let public_routes = Router::new()
        .route("/health", get(get_health))
        .route("/metrics", get(get_metrics))
        .route("/ws", get(ws::ws_handler))
        .with_state(state.clone());

    let admin_routes = Router::new()
        .route("/bot", post(bot::register_bot))
        .route("/bot/{id}", get(bot::get_bot))
        .route("/bot/{id}", delete(bot::delete_bot))
        .route("/bot/stop/{id}", post(bot::stop_bot))
        .route_layer(axum_middleware::from_fn_with_state(
            auth_state.clone(),
            auth::admin_auth,
        ))
        .with_state(state.clone());

    let operator_routes = Router::new()
        .route("/operator/get-sessions", get(operator::get_sessions))
        .route("/operator/send-msg", post(operator::send_msg))
        .route("/operator/end-session/{id}", post(operator::end_session))
        .route("/chat/ask-close/{id}", post(chat::ask_close))
        .route_layer(axum_middleware::from_fn_with_state(
            auth_state,
            auth::operator_auth,
        ))
        .with_state(state.clone());

    let chat_routes = Router::new()
        .route("/chat/open", post(chat::open_chat))
        .route("/chat/close/{id}", put(chat::close_chat))
        .route("/chat/read/{id}", put(chat::read_chat))
        .route("/chat/is-close/{id}", put(chat::answer_close))
        .route("/chat/{id}", post(chat::send_chat))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(admin_routes)
        .merge(operator_routes)
        .merge(chat_routes)
        .layer(CorsLayer::permissive())
}

/// Bind and serve until the cancellation token fires.
pub async fn start_server(
    config: &ServerConfig,
    state: GatewayState,
    cancel: CancellationToken,
) -> Result<(), ParloError> {
    let app = build_router(config, state);

    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener =
        tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| ParloError::Channel {
                message: format!("failed to bind gateway to {addr}: {e}"),
                source: Some(Box::new(e)),
            })?;

    tracing::info!(%addr, "gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|e| ParloError::Channel {
            message: format!("gateway server error: {e}"),
            source: Some(Box::new(e)),
        })?;

    tracing::info!("gateway stopped");
    Ok(())
}

/// GET /health
async fn get_health(
    axum::extract::State(state): axum::extract::State<GatewayState>,
) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "channels_running": state.registry.len(),
    }))
}

/// GET /metrics
async fn get_metrics(
    axum::extract::State(state): axum::extract::State<GatewayState>,
) -> impl IntoResponse {
    match &state.prometheus_render {
        Some(render) => (StatusCode::OK, render()),
        None => (StatusCode::NOT_FOUND, String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_config_debug() {
        let config = ServerConfig {
            bind_address: "127.0.0.1".to_string(),
            port: 8090,
            admin_token: None,
        };
        let debug = format!("{config:?}");
        assert!(debug.contains("127.0.0.1"));
        assert!(debug.contains("8090"));
    }
}
