// SPDX-FileCopyrightText: 2026 Parlo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP/WebSocket gateway for the Parlo support relay.
//!
//! Serves the admin, operator, and widget REST surfaces plus the `/ws`
//! push socket, and doubles as the channel adapter for the built-in `web`
//! channel: widget clients send over REST and receive over their
//! websocket subscription, so from the relay's point of view the web
//! widget is a channel like any other.

pub mod auth;
pub mod bot;
pub mod chat;
pub mod envelope;
pub mod hub;
pub mod operator;
pub mod recorder;
pub mod server;
pub mod ws;

use std::sync::Arc;

use async_trait::async_trait;
use parlo_core::error::ParloError;
use parlo_core::traits::adapter::PluginAdapter;
use parlo_core::traits::channel::ChannelAdapter;
use parlo_core::types::{
    AdapterType, ChannelCapabilities, CommandMenu, HealthStatus, InboundEvent, Keyboard,
    MessageId, new_public_id,
};
use serde_json::json;

pub use hub::PushHub;
pub use recorder::MetricsRecorder;
pub use server::{GatewayState, ServerConfig, build_router, start_server};

/// Topic carrying the web channel's direct sends for one widget client.
pub fn user_topic(external_id: &str) -> String {
    format!("user:{external_id}")
}

/// The built-in web channel adapter.
///
/// Outbound sends become hub events on the recipient's `user:` topic;
/// inbound traffic arrives through the REST handlers, which call the
/// relay operations directly, so `receive` pends forever.
pub struct WebChannel {
    hub: Arc<PushHub>,
}

impl WebChannel {
    pub fn new(hub: Arc<PushHub>) -> Self {
        Self { hub }
    }

    fn mint_id() -> MessageId {
        MessageId(format!("ws-{}", new_public_id()))
    }
}

#[async_trait]
impl PluginAdapter for WebChannel {
    fn name(&self) -> &str {
        "web"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Channel
    }

    async fn health_check(&self) -> Result<HealthStatus, ParloError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ParloError> {
        Ok(())
    }
}

#[async_trait]
impl ChannelAdapter for WebChannel {
    fn capabilities(&self) -> ChannelCapabilities {
        ChannelCapabilities {
            supports_edit: true,
            supports_delete: true,
            supports_typing: true,
            supports_keyboards: true,
            supports_command_menu: false,
            supports_media: false,
            max_message_length: None,
        }
    }

    async fn connect(&mut self) -> Result<(), ParloError> {
        Ok(())
    }

    async fn receive(&self) -> Result<InboundEvent, ParloError> {
        // Widget inbound traffic comes in over REST, not this stream.
        futures::future::pending().await
    }

    async fn send_text(&self, to: &str, text: &str) -> Result<MessageId, ParloError> {
        let id = Self::mint_id();
        self.hub
            .publish(&user_topic(to), json!({"event": "text", "id": id.0, "text": text}))
            .await;
        Ok(id)
    }

    async fn send_with_keyboard(
        &self,
        to: &str,
        text: &str,
        keyboard: &Keyboard,
    ) -> Result<MessageId, ParloError> {
        let id = Self::mint_id();
        self.hub
            .publish(
                &user_topic(to),
                json!({"event": "keyboard", "id": id.0, "text": text, "keyboard": keyboard}),
            )
            .await;
        Ok(id)
    }

    async fn send_typing(&self, to: &str) -> Result<(), ParloError> {
        self.hub.publish(&user_topic(to), json!({"event": "typing"})).await;
        Ok(())
    }

    async fn delete_message(&self, to: &str, id: &MessageId) -> Result<(), ParloError> {
        self.hub
            .publish(&user_topic(to), json!({"event": "delete", "id": id.0}))
            .await;
        Ok(())
    }

    async fn edit_text(&self, to: &str, id: &MessageId, text: &str) -> Result<(), ParloError> {
        self.hub
            .publish(&user_topic(to), json!({"event": "edit", "id": id.0, "text": text}))
            .await;
        Ok(())
    }

    async fn edit_caption(
        &self,
        to: &str,
        id: &MessageId,
        caption: &str,
    ) -> Result<(), ParloError> {
        self.hub
            .publish(
                &user_topic(to),
                json!({"event": "edit_caption", "id": id.0, "caption": caption}),
            )
            .await;
        Ok(())
    }

    async fn set_command_menu(&self, _menus: &[CommandMenu]) -> Result<(), ParloError> {
        // The widget has no command surface.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;

    async fn subscribed(hub: &PushHub, topic: &str) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(8);
        hub.attach(topic, hub.subscriber_id(), tx);
        rx
    }

    #[tokio::test]
    async fn send_text_reaches_the_user_topic() {
        let hub = Arc::new(PushHub::new());
        let mut rx = subscribed(&hub, "user:w-1").await;
        let channel = WebChannel::new(Arc::clone(&hub));

        let id = channel.send_text("w-1", "hello").await.unwrap();
        let event: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(event["event"], "text");
        assert_eq!(event["text"], "hello");
        assert_eq!(event["id"], id.0);
        assert!(id.0.starts_with("ws-"));
    }

    #[tokio::test]
    async fn keyboard_sends_carry_the_keyboard_json() {
        let hub = Arc::new(PushHub::new());
        let mut rx = subscribed(&hub, "user:w-2").await;
        let channel = WebChannel::new(Arc::clone(&hub));

        channel
            .send_with_keyboard("w-2", "rate us", &Keyboard::Remove)
            .await
            .unwrap();
        let event: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(event["event"], "keyboard");
        assert_eq!(event["text"], "rate us");
        assert!(!event["keyboard"].is_null());
    }

    #[tokio::test]
    async fn edits_and_deletes_are_pushed_as_events() {
        let hub = Arc::new(PushHub::new());
        let mut rx = subscribed(&hub, "user:w-3").await;
        let channel = WebChannel::new(Arc::clone(&hub));

        let id = MessageId::from("ws-m1");
        channel.edit_text("w-3", &id, "fixed").await.unwrap();
        channel.delete_message("w-3", &id).await.unwrap();

        let edit: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(edit["event"], "edit");
        assert_eq!(edit["text"], "fixed");
        let delete: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(delete["event"], "delete");
        assert_eq!(delete["id"], "ws-m1");
    }

    #[test]
    fn capabilities_exclude_media_and_menus() {
        let channel = WebChannel::new(Arc::new(PushHub::new()));
        let caps = channel.capabilities();
        assert!(caps.supports_keyboards);
        assert!(caps.supports_typing);
        assert!(!caps.supports_media);
        assert!(!caps.supports_command_menu);
        assert!(caps.max_message_length.is_none());
    }
}
