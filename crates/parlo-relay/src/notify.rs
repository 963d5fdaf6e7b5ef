// SPDX-FileCopyrightText: 2026 Parlo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound notifier wrapping channel sends with a bounded timeout and a
//! retry-once policy.
//!
//! Callers notify after their store mutation committed; a failed
//! notification never rolls anything back, so every method degrades to a
//! log line instead of an error. Event publication to the live sink is
//! best effort by contract.

use std::sync::Arc;
use std::time::Duration;

use parlo_core::traits::sink::EventSink;
use parlo_core::types::{Keyboard, MessageId, StoredMessage};
use parlo_config::model::NotifyConfig;
use tokio::time;
use tracing::{debug, warn};

use crate::metrics;
use crate::registry::ChannelRegistry;

/// Topic carrying a conversation's live events.
pub fn chat_topic(conversation_public_id: &str) -> String {
    format!("chat:{conversation_public_id}")
}

/// Topic carrying an operator's live events.
pub fn op_topic(operator_public_id: &str) -> String {
    format!("op:{operator_public_id}")
}

/// The externally visible projection of a stored message. Numeric row ids
/// never cross the process boundary.
pub fn message_json(message: &StoredMessage) -> serde_json::Value {
    serde_json::json!({
        "id": message.public_id,
        "sender": message.sender,
        "content": message.content,
        "is_read": message.is_read,
        "created_at": message.created_at,
    })
}

/// Delivers outbound messages and live events without ever failing the
/// caller.
pub struct Notifier {
    registry: Arc<ChannelRegistry>,
    sink: Arc<dyn EventSink>,
    config: NotifyConfig,
}

impl Notifier {
    pub fn new(registry: Arc<ChannelRegistry>, sink: Arc<dyn EventSink>, config: NotifyConfig) -> Self {
        Self {
            registry,
            sink,
            config,
        }
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.config.timeout_ms)
    }

    /// Send a plain text message. Returns the channel-native message id on
    /// success, `None` after the retry also failed.
    pub async fn send_text(&self, channel_id: i64, to: &str, text: &str) -> Option<MessageId> {
        let Some(adapter) = self.registry.lookup(channel_id) else {
            warn!(channel_id, "send skipped: channel not running");
            metrics::record_notification("failed");
            return None;
        };
        match time::timeout(self.timeout(), adapter.send_text(to, text)).await {
            Ok(Ok(id)) => {
                metrics::record_notification("sent");
                return Some(id);
            }
            Ok(Err(e)) => debug!(error = %e, channel_id, "send failed, retrying once"),
            Err(_) => debug!(channel_id, "send timed out, retrying once"),
        }
        time::sleep(Duration::from_millis(self.config.retry_delay_ms)).await;
        match time::timeout(self.timeout(), adapter.send_text(to, text)).await {
            Ok(Ok(id)) => {
                metrics::record_notification("sent");
                Some(id)
            }
            Ok(Err(e)) => {
                warn!(error = %e, channel_id, "send failed after retry");
                metrics::record_notification("failed");
                None
            }
            Err(_) => {
                warn!(
                    channel_id,
                    timeout_ms = self.config.timeout_ms,
                    "send timed out after retry"
                );
                metrics::record_notification("failed");
                None
            }
        }
    }

    /// Send a text message with a keyboard, falling back to plain text on
    /// channels without keyboard support.
    pub async fn send_with_keyboard(
        &self,
        channel_id: i64,
        to: &str,
        text: &str,
        keyboard: &Keyboard,
    ) -> Option<MessageId> {
        let Some(adapter) = self.registry.lookup(channel_id) else {
            warn!(channel_id, "send skipped: channel not running");
            metrics::record_notification("failed");
            return None;
        };
        if !adapter.capabilities().supports_keyboards {
            return self.send_text(channel_id, to, text).await;
        }
        match time::timeout(self.timeout(), adapter.send_with_keyboard(to, text, keyboard)).await {
            Ok(Ok(id)) => {
                metrics::record_notification("sent");
                return Some(id);
            }
            Ok(Err(e)) => debug!(error = %e, channel_id, "keyboard send failed, retrying once"),
            Err(_) => debug!(channel_id, "keyboard send timed out, retrying once"),
        }
        time::sleep(Duration::from_millis(self.config.retry_delay_ms)).await;
        match time::timeout(self.timeout(), adapter.send_with_keyboard(to, text, keyboard)).await {
            Ok(Ok(id)) => {
                metrics::record_notification("sent");
                Some(id)
            }
            Ok(Err(e)) => {
                warn!(error = %e, channel_id, "keyboard send failed after retry");
                metrics::record_notification("failed");
                None
            }
            Err(_) => {
                warn!(
                    channel_id,
                    timeout_ms = self.config.timeout_ms,
                    "keyboard send timed out after retry"
                );
                metrics::record_notification("failed");
                None
            }
        }
    }

    /// Show a typing indicator. Single attempt, skipped on channels
    /// without typing support.
    pub async fn send_typing(&self, channel_id: i64, to: &str) {
        let Some(adapter) = self.registry.lookup(channel_id) else {
            return;
        };
        if !adapter.capabilities().supports_typing {
            return;
        }
        if let Ok(Err(e)) = time::timeout(self.timeout(), adapter.send_typing(to)).await {
            debug!(error = %e, channel_id, "typing indicator failed");
        }
    }

    /// Delete a previously sent message. Single attempt, capability gated.
    pub async fn delete_message(&self, channel_id: i64, to: &str, id: &MessageId) {
        let Some(adapter) = self.registry.lookup(channel_id) else {
            return;
        };
        if !adapter.capabilities().supports_delete {
            return;
        }
        if let Ok(Err(e)) = time::timeout(self.timeout(), adapter.delete_message(to, id)).await {
            debug!(error = %e, channel_id, "message delete failed");
        }
    }

    /// Edit a previously sent message's text. Single attempt, capability
    /// gated.
    pub async fn edit_text(&self, channel_id: i64, to: &str, id: &MessageId, text: &str) {
        let Some(adapter) = self.registry.lookup(channel_id) else {
            return;
        };
        if !adapter.capabilities().supports_edit {
            return;
        }
        if let Ok(Err(e)) = time::timeout(self.timeout(), adapter.edit_text(to, id, text)).await {
            debug!(error = %e, channel_id, "message edit failed");
        }
    }

    /// Publish a live event to the sink.
    pub async fn publish(&self, topic: &str, event: serde_json::Value) {
        self.sink.publish(topic, event).await;
    }
}
