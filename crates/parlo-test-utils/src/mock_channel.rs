// SPDX-FileCopyrightText: 2026 Parlo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock channel adapter for deterministic testing.
//!
//! `MockChannel` implements `ChannelAdapter` with injectable inbound events
//! and captured outbound operations for assertion in tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use parlo_core::traits::adapter::PluginAdapter;
use parlo_core::traits::channel::ChannelAdapter;
use parlo_core::types::{
    AdapterType, ChannelCapabilities, CommandMenu, HealthStatus, InboundEvent, Keyboard, MessageId,
};
use parlo_core::ParloError;

/// One captured outbound operation, in call order.
#[derive(Debug, Clone, PartialEq)]
pub enum SentOp {
    Text {
        to: String,
        text: String,
    },
    WithKeyboard {
        to: String,
        text: String,
        keyboard: Keyboard,
    },
    Typing {
        to: String,
    },
    Delete {
        to: String,
        id: MessageId,
    },
    EditText {
        to: String,
        id: MessageId,
        text: String,
    },
    EditCaption {
        to: String,
        id: MessageId,
        caption: String,
    },
    CommandMenu {
        menus: Vec<CommandMenu>,
    },
}

impl SentOp {
    /// The message text, for ops that carry one.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text { text, .. } | Self::WithKeyboard { text, .. } => Some(text),
            _ => None,
        }
    }
}

/// A mock messaging channel for testing.
///
/// Provides two queues:
/// - **inbound**: events injected via `inject()` are returned by `receive()`
/// - **sent**: every outbound operation is captured and retrievable via
///   `sent_ops()`
///
/// `fail_next_sends(n)` makes the next `n` text/keyboard sends return a
/// channel error, for exercising retry paths.
///
/// Clones share all queues, so a test can hand one clone to the code
/// under test and keep another for injection and inspection.
#[derive(Clone)]
pub struct MockChannel {
    username: Option<String>,
    inbound: Arc<Mutex<VecDeque<InboundEvent>>>,
    sent: Arc<Mutex<Vec<SentOp>>>,
    notify: Arc<Notify>,
    fail_sends: Arc<AtomicU64>,
    next_id: Arc<AtomicU64>,
}

impl MockChannel {
    /// Create a new mock channel with empty queues.
    pub fn new() -> Self {
        Self {
            username: Some("mock_bot".to_string()),
            inbound: Arc::new(Mutex::new(VecDeque::new())),
            sent: Arc::new(Mutex::new(Vec::new())),
            notify: Arc::new(Notify::new()),
            fail_sends: Arc::new(AtomicU64::new(0)),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Create a mock channel reporting the given `@username`.
    pub fn with_username(username: &str) -> Self {
        let mut channel = Self::new();
        channel.username = Some(username.to_string());
        channel
    }

    /// Inject an inbound event into the receive queue.
    ///
    /// The next call to `receive()` will return this event.
    pub async fn inject(&self, event: InboundEvent) {
        self.inbound.lock().await.push_back(event);
        self.notify.notify_one();
    }

    /// Make the next `n` text/keyboard sends fail with a channel error.
    pub fn fail_next_sends(&self, n: u64) {
        self.fail_sends.store(n, Ordering::SeqCst);
    }

    /// Get all captured outbound operations, in call order.
    pub async fn sent_ops(&self) -> Vec<SentOp> {
        self.sent.lock().await.clone()
    }

    /// Get all captured text payloads (plain and keyboard sends).
    pub async fn sent_texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .await
            .iter()
            .filter_map(|op| op.text().map(str::to_string))
            .collect()
    }

    /// Get the count of captured operations.
    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }

    /// Clear all captured operations.
    pub async fn clear_sent(&self) {
        self.sent.lock().await.clear();
    }

    fn take_failure(&self) -> bool {
        self.fail_sends
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn issue_id(&self) -> MessageId {
        MessageId(format!(
            "mock-{}",
            self.next_id.fetch_add(1, Ordering::SeqCst)
        ))
    }
}

impl Default for MockChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockChannel {
    fn name(&self) -> &str {
        "mock-channel"
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
impl ChannelAdapter for MockChannel {
    fn capabilities(&self) -> ChannelCapabilities {
        ChannelCapabilities {
            supports_edit: true,
            supports_delete: true,
            supports_typing: true,
            supports_keyboards: true,
            supports_command_menu: true,
            supports_media: true,
            max_message_length: None,
        }
    }

    fn username(&self) -> Option<String> {
        self.username.clone()
    }

    async fn connect(&mut self) -> Result<(), ParloError> {
        Ok(())
    }

    async fn receive(&self) -> Result<InboundEvent, ParloError> {
        loop {
            {
                let mut queue = self.inbound.lock().await;
                if let Some(event) = queue.pop_front() {
                    return Ok(event);
                }
            }
            // Wait for notification that a new event was injected.
            self.notify.notified().await;
        }
    }

    async fn send_text(&self, to: &str, text: &str) -> Result<MessageId, ParloError> {
        if self.take_failure() {
            return Err(ParloError::channel("mock send failure"));
        }
        self.sent.lock().await.push(SentOp::Text {
            to: to.to_string(),
            text: text.to_string(),
        });
        Ok(self.issue_id())
    }

    async fn send_with_keyboard(
        &self,
        to: &str,
        text: &str,
        keyboard: &Keyboard,
    ) -> Result<MessageId, ParloError> {
        if self.take_failure() {
            return Err(ParloError::channel("mock send failure"));
        }
        self.sent.lock().await.push(SentOp::WithKeyboard {
            to: to.to_string(),
            text: text.to_string(),
            keyboard: keyboard.clone(),
        });
        Ok(self.issue_id())
    }

    async fn send_typing(&self, to: &str) -> Result<(), ParloError> {
        self.sent.lock().await.push(SentOp::Typing {
            to: to.to_string(),
        });
        Ok(())
    }

    async fn delete_message(&self, to: &str, id: &MessageId) -> Result<(), ParloError> {
        self.sent.lock().await.push(SentOp::Delete {
            to: to.to_string(),
            id: id.clone(),
        });
        Ok(())
    }

    async fn edit_text(&self, to: &str, id: &MessageId, text: &str) -> Result<(), ParloError> {
        self.sent.lock().await.push(SentOp::EditText {
            to: to.to_string(),
            id: id.clone(),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn edit_caption(
        &self,
        to: &str,
        id: &MessageId,
        caption: &str,
    ) -> Result<(), ParloError> {
        self.sent.lock().await.push(SentOp::EditCaption {
            to: to.to_string(),
            id: id.clone(),
            caption: caption.to_string(),
        });
        Ok(())
    }

    async fn set_command_menu(&self, menus: &[CommandMenu]) -> Result<(), ParloError> {
        self.sent.lock().await.push(SentOp::CommandMenu {
            menus: menus.to_vec(),
        });
        Ok(())
    }
}
