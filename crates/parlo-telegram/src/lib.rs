// SPDX-FileCopyrightText: 2026 Parlo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Telegram channel adapter for the Parlo support relay.
//!
//! Implements [`ChannelAdapter`] for the Telegram Bot API via teloxide:
//! long polling over messages, edits, callback queries, and membership
//! updates, with MarkdownV2 output, inline and reply keyboards, and
//! per-language command menus.

pub mod handler;
pub mod keyboards;
pub mod markdown;

use std::sync::OnceLock;

use async_trait::async_trait;
use parlo_core::error::ParloError;
use parlo_core::traits::adapter::PluginAdapter;
use parlo_core::traits::channel::ChannelAdapter;
use parlo_core::types::{
    AdapterType, ChannelCapabilities, CommandMenu, HealthStatus, InboundEvent, Keyboard, MessageId,
};
use teloxide::dptree;
use teloxide::prelude::*;
use teloxide::types::{ChatAction, ChatId, ChatMemberUpdated, ParseMode, Recipient};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};

/// Telegram channel adapter implementing [`ChannelAdapter`].
///
/// One instance per bot token; a multi-bot deployment runs several,
/// each registered under its own channel record.
pub struct TelegramChannel {
    bot: Bot,
    inbound_rx: Mutex<mpsc::Receiver<InboundEvent>>,
    inbound_tx: mpsc::Sender<InboundEvent>,
    polling: Mutex<Option<tokio::task::JoinHandle<()>>>,
    username: OnceLock<String>,
}

impl TelegramChannel {
    /// Creates an adapter for the given bot token. The token is only
    /// validated against the Bot API on [`connect`](ChannelAdapter::connect).
    pub fn new(token: &str) -> Result<Self, ParloError> {
        if token.is_empty() {
            return Err(ParloError::Config(
                "telegram bot token cannot be empty".into(),
            ));
        }
        let (inbound_tx, inbound_rx) = mpsc::channel(100);
        Ok(Self {
            bot: Bot::new(token),
            inbound_rx: Mutex::new(inbound_rx),
            inbound_tx,
            polling: Mutex::new(None),
            username: OnceLock::new(),
        })
    }

    fn parse_chat(to: &str) -> Result<ChatId, ParloError> {
        to.parse::<i64>()
            .map(ChatId)
            .map_err(|_| ParloError::channel(format!("invalid telegram chat id: {to}")))
    }

    fn parse_message_id(id: &MessageId) -> Result<teloxide::types::MessageId, ParloError> {
        id.0.parse::<i32>()
            .map(teloxide::types::MessageId)
            .map_err(|_| ParloError::channel(format!("invalid telegram message id: {}", id.0)))
    }
}

#[async_trait]
impl PluginAdapter for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Channel
    }

    async fn health_check(&self) -> Result<HealthStatus, ParloError> {
        match self.bot.get_me().await {
            Ok(_) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Unhealthy(format!(
                "Telegram bot unreachable: {e}"
            ))),
        }
    }

    async fn shutdown(&self) -> Result<(), ParloError> {
        if let Some(handle) = self.polling.lock().await.take() {
            handle.abort();
        }
        debug!("telegram channel shut down");
        Ok(())
    }
}

#[async_trait]
impl ChannelAdapter for TelegramChannel {
    fn capabilities(&self) -> ChannelCapabilities {
        ChannelCapabilities {
            supports_edit: true,
            supports_delete: true,
            supports_typing: true,
            supports_keyboards: true,
            supports_command_menu: true,
            supports_media: true,
            max_message_length: Some(4096),
        }
    }

    fn username(&self) -> Option<String> {
        self.username.get().cloned()
    }

    async fn connect(&mut self) -> Result<(), ParloError> {
        let mut polling = self.polling.lock().await;
        if polling.is_some() {
            return Ok(()); // Already connected
        }

        let me = self
            .bot
            .get_me()
            .await
            .map_err(|e| ParloError::channel_with("telegram getMe failed", e))?;
        let _ = self.username.set(me.username().to_string());
        info!(username = me.username(), "telegram bot connected");

        let bot = self.bot.clone();
        let tx = self.inbound_tx.clone();

        let handle = tokio::spawn(async move {
            let tree = dptree::entry()
                .branch(Update::filter_message().endpoint(
                    |msg: Message, tx: mpsc::Sender<InboundEvent>| async move {
                        if !handler::is_dm(&msg) {
                            debug!(chat_id = msg.chat.id.0, "ignoring non-DM message");
                            return respond(());
                        }
                        if tx.send(handler::map_message(&msg)).await.is_err() {
                            warn!("inbound channel closed, dropping message");
                        }
                        respond(())
                    },
                ))
                .branch(Update::filter_edited_message().endpoint(
                    |msg: Message, tx: mpsc::Sender<InboundEvent>| async move {
                        if handler::is_dm(&msg)
                            && let Some(inbound) = handler::map_edited(&msg)
                            && tx.send(inbound).await.is_err()
                        {
                            warn!("inbound channel closed, dropping edit");
                        }
                        respond(())
                    },
                ))
                .branch(Update::filter_callback_query().endpoint(
                    |bot: Bot, query: CallbackQuery, tx: mpsc::Sender<InboundEvent>| async move {
                        // Ack first so the client stops its spinner.
                        if let Err(e) = bot.answer_callback_query(query.id.clone()).await {
                            debug!(error = %e, "failed to ack callback query");
                        }
                        if let Some(inbound) = handler::map_callback(&query)
                            && tx.send(inbound).await.is_err()
                        {
                            warn!("inbound channel closed, dropping callback");
                        }
                        respond(())
                    },
                ))
                .branch(Update::filter_my_chat_member().endpoint(
                    |update: ChatMemberUpdated, tx: mpsc::Sender<InboundEvent>| async move {
                        if update.chat.is_private()
                            && tx.send(handler::map_membership(&update)).await.is_err()
                        {
                            warn!("inbound channel closed, dropping membership update");
                        }
                        respond(())
                    },
                ));

            Dispatcher::builder(bot, tree)
                .dependencies(dptree::deps![tx])
                .default_handler(|_| async {}) // Silently ignore other update kinds
                .build()
                .dispatch()
                .await;
        });

        *polling = Some(handle);
        Ok(())
    }

    async fn receive(&self) -> Result<InboundEvent, ParloError> {
        let mut rx = self.inbound_rx.lock().await;
        rx.recv()
            .await
            .ok_or_else(|| ParloError::channel("telegram inbound channel closed"))
    }

    async fn send_text(&self, to: &str, text: &str) -> Result<MessageId, ParloError> {
        let chat = Self::parse_chat(to)?;
        let escaped = markdown::escape_markdown_v2(text);

        // Try MarkdownV2 first, fall back to plain text.
        let sent = match self
            .bot
            .send_message(Recipient::Id(chat), &escaped)
            .parse_mode(ParseMode::MarkdownV2)
            .await
        {
            Ok(sent) => sent,
            Err(e) => {
                warn!(error = %e, "MarkdownV2 send failed, retrying as plain text");
                self.bot
                    .send_message(Recipient::Id(chat), text)
                    .await
                    .map_err(|e| ParloError::channel_with("failed to send message", e))?
            }
        };
        Ok(MessageId(sent.id.0.to_string()))
    }

    async fn send_with_keyboard(
        &self,
        to: &str,
        text: &str,
        keyboard: &Keyboard,
    ) -> Result<MessageId, ParloError> {
        let chat = Self::parse_chat(to)?;
        let sent = self
            .bot
            .send_message(Recipient::Id(chat), text)
            .reply_markup(keyboards::reply_markup(keyboard))
            .await
            .map_err(|e| ParloError::channel_with("failed to send keyboard message", e))?;
        Ok(MessageId(sent.id.0.to_string()))
    }

    async fn send_typing(&self, to: &str) -> Result<(), ParloError> {
        let chat = Self::parse_chat(to)?;
        self.bot
            .send_chat_action(chat, ChatAction::Typing)
            .await
            .map_err(|e| ParloError::channel_with("failed to send typing indicator", e))?;
        Ok(())
    }

    async fn delete_message(&self, to: &str, id: &MessageId) -> Result<(), ParloError> {
        let chat = Self::parse_chat(to)?;
        self.bot
            .delete_message(chat, Self::parse_message_id(id)?)
            .await
            .map_err(|e| ParloError::channel_with("failed to delete message", e))?;
        Ok(())
    }

    async fn edit_text(&self, to: &str, id: &MessageId, text: &str) -> Result<(), ParloError> {
        let chat = Self::parse_chat(to)?;
        let message_id = Self::parse_message_id(id)?;
        let escaped = markdown::escape_markdown_v2(text);

        match self
            .bot
            .edit_message_text(chat, message_id, &escaped)
            .parse_mode(ParseMode::MarkdownV2)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) => {
                let err_str = e.to_string();
                if err_str.contains("message is not modified") {
                    Ok(())
                } else if err_str.contains("can't parse entities") {
                    warn!(error = %e, "MarkdownV2 edit failed, retrying as plain text");
                    self.bot
                        .edit_message_text(chat, message_id, text)
                        .await
                        .map_err(|e| ParloError::channel_with("failed to edit message", e))?;
                    Ok(())
                } else {
                    Err(ParloError::channel_with("failed to edit message", e))
                }
            }
        }
    }

    async fn edit_caption(
        &self,
        to: &str,
        id: &MessageId,
        caption: &str,
    ) -> Result<(), ParloError> {
        let chat = Self::parse_chat(to)?;
        let message_id = Self::parse_message_id(id)?;
        match self
            .bot
            .edit_message_caption(chat, message_id)
            .caption(caption.to_string())
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if e.to_string().contains("message is not modified") => Ok(()),
            Err(e) => Err(ParloError::channel_with("failed to edit caption", e)),
        }
    }

    async fn set_command_menu(&self, menus: &[CommandMenu]) -> Result<(), ParloError> {
        for menu in menus {
            let commands = keyboards::commands(menu);
            let request = self.bot.set_my_commands(commands);
            let result = match &menu.language {
                Some(language) => request.language_code(language.clone()).await,
                None => request.await,
            };
            result.map_err(|e| ParloError::channel_with("failed to set command menu", e))?;
        }
        debug!(menus = menus.len(), "telegram command menus installed");
        Ok(())
    }
}
