// SPDX-FileCopyrightText: 2026 Parlo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel adapter trait for messaging surface integrations (Telegram, web widget).

use async_trait::async_trait;

use crate::error::ParloError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{ChannelCapabilities, CommandMenu, InboundEvent, Keyboard, MessageId};

/// Adapter for bidirectional messaging channel integrations.
///
/// Channel adapters connect Parlo to external messaging surfaces,
/// normalizing inbound traffic into [`InboundEvent`]s and delivering
/// outbound messages. The `to` parameter on outbound calls is the
/// channel-scoped recipient address (a Telegram chat id, a websocket
/// topic).
#[async_trait]
pub trait ChannelAdapter: PluginAdapter {
    /// Returns the capabilities supported by this channel.
    fn capabilities(&self) -> ChannelCapabilities;

    /// The channel's public handle, if the backend exposes one
    /// (e.g. a bot's `@username`).
    fn username(&self) -> Option<String> {
        None
    }

    /// Establishes a connection to the messaging surface.
    async fn connect(&mut self) -> Result<(), ParloError>;

    /// Receives the next inbound event from the channel. Pends until one
    /// arrives; a returned error means the channel stream is broken.
    async fn receive(&self) -> Result<InboundEvent, ParloError>;

    /// Sends a plain text message.
    async fn send_text(&self, to: &str, text: &str) -> Result<MessageId, ParloError>;

    /// Sends a text message with an attached keyboard.
    async fn send_with_keyboard(
        &self,
        to: &str,
        text: &str,
        keyboard: &Keyboard,
    ) -> Result<MessageId, ParloError>;

    /// Shows a typing indicator, where the surface supports one.
    async fn send_typing(&self, to: &str) -> Result<(), ParloError>;

    /// Deletes a previously sent message.
    async fn delete_message(&self, to: &str, id: &MessageId) -> Result<(), ParloError>;

    /// Edits the text of a previously sent message.
    async fn edit_text(&self, to: &str, id: &MessageId, text: &str) -> Result<(), ParloError>;

    /// Edits the caption of a previously sent media message.
    async fn edit_caption(&self, to: &str, id: &MessageId, caption: &str)
    -> Result<(), ParloError>;

    /// Publishes the per-language command menus on the surface.
    async fn set_command_menu(&self, menus: &[CommandMenu]) -> Result<(), ParloError>;
}
