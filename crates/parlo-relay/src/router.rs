// SPDX-FileCopyrightText: 2026 Parlo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inbound event routing: user resolution, onboarding, conversation
//! resolution, and message storage.
//!
//! One call to [`Relay::route_inbound`] fully handles one normalized
//! channel event. Events for the same sender arrive in order (the relay
//! loop serializes them per lane); this module never assumes anything
//! about ordering across senders.

use parlo_core::error::{ConflictKind, ParloError};
use parlo_core::types::{
    CallbackAction, Channel, Conversation, ConversationStatus, InboundEvent, InboundKind,
    MembershipStatus, MessageContent, MessageId, NewUser, User, UserStage,
};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::Relay;
use crate::metrics;
use crate::notify::{chat_topic, message_json, op_topic};
use crate::onboarding::{self, FsmOutcome};
use crate::text::{self, Prompt};

fn kind_name(kind: &InboundKind) -> &'static str {
    match kind {
        InboundKind::Text { .. } => "text",
        InboundKind::Contact { .. } => "contact",
        InboundKind::Callback { .. } => "callback",
        InboundKind::Media { .. } => "media",
        InboundKind::Location { .. } => "location",
        InboundKind::Dice { .. } => "dice",
        InboundKind::Edit { .. } => "edit",
        InboundKind::Membership { .. } => "membership",
        InboundKind::Unsupported { .. } => "unsupported",
    }
}

/// Session content this event would store, if any.
fn content_of(kind: &InboundKind) -> Option<MessageContent> {
    match kind {
        InboundKind::Text { text, .. } => Some(MessageContent::Text { text: text.clone() }),
        InboundKind::Media {
            media,
            reference,
            caption,
            ..
        } => Some(MessageContent::Media {
            media: *media,
            reference: reference.clone(),
            caption: caption.clone(),
        }),
        InboundKind::Location {
            latitude,
            longitude,
            ..
        } => Some(MessageContent::Location {
            latitude: *latitude,
            longitude: *longitude,
        }),
        InboundKind::Contact { phone, name, .. } => Some(MessageContent::Contact {
            phone: phone.clone(),
            name: name.clone(),
        }),
        InboundKind::Dice { emoji, value, .. } => Some(MessageContent::Dice {
            emoji: emoji.clone(),
            value: *value,
        }),
        InboundKind::Callback { .. }
        | InboundKind::Edit { .. }
        | InboundKind::Membership { .. }
        | InboundKind::Unsupported { .. } => None,
    }
}

fn origin_of(kind: &InboundKind) -> Option<String> {
    match kind {
        InboundKind::Text { origin_id, .. }
        | InboundKind::Media { origin_id, .. }
        | InboundKind::Location { origin_id, .. }
        | InboundKind::Dice { origin_id, .. } => origin_id.clone(),
        _ => None,
    }
}

/// How a channel is shown to users: `@username` when the backend has a
/// handle, otherwise the channel kind.
fn channel_display(channel: &Channel) -> String {
    channel
        .username
        .as_ref()
        .map(|u| format!("@{u}"))
        .unwrap_or_else(|| channel.kind.to_string())
}

impl Relay {
    /// Route one inbound channel event end to end.
    pub async fn route_inbound(&self, event: InboundEvent) -> Result<(), ParloError> {
        metrics::record_inbound(kind_name(&event.kind));

        // Unsupported content: drop and log. The sender is not notified.
        if let InboundKind::Unsupported { description } = &event.kind {
            warn!(
                channel_id = event.channel_id,
                description = %description,
                "dropping unsupported inbound event"
            );
            metrics::record_unsupported_dropped();
            return Ok(());
        }

        let channel = self.store.get_channel(event.channel_id).await?;

        // Membership changes flip the soft-delete flag and nothing else.
        if let InboundKind::Membership { status } = &event.kind {
            if let Some(user) = self
                .store
                .find_user(channel.kind, &event.sender.external_id)
                .await?
            {
                let deleted = *status == MembershipStatus::Blocked;
                self.store.set_user_deleted(user.id, deleted).await?;
                info!(user_id = user.id, deleted, "membership change applied");
            }
            return Ok(());
        }

        let user = self.resolve_user(&event, &channel).await?;

        // Channel-side edits update the stored copy, never create one.
        if let InboundKind::Edit {
            origin_id,
            new_text,
            new_caption,
        } = &event.kind
        {
            return self
                .apply_edit(&user, origin_id, new_text.as_deref(), new_caption.as_deref())
                .await;
        }

        // Rating and close-answer callbacks are valid in any stage.
        if let InboundKind::Callback { action, origin_id } = &event.kind {
            match action {
                CallbackAction::Rate {
                    score,
                    conversation,
                } => {
                    return self
                        .apply_rating(&event, &user, *score, conversation, origin_id.as_deref())
                        .await;
                }
                CallbackAction::CloseAnswer { accept, message } => {
                    return self
                        .apply_chat_close_answer(
                            &event,
                            &user,
                            *accept,
                            message,
                            origin_id.as_deref(),
                        )
                        .await;
                }
                CallbackAction::SetLanguage { .. } => {}
            }
        }

        if onboarding::advance(self, &user, &event).await? == FsmOutcome::Consumed {
            return Ok(());
        }

        let Some(content) = content_of(&event.kind) else {
            debug!(user_id = user.id, "ignoring non-storable event past onboarding");
            return Ok(());
        };
        self.store_inbound(&event, &user, content).await
    }

    /// Resolve the sender to a user record, creating or restoring one.
    async fn resolve_user(
        &self,
        event: &InboundEvent,
        channel: &Channel,
    ) -> Result<User, ParloError> {
        match self
            .store
            .find_user(channel.kind, &event.sender.external_id)
            .await?
        {
            Some(user) if user.deleted => {
                // A soft-deleted user writing again has unblocked us.
                self.store.set_user_deleted(user.id, false).await?;
                info!(user_id = user.id, "restored soft-deleted user");
                self.store.get_user(user.id).await
            }
            Some(user) => Ok(user),
            None => {
                let new = NewUser {
                    kind: channel.kind,
                    external_id: event.sender.external_id.clone(),
                    display_name: event.sender.display_name.clone(),
                    username: event.sender.username.clone(),
                    language: None,
                    stage: UserStage::New,
                };
                let user = self.store.create_user(&new).await?;
                debug!(user_id = user.id, kind = %channel.kind, "created user");
                Ok(user)
            }
        }
    }

    async fn apply_edit(
        &self,
        user: &User,
        origin_id: &str,
        new_text: Option<&str>,
        new_caption: Option<&str>,
    ) -> Result<(), ParloError> {
        let Some(conversation) = self.store.find_open_by_user(user.id).await? else {
            debug!(user_id = user.id, "edit with no open conversation, ignoring");
            return Ok(());
        };
        let Some(updated) = self
            .store
            .update_message_by_origin(conversation.id, origin_id, new_text, new_caption)
            .await?
        else {
            debug!(
                conversation_id = conversation.id,
                origin_id, "edit matched no stored message"
            );
            return Ok(());
        };
        self.notifier
            .publish(
                &chat_topic(&conversation.public_id),
                json!({"event": "edit", "message": message_json(&updated)}),
            )
            .await;
        if conversation.status == ConversationStatus::Busy
            && let Some(operator_id) = conversation.operator_id
        {
            let operator = self.store.get_operator(operator_id).await?;
            self.notifier
                .publish(
                    &op_topic(&operator.public_id),
                    json!({
                        "event": "edit",
                        "conversation": conversation.public_id,
                        "message": message_json(&updated),
                    }),
                )
                .await;
        }
        Ok(())
    }

    async fn apply_rating(
        &self,
        event: &InboundEvent,
        user: &User,
        score: u8,
        conversation_public_id: &str,
        origin_id: Option<&str>,
    ) -> Result<(), ParloError> {
        let lang = user
            .language
            .as_deref()
            .unwrap_or(&self.config.default_language);
        let Some(conversation) = self
            .store
            .find_conversation_by_public_id(conversation_public_id)
            .await?
        else {
            debug!(conversation = conversation_public_id, "stale rate callback");
            return Ok(());
        };
        if conversation.user_id != user.id {
            warn!(
                user_id = user.id,
                conversation_id = conversation.id,
                "rate callback from a non-participant"
            );
            return Ok(());
        }
        match self.store.set_rating(conversation.id, score).await {
            Ok(updated) => {
                if let Some(origin) = origin_id {
                    self.notifier
                        .delete_message(
                            event.channel_id,
                            &event.sender.external_id,
                            &MessageId(origin.to_string()),
                        )
                        .await;
                }
                self.notifier
                    .send_text(
                        event.channel_id,
                        &event.sender.external_id,
                        text::prompt(lang, Prompt::RateThanks),
                    )
                    .await;
                self.notifier
                    .publish(
                        &chat_topic(&updated.public_id),
                        json!({"event": "rated", "rating": score}),
                    )
                    .await;
                if let Some(operator_id) = updated.operator_id {
                    let operator = self.store.get_operator(operator_id).await?;
                    self.notifier
                        .publish(
                            &op_topic(&operator.public_id),
                            json!({
                                "event": "rated",
                                "conversation": updated.public_id,
                                "rating": score,
                            }),
                        )
                        .await;
                }
                Ok(())
            }
            Err(e) if e.is_conflict() => {
                info!(error = %e, conversation_id = conversation.id, "rating ignored");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn apply_chat_close_answer(
        &self,
        event: &InboundEvent,
        user: &User,
        accept: bool,
        message_public_id: &str,
        origin_id: Option<&str>,
    ) -> Result<(), ParloError> {
        let lang = user
            .language
            .as_deref()
            .unwrap_or(&self.config.default_language);
        let Some(message) = self
            .store
            .find_message_by_public_id(message_public_id)
            .await?
        else {
            debug!(message = message_public_id, "stale close-answer callback");
            return Ok(());
        };
        let conversation = self.store.get_conversation(message.conversation_id).await?;
        if conversation.user_id != user.id {
            warn!(
                user_id = user.id,
                conversation_id = conversation.id,
                "close-answer callback from a non-participant"
            );
            return Ok(());
        }
        match self.resolve_close_answer(&conversation, &message, accept).await {
            Ok(()) => {
                if let Some(origin) = origin_id {
                    // Replace the question so the buttons disappear.
                    let resolution = if accept {
                        text::prompt(lang, Prompt::Closed)
                    } else {
                        text::prompt(lang, Prompt::WaitingOperator)
                    };
                    self.notifier
                        .edit_text(
                            event.channel_id,
                            &event.sender.external_id,
                            &MessageId(origin.to_string()),
                            resolution,
                        )
                        .await;
                }
                Ok(())
            }
            Err(e) if e.is_conflict() => {
                info!(error = %e, message = message_public_id, "close answer ignored");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Resolve the target conversation and store session content.
    async fn store_inbound(
        &self,
        event: &InboundEvent,
        user: &User,
        content: MessageContent,
    ) -> Result<(), ParloError> {
        let lang = user
            .language
            .as_deref()
            .unwrap_or(&self.config.default_language);

        let (conversation, created) = match self.store.find_open_by_user(user.id).await? {
            None => (
                self.create_conversation_for(user, event.channel_id, lang)
                    .await?,
                true,
            ),
            Some(open)
                if open.status == ConversationStatus::Busy
                    && open.channel_id != event.channel_id =>
            {
                // Cross-channel exclusivity: nothing is stored.
                let busy_channel = self.store.get_channel(open.channel_id).await?;
                self.notifier
                    .send_text(
                        event.channel_id,
                        &event.sender.external_id,
                        &text::already_in_session(lang, &channel_display(&busy_channel)),
                    )
                    .await;
                info!(
                    user_id = user.id,
                    conversation_id = open.id,
                    "rejected cross-channel message for busy conversation"
                );
                return Ok(());
            }
            Some(open) => (open, false),
        };

        self.store_client_message(&conversation, content, origin_of(&event.kind))
            .await?;

        if created {
            self.notifier
                .send_text(
                    event.channel_id,
                    &event.sender.external_id,
                    text::prompt(lang, Prompt::WaitingOperator),
                )
                .await;
        }
        Ok(())
    }

    /// Create a WAITING conversation, folding a lost same-user race into
    /// the winner's conversation.
    pub(crate) async fn create_conversation_for(
        &self,
        user: &User,
        channel_id: i64,
        language: &str,
    ) -> Result<Conversation, ParloError> {
        match self
            .store
            .create_conversation(user.id, channel_id, language)
            .await
        {
            Ok(conversation) => Ok(conversation),
            Err(ParloError::Conflict(ConflictKind::ChatIsOpen)) => self
                .store
                .find_open_by_user(user.id)
                .await?
                .ok_or_else(|| {
                    ParloError::Internal(
                        "open conversation vanished after create conflict".to_string(),
                    )
                }),
            Err(e) => Err(e),
        }
    }
}
