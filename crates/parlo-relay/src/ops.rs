// SPDX-FileCopyrightText: 2026 Parlo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Operator- and widget-side conversation operations.
//!
//! Everything here is called from the HTTP gateway or the assignment
//! loop. The pattern throughout is mutate-then-notify: the store commit
//! happens first, then queue updates, channel sends, and sink events,
//! none of which can roll the mutation back.

use parlo_core::error::{ConflictKind, ParloError};
use parlo_core::types::{
    ChannelKind, Conversation, ConversationStatus, MessageContent, NewMessage, NewUser, Operator,
    ParticipantRole, SenderKind, StoredMessage, UserStage,
};
use serde_json::json;
use tracing::{debug, info};

use crate::Relay;
use crate::metrics;
use crate::notify::{chat_topic, message_json, op_topic};
use crate::text::{self, Prompt};

impl Relay {
    /// Resolve a conversation public id or fail with `NotFound`.
    pub(crate) async fn find_by_public(&self, public_id: &str) -> Result<Conversation, ParloError> {
        self.store
            .find_conversation_by_public_id(public_id)
            .await?
            .ok_or(ParloError::NotFound("conversation"))
    }

    /// Persist a client message and fan it out: dispatch queue, chat
    /// topic, and the bound operator's topic when there is one.
    pub(crate) async fn store_client_message(
        &self,
        conversation: &Conversation,
        content: MessageContent,
        origin_id: Option<String>,
    ) -> Result<StoredMessage, ParloError> {
        let stored = self
            .store
            .insert_message(&NewMessage {
                conversation_id: conversation.id,
                sender: SenderKind::Client,
                content,
                origin_id,
            })
            .await?;
        metrics::record_stored("client");

        self.queue
            .enqueue(
                conversation.id,
                conversation.channel_id,
                &conversation.language,
                stored.clone(),
            )
            .await;

        self.notifier
            .publish(
                &chat_topic(&conversation.public_id),
                json!({"event": "message", "message": message_json(&stored)}),
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
                        "event": "message",
                        "conversation": conversation.public_id,
                        "message": message_json(&stored),
                    }),
                )
                .await;
        }
        Ok(stored)
    }

    /// Bind a conversation to an operator and hand over the backlog.
    ///
    /// The underlying store bind is compare-and-set; losing a race
    /// surfaces `SessionAlreadyBusy` and has no side effects.
    pub async fn complete_bind(
        &self,
        conversation: &Conversation,
        operator: &Operator,
    ) -> Result<Conversation, ParloError> {
        let bound = self.store.bind_operator(conversation.id, operator.id).await?;
        metrics::record_bind();
        info!(
            conversation_id = bound.id,
            operator_id = operator.id,
            "conversation bound"
        );

        self.store
            .set_user_stage(bound.user_id, UserStage::Talking)
            .await?;

        let backlog = self.queue.drain(bound.id).await;
        let backlog_json: Vec<serde_json::Value> = backlog.iter().map(message_json).collect();
        self.notifier
            .publish(
                &op_topic(&operator.public_id),
                json!({
                    "event": "bound",
                    "conversation": bound.public_id,
                    "backlog": backlog_json,
                }),
            )
            .await;
        self.notifier
            .publish(
                &chat_topic(&bound.public_id),
                json!({"event": "bind", "operator": operator.name}),
            )
            .await;

        let user = self.store.get_user(bound.user_id).await?;
        let lang = user
            .language
            .as_deref()
            .unwrap_or(&self.config.default_language);
        self.notifier
            .send_text(
                bound.channel_id,
                &user.external_id,
                &text::operator_joined(lang, &operator.name),
            )
            .await;
        Ok(bound)
    }

    /// Claim a waiting conversation for the calling operator.
    pub async fn bind_to_self(
        &self,
        operator: &Operator,
        conversation_public_id: &str,
    ) -> Result<Conversation, ParloError> {
        let conversation = self.find_by_public(conversation_public_id).await?;
        self.complete_bind(&conversation, operator).await
    }

    /// Send an operator message to the client. Sending to a WAITING
    /// conversation claims it first.
    pub async fn operator_send(
        &self,
        operator: &Operator,
        conversation_public_id: &str,
        body: &str,
    ) -> Result<StoredMessage, ParloError> {
        if body.trim().is_empty() {
            return Err(ParloError::InvalidInput("message text is empty".to_string()));
        }
        let conversation = self.find_by_public(conversation_public_id).await?;
        let conversation = match conversation.status {
            ConversationStatus::Waiting => self.complete_bind(&conversation, operator).await?,
            ConversationStatus::Busy if conversation.operator_id == Some(operator.id) => {
                conversation
            }
            ConversationStatus::Busy => {
                return Err(ParloError::Unauthorized(
                    "conversation belongs to another operator".to_string(),
                ));
            }
            ConversationStatus::Closed => {
                return Err(ParloError::Conflict(ConflictKind::ChatNotOpen));
            }
        };

        let user = self.store.get_user(conversation.user_id).await?;
        self.notifier
            .send_typing(conversation.channel_id, &user.external_id)
            .await;

        let stored = self
            .store
            .insert_message(&NewMessage {
                conversation_id: conversation.id,
                sender: SenderKind::Support,
                content: MessageContent::Text {
                    text: body.to_string(),
                },
                origin_id: None,
            })
            .await?;
        metrics::record_stored("support");

        self.notifier
            .send_text(conversation.channel_id, &user.external_id, body)
            .await;
        self.notifier
            .publish(
                &chat_topic(&conversation.public_id),
                json!({"event": "message", "message": message_json(&stored)}),
            )
            .await;
        Ok(stored)
    }

    /// Ask the client whether the session can be closed. Inserts an
    /// `ask_close` system message; the conversation status is unchanged.
    pub async fn ask_to_close(
        &self,
        operator: &Operator,
        conversation_public_id: &str,
    ) -> Result<StoredMessage, ParloError> {
        let conversation = self.find_by_public(conversation_public_id).await?;
        match conversation.status {
            ConversationStatus::Closed => {
                return Err(ParloError::Conflict(ConflictKind::ChatNotOpen));
            }
            ConversationStatus::Busy if conversation.operator_id != Some(operator.id) => {
                return Err(ParloError::Unauthorized(
                    "conversation belongs to another operator".to_string(),
                ));
            }
            _ => {}
        }

        let user = self.store.get_user(conversation.user_id).await?;
        let lang = user
            .language
            .as_deref()
            .unwrap_or(&self.config.default_language);
        let question = text::close_question(lang);

        let stored = self
            .store
            .insert_message(&NewMessage {
                conversation_id: conversation.id,
                sender: SenderKind::AskClose,
                content: MessageContent::Text {
                    text: question.to_string(),
                },
                origin_id: None,
            })
            .await?;

        self.notifier
            .send_with_keyboard(
                conversation.channel_id,
                &user.external_id,
                question,
                &text::close_answer_keyboard(lang, &stored.public_id),
            )
            .await;
        self.notifier
            .publish(
                &chat_topic(&conversation.public_id),
                json!({"event": "ask_close", "message": message_json(&stored)}),
            )
            .await;
        Ok(stored)
    }

    /// Resolve a close request by its message public id.
    pub async fn answer_close_request(
        &self,
        message_public_id: &str,
        accept: bool,
    ) -> Result<(), ParloError> {
        let message = self
            .store
            .find_message_by_public_id(message_public_id)
            .await?
            .ok_or(ParloError::NotFound("close request"))?;
        let conversation = self.store.get_conversation(message.conversation_id).await?;
        self.resolve_close_answer(&conversation, &message, accept).await
    }

    /// Flip an `ask_close` message to its resolution; on accept, close
    /// the conversation on the operator's behalf.
    pub(crate) async fn resolve_close_answer(
        &self,
        conversation: &Conversation,
        message: &StoredMessage,
        accept: bool,
    ) -> Result<(), ParloError> {
        let resolved = self.store.resolve_close_request(message.id, accept).await?;
        self.notifier
            .publish(
                &chat_topic(&conversation.public_id),
                json!({
                    "event": "close_answer",
                    "accept": accept,
                    "message": message_json(&resolved),
                }),
            )
            .await;
        if let Some(operator_id) = conversation.operator_id {
            let operator = self.store.get_operator(operator_id).await?;
            self.notifier
                .publish(
                    &op_topic(&operator.public_id),
                    json!({
                        "event": "close_answer",
                        "conversation": conversation.public_id,
                        "accept": accept,
                    }),
                )
                .await;
        }
        if accept {
            self.close_conversation(&conversation.public_id, None, ParticipantRole::Support)
                .await?;
        }
        Ok(())
    }

    /// Close a conversation. A missing rating on an operator-side close
    /// sends the client a rate prompt instead.
    pub async fn close_conversation(
        &self,
        conversation_public_id: &str,
        rating: Option<u8>,
        by: ParticipantRole,
    ) -> Result<Conversation, ParloError> {
        if let Some(score) = rating
            && !(1..=5).contains(&score)
        {
            return Err(ParloError::InvalidInput(format!(
                "rating must be between 1 and 5, got {score}"
            )));
        }

        let conversation = self.find_by_public(conversation_public_id).await?;
        let closed = self.store.close_conversation(conversation.id).await?;
        info!(conversation_id = closed.id, by = ?by, "conversation closed");

        self.queue.discard(closed.id).await;
        self.store
            .set_user_stage(closed.user_id, UserStage::Active)
            .await?;

        let user = self.store.get_user(closed.user_id).await?;
        let lang = user
            .language
            .as_deref()
            .unwrap_or(&self.config.default_language);
        self.notifier
            .send_text(
                closed.channel_id,
                &user.external_id,
                text::prompt(lang, Prompt::Closed),
            )
            .await;

        if let Some(score) = rating {
            match self.store.set_rating(closed.id, score).await {
                Ok(_) => {}
                Err(e) if e.is_conflict() => {
                    info!(error = %e, conversation_id = closed.id, "rating on close ignored");
                }
                Err(e) => return Err(e),
            }
        } else if by == ParticipantRole::Support {
            self.notifier
                .send_with_keyboard(
                    closed.channel_id,
                    &user.external_id,
                    text::prompt(lang, Prompt::RateRequest),
                    &text::rate_keyboard(&closed.public_id),
                )
                .await;
        }

        self.notifier
            .publish(&chat_topic(&closed.public_id), json!({"event": "close"}))
            .await;
        if let Some(operator_id) = closed.operator_id {
            let operator = self.store.get_operator(operator_id).await?;
            self.notifier
                .publish(
                    &op_topic(&operator.public_id),
                    json!({"event": "close", "conversation": closed.public_id}),
                )
                .await;
        }
        Ok(closed)
    }

    /// Bulk-mark the counterparty's messages read, up to an optional
    /// watermark message.
    pub async fn mark_read(
        &self,
        conversation_public_id: &str,
        reader: ParticipantRole,
        until_public_id: Option<&str>,
    ) -> Result<u64, ParloError> {
        let conversation = self.find_by_public(conversation_public_id).await?;
        let until = match until_public_id {
            None => None,
            Some(public_id) => {
                let message = self
                    .store
                    .find_message_by_public_id(public_id)
                    .await?
                    .ok_or(ParloError::NotFound("message"))?;
                if message.conversation_id != conversation.id {
                    return Err(ParloError::InvalidInput(
                        "message is not part of this conversation".to_string(),
                    ));
                }
                Some(message.id)
            }
        };
        let flipped = self.store.mark_read(conversation.id, reader, until).await?;
        if reader == ParticipantRole::Support {
            self.queue.ack_read(conversation.id, until).await;
        }
        debug!(
            conversation_id = conversation.id,
            reader = ?reader,
            flipped,
            "messages marked read"
        );
        Ok(flipped)
    }

    /// Open (or return) a web-widget conversation for a client id.
    ///
    /// Web users skip onboarding: the record is created already ACTIVE.
    /// Router rules apply, including cross-channel exclusivity.
    pub async fn open_web_conversation(
        &self,
        client_id: &str,
        language: Option<&str>,
        opening_text: Option<&str>,
    ) -> Result<(Conversation, Option<StoredMessage>), ParloError> {
        if client_id.trim().is_empty() {
            return Err(ParloError::InvalidInput("client_id is required".to_string()));
        }
        let web = self.store.ensure_web_channel().await?;

        let requested = language.filter(|l| self.config.languages.iter().any(|c| c == l));
        let user = match self.store.find_user(ChannelKind::Web, client_id).await? {
            Some(user) if user.deleted => {
                self.store.set_user_deleted(user.id, false).await?;
                self.store.get_user(user.id).await?
            }
            Some(user) => user,
            None => {
                self.store
                    .create_user(&NewUser {
                        kind: ChannelKind::Web,
                        external_id: client_id.to_string(),
                        display_name: None,
                        username: None,
                        language: Some(
                            requested
                                .unwrap_or(&self.config.default_language)
                                .to_string(),
                        ),
                        stage: UserStage::Active,
                    })
                    .await?
            }
        };
        if let Some(picked) = requested
            && user.language.as_deref() != Some(picked)
        {
            self.store.set_user_language(user.id, picked).await?;
        }
        let lang = requested
            .or(user.language.as_deref())
            .unwrap_or(&self.config.default_language)
            .to_string();

        let conversation = match self.store.find_open_by_user(user.id).await? {
            Some(open)
                if open.status == ConversationStatus::Busy && open.channel_id != web.id =>
            {
                return Err(ParloError::Conflict(ConflictKind::ChatIsOpen));
            }
            Some(open) => open,
            None => {
                self.store
                    .set_user_stage(user.id, UserStage::WaitingOperator)
                    .await?;
                self.create_conversation_for(&user, web.id, &lang).await?
            }
        };

        let stored = match opening_text {
            Some(body) if !body.trim().is_empty() => Some(
                self.store_client_message(
                    &conversation,
                    MessageContent::Text {
                        text: body.to_string(),
                    },
                    None,
                )
                .await?,
            ),
            _ => None,
        };
        Ok((conversation, stored))
    }

    /// Store a widget client message sent over REST.
    pub async fn client_send(
        &self,
        conversation_public_id: &str,
        content: MessageContent,
    ) -> Result<StoredMessage, ParloError> {
        let conversation = self.find_by_public(conversation_public_id).await?;
        if conversation.status == ConversationStatus::Closed {
            return Err(ParloError::Conflict(ConflictKind::ChatNotOpen));
        }
        self.store_client_message(&conversation, content, None).await
    }
}
