// SPDX-FileCopyrightText: 2026 Parlo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-user onboarding and menu state machine.
//!
//! Stages advance strictly `new -> awaiting_phone -> awaiting_name ->
//! choosing_language -> active`; each stage accepts exactly one content
//! shape and answers anything else with a localized retry prompt. Once a
//! user reaches `awaiting_question`, their next storable message falls
//! through to conversation routing.

use parlo_core::error::ParloError;
use parlo_core::types::{CallbackAction, InboundEvent, InboundKind, Keyboard, User, UserStage};
use tracing::debug;

use crate::Relay;
use crate::text::{self, Prompt};

/// What the state machine did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FsmOutcome {
    /// The event was fully handled here; routing stops.
    Consumed,
    /// The event is session content; conversation routing takes over.
    FallThrough,
}

fn language<'a>(relay: &'a Relay, user: &'a User) -> &'a str {
    user.language
        .as_deref()
        .unwrap_or(&relay.config.default_language)
}

/// Advance the user's stage for one inbound event.
///
/// Store mutations commit before any prompt goes out; a failed prompt
/// leaves the user in the new stage and the next contact re-prompts.
pub(crate) async fn advance(
    relay: &Relay,
    user: &User,
    event: &InboundEvent,
) -> Result<FsmOutcome, ParloError> {
    let to = event.sender.external_id.as_str();
    let lang = language(relay, user);

    match user.stage {
        UserStage::New => {
            relay
                .store
                .set_user_stage(user.id, UserStage::AwaitingPhone)
                .await?;
            debug!(user_id = user.id, "greeting new user");
            relay
                .notifier
                .send_with_keyboard(
                    event.channel_id,
                    to,
                    text::prompt(lang, Prompt::SharePhone),
                    &text::contact_keyboard(lang),
                )
                .await;
            Ok(FsmOutcome::Consumed)
        }

        UserStage::AwaitingPhone => match &event.kind {
            InboundKind::Contact {
                phone,
                owner_external_id,
                ..
            } if owner_external_id.is_none()
                || owner_external_id.as_deref() == Some(to) =>
            {
                relay.store.set_user_phone(user.id, phone).await?;
                relay
                    .store
                    .set_user_stage(user.id, UserStage::AwaitingName)
                    .await?;
                relay
                    .notifier
                    .send_with_keyboard(
                        event.channel_id,
                        to,
                        text::prompt(lang, Prompt::AskName),
                        &Keyboard::Remove,
                    )
                    .await;
                Ok(FsmOutcome::Consumed)
            }
            _ => {
                relay
                    .notifier
                    .send_with_keyboard(
                        event.channel_id,
                        to,
                        text::prompt(lang, Prompt::PleaseRepeat),
                        &text::contact_keyboard(lang),
                    )
                    .await;
                Ok(FsmOutcome::Consumed)
            }
        },

        UserStage::AwaitingName => match &event.kind {
            InboundKind::Text { text: name, .. } if !name.trim().is_empty() => {
                relay.store.set_user_name(user.id, name.trim()).await?;
                relay
                    .store
                    .set_user_stage(user.id, UserStage::ChoosingLanguage)
                    .await?;
                relay
                    .notifier
                    .send_with_keyboard(
                        event.channel_id,
                        to,
                        text::prompt(lang, Prompt::ChooseLanguage),
                        &text::language_keyboard(relay.languages()),
                    )
                    .await;
                Ok(FsmOutcome::Consumed)
            }
            _ => {
                relay
                    .notifier
                    .send_text(event.channel_id, to, text::prompt(lang, Prompt::PleaseRepeat))
                    .await;
                Ok(FsmOutcome::Consumed)
            }
        },

        UserStage::ChoosingLanguage => match &event.kind {
            InboundKind::Callback {
                action: CallbackAction::SetLanguage { language: picked },
                ..
            } if relay.languages().contains(picked) => {
                relay.store.set_user_language(user.id, picked).await?;
                relay
                    .store
                    .set_user_stage(user.id, UserStage::Active)
                    .await?;
                relay
                    .notifier
                    .send_with_keyboard(
                        event.channel_id,
                        to,
                        text::prompt(picked, Prompt::MainMenu),
                        &text::main_menu_keyboard(picked),
                    )
                    .await;
                Ok(FsmOutcome::Consumed)
            }
            _ => {
                relay
                    .notifier
                    .send_with_keyboard(
                        event.channel_id,
                        to,
                        text::prompt(lang, Prompt::ChooseLanguage),
                        &text::language_keyboard(relay.languages()),
                    )
                    .await;
                Ok(FsmOutcome::Consumed)
            }
        },

        UserStage::Active => match &event.kind {
            InboundKind::Text { text: body, .. } if text::is_connect_command(body) => {
                relay
                    .store
                    .set_user_stage(user.id, UserStage::AwaitingQuestion)
                    .await?;
                relay
                    .notifier
                    .send_text(event.channel_id, to, text::prompt(lang, Prompt::AskQuestion))
                    .await;
                Ok(FsmOutcome::Consumed)
            }
            InboundKind::Text { text: body, .. } if text::is_language_command(body) => {
                relay
                    .store
                    .set_user_stage(user.id, UserStage::ChoosingLanguage)
                    .await?;
                relay
                    .notifier
                    .send_with_keyboard(
                        event.channel_id,
                        to,
                        text::prompt(lang, Prompt::ChooseLanguage),
                        &text::language_keyboard(relay.languages()),
                    )
                    .await;
                Ok(FsmOutcome::Consumed)
            }
            _ => {
                relay
                    .notifier
                    .send_with_keyboard(
                        event.channel_id,
                        to,
                        text::prompt(lang, Prompt::MainMenu),
                        &text::main_menu_keyboard(lang),
                    )
                    .await;
                Ok(FsmOutcome::Consumed)
            }
        },

        UserStage::AwaitingQuestion => match &event.kind {
            InboundKind::Text { text: body, .. } if text::is_connect_command(body) => {
                relay
                    .notifier
                    .send_text(event.channel_id, to, text::prompt(lang, Prompt::AskQuestion))
                    .await;
                Ok(FsmOutcome::Consumed)
            }
            InboundKind::Text { text: body, .. } if text::is_language_command(body) => {
                relay
                    .store
                    .set_user_stage(user.id, UserStage::ChoosingLanguage)
                    .await?;
                relay
                    .notifier
                    .send_with_keyboard(
                        event.channel_id,
                        to,
                        text::prompt(lang, Prompt::ChooseLanguage),
                        &text::language_keyboard(relay.languages()),
                    )
                    .await;
                Ok(FsmOutcome::Consumed)
            }
            InboundKind::Text { .. }
            | InboundKind::Media { .. }
            | InboundKind::Location { .. }
            | InboundKind::Dice { .. } => {
                relay
                    .store
                    .set_user_stage(user.id, UserStage::WaitingOperator)
                    .await?;
                Ok(FsmOutcome::FallThrough)
            }
            _ => {
                relay
                    .notifier
                    .send_text(event.channel_id, to, text::prompt(lang, Prompt::PleaseRepeat))
                    .await;
                Ok(FsmOutcome::Consumed)
            }
        },

        UserStage::WaitingOperator | UserStage::Talking => Ok(FsmOutcome::FallThrough),
    }
}
