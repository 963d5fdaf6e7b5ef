// SPDX-FileCopyrightText: 2026 Parlo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Telegram update mapping.
//!
//! Decides the tagged [`InboundKind`] once per update, so the relay never
//! looks at Telegram types. Events leave here with `channel_id = 0`; the
//! registry re-tags them with the owning channel's record id.

use parlo_core::types::{
    CallbackAction, InboundEvent, InboundKind, MediaKind, MembershipStatus, Sender,
};
use teloxide::types::{
    CallbackQuery, ChatId, ChatKind, ChatMemberUpdated, Dice, DiceEmoji, Message,
};

/// Whether the message comes from a private (DM) chat.
///
/// Group, supergroup, and channel messages are ignored.
pub fn is_dm(msg: &Message) -> bool {
    matches!(msg.chat.kind, ChatKind::Private(_))
}

fn sender_of(msg: &Message) -> Sender {
    let external_id = msg.chat.id.0.to_string();
    match msg.from.as_ref() {
        Some(user) => Sender {
            external_id,
            display_name: Some(user.full_name()),
            username: user.username.clone(),
        },
        None => Sender {
            external_id,
            display_name: None,
            username: None,
        },
    }
}

fn event(sender: Sender, kind: InboundKind, occurred_at: String) -> InboundEvent {
    InboundEvent {
        channel_id: 0,
        sender,
        kind,
        occurred_at,
    }
}

fn dice_emoji(dice: &Dice) -> String {
    match dice.emoji {
        DiceEmoji::Dice => "🎲",
        DiceEmoji::Darts => "🎯",
        DiceEmoji::Basketball => "🏀",
        DiceEmoji::Football => "⚽",
        DiceEmoji::Bowling => "🎳",
        DiceEmoji::SlotMachine => "🎰",
    }
    .to_string()
}

/// What an unsupported message actually carried, for the drop log.
fn describe(msg: &Message) -> &'static str {
    if msg.sticker().is_some() {
        "sticker"
    } else if msg.animation().is_some() {
        "animation"
    } else if msg.audio().is_some() {
        "audio"
    } else if msg.video_note().is_some() {
        "video note"
    } else if msg.poll().is_some() {
        "poll"
    } else if msg.venue().is_some() {
        "venue"
    } else {
        "unrecognized message shape"
    }
}

/// Maps a regular message update to an inbound event.
pub fn map_message(msg: &Message) -> InboundEvent {
    let origin_id = Some(msg.id.0.to_string());
    let kind = if let Some(text) = msg.text() {
        InboundKind::Text {
            text: text.to_string(),
            origin_id,
            reply_to: msg.reply_to_message().map(|m| m.id.0.to_string()),
        }
    } else if let Some(contact) = msg.contact() {
        let name = format!(
            "{} {}",
            contact.first_name,
            contact.last_name.as_deref().unwrap_or_default()
        );
        InboundKind::Contact {
            phone: contact.phone_number.clone(),
            owner_external_id: contact.user_id.map(|id| id.0.to_string()),
            name: Some(name.trim().to_string()),
        }
    } else if let Some(photos) = msg.photo() {
        // Telegram sends several sizes; the last one is the largest.
        match photos.last() {
            Some(largest) => InboundKind::Media {
                media: MediaKind::Photo,
                reference: largest.file.id.to_string(),
                caption: msg.caption().map(str::to_string),
                origin_id,
            },
            None => InboundKind::Unsupported {
                description: "empty photo array".to_string(),
            },
        }
    } else if let Some(doc) = msg.document() {
        InboundKind::Media {
            media: MediaKind::Document,
            reference: doc.file.id.to_string(),
            caption: msg.caption().map(str::to_string),
            origin_id,
        }
    } else if let Some(voice) = msg.voice() {
        InboundKind::Media {
            media: MediaKind::Voice,
            reference: voice.file.id.to_string(),
            caption: msg.caption().map(str::to_string),
            origin_id,
        }
    } else if let Some(video) = msg.video() {
        InboundKind::Media {
            media: MediaKind::Video,
            reference: video.file.id.to_string(),
            caption: msg.caption().map(str::to_string),
            origin_id,
        }
    } else if let Some(location) = msg.location() {
        InboundKind::Location {
            latitude: location.latitude,
            longitude: location.longitude,
            origin_id,
        }
    } else if let Some(dice) = msg.dice() {
        InboundKind::Dice {
            emoji: dice_emoji(dice),
            value: i32::from(dice.value),
            origin_id,
        }
    } else {
        InboundKind::Unsupported {
            description: describe(msg).to_string(),
        }
    };
    event(sender_of(msg), kind, msg.date.to_rfc3339())
}

/// Maps an edited-message update. Edits that change neither text nor
/// caption carry nothing worth relaying.
pub fn map_edited(msg: &Message) -> Option<InboundEvent> {
    let new_text = msg.text().map(str::to_string);
    let new_caption = msg.caption().map(str::to_string);
    if new_text.is_none() && new_caption.is_none() {
        return None;
    }
    Some(event(
        sender_of(msg),
        InboundKind::Edit {
            origin_id: msg.id.0.to_string(),
            new_text,
            new_caption,
        },
        msg.date.to_rfc3339(),
    ))
}

/// Maps a callback-query update (inline keyboard button press).
///
/// Unrecognized callback data becomes `Unsupported` so the relay logs
/// and drops it instead of guessing.
pub fn map_callback(query: &CallbackQuery) -> Option<InboundEvent> {
    let data = query.data.as_deref()?;
    let origin_id = query.message.as_ref().map(|m| m.id().0.to_string());
    let chat_id = query
        .message
        .as_ref()
        .map(|m| m.chat().id)
        .unwrap_or(ChatId(query.from.id.0 as i64));

    let kind = match CallbackAction::parse(data) {
        Some(action) => InboundKind::Callback { action, origin_id },
        None => InboundKind::Unsupported {
            description: format!("unrecognized callback data: {data}"),
        },
    };
    Some(event(
        Sender {
            external_id: chat_id.0.to_string(),
            display_name: Some(query.from.full_name()),
            username: query.from.username.clone(),
        },
        kind,
        chrono::Utc::now().to_rfc3339(),
    ))
}

/// Maps a my-chat-member update: the user blocking the bot soft-deletes
/// them, anything that makes the bot reachable again restores them.
pub fn map_membership(update: &ChatMemberUpdated) -> InboundEvent {
    let blocked = update.new_chat_member.is_left() || update.new_chat_member.is_banned();
    let status = if blocked {
        MembershipStatus::Blocked
    } else {
        MembershipStatus::Unblocked
    };
    event(
        Sender {
            external_id: update.chat.id.0.to_string(),
            display_name: Some(update.from.full_name()),
            username: update.from.username.clone(),
        },
        InboundKind::Membership { status },
        update.date.to_rfc3339(),
    )
}
