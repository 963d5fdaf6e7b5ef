// SPDX-FileCopyrightText: 2026 Parlo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Builders for the inbound event shapes used across integration tests.

use parlo_core::types::{
    CallbackAction, InboundEvent, InboundKind, MediaKind, MembershipStatus, Sender,
};

/// A sender with a stable external id and a readable display name.
pub fn sender(external_id: &str) -> Sender {
    Sender {
        external_id: external_id.to_string(),
        display_name: Some(format!("user {external_id}")),
        username: None,
    }
}

fn event(channel_id: i64, external_id: &str, kind: InboundKind) -> InboundEvent {
    InboundEvent {
        channel_id,
        sender: sender(external_id),
        kind,
        occurred_at: chrono::Utc::now().to_rfc3339(),
    }
}

pub fn text_event(channel_id: i64, external_id: &str, text: &str) -> InboundEvent {
    event(
        channel_id,
        external_id,
        InboundKind::Text {
            text: text.to_string(),
            origin_id: Some(uuid::Uuid::new_v4().simple().to_string()),
            reply_to: None,
        },
    )
}

/// A contact share owned by the sender (a valid phone-stage answer).
pub fn own_contact_event(channel_id: i64, external_id: &str, phone: &str) -> InboundEvent {
    event(
        channel_id,
        external_id,
        InboundKind::Contact {
            phone: phone.to_string(),
            owner_external_id: Some(external_id.to_string()),
            name: None,
        },
    )
}

/// A contact share owned by somebody else (rejected in the phone stage).
pub fn foreign_contact_event(channel_id: i64, external_id: &str, phone: &str) -> InboundEvent {
    event(
        channel_id,
        external_id,
        InboundKind::Contact {
            phone: phone.to_string(),
            owner_external_id: Some(format!("not-{external_id}")),
            name: None,
        },
    )
}

pub fn callback_event(
    channel_id: i64,
    external_id: &str,
    action: CallbackAction,
) -> InboundEvent {
    event(
        channel_id,
        external_id,
        InboundKind::Callback {
            action,
            origin_id: Some("kb-1".to_string()),
        },
    )
}

pub fn media_event(
    channel_id: i64,
    external_id: &str,
    media: MediaKind,
    reference: &str,
) -> InboundEvent {
    event(
        channel_id,
        external_id,
        InboundKind::Media {
            media,
            reference: reference.to_string(),
            caption: None,
            origin_id: Some(uuid::Uuid::new_v4().simple().to_string()),
        },
    )
}

pub fn edit_event(
    channel_id: i64,
    external_id: &str,
    origin_id: &str,
    new_text: &str,
) -> InboundEvent {
    event(
        channel_id,
        external_id,
        InboundKind::Edit {
            origin_id: origin_id.to_string(),
            new_text: Some(new_text.to_string()),
            new_caption: None,
        },
    )
}

pub fn membership_event(
    channel_id: i64,
    external_id: &str,
    status: MembershipStatus,
) -> InboundEvent {
    event(channel_id, external_id, InboundKind::Membership { status })
}

pub fn unsupported_event(channel_id: i64, external_id: &str) -> InboundEvent {
    event(
        channel_id,
        external_id,
        InboundKind::Unsupported {
            description: "sticker".to_string(),
        },
    )
}

/// The text payload of a `Text` event, for assertions.
pub fn text_of(event: &InboundEvent) -> Option<&str> {
    match &event.kind {
        InboundKind::Text { text, .. } => Some(text),
        _ => None,
    }
}
