// SPDX-FileCopyrightText: 2026 Parlo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared across the Parlo crates.

use serde::{Deserialize, Serialize};

/// A channel-scoped message identifier, as issued by the channel backend
/// (e.g. a Telegram message id). Opaque to everything but the issuing adapter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Mint a new public identifier. Public ids are what crosses the process
/// boundary (HTTP payloads, websocket topics, callback data); numeric row
/// ids never leave the store.
pub fn new_public_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Health status reported by adapters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Degraded(String),
    Unhealthy(String),
}

/// Adapter category, used in registry diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum AdapterType {
    Channel,
    Storage,
}

/// The kind of messaging surface a channel record represents.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Telegram,
    Web,
}

/// Conversation lifecycle status. Transitions are monotonic:
/// `Waiting -> Busy -> Closed`, with `Waiting -> Closed` allowed for
/// conversations closed before any operator bound.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    Waiting,
    Busy,
    Closed,
}

/// Per-user finite state machine driving onboarding and session flow.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UserStage {
    /// First contact; nothing collected yet.
    New,
    /// Greeted; waiting for a shared contact.
    AwaitingPhone,
    /// Phone stored; waiting for a display name.
    AwaitingName,
    /// Name stored; waiting for a language pick.
    ChoosingLanguage,
    /// Onboarded; at the main menu.
    Active,
    /// Asked to talk to an operator; next text becomes the opening question.
    AwaitingQuestion,
    /// In a live session with an operator.
    Talking,
    /// Question submitted; conversation is queued for assignment.
    WaitingOperator,
}

/// Who authored a stored message. The `AskClose*` variants are system
/// messages recording a close-request and its resolution.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SenderKind {
    Client,
    Support,
    AskClose,
    AskCloseAccepted,
    AskCloseDenied,
}

impl SenderKind {
    /// System messages are bookkeeping rows, not chat content.
    pub fn is_system(&self) -> bool {
        matches!(
            self,
            Self::AskClose | Self::AskCloseAccepted | Self::AskCloseDenied
        )
    }
}

/// Which side of a conversation an actor is on, for read tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantRole {
    Client,
    Support,
}

/// Media attachment category.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Photo,
    Document,
    Voice,
    Video,
}

/// Normalized message content, the relay's common currency. Every channel
/// adapter maps its native payloads into this shape before anything else
/// sees them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageContent {
    Text {
        text: String,
    },
    Media {
        media: MediaKind,
        /// Channel-scoped handle for re-sending (e.g. a Telegram file id).
        reference: String,
        caption: Option<String>,
    },
    Location {
        latitude: f64,
        longitude: f64,
    },
    Contact {
        phone: String,
        name: Option<String>,
    },
    Dice {
        emoji: String,
        value: i32,
    },
}

impl MessageContent {
    /// Short discriminant used in storage and logs.
    pub fn kind_str(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Media {
                media: MediaKind::Photo,
                ..
            } => "photo",
            Self::Media {
                media: MediaKind::Document,
                ..
            } => "document",
            Self::Media {
                media: MediaKind::Voice,
                ..
            } => "voice",
            Self::Media {
                media: MediaKind::Video,
                ..
            } => "video",
            Self::Location { .. } => "location",
            Self::Contact { .. } => "contact",
            Self::Dice { .. } => "dice",
        }
    }
}

/// The end user behind an inbound event, as the channel saw them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sender {
    /// Channel-scoped stable identifier (Telegram chat id, web client id).
    pub external_id: String,
    pub display_name: Option<String>,
    pub username: Option<String>,
}

/// Membership change reported by a channel (user blocked or unblocked the bot).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipStatus {
    Blocked,
    Unblocked,
}

/// A parsed inline-button callback. The wire encoding is part of the
/// external contract (it round-trips through channel backends unchanged).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallbackAction {
    /// `setLang:<iso>` — pick a conversation language.
    SetLanguage { language: String },
    /// `rate:<1-5>:<conversation_public_id>` — rate a closed conversation.
    Rate { score: u8, conversation: String },
    /// `isClose:<yes|no>:<message_public_id>` — answer a close request.
    CloseAnswer { accept: bool, message: String },
}

impl CallbackAction {
    /// Parse callback data. Returns `None` for anything unrecognized so the
    /// caller can drop stale or foreign payloads without erroring.
    pub fn parse(data: &str) -> Option<Self> {
        let mut parts = data.splitn(3, ':');
        match parts.next()? {
            "setLang" => {
                let language = parts.next()?.to_string();
                if language.is_empty() {
                    return None;
                }
                Some(Self::SetLanguage { language })
            }
            "rate" => {
                let score: u8 = parts.next()?.parse().ok()?;
                if !(1..=5).contains(&score) {
                    return None;
                }
                let conversation = parts.next()?.to_string();
                if conversation.is_empty() {
                    return None;
                }
                Some(Self::Rate {
                    score,
                    conversation,
                })
            }
            "isClose" => {
                let accept = match parts.next()? {
                    "yes" => true,
                    "no" => false,
                    _ => return None,
                };
                let message = parts.next()?.to_string();
                if message.is_empty() {
                    return None;
                }
                Some(Self::CloseAnswer { accept, message })
            }
            _ => None,
        }
    }

    /// Encode to the wire form handed to channel keyboards.
    pub fn encode(&self) -> String {
        match self {
            Self::SetLanguage { language } => format!("setLang:{language}"),
            Self::Rate {
                score,
                conversation,
            } => format!("rate:{score}:{conversation}"),
            Self::CloseAnswer { accept, message } => {
                format!("isClose:{}:{message}", if *accept { "yes" } else { "no" })
            }
        }
    }
}

/// What an inbound event carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InboundKind {
    Text {
        text: String,
        /// Channel-native id of the originating message, when the channel has one.
        origin_id: Option<String>,
        /// Channel-native id of the message this replies to, if any.
        reply_to: Option<String>,
    },
    Contact {
        phone: String,
        /// External id of the contact's owner; used to verify the sender
        /// shared their own contact rather than a third party's.
        owner_external_id: Option<String>,
        name: Option<String>,
    },
    Callback {
        action: CallbackAction,
        /// The message the pressed button was attached to.
        origin_id: Option<String>,
    },
    Media {
        media: MediaKind,
        reference: String,
        caption: Option<String>,
        origin_id: Option<String>,
    },
    Location {
        latitude: f64,
        longitude: f64,
        origin_id: Option<String>,
    },
    Dice {
        emoji: String,
        value: i32,
        origin_id: Option<String>,
    },
    /// An earlier message was edited at the channel.
    Edit {
        origin_id: String,
        new_text: Option<String>,
        new_caption: Option<String>,
    },
    /// The sender blocked or unblocked the channel surface.
    Membership { status: MembershipStatus },
    /// Anything the adapter cannot normalize (stickers, polls, ...).
    Unsupported { description: String },
}

/// A single normalized inbound event, as produced by a channel adapter
/// and consumed by the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundEvent {
    /// Row id of the channel record this event arrived through.
    pub channel_id: i64,
    pub sender: Sender,
    pub kind: InboundKind,
    /// RFC 3339 timestamp of when the channel backend saw the event.
    pub occurred_at: String,
}

/// An inline keyboard button.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InlineButton {
    pub label: String,
    pub action: CallbackAction,
}

/// A reply-keyboard button.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyButton {
    pub label: String,
    /// When set, pressing the button shares the user's contact.
    pub request_contact: bool,
}

/// A keyboard to attach to an outbound message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Keyboard {
    Inline { rows: Vec<Vec<InlineButton>> },
    Reply {
        rows: Vec<Vec<ReplyButton>>,
        one_time: bool,
    },
    /// Remove any visible reply keyboard.
    Remove,
}

/// One command in a channel's command menu.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuCommand {
    pub command: String,
    pub description: String,
}

/// A localized command menu. `language: None` is the fallback menu.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandMenu {
    pub language: Option<String>,
    pub commands: Vec<MenuCommand>,
}

/// What a channel backend can do; the relay degrades gracefully around
/// anything unsupported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelCapabilities {
    pub supports_edit: bool,
    pub supports_delete: bool,
    pub supports_typing: bool,
    pub supports_keyboards: bool,
    pub supports_command_menu: bool,
    pub supports_media: bool,
    pub max_message_length: Option<usize>,
}

impl Default for ChannelCapabilities {
    fn default() -> Self {
        Self {
            supports_edit: false,
            supports_delete: false,
            supports_typing: false,
            supports_keyboards: false,
            supports_command_menu: false,
            supports_media: false,
            max_message_length: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Persistent records
// ---------------------------------------------------------------------------

/// A known end user. Identity is `(kind, external_id)`: the same Telegram
/// account reached through two different bots resolves to one user row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub public_id: String,
    pub kind: ChannelKind,
    pub external_id: String,
    pub display_name: Option<String>,
    pub username: Option<String>,
    pub phone: Option<String>,
    pub language: Option<String>,
    pub stage: UserStage,
    pub deleted: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// A support operator. The bearer token is held in storage only and never
/// enters this struct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operator {
    pub id: i64,
    pub public_id: String,
    pub name: String,
    pub languages: Vec<String>,
    pub capacity: u32,
    pub active: bool,
    pub created_at: String,
}

/// A registered messaging channel. The backend token is held in storage
/// only and never enters this struct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub id: i64,
    pub public_id: String,
    pub kind: ChannelKind,
    pub username: Option<String>,
    pub active: bool,
    pub deleted: bool,
    pub created_at: String,
}

/// A support conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: i64,
    pub public_id: String,
    pub user_id: i64,
    pub channel_id: i64,
    pub operator_id: Option<i64>,
    pub status: ConversationStatus,
    pub language: String,
    pub rating: Option<u8>,
    pub deleted: bool,
    pub created_at: String,
    pub closed_at: Option<String>,
}

/// A stored chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: i64,
    pub public_id: String,
    pub conversation_id: i64,
    pub sender: SenderKind,
    pub content: MessageContent,
    pub is_read: bool,
    /// Channel-native id of the originating message, for edit tracking.
    pub origin_id: Option<String>,
    pub created_at: String,
}

// ---------------------------------------------------------------------------
// Operation parameters and projections
// ---------------------------------------------------------------------------

/// Parameters for creating a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub kind: ChannelKind,
    pub external_id: String,
    pub display_name: Option<String>,
    pub username: Option<String>,
    pub language: Option<String>,
    pub stage: UserStage,
}

/// Parameters for registering a channel.
#[derive(Debug, Clone)]
pub struct NewChannel {
    pub kind: ChannelKind,
    pub token: String,
    pub username: Option<String>,
}

/// Parameters for provisioning an operator.
#[derive(Debug, Clone)]
pub struct NewOperator {
    pub name: String,
    pub languages: Vec<String>,
    pub capacity: u32,
    pub token: String,
}

/// Parameters for inserting a message.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub conversation_id: i64,
    pub sender: SenderKind,
    pub content: MessageContent,
    pub origin_id: Option<String>,
}

/// One undelivered message with the routing context needed to re-queue it.
#[derive(Debug, Clone)]
pub struct BacklogEntry {
    pub conversation_id: i64,
    pub channel_id: i64,
    pub language: String,
    pub message: StoredMessage,
}

/// An operator-facing view of a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    /// Public id.
    pub id: String,
    pub status: ConversationStatus,
    pub language: String,
    pub channel: String,
    pub client: Option<String>,
    pub operator: Option<String>,
    pub unread: i64,
    pub last_message_at: Option<String>,
}
