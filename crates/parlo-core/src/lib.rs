// SPDX-FileCopyrightText: 2026 Parlo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Parlo support relay.
//!
//! This crate provides the foundational trait definitions, error types, and
//! common types used throughout the Parlo workspace. All adapter plugins
//! implement traits defined here.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::{ConflictKind, ParloError};
pub use types::{
    AdapterType, BacklogEntry, CallbackAction, Channel, ChannelCapabilities, ChannelKind,
    CommandMenu, Conversation, ConversationStatus, ConversationSummary, HealthStatus,
    InboundEvent, InboundKind, InlineButton, Keyboard, MediaKind, MembershipStatus, MenuCommand,
    MessageContent, MessageId, NewChannel, NewMessage, NewOperator, NewUser, Operator,
    ParticipantRole, ReplyButton, Sender, SenderKind, StoredMessage, User, UserStage,
    new_public_id,
};

// Re-export all adapter traits at crate root.
pub use traits::{ChannelAdapter, ConversationStore, EventSink, PluginAdapter};
