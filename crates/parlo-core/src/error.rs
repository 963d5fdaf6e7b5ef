// SPDX-FileCopyrightText: 2026 Parlo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Parlo support relay.

use thiserror::Error;

/// A lifecycle conflict: the operation raced with, or arrived after, a
/// status transition. Conflicts are expected under concurrent access and
/// are reported to callers rather than treated as failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ConflictKind {
    /// `bindOperator` lost the race: the conversation is no longer WAITING.
    #[strum(serialize = "session is already busy")]
    SessionAlreadyBusy,
    /// The conversation was already closed.
    #[strum(serialize = "session is closed")]
    SessionClosed,
    /// The operation requires a closed conversation.
    #[strum(serialize = "session is not closed")]
    SessionNotClosed,
    /// The user already has an open conversation.
    #[strum(serialize = "chat is already open")]
    ChatIsOpen,
    /// The conversation is not open.
    #[strum(serialize = "chat is not open")]
    ChatNotOpen,
    /// The conversation was already rated; ratings are write-once.
    #[strum(serialize = "rating is already set")]
    RatingAlreadySet,
    /// The close request was already accepted or denied.
    #[strum(serialize = "close request is already resolved")]
    CloseRequestResolved,
}

/// The primary error type used across all Parlo adapter traits and core operations.
#[derive(Debug, Error)]
pub enum ParloError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Channel adapter errors (connection failure, send failure, rate limiting).
    #[error("channel error: {message}")]
    Channel {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A referenced entity does not exist (or is soft-deleted).
    #[error("{0} not found")]
    NotFound(&'static str),

    /// The operation conflicts with the entity's current lifecycle status.
    #[error("conflict: {0}")]
    Conflict(ConflictKind),

    /// The caller supplied a value the operation cannot accept.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An inbound event carried content no handler can ingest. The event is
    /// dropped and logged; the sender is not notified.
    #[error("unsupported message type: {0}")]
    UnsupportedMessageType(String),

    /// Role or ownership check failed.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Persisted data contradicts a core invariant. Handled fail-closed.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ParloError {
    /// Shorthand for a channel error without an underlying source.
    pub fn channel(message: impl Into<String>) -> Self {
        Self::Channel {
            message: message.into(),
            source: None,
        }
    }

    /// Shorthand for a channel error wrapping an underlying source.
    pub fn channel_with(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Channel {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// The stable numeric code surfaced at the HTTP boundary.
    ///
    /// Codes are part of the external contract and never change:
    /// 1400 invalid input, 1401 unauthorized, 1404 not found,
    /// 1409 conflict, 1500 everything else.
    pub fn code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 1404,
            Self::Conflict(_) => 1409,
            Self::InvalidInput(_) | Self::UnsupportedMessageType(_) => 1400,
            Self::Unauthorized(_) => 1401,
            _ => 1500,
        }
    }

    /// True for lifecycle conflicts, which are logged at info level and
    /// never alarmed: losing a bind race is normal operation.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}
