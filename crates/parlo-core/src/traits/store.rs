// SPDX-FileCopyrightText: 2026 Parlo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation store trait: the persistence contract for users, channels,
//! operators, conversations, and messages.

use async_trait::async_trait;

use crate::error::ParloError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{
    BacklogEntry, Channel, ChannelKind, Conversation, ConversationSummary, NewChannel, NewMessage,
    NewOperator, NewUser, Operator, ParticipantRole, StoredMessage, User, UserStage,
};

/// The persistence contract for the support relay.
///
/// All lifecycle transitions (`bind_operator`, `close_conversation`,
/// `set_rating`, `resolve_close_request`) are compare-and-set: the
/// implementation must re-check the current status inside its own
/// transaction and surface a [`ParloError::Conflict`] when the
/// precondition no longer holds. Concurrent callers racing on the same
/// row get exactly one winner.
///
/// [`ParloError::Conflict`]: crate::error::ParloError::Conflict
#[async_trait]
pub trait ConversationStore: PluginAdapter {
    /// Initializes the storage backend (migrations, connection setup).
    async fn initialize(&self) -> Result<(), ParloError>;

    /// Closes the storage backend, flushing pending writes.
    async fn close(&self) -> Result<(), ParloError>;

    // -- users --------------------------------------------------------------

    /// Looks up a user by identity namespace and external id.
    async fn find_user(
        &self,
        kind: ChannelKind,
        external_id: &str,
    ) -> Result<Option<User>, ParloError>;

    async fn get_user(&self, id: i64) -> Result<User, ParloError>;

    async fn create_user(&self, new: &NewUser) -> Result<User, ParloError>;

    async fn set_user_stage(&self, id: i64, stage: UserStage) -> Result<(), ParloError>;

    async fn set_user_phone(&self, id: i64, phone: &str) -> Result<(), ParloError>;

    async fn set_user_name(&self, id: i64, name: &str) -> Result<(), ParloError>;

    async fn set_user_language(&self, id: i64, language: &str) -> Result<(), ParloError>;

    /// Soft-deletes or restores a user (membership changes).
    async fn set_user_deleted(&self, id: i64, deleted: bool) -> Result<(), ParloError>;

    // -- channels -----------------------------------------------------------

    async fn create_channel(&self, new: &NewChannel) -> Result<Channel, ParloError>;

    async fn get_channel(&self, id: i64) -> Result<Channel, ParloError>;

    async fn find_channel_by_public_id(&self, public_id: &str)
    -> Result<Option<Channel>, ParloError>;

    /// Returns the backend token for a channel. Tokens never travel inside
    /// [`Channel`] records.
    async fn channel_token(&self, id: i64) -> Result<Option<String>, ParloError>;

    /// Lists channels in stable ascending id order.
    async fn list_channels(&self, only_active: bool) -> Result<Vec<Channel>, ParloError>;

    async fn set_channel_active(&self, id: i64, active: bool) -> Result<(), ParloError>;

    async fn set_channel_username(&self, id: i64, username: &str) -> Result<(), ParloError>;

    /// Soft-deletes a channel and deactivates it.
    async fn delete_channel(&self, id: i64) -> Result<(), ParloError>;

    /// Returns the singleton web channel record, creating it on first use.
    async fn ensure_web_channel(&self) -> Result<Channel, ParloError>;

    // -- operators ----------------------------------------------------------

    /// Creates or updates an operator by name, syncing languages, capacity,
    /// token, and reactivating if previously deactivated.
    async fn upsert_operator(&self, new: &NewOperator) -> Result<Operator, ParloError>;

    async fn get_operator(&self, id: i64) -> Result<Operator, ParloError>;

    async fn list_active_operators(&self) -> Result<Vec<Operator>, ParloError>;

    async fn find_operator_by_token(&self, token: &str) -> Result<Option<Operator>, ParloError>;

    /// Deactivates every active operator whose name is not in `keep`.
    /// Returns the number deactivated.
    async fn deactivate_operators_except(&self, keep: &[String]) -> Result<u64, ParloError>;

    /// Counts conversations currently BUSY under this operator.
    async fn count_operator_busy(&self, operator_id: i64) -> Result<i64, ParloError>;

    // -- conversations ------------------------------------------------------

    /// Finds the user's open (non-CLOSED) conversation, if any. When
    /// storage holds more than one open row for the user the oldest wins
    /// and the violation is logged.
    async fn find_open_by_user(&self, user_id: i64) -> Result<Option<Conversation>, ParloError>;

    /// Creates a WAITING conversation. Fails with
    /// [`ConflictKind::ChatIsOpen`] when the user already has an open one;
    /// the check runs inside the same transaction as the insert.
    ///
    /// [`ConflictKind::ChatIsOpen`]: crate::error::ConflictKind::ChatIsOpen
    async fn create_conversation(
        &self,
        user_id: i64,
        channel_id: i64,
        language: &str,
    ) -> Result<Conversation, ParloError>;

    async fn get_conversation(&self, id: i64) -> Result<Conversation, ParloError>;

    async fn find_conversation_by_public_id(
        &self,
        public_id: &str,
    ) -> Result<Option<Conversation>, ParloError>;

    /// Lists WAITING conversations on a channel whose language is in
    /// `languages`, oldest first. An empty `languages` slice matches all.
    async fn list_waiting(
        &self,
        channel_id: i64,
        languages: &[String],
    ) -> Result<Vec<Conversation>, ParloError>;

    /// Atomically binds an operator: WAITING -> BUSY. Exactly one of any
    /// set of concurrent callers succeeds; the rest get
    /// [`ConflictKind::SessionAlreadyBusy`].
    ///
    /// [`ConflictKind::SessionAlreadyBusy`]: crate::error::ConflictKind::SessionAlreadyBusy
    async fn bind_operator(&self, id: i64, operator_id: i64) -> Result<Conversation, ParloError>;

    /// Atomically closes: WAITING|BUSY -> CLOSED. Closing a CLOSED
    /// conversation yields [`ConflictKind::SessionClosed`].
    ///
    /// [`ConflictKind::SessionClosed`]: crate::error::ConflictKind::SessionClosed
    async fn close_conversation(&self, id: i64) -> Result<Conversation, ParloError>;

    /// Records a rating on a CLOSED conversation. Ratings are write-once:
    /// rating an open conversation yields `SessionNotClosed`, re-rating
    /// yields `RatingAlreadySet`.
    async fn set_rating(&self, id: i64, rating: u8) -> Result<Conversation, ParloError>;

    /// Counts unread client messages in the conversation.
    async fn count_unread(&self, id: i64) -> Result<i64, ParloError>;

    /// Marks the counterparty's messages read, up to and including message
    /// row id `until` (all of them when `None`). Returns the number of rows
    /// flipped.
    async fn mark_read(
        &self,
        id: i64,
        reader: ParticipantRole,
        until: Option<i64>,
    ) -> Result<u64, ParloError>;

    /// The operator dashboard feed: every WAITING conversation plus the
    /// caller's own BUSY ones, with unread counts.
    async fn list_sessions(&self, operator_id: i64)
    -> Result<Vec<ConversationSummary>, ParloError>;

    // -- messages -----------------------------------------------------------

    async fn insert_message(&self, new: &NewMessage) -> Result<StoredMessage, ParloError>;

    /// Lists messages in insertion order, newest last, capped at `limit`.
    async fn list_messages(&self, conversation_id: i64, limit: i64)
    -> Result<Vec<StoredMessage>, ParloError>;

    /// Every unread client message in an open conversation, in insertion
    /// order, with routing context. Used to rebuild the dispatch queue on
    /// startup.
    async fn unread_backlog(&self) -> Result<Vec<BacklogEntry>, ParloError>;

    async fn find_message_by_public_id(
        &self,
        public_id: &str,
    ) -> Result<Option<StoredMessage>, ParloError>;

    /// Applies a channel-side edit to the stored copy, matched by origin id.
    /// Returns the updated row, or `None` when no stored message matches.
    async fn update_message_by_origin(
        &self,
        conversation_id: i64,
        origin_id: &str,
        new_text: Option<&str>,
        new_caption: Option<&str>,
    ) -> Result<Option<StoredMessage>, ParloError>;

    /// Resolves a pending close request (an `ask_close` system message):
    /// flips its sender to accepted/denied. A second resolution yields
    /// [`ConflictKind::CloseRequestResolved`].
    ///
    /// [`ConflictKind::CloseRequestResolved`]: crate::error::ConflictKind::CloseRequestResolved
    async fn resolve_close_request(
        &self,
        message_id: i64,
        accept: bool,
    ) -> Result<StoredMessage, ParloError>;
}
