// SPDX-FileCopyrightText: 2026 Parlo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain model types for storage entities.
//!
//! The canonical types are defined in `parlo-core::types` for use across
//! adapter trait boundaries. This module re-exports them for convenience
//! within the storage crate.

pub use parlo_core::types::{
    BacklogEntry, Channel, Conversation, ConversationSummary, NewChannel, NewMessage, NewOperator,
    NewUser, Operator, StoredMessage, User,
};
