// SPDX-FileCopyrightText: 2026 Parlo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Parlo integration tests.
//!
//! Provides a [`MockChannel`] that implements `ChannelAdapter` with
//! injectable inbound events and captured outbound operations, a
//! [`CaptureSink`] recording every published event, and builders for
//! common inbound event shapes.

pub mod events;
pub mod mock_channel;
pub mod sink;

pub use mock_channel::{MockChannel, SentOp};
pub use sink::CaptureSink;
