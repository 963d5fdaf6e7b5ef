// SPDX-FileCopyrightText: 2026 Parlo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Event sink trait for pushing live updates to connected front ends.

use async_trait::async_trait;

/// A best-effort push bus for live updates (websocket fan-out).
///
/// Publishing never fails the surrounding operation: a sink with no
/// subscriber for the topic simply drops the event. Topics follow the
/// `chat:<conversation_public_id>` and `op:<operator_public_id>` naming.
#[async_trait]
pub trait EventSink: Send + Sync + 'static {
    async fn publish(&self, topic: &str, event: serde_json::Value);
}
