// SPDX-FileCopyrightText: 2026 Parlo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Capturing event sink for asserting on published live updates.

use async_trait::async_trait;
use tokio::sync::Mutex;

use parlo_core::traits::sink::EventSink;

/// An [`EventSink`] that records every published `(topic, event)` pair.
#[derive(Default)]
pub struct CaptureSink {
    published: Mutex<Vec<(String, serde_json::Value)>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All published events, in publish order.
    pub async fn published(&self) -> Vec<(String, serde_json::Value)> {
        self.published.lock().await.clone()
    }

    /// Events published to one topic, in publish order.
    pub async fn on_topic(&self, topic: &str) -> Vec<serde_json::Value> {
        self.published
            .lock()
            .await
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, e)| e.clone())
            .collect()
    }

    pub async fn count(&self) -> usize {
        self.published.lock().await.len()
    }

    pub async fn clear(&self) {
        self.published.lock().await.clear();
    }
}

#[async_trait]
impl EventSink for CaptureSink {
    async fn publish(&self, topic: &str, event: serde_json::Value) {
        self.published
            .lock()
            .await
            .push((topic.to_string(), event));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn publish_records_topic_and_payload() {
        let sink = CaptureSink::new();
        sink.publish("chat:abc", json!({"event": "message"})).await;
        sink.publish("op:xyz", json!({"event": "bind"})).await;
        sink.publish("chat:abc", json!({"event": "close"})).await;

        assert_eq!(sink.count().await, 3);
        let chat = sink.on_topic("chat:abc").await;
        assert_eq!(chat.len(), 2);
        assert_eq!(chat[0]["event"], "message");
        assert_eq!(chat[1]["event"], "close");

        sink.clear().await;
        assert_eq!(sink.count().await, 0);
    }
}
