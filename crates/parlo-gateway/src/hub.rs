// SPDX-FileCopyrightText: 2026 Parlo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Topic-keyed push hub fanning live events out to websocket subscribers.
//!
//! The hub is the gateway's [`EventSink`]: the notifier publishes here
//! after every store mutation, and each connected socket attaches one
//! sender per subscribed topic. Publishing is best effort by contract; a
//! topic with no subscribers drops the event, and a subscriber that falls
//! behind loses events rather than blocking the relay.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use parlo_core::traits::sink::EventSink;
use tokio::sync::mpsc;
use tracing::debug;

/// Fan-out hub mapping topics to connected websocket subscribers.
#[derive(Default)]
pub struct PushHub {
    topics: DashMap<String, DashMap<u64, mpsc::Sender<String>>>,
    next_id: AtomicU64,
}

impl PushHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a subscriber id for one socket connection.
    pub fn subscriber_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Attach a subscriber's outbound lane to a topic.
    pub fn attach(&self, topic: &str, id: u64, tx: mpsc::Sender<String>) {
        self.topics
            .entry(topic.to_string())
            .or_default()
            .insert(id, tx);
    }

    /// Detach a subscriber from a topic, dropping the topic entry when it
    /// was the last one.
    pub fn detach(&self, topic: &str, id: u64) {
        let emptied = match self.topics.get(topic) {
            Some(subscribers) => {
                subscribers.remove(&id);
                subscribers.is_empty()
            }
            None => return,
        };
        if emptied {
            self.topics.remove_if(topic, |_, subscribers| subscribers.is_empty());
        }
    }

    /// Number of live subscribers on a topic.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics.get(topic).map_or(0, |s| s.len())
    }

    /// Serialize an event and hand it to every subscriber of the topic.
    ///
    /// The topic is stamped into the event object so a socket subscribed
    /// to several topics can tell them apart. Closed subscribers are
    /// pruned; full ones lose the event.
    pub async fn publish(&self, topic: &str, event: serde_json::Value) {
        let payload = match event {
            serde_json::Value::Object(mut map) => {
                map.insert("topic".to_string(), serde_json::Value::String(topic.to_string()));
                serde_json::Value::Object(map)
            }
            other => serde_json::json!({"topic": topic, "event": other}),
        };
        let text = payload.to_string();

        let Some(subscribers) = self.topics.get(topic) else {
            return;
        };
        let mut dead: Vec<u64> = Vec::new();
        for entry in subscribers.iter() {
            match entry.value().try_send(text.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    debug!(topic, subscriber = *entry.key(), "subscriber lagging, event dropped");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    dead.push(*entry.key());
                }
            }
        }
        for id in dead {
            subscribers.remove(&id);
        }
    }
}

#[async_trait]
impl EventSink for PushHub {
    async fn publish(&self, topic: &str, event: serde_json::Value) {
        PushHub::publish(self, topic, event).await;
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn publish_reaches_every_subscriber_of_the_topic() {
        let hub = PushHub::new();
        let (tx1, mut rx1) = mpsc::channel(8);
        let (tx2, mut rx2) = mpsc::channel(8);
        hub.attach("chat:c1", hub.subscriber_id(), tx1);
        hub.attach("chat:c1", hub.subscriber_id(), tx2);

        hub.publish("chat:c1", json!({"event": "message"})).await;

        let first: serde_json::Value = serde_json::from_str(&rx1.recv().await.unwrap()).unwrap();
        assert_eq!(first["event"], "message");
        assert_eq!(first["topic"], "chat:c1");
        assert!(rx2.recv().await.is_some());
    }

    #[tokio::test]
    async fn publish_to_an_empty_topic_is_a_no_op() {
        let hub = PushHub::new();
        hub.publish("chat:nobody", json!({"event": "message"})).await;
        assert_eq!(hub.subscriber_count("chat:nobody"), 0);
    }

    #[tokio::test]
    async fn detach_removes_the_subscriber() {
        let hub = PushHub::new();
        let (tx, mut rx) = mpsc::channel(8);
        let id = hub.subscriber_id();
        hub.attach("op:o1", id, tx);
        assert_eq!(hub.subscriber_count("op:o1"), 1);

        hub.detach("op:o1", id);
        assert_eq!(hub.subscriber_count("op:o1"), 0);

        hub.publish("op:o1", json!({"event": "close"})).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn closed_subscribers_are_pruned_on_publish() {
        let hub = PushHub::new();
        let (tx, rx) = mpsc::channel(8);
        hub.attach("chat:c1", hub.subscriber_id(), tx);
        drop(rx);

        hub.publish("chat:c1", json!({"event": "message"})).await;
        assert_eq!(hub.subscriber_count("chat:c1"), 0);
    }

    #[tokio::test]
    async fn non_object_events_are_wrapped() {
        let hub = PushHub::new();
        let (tx, mut rx) = mpsc::channel(8);
        hub.attach("chat:c1", hub.subscriber_id(), tx);

        hub.publish("chat:c1", json!("plain")).await;
        let got: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(got["topic"], "chat:c1");
        assert_eq!(got["event"], "plain");
    }
}
