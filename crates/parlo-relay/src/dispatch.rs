// SPDX-FileCopyrightText: 2026 Parlo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory dispatch queue for undelivered client messages.
//!
//! Logical shape: channel, then language, then conversation, then messages
//! in arrival order. The queue is a disposable cache over the store's
//! unread state; [`DispatchQueue::warm_up`] rebuilds it from persisted
//! unread messages at any time. Enqueue and drain are serialized per
//! conversation, never globally.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use parlo_core::error::ParloError;
use parlo_core::traits::store::ConversationStore;
use parlo_core::types::StoredMessage;
use tokio::sync::Mutex;
use tracing::debug;

use crate::metrics;

struct Bucket {
    channel_id: i64,
    language: String,
    entries: VecDeque<StoredMessage>,
}

/// Per-conversation FIFO buckets of messages awaiting operator delivery.
pub struct DispatchQueue {
    buckets: DashMap<i64, Arc<Mutex<Bucket>>>,
    depth: AtomicUsize,
}

impl DispatchQueue {
    pub fn new() -> Self {
        Self {
            buckets: DashMap::new(),
            depth: AtomicUsize::new(0),
        }
    }

    /// Rebuild the queue from the store's unread client messages.
    ///
    /// Replaces any in-memory state. Returns the number of buffered
    /// messages.
    pub async fn warm_up(&self, store: &dyn ConversationStore) -> Result<usize, ParloError> {
        let backlog = store.unread_backlog().await?;
        self.buckets.clear();
        let mut total = 0usize;
        for entry in backlog {
            let bucket = self.bucket_for(entry.conversation_id, entry.channel_id, &entry.language);
            bucket.lock().await.entries.push_back(entry.message);
            total += 1;
        }
        self.depth.store(total, Ordering::Relaxed);
        metrics::set_queue_depth(total as f64);
        debug!(messages = total, "dispatch queue warmed up from unread backlog");
        Ok(total)
    }

    /// Append a stored message to its conversation bucket.
    pub async fn enqueue(
        &self,
        conversation_id: i64,
        channel_id: i64,
        language: &str,
        message: StoredMessage,
    ) {
        loop {
            let bucket = self.bucket_for(conversation_id, channel_id, language);
            let mut guard = bucket.lock().await;
            // A drain can evict the empty map entry between `bucket_for`
            // and the lock above; pushing into that orphan would lose the
            // message. Re-check identity under the lock and retry.
            let live = self
                .buckets
                .get(&conversation_id)
                .is_some_and(|b| Arc::ptr_eq(&*b, &bucket));
            if !live {
                continue;
            }
            guard.entries.push_back(message);
            break;
        }
        let depth = self.depth.fetch_add(1, Ordering::Relaxed) + 1;
        metrics::set_queue_depth(depth as f64);
    }

    /// Flush a conversation's backlog in arrival order.
    ///
    /// Called when an operator binds; the returned messages are theirs to
    /// deliver.
    pub async fn drain(&self, conversation_id: i64) -> Vec<StoredMessage> {
        let Some(bucket) = self.buckets.get(&conversation_id).map(|b| Arc::clone(&*b)) else {
            return Vec::new();
        };
        let mut guard = bucket.lock().await;
        let drained: Vec<StoredMessage> = guard.entries.drain(..).collect();
        debug!(
            conversation_id,
            channel_id = guard.channel_id,
            language = %guard.language,
            count = drained.len(),
            "drained dispatch backlog"
        );
        drop(guard);
        self.remove_if_empty(conversation_id);
        self.sub_depth(drained.len());
        drained
    }

    /// Drop entries the reader has acknowledged.
    ///
    /// `until` is the highest acknowledged message id; `None` acknowledges
    /// everything buffered for the conversation.
    pub async fn ack_read(&self, conversation_id: i64, until: Option<i64>) {
        let Some(bucket) = self.buckets.get(&conversation_id).map(|b| Arc::clone(&*b)) else {
            return;
        };
        let mut guard = bucket.lock().await;
        let before = guard.entries.len();
        match until {
            Some(watermark) => guard.entries.retain(|m| m.id > watermark),
            None => guard.entries.clear(),
        }
        let removed = before - guard.entries.len();
        let empty = guard.entries.is_empty();
        drop(guard);
        if empty {
            self.remove_if_empty(conversation_id);
        }
        self.sub_depth(removed);
    }

    /// Discard a conversation's bucket entirely (conversation closed).
    pub async fn discard(&self, conversation_id: i64) {
        let Some(bucket) = self.buckets.get(&conversation_id).map(|b| Arc::clone(&*b)) else {
            return;
        };
        let mut guard = bucket.lock().await;
        let dropped = guard.entries.len();
        guard.entries.clear();
        drop(guard);
        self.remove_if_empty(conversation_id);
        self.sub_depth(dropped);
    }

    /// Total buffered messages across all conversations.
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    fn bucket_for(&self, conversation_id: i64, channel_id: i64, language: &str) -> Arc<Mutex<Bucket>> {
        let entry = self.buckets.entry(conversation_id).or_insert_with(|| {
            Arc::new(Mutex::new(Bucket {
                channel_id,
                language: language.to_string(),
                entries: VecDeque::new(),
            }))
        });
        Arc::clone(&*entry)
    }

    /// Drop the map entry only while the bucket is still observably empty.
    /// A concurrent enqueue holds the bucket lock while it appends, so the
    /// `try_lock` failing (or the bucket being non-empty again) keeps the
    /// entry alive and no message is orphaned.
    fn remove_if_empty(&self, conversation_id: i64) {
        self.buckets.remove_if(&conversation_id, |_, bucket| {
            bucket
                .try_lock()
                .map(|guard| guard.entries.is_empty())
                .unwrap_or(false)
        });
    }

    fn sub_depth(&self, n: usize) {
        if n > 0 {
            let _ = self
                .depth
                .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |d| {
                    Some(d.saturating_sub(n))
                });
        }
        metrics::set_queue_depth(self.depth() as f64);
    }
}

impl Default for DispatchQueue {
    fn default() -> Self {
        Self::new()
    }
}
