// SPDX-FileCopyrightText: 2026 Parlo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Periodic operator assignment.
//!
//! Every tick scans ACTIVE operators with spare capacity against
//! WAITING conversations, oldest first across channels in stable id
//! order, and binds at most one conversation per operator per tick.
//! Binds race with manual claims; the compare-and-set in the store
//! makes losing the race harmless.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parlo_config::model::AssignmentConfig;
use parlo_core::error::{ConflictKind, ParloError};
use parlo_core::types::Conversation;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::Relay;
use crate::metrics;

pub struct AssignmentLoop {
    relay: Arc<Relay>,
    interval: Duration,
    default_capacity: u32,
}

impl AssignmentLoop {
    pub fn new(relay: Arc<Relay>, config: &AssignmentConfig) -> Self {
        Self {
            relay,
            interval: Duration::from_secs(config.interval_secs.max(1)),
            default_capacity: config.default_capacity,
        }
    }

    /// Runs until the cancellation token fires.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            interval_secs = self.interval.as_secs(),
            "assignment loop running"
        );
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        warn!(error = %e, "assignment pass failed");
                    }
                }
                _ = cancel.cancelled() => {
                    info!("assignment loop stopped");
                    break;
                }
            }
        }
    }

    /// One assignment pass over a snapshot of operators and queues.
    async fn tick(&self) -> Result<(), ParloError> {
        let store = &self.relay.store;

        let channels = store.list_channels(true).await?;
        let mut waiting: Vec<Vec<Conversation>> = Vec::with_capacity(channels.len());
        for channel in &channels {
            waiting.push(store.list_waiting(channel.id, &[]).await?);
        }
        let total_waiting: usize = waiting.iter().map(Vec::len).sum();

        let operators = store.list_active_operators().await?;
        let mut taken: HashSet<i64> = HashSet::new();
        let mut busy_total = 0i64;

        for operator in &operators {
            let busy = store.count_operator_busy(operator.id).await?;
            busy_total += busy;
            let capacity = if operator.capacity == 0 {
                self.default_capacity
            } else {
                operator.capacity
            };
            if busy >= i64::from(capacity) {
                continue;
            }

            'scan: for queue in &waiting {
                for conversation in queue {
                    if taken.contains(&conversation.id) {
                        continue;
                    }
                    if !operator.languages.is_empty()
                        && !operator.languages.iter().any(|l| l == &conversation.language)
                    {
                        continue;
                    }
                    match self.relay.complete_bind(conversation, operator).await {
                        Ok(_) => {
                            taken.insert(conversation.id);
                            // One bind per operator per tick.
                            break 'scan;
                        }
                        Err(ParloError::Conflict(ConflictKind::SessionAlreadyBusy)) => {
                            info!(
                                conversation_id = conversation.id,
                                operator_id = operator.id,
                                "lost bind race, skipping"
                            );
                            metrics::record_bind_conflict();
                            taken.insert(conversation.id);
                        }
                        Err(e) => {
                            warn!(
                                error = %e,
                                conversation_id = conversation.id,
                                operator_id = operator.id,
                                "bind attempt failed"
                            );
                        }
                    }
                }
            }
        }

        // Taken conversations moved from waiting to busy, so the sum is
        // stable either way.
        metrics::set_open_conversations((total_waiting as i64 + busy_total) as f64);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parlo_config::model::{NotifyConfig, RelayConfig, StorageConfig};
    use parlo_core::traits::store::ConversationStore;
    use parlo_core::types::{
        ChannelKind, Conversation, ConversationStatus, NewOperator, NewUser, Operator, UserStage,
    };
    use parlo_storage::SqliteStore;
    use parlo_test_utils::sink::CaptureSink;

    use super::*;
    use crate::Relay;
    use crate::dispatch::DispatchQueue;
    use crate::notify::Notifier;
    use crate::registry::ChannelRegistry;

    async fn harness() -> (AssignmentLoop, Arc<Relay>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::new(StorageConfig {
            database_path: dir.path().join("parlo.db").to_string_lossy().into_owned(),
            wal_mode: false,
        });
        store.initialize().await.unwrap();
        let store: Arc<dyn ConversationStore> = Arc::new(store);

        let (registry, _inbox) = ChannelRegistry::new(16);
        let registry = Arc::new(registry);
        let notifier = Arc::new(Notifier::new(
            Arc::clone(&registry),
            Arc::new(CaptureSink::new()),
            NotifyConfig {
                timeout_ms: 200,
                retry_delay_ms: 5,
            },
        ));
        let relay = Arc::new(Relay::new(
            store,
            registry,
            Arc::new(DispatchQueue::new()),
            notifier,
            RelayConfig::default(),
        ));
        let config = AssignmentConfig {
            interval_secs: 1,
            default_capacity: 1,
        };
        (AssignmentLoop::new(Arc::clone(&relay), &config), relay, dir)
    }

    async fn waiting_conversation(relay: &Relay, external_id: &str, language: &str) -> Conversation {
        let channel = relay.store.ensure_web_channel().await.unwrap();
        let user = relay
            .store
            .create_user(&NewUser {
                kind: ChannelKind::Web,
                external_id: external_id.to_string(),
                display_name: None,
                username: None,
                language: Some(language.to_string()),
                stage: UserStage::WaitingOperator,
            })
            .await
            .unwrap();
        relay
            .store
            .create_conversation(user.id, channel.id, language)
            .await
            .unwrap()
    }

    async fn operator(relay: &Relay, name: &str, languages: &[&str], capacity: u32) -> Operator {
        relay
            .store
            .upsert_operator(&NewOperator {
                name: name.to_string(),
                languages: languages.iter().map(|l| l.to_string()).collect(),
                capacity,
                token: format!("token-{name}"),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn tick_binds_the_oldest_waiting_conversation() {
        let (assign, relay, _dir) = harness().await;
        let first = waiting_conversation(&relay, "client-1", "en").await;
        let second = waiting_conversation(&relay, "client-2", "en").await;
        operator(&relay, "alice", &["en"], 1).await;

        assign.tick().await.unwrap();

        let first = relay.store.get_conversation(first.id).await.unwrap();
        let second = relay.store.get_conversation(second.id).await.unwrap();
        assert_eq!(first.status, ConversationStatus::Busy);
        assert_eq!(second.status, ConversationStatus::Waiting);
    }

    #[tokio::test]
    async fn tick_skips_conversations_in_other_languages() {
        let (assign, relay, _dir) = harness().await;
        let conversation = waiting_conversation(&relay, "client-1", "en").await;
        operator(&relay, "boris", &["ru"], 1).await;

        assign.tick().await.unwrap();

        let conversation = relay.store.get_conversation(conversation.id).await.unwrap();
        assert_eq!(conversation.status, ConversationStatus::Waiting);
    }

    #[tokio::test]
    async fn operator_without_languages_takes_any_conversation() {
        let (assign, relay, _dir) = harness().await;
        let conversation = waiting_conversation(&relay, "client-1", "de").await;
        let op = operator(&relay, "carol", &[], 1).await;

        assign.tick().await.unwrap();

        let conversation = relay.store.get_conversation(conversation.id).await.unwrap();
        assert_eq!(conversation.status, ConversationStatus::Busy);
        assert_eq!(conversation.operator_id, Some(op.id));
    }

    #[tokio::test]
    async fn full_operator_is_skipped_until_capacity_frees_up() {
        let (assign, relay, _dir) = harness().await;
        waiting_conversation(&relay, "client-1", "en").await;
        let second = waiting_conversation(&relay, "client-2", "en").await;
        operator(&relay, "dora", &["en"], 1).await;

        assign.tick().await.unwrap();
        // Second tick: dora is at capacity, nothing else may bind.
        assign.tick().await.unwrap();

        let second = relay.store.get_conversation(second.id).await.unwrap();
        assert_eq!(second.status, ConversationStatus::Waiting);
    }

    #[tokio::test]
    async fn one_bind_per_operator_per_tick() {
        let (assign, relay, _dir) = harness().await;
        waiting_conversation(&relay, "client-1", "en").await;
        let second = waiting_conversation(&relay, "client-2", "en").await;
        operator(&relay, "erin", &["en"], 5).await;

        assign.tick().await.unwrap();

        let second = relay.store.get_conversation(second.id).await.unwrap();
        assert_eq!(second.status, ConversationStatus::Waiting);
    }
}
