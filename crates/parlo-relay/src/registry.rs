// SPDX-FileCopyrightText: 2026 Parlo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel registry owning the lifecycle of running channel adapters.
//!
//! The registry is the single owner of adapter handles. `register`
//! connects an adapter and spawns a receive task that tags every inbound
//! event with the channel's storage id and forwards it into the shared
//! inbox; `deregister` cancels that task and shuts the adapter down.
//! Everything downstream reads one inbox and never touches adapters
//! directly except through `lookup`.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parlo_core::error::ParloError;
use parlo_core::traits::channel::ChannelAdapter;
use parlo_core::types::{Channel, InboundEvent};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::metrics;

/// Builds a channel adapter for a persisted channel record.
///
/// The binary supplies one factory per channel kind; the registry and the
/// bot-management handlers stay independent of concrete backends.
#[async_trait]
pub trait AdapterFactory: Send + Sync + 'static {
    async fn create(
        &self,
        record: &Channel,
        token: String,
    ) -> Result<Box<dyn ChannelAdapter>, ParloError>;
}

struct RunningChannel {
    record: Channel,
    adapter: Arc<dyn ChannelAdapter>,
    cancel: CancellationToken,
}

/// Registry of running channel adapters, keyed by channel storage id.
pub struct ChannelRegistry {
    channels: DashMap<i64, RunningChannel>,
    inbound_tx: mpsc::Sender<InboundEvent>,
}

impl ChannelRegistry {
    /// Create a registry and the inbox receiving every inbound event.
    pub fn new(inbox_capacity: usize) -> (Self, mpsc::Receiver<InboundEvent>) {
        let (inbound_tx, inbound_rx) = mpsc::channel(inbox_capacity);
        (
            Self {
                channels: DashMap::new(),
                inbound_tx,
            },
            inbound_rx,
        )
    }

    /// Connect an adapter and start pumping its events into the inbox.
    ///
    /// Replaces any previous registration for the same channel id.
    pub async fn register(
        &self,
        record: Channel,
        mut adapter: Box<dyn ChannelAdapter>,
    ) -> Result<(), ParloError> {
        adapter.connect().await?;
        let adapter: Arc<dyn ChannelAdapter> = Arc::from(adapter);
        let cancel = CancellationToken::new();

        let tx = self.inbound_tx.clone();
        let recv_adapter = Arc::clone(&adapter);
        let recv_cancel = cancel.clone();
        let channel_id = record.id;
        let kind = record.kind;
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = recv_cancel.cancelled() => {
                        info!(channel_id, "receive task cancelled");
                        break;
                    }
                    received = recv_adapter.receive() => match received {
                        Ok(mut event) => {
                            // Tag the event with its source channel.
                            event.channel_id = channel_id;
                            if tx.send(event).await.is_err() {
                                // Inbox was dropped.
                                break;
                            }
                        }
                        Err(e) => {
                            warn!(error = %e, channel_id, "channel stream broken, stopping receive task");
                            break;
                        }
                    }
                }
            }
        });

        info!(channel_id, kind = %kind, "channel registered");
        if let Some(previous) = self.channels.insert(
            record.id,
            RunningChannel {
                record,
                adapter,
                cancel,
            },
        ) {
            previous.cancel.cancel();
            if let Err(e) = previous.adapter.shutdown().await {
                warn!(error = %e, channel_id, "previous adapter shutdown error");
            }
        }
        metrics::set_registered_channels(self.channels.len() as f64);
        Ok(())
    }

    /// Stop a channel's receive task and shut its adapter down.
    ///
    /// Returns `false` when the channel was not running.
    pub async fn deregister(&self, channel_id: i64) -> bool {
        let Some((_, running)) = self.channels.remove(&channel_id) else {
            return false;
        };
        running.cancel.cancel();
        if let Err(e) = running.adapter.shutdown().await {
            warn!(error = %e, channel_id, "adapter shutdown error");
        }
        info!(channel_id, kind = %running.record.kind, "channel deregistered");
        metrics::set_registered_channels(self.channels.len() as f64);
        true
    }

    /// The running adapter for a channel, if any.
    pub fn lookup(&self, channel_id: i64) -> Option<Arc<dyn ChannelAdapter>> {
        self.channels.get(&channel_id).map(|c| Arc::clone(&c.adapter))
    }

    /// Whether the channel currently has a running adapter.
    pub fn is_running(&self, channel_id: i64) -> bool {
        self.channels.contains_key(&channel_id)
    }

    /// Number of running channels.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Deregister every channel, for graceful shutdown.
    pub async fn shutdown_all(&self) {
        let ids: Vec<i64> = self.channels.iter().map(|c| *c.key()).collect();
        for id in ids {
            self.deregister(id).await;
        }
    }
}
