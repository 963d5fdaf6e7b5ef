// SPDX-FileCopyrightText: 2026 Parlo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session routing for the Parlo support relay.
//!
//! The [`RelayLoop`] is the central coordinator that:
//! - Receives normalized inbound events from the channel registry inbox
//! - Serializes them onto per-user lanes
//! - Drives onboarding, conversation resolution, and message storage
//! - Hands stored messages to the dispatch queue and outbound notifier
//!
//! The [`AssignmentLoop`] runs beside it on an independent timer, binding
//! waiting conversations to free operators.

pub mod assign;
pub mod dispatch;
pub mod metrics;
pub mod notify;
pub mod onboarding;
pub mod ops;
pub mod registry;
pub mod router;
pub mod shutdown;
pub mod text;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parlo_config::model::RelayConfig;
use parlo_core::traits::store::ConversationStore;
use parlo_core::types::InboundEvent;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub use assign::AssignmentLoop;
pub use dispatch::DispatchQueue;
pub use notify::Notifier;
pub use registry::{AdapterFactory, ChannelRegistry};

/// Shared routing state: the store, the running channels, the dispatch
/// queue, and the notifier.
///
/// All conversation flows live on this type; `router` drives the
/// channel-side flows and `ops` the operator- and widget-side ones.
pub struct Relay {
    pub(crate) store: Arc<dyn ConversationStore>,
    pub(crate) registry: Arc<ChannelRegistry>,
    pub(crate) queue: Arc<DispatchQueue>,
    pub(crate) notifier: Arc<Notifier>,
    pub(crate) config: RelayConfig,
}

impl Relay {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        registry: Arc<ChannelRegistry>,
        queue: Arc<DispatchQueue>,
        notifier: Arc<Notifier>,
        config: RelayConfig,
    ) -> Self {
        Self {
            store,
            registry,
            queue,
            notifier,
            config,
        }
    }

    /// The languages offered during onboarding.
    pub fn languages(&self) -> &[String] {
        &self.config.languages
    }
}

/// How long a lane may sit without traffic before its worker is reclaimed.
const LANE_IDLE_TTL: Duration = Duration::from_secs(300);
const LANE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

struct Lane {
    tx: mpsc::Sender<InboundEvent>,
    handle: JoinHandle<()>,
    last_used: Instant,
}

/// Consumes the registry inbox and routes every event on a per-user lane.
///
/// Events from the same channel and sender are processed strictly in
/// order; unrelated senders run concurrently.
pub struct RelayLoop {
    relay: Arc<Relay>,
    inbox: mpsc::Receiver<InboundEvent>,
    lanes: HashMap<String, Lane>,
}

impl RelayLoop {
    pub fn new(relay: Arc<Relay>, inbox: mpsc::Receiver<InboundEvent>) -> Self {
        Self {
            relay,
            inbox,
            lanes: HashMap::new(),
        }
    }

    /// Runs until the cancellation token fires, then drains the lanes.
    pub async fn run(&mut self, cancel: CancellationToken) {
        info!("relay loop running");
        let mut sweep = time::interval(LANE_SWEEP_INTERVAL);
        sweep.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                maybe = self.inbox.recv() => {
                    let Some(event) = maybe else {
                        warn!("inbound inbox closed, stopping relay loop");
                        break;
                    };
                    self.dispatch(event).await;
                }
                _ = sweep.tick() => {
                    self.evict_idle_lanes(LANE_IDLE_TTL);
                }
                _ = cancel.cancelled() => {
                    info!("shutdown signal received, stopping relay loop");
                    break;
                }
            }
        }
        self.drain_lanes().await;
        info!("relay loop stopped");
    }

    async fn dispatch(&mut self, event: InboundEvent) {
        let key = format!("{}:{}", event.channel_id, event.sender.external_id);
        if let Some(lane) = self.lanes.get(&key)
            && lane.handle.is_finished()
        {
            self.lanes.remove(&key);
        }
        let lane = self
            .lanes
            .entry(key.clone())
            .or_insert_with(|| spawn_lane(Arc::clone(&self.relay)));
        lane.last_used = Instant::now();
        if lane.tx.send(event).await.is_err() {
            warn!(lane = %key, "lane worker gone, dropping event");
        }
    }

    /// Reclaim lanes that have been idle past the TTL.
    ///
    /// Dropping the sender lets the worker exit once its queue is empty;
    /// queued events still route. A later event from the same sender just
    /// spawns a fresh lane.
    fn evict_idle_lanes(&mut self, ttl: Duration) {
        let before = self.lanes.len();
        self.lanes
            .retain(|_, lane| !lane.handle.is_finished() && lane.last_used.elapsed() < ttl);
        let evicted = before - self.lanes.len();
        if evicted > 0 {
            debug!(evicted, remaining = self.lanes.len(), "idle relay lanes evicted");
        }
    }

    /// Closes every lane and waits for queued events to finish routing.
    async fn drain_lanes(&mut self) {
        let lanes = std::mem::take(&mut self.lanes);
        let count = lanes.len();
        for (key, lane) in lanes {
            drop(lane.tx);
            if time::timeout(Duration::from_secs(10), lane.handle)
                .await
                .is_err()
            {
                warn!(lane = %key, "lane did not drain in time");
            }
        }
        info!(lanes = count, "relay lanes drained");
    }
}

fn spawn_lane(relay: Arc<Relay>) -> Lane {
    let (tx, mut rx) = mpsc::channel(32);
    let handle = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let Err(e) = relay.route_inbound(event).await {
                error!(error = %e, "inbound routing failed");
            }
        }
    });
    Lane {
        tx,
        handle,
        last_used: Instant::now(),
    }
}

#[cfg(test)]
mod tests {
    use parlo_config::model::{NotifyConfig, StorageConfig};
    use parlo_core::traits::sink::EventSink;
    use parlo_storage::SqliteStore;
    use parlo_test_utils::events::text_event;
    use parlo_test_utils::sink::CaptureSink;

    use super::*;

    async fn relay_loop() -> (RelayLoop, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::new(StorageConfig {
            database_path: dir.path().join("parlo.db").to_string_lossy().into_owned(),
            wal_mode: false,
        });
        store.initialize().await.unwrap();
        let store: Arc<dyn ConversationStore> = Arc::new(store);
        let (registry, inbox) = ChannelRegistry::new(16);
        let registry = Arc::new(registry);
        let notifier = Arc::new(Notifier::new(
            Arc::clone(&registry),
            Arc::new(CaptureSink::new()) as Arc<dyn EventSink>,
            NotifyConfig::default(),
        ));
        let relay = Arc::new(Relay::new(
            store,
            registry,
            Arc::new(DispatchQueue::new()),
            notifier,
            RelayConfig::default(),
        ));
        (RelayLoop::new(relay, inbox), dir)
    }

    #[tokio::test]
    async fn idle_lanes_are_reclaimed() {
        let (mut relay_loop, _dir) = relay_loop().await;
        relay_loop.dispatch(text_event(1, "42", "hello")).await;
        assert_eq!(relay_loop.lanes.len(), 1);

        // Fresh lanes survive a sweep.
        relay_loop.evict_idle_lanes(LANE_IDLE_TTL);
        assert_eq!(relay_loop.lanes.len(), 1);

        // Aged past the TTL, the lane is dropped.
        relay_loop.evict_idle_lanes(Duration::ZERO);
        assert!(relay_loop.lanes.is_empty());

        // The sender is usable again afterwards.
        relay_loop.dispatch(text_event(1, "42", "again")).await;
        assert_eq!(relay_loop.lanes.len(), 1);
    }
}
