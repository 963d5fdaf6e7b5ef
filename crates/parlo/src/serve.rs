// SPDX-FileCopyrightText: 2026 Parlo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `parlo serve` command implementation.
//!
//! Wires the full relay together: SQLite storage, operator provisioning,
//! the channel registry with the built-in web channel and any persisted
//! Telegram bots, dispatch queue warm-up, the HTTP gateway, and the
//! relay and assignment loops under one cancellation token.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use parlo_config::model::ParloConfig;
use parlo_core::error::ParloError;
use parlo_core::traits::channel::ChannelAdapter;
use parlo_core::traits::sink::EventSink;
use parlo_core::traits::store::ConversationStore;
use parlo_core::types::{Channel, ChannelKind, NewChannel, NewOperator};
use parlo_gateway::{GatewayState, MetricsRecorder, PushHub, ServerConfig, WebChannel, start_server};
use parlo_relay::dispatch::DispatchQueue;
use parlo_relay::{
    AdapterFactory, AssignmentLoop, ChannelRegistry, Notifier, Relay, RelayLoop, metrics, shutdown,
    text,
};
use parlo_storage::SqliteStore;
use parlo_telegram::TelegramChannel;
use tracing::{error, info, warn};

/// Builds adapters for persisted channel records.
struct ChannelFactory {
    hub: Arc<PushHub>,
}

#[async_trait]
impl AdapterFactory for ChannelFactory {
    async fn create(
        &self,
        record: &Channel,
        token: String,
    ) -> Result<Box<dyn ChannelAdapter>, ParloError> {
        match record.kind {
            ChannelKind::Telegram => Ok(Box::new(TelegramChannel::new(&token)?)),
            ChannelKind::Web => Ok(Box::new(WebChannel::new(Arc::clone(&self.hub)))),
        }
    }
}

/// Runs the `parlo serve` command until a shutdown signal arrives.
pub async fn run_serve(config: ParloConfig) -> Result<(), ParloError> {
    init_tracing(&config.relay.log_level);
    info!(name = config.relay.name.as_str(), "starting parlo serve");

    // Metrics recorder; the relay records through the facade either way.
    let prometheus_render = match MetricsRecorder::install() {
        Ok(recorder) => {
            metrics::register_metrics();
            Some(recorder.render_fn())
        }
        Err(e) => {
            warn!(error = %e, "metrics recorder unavailable, /metrics disabled");
            None
        }
    };

    let store = SqliteStore::new(config.storage.clone());
    store.initialize().await?;
    let store: Arc<dyn ConversationStore> = Arc::new(store);

    sync_operators(store.as_ref(), &config).await?;

    let (registry, inbox) = ChannelRegistry::new(config.relay.inbox_capacity);
    let registry = Arc::new(registry);
    let hub = Arc::new(PushHub::new());

    let notifier = Arc::new(Notifier::new(
        Arc::clone(&registry),
        Arc::clone(&hub) as Arc<dyn EventSink>,
        config.notify.clone(),
    ));
    let queue = Arc::new(DispatchQueue::new());
    let relay = Arc::new(Relay::new(
        Arc::clone(&store),
        Arc::clone(&registry),
        Arc::clone(&queue),
        notifier,
        config.relay.clone(),
    ));

    // The built-in web channel is always running while the process is.
    let web = store.ensure_web_channel().await?;
    registry
        .register(web, Box::new(WebChannel::new(Arc::clone(&hub))))
        .await?;

    let factory: Arc<dyn AdapterFactory> = Arc::new(ChannelFactory {
        hub: Arc::clone(&hub),
    });

    bootstrap_telegram(store.as_ref(), &config).await?;
    respawn_channels(
        store.as_ref(),
        &registry,
        factory.as_ref(),
        &config.relay.languages,
    )
    .await?;

    let warmed = queue.warm_up(store.as_ref()).await?;
    info!(messages = warmed, "dispatch queue warmed up");

    let cancel = shutdown::install_signal_handler();

    if config.gateway.enabled {
        if config.gateway.admin_token.is_none() {
            warn!("no gateway admin token configured, /bot admin surface is disabled");
        }
        let server_config = ServerConfig {
            bind_address: config.gateway.bind_address.clone(),
            port: config.gateway.port,
            admin_token: config.gateway.admin_token.clone(),
        };
        let state = GatewayState {
            relay: Arc::clone(&relay),
            store: Arc::clone(&store),
            registry: Arc::clone(&registry),
            hub: Arc::clone(&hub),
            factory: Arc::clone(&factory),
            start_time: Instant::now(),
            prometheus_render,
        };
        let gateway_cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = start_server(&server_config, state, gateway_cancel).await {
                error!(error = %e, "gateway failed");
            }
        });
    } else {
        info!("gateway disabled by configuration");
    }

    let assignment = AssignmentLoop::new(Arc::clone(&relay), &config.assignment);
    let assignment_cancel = cancel.clone();
    let assignment_handle = tokio::spawn(async move {
        assignment.run(assignment_cancel).await;
    });

    let mut relay_loop = RelayLoop::new(Arc::clone(&relay), inbox);
    relay_loop.run(cancel.clone()).await;

    // Graceful shutdown: loops first, then adapters, then storage.
    let _ = assignment_handle.await;
    registry.shutdown_all().await;
    store.close().await?;
    info!("parlo serve shutdown complete");
    Ok(())
}

/// Sync provisioned operators from configuration into storage.
///
/// Config is the source of truth: every `[[operators]]` entry is upserted
/// and active operators absent from the config are deactivated.
async fn sync_operators(
    store: &dyn ConversationStore,
    config: &ParloConfig,
) -> Result<(), ParloError> {
    let mut names = Vec::with_capacity(config.operators.len());
    for operator in &config.operators {
        store
            .upsert_operator(&NewOperator {
                name: operator.name.clone(),
                languages: operator.languages.clone(),
                capacity: operator.capacity,
                token: operator.token.clone(),
            })
            .await?;
        names.push(operator.name.clone());
    }
    let deactivated = store.deactivate_operators_except(&names).await?;
    info!(
        provisioned = names.len(),
        deactivated, "operators synced from configuration"
    );
    Ok(())
}

/// Register the configured Telegram bot on first start.
///
/// Idempotent: when any persisted telegram channel already carries the
/// configured token, nothing happens. Further bots are registered through
/// the admin API.
async fn bootstrap_telegram(
    store: &dyn ConversationStore,
    config: &ParloConfig,
) -> Result<(), ParloError> {
    let Some(token) = config.telegram.bot_token.as_deref() else {
        return Ok(());
    };
    for channel in store.list_channels(false).await? {
        if channel.kind == ChannelKind::Telegram
            && store.channel_token(channel.id).await?.as_deref() == Some(token)
        {
            return Ok(());
        }
    }
    let record = store
        .create_channel(&NewChannel {
            kind: ChannelKind::Telegram,
            token: token.to_string(),
            username: None,
        })
        .await?;
    info!(channel = %record.public_id, "telegram channel bootstrapped from configuration");
    Ok(())
}

/// Respawn adapters for every active persisted channel.
///
/// A channel that fails to come up is logged and skipped; the rest of the
/// relay starts without it.
async fn respawn_channels(
    store: &dyn ConversationStore,
    registry: &ChannelRegistry,
    factory: &dyn AdapterFactory,
    languages: &[String],
) -> Result<(), ParloError> {
    let menus = text::command_menu(languages);
    for channel in store.list_channels(true).await? {
        if channel.kind == ChannelKind::Web {
            // Registered explicitly at startup.
            continue;
        }
        let Some(token) = store.channel_token(channel.id).await? else {
            warn!(channel = %channel.public_id, "channel has no stored token, skipping");
            continue;
        };
        let adapter = match factory.create(&channel, token).await {
            Ok(adapter) => adapter,
            Err(e) => {
                warn!(error = %e, channel = %channel.public_id, "adapter build failed, skipping");
                continue;
            }
        };
        let channel_id = channel.id;
        if let Err(e) = registry.register(channel, adapter).await {
            warn!(error = %e, channel_id, "channel respawn failed, skipping");
            continue;
        }
        if let Some(adapter) = registry.lookup(channel_id) {
            if let Some(username) = adapter.username() {
                store.set_channel_username(channel_id, &username).await?;
            }
            if adapter.capabilities().supports_command_menu
                && let Err(e) = adapter.set_command_menu(&menus).await
            {
                warn!(error = %e, channel_id, "command menu install failed");
            }
        }
    }
    Ok(())
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("parlo={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}

#[cfg(test)]
mod tests {
    use parlo_config::model::{OperatorConfig, StorageConfig, TelegramConfig};
    use parlo_test_utils::mock_channel::MockChannel;

    use super::*;

    async fn temp_store() -> (Arc<dyn ConversationStore>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::new(StorageConfig {
            database_path: dir.path().join("parlo.db").to_string_lossy().into_owned(),
            wal_mode: false,
        });
        store.initialize().await.unwrap();
        (Arc::new(store), dir)
    }

    fn config_with_operators(operators: Vec<OperatorConfig>) -> ParloConfig {
        ParloConfig {
            operators,
            ..ParloConfig::default()
        }
    }

    struct MockFactory;

    #[async_trait]
    impl AdapterFactory for MockFactory {
        async fn create(
            &self,
            _record: &Channel,
            _token: String,
        ) -> Result<Box<dyn ChannelAdapter>, ParloError> {
            Ok(Box::new(MockChannel::new()))
        }
    }

    #[tokio::test]
    async fn sync_operators_provisions_and_deactivates() {
        let (store, _dir) = temp_store().await;
        let config = config_with_operators(vec![
            OperatorConfig {
                name: "alice".to_string(),
                languages: vec!["en".to_string()],
                capacity: 2,
                token: "tok-a".to_string(),
            },
            OperatorConfig {
                name: "boris".to_string(),
                languages: vec![],
                capacity: 0,
                token: "tok-b".to_string(),
            },
        ]);
        sync_operators(store.as_ref(), &config).await.unwrap();
        assert_eq!(store.list_active_operators().await.unwrap().len(), 2);

        // Boris disappears from the config and gets deactivated.
        let config = config_with_operators(vec![OperatorConfig {
            name: "alice".to_string(),
            languages: vec!["en".to_string()],
            capacity: 2,
            token: "tok-a".to_string(),
        }]);
        sync_operators(store.as_ref(), &config).await.unwrap();
        let active = store.list_active_operators().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].name, "alice");
    }

    #[tokio::test]
    async fn bootstrap_telegram_is_idempotent() {
        let (store, _dir) = temp_store().await;
        let config = ParloConfig {
            telegram: TelegramConfig {
                bot_token: Some("123:abc".to_string()),
            },
            ..ParloConfig::default()
        };
        bootstrap_telegram(store.as_ref(), &config).await.unwrap();
        bootstrap_telegram(store.as_ref(), &config).await.unwrap();
        let channels = store.list_channels(false).await.unwrap();
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].kind, ChannelKind::Telegram);
    }

    #[tokio::test]
    async fn bootstrap_without_a_token_does_nothing() {
        let (store, _dir) = temp_store().await;
        bootstrap_telegram(store.as_ref(), &ParloConfig::default())
            .await
            .unwrap();
        assert!(store.list_channels(false).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn respawn_brings_persisted_channels_back_up() {
        let (store, _dir) = temp_store().await;
        let record = store
            .create_channel(&NewChannel {
                kind: ChannelKind::Telegram,
                token: "123:abc".to_string(),
                username: None,
            })
            .await
            .unwrap();
        let (registry, _inbox) = ChannelRegistry::new(16);

        respawn_channels(store.as_ref(), &registry, &MockFactory, &["en".to_string()])
            .await
            .unwrap();
        assert!(registry.is_running(record.id));
    }

    #[tokio::test]
    async fn respawn_skips_the_web_channel() {
        let (store, _dir) = temp_store().await;
        let web = store.ensure_web_channel().await.unwrap();
        let (registry, _inbox) = ChannelRegistry::new(16);

        respawn_channels(store.as_ref(), &registry, &MockFactory, &["en".to_string()])
            .await
            .unwrap();
        assert!(!registry.is_running(web.id));
    }
}
