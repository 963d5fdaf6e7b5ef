// SPDX-FileCopyrightText: 2026 Parlo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the ConversationStore trait.

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use parlo_config::model::StorageConfig;
use parlo_core::types::{
    BacklogEntry, Channel, ChannelKind, Conversation, ConversationSummary, NewChannel, NewMessage,
    NewOperator, NewUser, Operator, ParticipantRole, StoredMessage, User, UserStage,
};
use parlo_core::{AdapterType, ConversationStore, HealthStatus, ParloError, PluginAdapter};

use crate::database::Database;
use crate::queries;

/// SQLite-backed conversation store.
///
/// Wraps a [`Database`] handle and delegates all query operations to the
/// typed query modules. The database is lazily opened on the first call to
/// [`ConversationStore::initialize`].
pub struct SqliteStore {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStore {
    /// Create a new SqliteStore with the given configuration.
    ///
    /// The database connection is not opened until [`initialize`] is called.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    /// Returns a reference to the underlying Database, or an error if not initialized.
    fn db(&self) -> Result<&Database, ParloError> {
        self.db.get().ok_or_else(|| ParloError::Storage {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }
}

#[async_trait]
impl PluginAdapter for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, ParloError> {
        let db = self.db()?;
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(crate::database::map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ParloError> {
        // Shutdown delegates to close if the DB was initialized.
        if let Some(db) = self.db.get() {
            db.connection()
                .call(|conn| -> Result<(), rusqlite::Error> {
                    conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                    Ok(())
                })
                .await
                .map_err(crate::database::map_tr_err)?;
            debug!("shutdown: WAL checkpoint complete");
        }
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for SqliteStore {
    async fn initialize(&self) -> Result<(), ParloError> {
        let db = Database::open(&self.config.database_path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| ParloError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite store initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), ParloError> {
        self.db()?.close().await?;
        debug!("WAL checkpoint complete");
        Ok(())
    }

    // --- User operations ---

    async fn find_user(
        &self,
        kind: ChannelKind,
        external_id: &str,
    ) -> Result<Option<User>, ParloError> {
        queries::users::find_user(self.db()?, kind, external_id).await
    }

    async fn get_user(&self, id: i64) -> Result<User, ParloError> {
        queries::users::get_user(self.db()?, id).await
    }

    async fn create_user(&self, new: &NewUser) -> Result<User, ParloError> {
        queries::users::create_user(self.db()?, new).await
    }

    async fn set_user_stage(&self, id: i64, stage: UserStage) -> Result<(), ParloError> {
        queries::users::set_user_stage(self.db()?, id, stage).await
    }

    async fn set_user_phone(&self, id: i64, phone: &str) -> Result<(), ParloError> {
        queries::users::set_user_phone(self.db()?, id, phone).await
    }

    async fn set_user_name(&self, id: i64, name: &str) -> Result<(), ParloError> {
        queries::users::set_user_name(self.db()?, id, name).await
    }

    async fn set_user_language(&self, id: i64, language: &str) -> Result<(), ParloError> {
        queries::users::set_user_language(self.db()?, id, language).await
    }

    async fn set_user_deleted(&self, id: i64, deleted: bool) -> Result<(), ParloError> {
        queries::users::set_user_deleted(self.db()?, id, deleted).await
    }

    // --- Channel operations ---

    async fn create_channel(&self, new: &NewChannel) -> Result<Channel, ParloError> {
        queries::channels::create_channel(self.db()?, new).await
    }

    async fn get_channel(&self, id: i64) -> Result<Channel, ParloError> {
        queries::channels::get_channel(self.db()?, id).await
    }

    async fn find_channel_by_public_id(
        &self,
        public_id: &str,
    ) -> Result<Option<Channel>, ParloError> {
        queries::channels::find_channel_by_public_id(self.db()?, public_id).await
    }

    async fn channel_token(&self, id: i64) -> Result<Option<String>, ParloError> {
        queries::channels::channel_token(self.db()?, id).await
    }

    async fn list_channels(&self, only_active: bool) -> Result<Vec<Channel>, ParloError> {
        queries::channels::list_channels(self.db()?, only_active).await
    }

    async fn set_channel_active(&self, id: i64, active: bool) -> Result<(), ParloError> {
        queries::channels::set_channel_active(self.db()?, id, active).await
    }

    async fn set_channel_username(&self, id: i64, username: &str) -> Result<(), ParloError> {
        queries::channels::set_channel_username(self.db()?, id, username).await
    }

    async fn delete_channel(&self, id: i64) -> Result<(), ParloError> {
        queries::channels::delete_channel(self.db()?, id).await
    }

    async fn ensure_web_channel(&self) -> Result<Channel, ParloError> {
        queries::channels::ensure_web_channel(self.db()?).await
    }

    // --- Operator operations ---

    async fn upsert_operator(&self, new: &NewOperator) -> Result<Operator, ParloError> {
        queries::operators::upsert_operator(self.db()?, new).await
    }

    async fn get_operator(&self, id: i64) -> Result<Operator, ParloError> {
        queries::operators::get_operator(self.db()?, id).await
    }

    async fn list_active_operators(&self) -> Result<Vec<Operator>, ParloError> {
        queries::operators::list_active_operators(self.db()?).await
    }

    async fn find_operator_by_token(&self, token: &str) -> Result<Option<Operator>, ParloError> {
        queries::operators::find_operator_by_token(self.db()?, token).await
    }

    async fn deactivate_operators_except(&self, keep: &[String]) -> Result<u64, ParloError> {
        queries::operators::deactivate_operators_except(self.db()?, keep).await
    }

    async fn count_operator_busy(&self, operator_id: i64) -> Result<i64, ParloError> {
        queries::conversations::count_busy_for_operator(self.db()?, operator_id).await
    }

    // --- Conversation operations ---

    async fn find_open_by_user(&self, user_id: i64) -> Result<Option<Conversation>, ParloError> {
        queries::conversations::find_open_by_user(self.db()?, user_id).await
    }

    async fn create_conversation(
        &self,
        user_id: i64,
        channel_id: i64,
        language: &str,
    ) -> Result<Conversation, ParloError> {
        queries::conversations::create_conversation(self.db()?, user_id, channel_id, language)
            .await
    }

    async fn get_conversation(&self, id: i64) -> Result<Conversation, ParloError> {
        queries::conversations::get_conversation(self.db()?, id).await
    }

    async fn find_conversation_by_public_id(
        &self,
        public_id: &str,
    ) -> Result<Option<Conversation>, ParloError> {
        queries::conversations::find_by_public_id(self.db()?, public_id).await
    }

    async fn list_waiting(
        &self,
        channel_id: i64,
        languages: &[String],
    ) -> Result<Vec<Conversation>, ParloError> {
        queries::conversations::list_waiting(self.db()?, channel_id, languages).await
    }

    async fn bind_operator(&self, id: i64, operator_id: i64) -> Result<Conversation, ParloError> {
        queries::conversations::bind_operator(self.db()?, id, operator_id).await
    }

    async fn close_conversation(&self, id: i64) -> Result<Conversation, ParloError> {
        queries::conversations::close_conversation(self.db()?, id).await
    }

    async fn set_rating(&self, id: i64, rating: u8) -> Result<Conversation, ParloError> {
        queries::conversations::set_rating(self.db()?, id, rating).await
    }

    async fn count_unread(&self, id: i64) -> Result<i64, ParloError> {
        queries::messages::count_unread(self.db()?, id).await
    }

    async fn mark_read(
        &self,
        id: i64,
        reader: ParticipantRole,
        until: Option<i64>,
    ) -> Result<u64, ParloError> {
        queries::messages::mark_read(self.db()?, id, reader, until).await
    }

    async fn list_sessions(
        &self,
        operator_id: i64,
    ) -> Result<Vec<ConversationSummary>, ParloError> {
        queries::conversations::list_sessions(self.db()?, operator_id).await
    }

    // --- Message operations ---

    async fn insert_message(&self, new: &NewMessage) -> Result<StoredMessage, ParloError> {
        queries::messages::insert_message(self.db()?, new).await
    }

    async fn list_messages(
        &self,
        conversation_id: i64,
        limit: i64,
    ) -> Result<Vec<StoredMessage>, ParloError> {
        queries::messages::list_messages(self.db()?, conversation_id, limit).await
    }

    async fn unread_backlog(&self) -> Result<Vec<BacklogEntry>, ParloError> {
        queries::messages::unread_backlog(self.db()?).await
    }

    async fn find_message_by_public_id(
        &self,
        public_id: &str,
    ) -> Result<Option<StoredMessage>, ParloError> {
        queries::messages::find_by_public_id(self.db()?, public_id).await
    }

    async fn update_message_by_origin(
        &self,
        conversation_id: i64,
        origin_id: &str,
        new_text: Option<&str>,
        new_caption: Option<&str>,
    ) -> Result<Option<StoredMessage>, ParloError> {
        queries::messages::update_message_by_origin(
            self.db()?,
            conversation_id,
            origin_id,
            new_text,
            new_caption,
        )
        .await
    }

    async fn resolve_close_request(
        &self,
        message_id: i64,
        accept: bool,
    ) -> Result<StoredMessage, ParloError> {
        queries::messages::resolve_close_request(self.db()?, message_id, accept).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parlo_core::types::{MessageContent, SenderKind};
    use tempfile::tempdir;

    fn make_config(path: &str) -> StorageConfig {
        StorageConfig {
            database_path: path.to_string(),
            wal_mode: true,
        }
    }

    #[tokio::test]
    async fn sqlite_store_implements_plugin_adapter() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let store = SqliteStore::new(make_config(db_path.to_str().unwrap()));

        assert_eq!(store.name(), "sqlite");
        assert_eq!(store.version(), semver::Version::new(0, 1, 0));
        assert_eq!(store.adapter_type(), AdapterType::Storage);
    }

    #[tokio::test]
    async fn initialize_opens_database_at_configured_path() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("init_test.db");
        let store = SqliteStore::new(make_config(db_path.to_str().unwrap()));

        store.initialize().await.unwrap();
        assert!(db_path.exists(), "database file should be created");
    }

    #[tokio::test]
    async fn initialize_twice_returns_error() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("double_init.db");
        let store = SqliteStore::new(make_config(db_path.to_str().unwrap()));

        store.initialize().await.unwrap();
        let result = store.initialize().await;
        assert!(result.is_err(), "second initialize should fail");
    }

    #[tokio::test]
    async fn health_check_returns_healthy_when_initialized() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("health.db");
        let store = SqliteStore::new(make_config(db_path.to_str().unwrap()));

        store.initialize().await.unwrap();
        let status = store.health_check().await.unwrap();
        assert_eq!(status, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn health_check_fails_when_not_initialized() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("no_init.db");
        let store = SqliteStore::new(make_config(db_path.to_str().unwrap()));

        let result = store.health_check().await;
        assert!(result.is_err(), "health_check should fail before initialize");
    }

    #[tokio::test]
    async fn full_conversation_lifecycle_through_adapter() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("lifecycle.db");
        let store = SqliteStore::new(make_config(db_path.to_str().unwrap()));
        store.initialize().await.unwrap();

        // Provision the graph: user, channel, operator.
        let user = store
            .create_user(&NewUser {
                kind: ChannelKind::Telegram,
                external_id: "555001".to_string(),
                display_name: Some("Ada".to_string()),
                username: Some("ada".to_string()),
                language: Some("en".to_string()),
                stage: UserStage::Active,
            })
            .await
            .unwrap();
        let channel = store
            .create_channel(&NewChannel {
                kind: ChannelKind::Telegram,
                token: "100200:abc".to_string(),
                username: Some("support_bot".to_string()),
            })
            .await
            .unwrap();
        let operator = store
            .upsert_operator(&NewOperator {
                name: "alice".to_string(),
                languages: vec!["en".to_string()],
                capacity: 2,
                token: "op-alice".to_string(),
            })
            .await
            .unwrap();

        // Open a conversation and exchange messages.
        let conversation = store
            .create_conversation(user.id, channel.id, "en")
            .await
            .unwrap();
        store
            .insert_message(&NewMessage {
                conversation_id: conversation.id,
                sender: SenderKind::Client,
                content: MessageContent::Text {
                    text: "my order is missing".to_string(),
                },
                origin_id: Some("9001".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(store.count_unread(conversation.id).await.unwrap(), 1);

        // Operator takes it.
        let busy = store.bind_operator(conversation.id, operator.id).await.unwrap();
        assert_eq!(busy.operator_id, Some(operator.id));
        assert_eq!(store.count_operator_busy(operator.id).await.unwrap(), 1);

        store
            .insert_message(&NewMessage {
                conversation_id: conversation.id,
                sender: SenderKind::Support,
                content: MessageContent::Text {
                    text: "looking into it".to_string(),
                },
                origin_id: None,
            })
            .await
            .unwrap();
        store
            .mark_read(conversation.id, ParticipantRole::Support, None)
            .await
            .unwrap();
        assert_eq!(store.count_unread(conversation.id).await.unwrap(), 0);

        let transcript = store.list_messages(conversation.id, 0).await.unwrap();
        assert_eq!(transcript.len(), 2);

        // Close and rate.
        store.close_conversation(conversation.id).await.unwrap();
        let rated = store.set_rating(conversation.id, 5).await.unwrap();
        assert_eq!(rated.rating, Some(5));

        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_runs_checkpoint() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("shutdown.db");
        let store = SqliteStore::new(make_config(db_path.to_str().unwrap()));
        store.initialize().await.unwrap();

        store
            .create_user(&NewUser {
                kind: ChannelKind::Web,
                external_id: "web-1".to_string(),
                display_name: None,
                username: None,
                language: None,
                stage: UserStage::New,
            })
            .await
            .unwrap();

        store.shutdown().await.unwrap();
    }
}
