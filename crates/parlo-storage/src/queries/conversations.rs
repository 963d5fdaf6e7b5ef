// SPDX-FileCopyrightText: 2026 Parlo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation lifecycle operations.
//!
//! Every status transition re-checks the current status inside its own
//! transaction and surfaces a conflict when the precondition no longer
//! holds, so concurrent callers racing on the same row get exactly one
//! winner.

use parlo_core::error::ConflictKind;
use parlo_core::types::{Conversation, ConversationStatus, ConversationSummary};
use parlo_core::ParloError;
use rusqlite::params;
use tracing::error;

use crate::database::Database;

const CONVERSATION_COLUMNS: &str = "id, public_id, user_id, channel_id, operator_id, status, \
                                    language, rating, deleted, created_at, closed_at";

fn row_to_conversation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Conversation> {
    let status: String = row.get(5)?;
    Ok(Conversation {
        id: row.get(0)?,
        public_id: row.get(1)?,
        user_id: row.get(2)?,
        channel_id: row.get(3)?,
        operator_id: row.get(4)?,
        status: super::parse_enum(5, &status)?,
        language: row.get(6)?,
        rating: row.get(7)?,
        deleted: row.get(8)?,
        created_at: row.get(9)?,
        closed_at: row.get(10)?,
    })
}

fn fetch_conversation(
    conn: &rusqlite::Connection,
    id: i64,
) -> rusqlite::Result<Option<Conversation>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?1 AND deleted = 0"
    ))?;
    match stmt.query_row(params![id], row_to_conversation) {
        Ok(c) => Ok(Some(c)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Find the user's open (non-CLOSED) conversation.
///
/// Storage holding more than one open row for a user is an invariant
/// violation; it is logged and the oldest row wins.
pub async fn find_open_by_user(
    db: &Database,
    user_id: i64,
) -> Result<Option<Conversation>, ParloError> {
    let rows = db
        .connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CONVERSATION_COLUMNS} FROM conversations
                 WHERE user_id = ?1 AND status != 'closed' AND deleted = 0
                 ORDER BY id ASC"
            ))?;
            let rows = stmt
                .query_map(params![user_id], row_to_conversation)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(crate::database::map_tr_err)?;

    if rows.len() > 1 {
        error!(
            user_id,
            open = rows.len(),
            "multiple open conversations for one user; keeping the oldest"
        );
    }
    Ok(rows.into_iter().next())
}

/// Create a WAITING conversation. The open-conversation check runs inside
/// the same transaction as the insert, so two racing creates cannot both
/// succeed.
pub async fn create_conversation(
    db: &Database,
    user_id: i64,
    channel_id: i64,
    language: &str,
) -> Result<Conversation, ParloError> {
    let language = language.to_string();
    let public_id = parlo_core::new_public_id();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let open: i64 = tx.query_row(
                "SELECT COUNT(*) FROM conversations
                 WHERE user_id = ?1 AND status != 'closed' AND deleted = 0",
                params![user_id],
                |row| row.get(0),
            )?;
            let result = if open > 0 {
                Err(ParloError::Conflict(ConflictKind::ChatIsOpen))
            } else {
                tx.execute(
                    "INSERT INTO conversations (public_id, user_id, channel_id, language)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![public_id, user_id, channel_id, language],
                )?;
                let id = tx.last_insert_rowid();
                match fetch_conversation(&tx, id)? {
                    Some(c) => Ok(c),
                    None => Err(ParloError::Internal(
                        "conversation row missing after insert".into(),
                    )),
                }
            };
            tx.commit()?;
            Ok(result)
        })
        .await
        .map_err(crate::database::map_tr_err)?
}

pub async fn get_conversation(db: &Database, id: i64) -> Result<Conversation, ParloError> {
    db.connection()
        .call(move |conn| fetch_conversation(conn, id))
        .await
        .map_err(crate::database::map_tr_err)?
        .ok_or(ParloError::NotFound("conversation"))
}

pub async fn find_by_public_id(
    db: &Database,
    public_id: &str,
) -> Result<Option<Conversation>, ParloError> {
    let public_id = public_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CONVERSATION_COLUMNS} FROM conversations
                 WHERE public_id = ?1 AND deleted = 0"
            ))?;
            match stmt.query_row(params![public_id], row_to_conversation) {
                Ok(c) => Ok(Some(c)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// WAITING conversations on a channel, oldest first. An empty `languages`
/// slice matches all languages.
pub async fn list_waiting(
    db: &Database,
    channel_id: i64,
    languages: &[String],
) -> Result<Vec<Conversation>, ParloError> {
    let rows = db
        .connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CONVERSATION_COLUMNS} FROM conversations
                 WHERE channel_id = ?1 AND status = 'waiting' AND deleted = 0
                 ORDER BY created_at ASC, id ASC"
            ))?;
            let rows = stmt
                .query_map(params![channel_id], row_to_conversation)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(crate::database::map_tr_err)?;

    if languages.is_empty() {
        return Ok(rows);
    }
    Ok(rows
        .into_iter()
        .filter(|c| languages.contains(&c.language))
        .collect())
}

/// Atomically bind an operator: WAITING -> BUSY.
pub async fn bind_operator(
    db: &Database,
    id: i64,
    operator_id: i64,
) -> Result<Conversation, ParloError> {
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let result = match fetch_conversation(&tx, id)? {
                None => Err(ParloError::NotFound("conversation")),
                Some(c) if c.status == ConversationStatus::Closed => {
                    Err(ParloError::Conflict(ConflictKind::SessionClosed))
                }
                Some(c) if c.status == ConversationStatus::Busy => {
                    Err(ParloError::Conflict(ConflictKind::SessionAlreadyBusy))
                }
                Some(_) => {
                    tx.execute(
                        "UPDATE conversations SET status = 'busy', operator_id = ?1 WHERE id = ?2",
                        params![operator_id, id],
                    )?;
                    match fetch_conversation(&tx, id)? {
                        Some(c) => Ok(c),
                        None => Err(ParloError::Internal(
                            "conversation row missing after bind".into(),
                        )),
                    }
                }
            };
            tx.commit()?;
            Ok(result)
        })
        .await
        .map_err(crate::database::map_tr_err)?
}

/// Atomically close: WAITING|BUSY -> CLOSED.
pub async fn close_conversation(db: &Database, id: i64) -> Result<Conversation, ParloError> {
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let result = match fetch_conversation(&tx, id)? {
                None => Err(ParloError::NotFound("conversation")),
                Some(c) if c.status == ConversationStatus::Closed => {
                    Err(ParloError::Conflict(ConflictKind::SessionClosed))
                }
                Some(_) => {
                    tx.execute(
                        "UPDATE conversations SET status = 'closed',
                         closed_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                         WHERE id = ?1",
                        params![id],
                    )?;
                    match fetch_conversation(&tx, id)? {
                        Some(c) => Ok(c),
                        None => Err(ParloError::Internal(
                            "conversation row missing after close".into(),
                        )),
                    }
                }
            };
            tx.commit()?;
            Ok(result)
        })
        .await
        .map_err(crate::database::map_tr_err)?
}

/// Record a rating on a CLOSED conversation. Write-once.
pub async fn set_rating(db: &Database, id: i64, rating: u8) -> Result<Conversation, ParloError> {
    if rating > 5 {
        return Err(ParloError::InvalidInput(format!(
            "rating must be between 0 and 5, got {rating}"
        )));
    }
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let result = match fetch_conversation(&tx, id)? {
                None => Err(ParloError::NotFound("conversation")),
                Some(c) if c.status != ConversationStatus::Closed => {
                    Err(ParloError::Conflict(ConflictKind::SessionNotClosed))
                }
                Some(c) if c.rating.is_some() => {
                    Err(ParloError::Conflict(ConflictKind::RatingAlreadySet))
                }
                Some(_) => {
                    tx.execute(
                        "UPDATE conversations SET rating = ?1 WHERE id = ?2",
                        params![rating, id],
                    )?;
                    match fetch_conversation(&tx, id)? {
                        Some(c) => Ok(c),
                        None => Err(ParloError::Internal(
                            "conversation row missing after rating".into(),
                        )),
                    }
                }
            };
            tx.commit()?;
            Ok(result)
        })
        .await
        .map_err(crate::database::map_tr_err)?
}

/// Conversations currently BUSY under an operator.
pub async fn count_busy_for_operator(db: &Database, operator_id: i64) -> Result<i64, ParloError> {
    db.connection()
        .call(move |conn| {
            let n = conn.query_row(
                "SELECT COUNT(*) FROM conversations
                 WHERE operator_id = ?1 AND status = 'busy' AND deleted = 0",
                params![operator_id],
                |row| row.get(0),
            )?;
            Ok(n)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// The operator dashboard feed: every WAITING conversation plus the
/// caller's own BUSY ones, with unread client-message counts.
pub async fn list_sessions(
    db: &Database,
    operator_id: i64,
) -> Result<Vec<ConversationSummary>, ParloError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT c.public_id, c.status, c.language, ch.kind, ch.username,
                        u.display_name, o.name,
                        (SELECT COUNT(*) FROM messages m
                          WHERE m.conversation_id = c.id AND m.is_read = 0 AND m.sender = 'client') AS unread,
                        (SELECT MAX(m.created_at) FROM messages m
                          WHERE m.conversation_id = c.id) AS last_message_at
                 FROM conversations c
                 JOIN users u ON u.id = c.user_id
                 JOIN channels ch ON ch.id = c.channel_id
                 LEFT JOIN operators o ON o.id = c.operator_id
                 WHERE c.deleted = 0
                   AND (c.status = 'waiting' OR (c.status = 'busy' AND c.operator_id = ?1))
                 ORDER BY c.created_at ASC, c.id ASC",
            )?;
            let rows = stmt
                .query_map(params![operator_id], |row| {
                    let status: String = row.get(1)?;
                    let channel_kind: String = row.get(3)?;
                    let channel_username: Option<String> = row.get(4)?;
                    Ok(ConversationSummary {
                        id: row.get(0)?,
                        status: super::parse_enum(1, &status)?,
                        language: row.get(2)?,
                        channel: channel_username
                            .map(|u| format!("@{u}"))
                            .unwrap_or(channel_kind),
                        client: row.get(5)?,
                        operator: row.get(6)?,
                        unread: row.get(7)?,
                        last_message_at: row.get(8)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::{channels, operators, users};
    use parlo_core::types::{ChannelKind, NewChannel, NewOperator, NewUser, UserStage};
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap(), true).await.unwrap();
        (db, dir)
    }

    async fn seed_user(db: &Database, external_id: &str) -> i64 {
        users::create_user(
            db,
            &NewUser {
                kind: ChannelKind::Telegram,
                external_id: external_id.to_string(),
                display_name: None,
                username: None,
                language: None,
                stage: UserStage::Active,
            },
        )
        .await
        .unwrap()
        .id
    }

    async fn seed_channel(db: &Database) -> i64 {
        channels::create_channel(
            db,
            &NewChannel {
                kind: ChannelKind::Telegram,
                token: "111:aa".to_string(),
                username: Some("support_bot".to_string()),
            },
        )
        .await
        .unwrap()
        .id
    }

    async fn seed_operator(db: &Database, name: &str) -> i64 {
        operators::upsert_operator(
            db,
            &NewOperator {
                name: name.to_string(),
                languages: vec![],
                capacity: 1,
                token: format!("tok-{name}"),
            },
        )
        .await
        .unwrap()
        .id
    }

    #[tokio::test]
    async fn second_create_for_same_user_conflicts() {
        let (db, _dir) = setup_db().await;
        let user = seed_user(&db, "1").await;
        let channel = seed_channel(&db).await;

        let first = create_conversation(&db, user, channel, "en").await.unwrap();
        assert_eq!(first.status, ConversationStatus::Waiting);

        let second = create_conversation(&db, user, channel, "en").await;
        assert!(matches!(
            second,
            Err(ParloError::Conflict(ConflictKind::ChatIsOpen))
        ));

        // After closing, a new one can be created.
        close_conversation(&db, first.id).await.unwrap();
        create_conversation(&db, user, channel, "en").await.unwrap();

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn bind_has_exactly_one_winner_under_race() {
        let (db, _dir) = setup_db().await;
        let user = seed_user(&db, "1").await;
        let channel = seed_channel(&db).await;
        let conversation = create_conversation(&db, user, channel, "en").await.unwrap();

        let mut operator_ids = Vec::new();
        for i in 0..10 {
            operator_ids.push(seed_operator(&db, &format!("op{i}")).await);
        }

        let db = std::sync::Arc::new(db);
        let mut handles = Vec::new();
        for op in operator_ids {
            let db = db.clone();
            let conversation_id = conversation.id;
            handles.push(tokio::spawn(async move {
                bind_operator(&db, conversation_id, op).await
            }));
        }

        let mut won = 0;
        let mut lost = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(c) => {
                    assert_eq!(c.status, ConversationStatus::Busy);
                    won += 1;
                }
                Err(ParloError::Conflict(ConflictKind::SessionAlreadyBusy)) => lost += 1,
                Err(e) => panic!("unexpected bind error: {e}"),
            }
        }
        assert_eq!(won, 1, "exactly one binder may win");
        assert_eq!(lost, 9);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn closed_is_terminal() {
        let (db, _dir) = setup_db().await;
        let user = seed_user(&db, "1").await;
        let channel = seed_channel(&db).await;
        let operator = seed_operator(&db, "alice").await;
        let conversation = create_conversation(&db, user, channel, "en").await.unwrap();

        let closed = close_conversation(&db, conversation.id).await.unwrap();
        assert_eq!(closed.status, ConversationStatus::Closed);
        assert!(closed.closed_at.is_some());

        assert!(matches!(
            close_conversation(&db, conversation.id).await,
            Err(ParloError::Conflict(ConflictKind::SessionClosed))
        ));
        assert!(matches!(
            bind_operator(&db, conversation.id, operator).await,
            Err(ParloError::Conflict(ConflictKind::SessionClosed))
        ));

        let current = get_conversation(&db, conversation.id).await.unwrap();
        assert_eq!(current.status, ConversationStatus::Closed);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn rating_requires_closed_and_is_write_once() {
        let (db, _dir) = setup_db().await;
        let user = seed_user(&db, "1").await;
        let channel = seed_channel(&db).await;
        let conversation = create_conversation(&db, user, channel, "en").await.unwrap();

        assert!(matches!(
            set_rating(&db, conversation.id, 4).await,
            Err(ParloError::Conflict(ConflictKind::SessionNotClosed))
        ));

        close_conversation(&db, conversation.id).await.unwrap();
        let rated = set_rating(&db, conversation.id, 4).await.unwrap();
        assert_eq!(rated.rating, Some(4));

        assert!(matches!(
            set_rating(&db, conversation.id, 5).await,
            Err(ParloError::Conflict(ConflictKind::RatingAlreadySet))
        ));
        let current = get_conversation(&db, conversation.id).await.unwrap();
        assert_eq!(current.rating, Some(4));

        assert!(matches!(
            set_rating(&db, conversation.id, 6).await,
            Err(ParloError::InvalidInput(_))
        ));

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn list_waiting_filters_language_and_keeps_order() {
        let (db, _dir) = setup_db().await;
        let channel = seed_channel(&db).await;
        let u1 = seed_user(&db, "1").await;
        let u2 = seed_user(&db, "2").await;
        let u3 = seed_user(&db, "3").await;

        let c1 = create_conversation(&db, u1, channel, "en").await.unwrap();
        let c2 = create_conversation(&db, u2, channel, "ru").await.unwrap();
        let c3 = create_conversation(&db, u3, channel, "en").await.unwrap();

        let en_only = list_waiting(&db, channel, &["en".to_string()]).await.unwrap();
        assert_eq!(
            en_only.iter().map(|c| c.id).collect::<Vec<_>>(),
            vec![c1.id, c3.id]
        );

        let all = list_waiting(&db, channel, &[]).await.unwrap();
        assert_eq!(
            all.iter().map(|c| c.id).collect::<Vec<_>>(),
            vec![c1.id, c2.id, c3.id]
        );

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn find_open_keeps_oldest_when_storage_is_inconsistent() {
        let (db, _dir) = setup_db().await;
        let user = seed_user(&db, "1").await;
        let channel = seed_channel(&db).await;

        // Bypass create_conversation to force the violated state.
        for pub_id in ["dup-a", "dup-b"] {
            let pub_id = pub_id.to_string();
            db.connection()
                .call(move |conn| -> Result<(), rusqlite::Error> {
                    conn.execute(
                        "INSERT INTO conversations (public_id, user_id, channel_id, language)
                         VALUES (?1, ?2, ?3, 'en')",
                        params![pub_id, user, channel],
                    )?;
                    Ok(())
                })
                .await
                .unwrap();
        }

        let open = find_open_by_user(&db, user).await.unwrap().unwrap();
        assert_eq!(open.public_id, "dup-a", "oldest open conversation wins");

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn dashboard_feed_scopes_busy_to_caller() {
        let (db, _dir) = setup_db().await;
        let channel = seed_channel(&db).await;
        let alice = seed_operator(&db, "alice").await;
        let bob = seed_operator(&db, "bob").await;
        let u1 = seed_user(&db, "1").await;
        let u2 = seed_user(&db, "2").await;
        let u3 = seed_user(&db, "3").await;

        let waiting = create_conversation(&db, u1, channel, "en").await.unwrap();
        let mine = create_conversation(&db, u2, channel, "en").await.unwrap();
        let theirs = create_conversation(&db, u3, channel, "en").await.unwrap();
        bind_operator(&db, mine.id, alice).await.unwrap();
        bind_operator(&db, theirs.id, bob).await.unwrap();

        let feed = list_sessions(&db, alice).await.unwrap();
        let ids: Vec<&str> = feed.iter().map(|s| s.id.as_str()).collect();
        assert!(ids.contains(&waiting.public_id.as_str()));
        assert!(ids.contains(&mine.public_id.as_str()));
        assert!(!ids.contains(&theirs.public_id.as_str()));
        assert!(feed.iter().all(|s| s.channel == "@support_bot"));

        assert_eq!(count_busy_for_operator(&db, alice).await.unwrap(), 1);

        db.close().await.unwrap();
    }
}
