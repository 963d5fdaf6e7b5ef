// SPDX-FileCopyrightText: 2026 Parlo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel registry records.
//!
//! Backend tokens live only in the `token` column and never travel inside
//! [`Channel`] values; [`channel_token`] is the single way to read one.

use parlo_core::types::{Channel, NewChannel};
use parlo_core::ParloError;
use rusqlite::params;

use crate::database::Database;

const CHANNEL_COLUMNS: &str = "id, public_id, kind, username, active, deleted, created_at";

fn row_to_channel(row: &rusqlite::Row<'_>) -> rusqlite::Result<Channel> {
    let kind: String = row.get(2)?;
    Ok(Channel {
        id: row.get(0)?,
        public_id: row.get(1)?,
        kind: super::parse_enum(2, &kind)?,
        username: row.get(3)?,
        active: row.get(4)?,
        deleted: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn fetch_channel(conn: &rusqlite::Connection, id: i64) -> rusqlite::Result<Option<Channel>> {
    let mut stmt = conn.prepare(&format!("SELECT {CHANNEL_COLUMNS} FROM channels WHERE id = ?1"))?;
    match stmt.query_row(params![id], row_to_channel) {
        Ok(channel) => Ok(Some(channel)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Register a channel, minting its public id.
pub async fn create_channel(db: &Database, new: &NewChannel) -> Result<Channel, ParloError> {
    let new = new.clone();
    let public_id = parlo_core::new_public_id();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO channels (public_id, kind, token, username) VALUES (?1, ?2, ?3, ?4)",
                params![public_id, new.kind.to_string(), new.token, new.username],
            )?;
            let id = conn.last_insert_rowid();
            fetch_channel(conn, id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn get_channel(db: &Database, id: i64) -> Result<Channel, ParloError> {
    db.connection()
        .call(move |conn| fetch_channel(conn, id))
        .await
        .map_err(crate::database::map_tr_err)?
        .ok_or(ParloError::NotFound("channel"))
}

pub async fn find_channel_by_public_id(
    db: &Database,
    public_id: &str,
) -> Result<Option<Channel>, ParloError> {
    let public_id = public_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CHANNEL_COLUMNS} FROM channels WHERE public_id = ?1"
            ))?;
            match stmt.query_row(params![public_id], row_to_channel) {
                Ok(channel) => Ok(Some(channel)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Read a channel's backend token. `None` when the channel has no token
/// (the web channel). `NotFound` when the row does not exist.
pub async fn channel_token(db: &Database, id: i64) -> Result<Option<String>, ParloError> {
    let raw = db
        .connection()
        .call(move |conn| {
            let mut stmt = conn.prepare("SELECT token FROM channels WHERE id = ?1")?;
            match stmt.query_row(params![id], |row| row.get::<_, String>(0)) {
                Ok(token) => Ok(Some(token)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)?;
    match raw {
        None => Err(ParloError::NotFound("channel")),
        Some(token) if token.is_empty() => Ok(None),
        Some(token) => Ok(Some(token)),
    }
}

/// List channels in stable ascending id order, skipping soft-deleted rows.
pub async fn list_channels(db: &Database, only_active: bool) -> Result<Vec<Channel>, ParloError> {
    db.connection()
        .call(move |conn| {
            let sql = if only_active {
                format!(
                    "SELECT {CHANNEL_COLUMNS} FROM channels WHERE deleted = 0 AND active = 1 ORDER BY id ASC"
                )
            } else {
                format!("SELECT {CHANNEL_COLUMNS} FROM channels WHERE deleted = 0 ORDER BY id ASC")
            };
            let mut stmt = conn.prepare(&sql)?;
            let channels = stmt
                .query_map([], row_to_channel)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(channels)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn set_channel_active(db: &Database, id: i64, active: bool) -> Result<(), ParloError> {
    let changed = db
        .connection()
        .call(move |conn| {
            let n = conn.execute(
                "UPDATE channels SET active = ?1 WHERE id = ?2 AND deleted = 0",
                params![active, id],
            )?;
            Ok(n)
        })
        .await
        .map_err(crate::database::map_tr_err)?;
    if changed == 0 {
        return Err(ParloError::NotFound("channel"));
    }
    Ok(())
}

pub async fn set_channel_username(db: &Database, id: i64, username: &str) -> Result<(), ParloError> {
    let username = username.to_string();
    let changed = db
        .connection()
        .call(move |conn| {
            let n = conn.execute(
                "UPDATE channels SET username = ?1 WHERE id = ?2 AND deleted = 0",
                params![username, id],
            )?;
            Ok(n)
        })
        .await
        .map_err(crate::database::map_tr_err)?;
    if changed == 0 {
        return Err(ParloError::NotFound("channel"));
    }
    Ok(())
}

/// Soft-delete a channel and deactivate it.
pub async fn delete_channel(db: &Database, id: i64) -> Result<(), ParloError> {
    let changed = db
        .connection()
        .call(move |conn| {
            let n = conn.execute(
                "UPDATE channels SET deleted = 1, active = 0 WHERE id = ?1 AND deleted = 0",
                params![id],
            )?;
            Ok(n)
        })
        .await
        .map_err(crate::database::map_tr_err)?;
    if changed == 0 {
        return Err(ParloError::NotFound("channel"));
    }
    Ok(())
}

/// Return the singleton web channel record, creating it on first use.
pub async fn ensure_web_channel(db: &Database) -> Result<Channel, ParloError> {
    let public_id = parlo_core::new_public_id();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let existing = {
                let mut stmt = tx.prepare(&format!(
                    "SELECT {CHANNEL_COLUMNS} FROM channels WHERE kind = 'web' AND deleted = 0 ORDER BY id ASC LIMIT 1"
                ))?;
                match stmt.query_row([], row_to_channel) {
                    Ok(channel) => Some(channel),
                    Err(rusqlite::Error::QueryReturnedNoRows) => None,
                    Err(e) => return Err(e),
                }
            };
            let channel = match existing {
                Some(channel) => channel,
                None => {
                    tx.execute(
                        "INSERT INTO channels (public_id, kind) VALUES (?1, 'web')",
                        params![public_id],
                    )?;
                    let id = tx.last_insert_rowid();
                    fetch_channel(&tx, id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)?
                }
            };
            tx.commit()?;
            Ok(channel)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parlo_core::types::ChannelKind;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap(), true).await.unwrap();
        (db, dir)
    }

    fn make_bot(token: &str) -> NewChannel {
        NewChannel {
            kind: ChannelKind::Telegram,
            token: token.to_string(),
            username: None,
        }
    }

    #[tokio::test]
    async fn create_list_order_is_stable() {
        let (db, _dir) = setup_db().await;
        let a = create_channel(&db, &make_bot("111:aa")).await.unwrap();
        let b = create_channel(&db, &make_bot("222:bb")).await.unwrap();

        let all = list_channels(&db, false).await.unwrap();
        assert_eq!(all.iter().map(|c| c.id).collect::<Vec<_>>(), vec![a.id, b.id]);

        set_channel_active(&db, a.id, false).await.unwrap();
        let active = list_channels(&db, true).await.unwrap();
        assert_eq!(active.iter().map(|c| c.id).collect::<Vec<_>>(), vec![b.id]);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn token_is_not_part_of_the_record() {
        let (db, _dir) = setup_db().await;
        let channel = create_channel(&db, &make_bot("111:secret")).await.unwrap();

        // The record carries no token; the accessor does.
        let token = channel_token(&db, channel.id).await.unwrap();
        assert_eq!(token.as_deref(), Some("111:secret"));

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn ensure_web_channel_is_idempotent() {
        let (db, _dir) = setup_db().await;
        let first = ensure_web_channel(&db).await.unwrap();
        let second = ensure_web_channel(&db).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.kind, ChannelKind::Web);

        // Web channel has no token.
        let token = channel_token(&db, first.id).await.unwrap();
        assert!(token.is_none());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn delete_is_soft_and_deactivates() {
        let (db, _dir) = setup_db().await;
        let channel = create_channel(&db, &make_bot("111:aa")).await.unwrap();

        delete_channel(&db, channel.id).await.unwrap();
        assert!(list_channels(&db, false).await.unwrap().is_empty());

        // Second delete: the row is already gone from the visible set.
        let again = delete_channel(&db, channel.id).await;
        assert!(matches!(again, Err(ParloError::NotFound("channel"))));

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn username_updates_after_connect() {
        let (db, _dir) = setup_db().await;
        let channel = create_channel(&db, &make_bot("111:aa")).await.unwrap();
        set_channel_username(&db, channel.id, "support_bot").await.unwrap();
        let updated = get_channel(&db, channel.id).await.unwrap();
        assert_eq!(updated.username.as_deref(), Some("support_bot"));
        db.close().await.unwrap();
    }
}
