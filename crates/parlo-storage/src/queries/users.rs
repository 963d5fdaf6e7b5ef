// SPDX-FileCopyrightText: 2026 Parlo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! User CRUD operations.
//!
//! Identity is `(kind, external_id)`: the same Telegram account reached
//! through different bots resolves to one row. Soft-deleted users stay
//! findable so a later unblock can restore them.

use parlo_core::types::{ChannelKind, NewUser, User, UserStage};
use parlo_core::ParloError;
use rusqlite::params;

use crate::database::Database;

const USER_COLUMNS: &str = "id, public_id, kind, external_id, display_name, username, phone, \
                            language, stage, deleted, created_at, updated_at";

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let kind: String = row.get(2)?;
    let stage: String = row.get(8)?;
    Ok(User {
        id: row.get(0)?,
        public_id: row.get(1)?,
        kind: super::parse_enum(2, &kind)?,
        external_id: row.get(3)?,
        display_name: row.get(4)?,
        username: row.get(5)?,
        phone: row.get(6)?,
        language: row.get(7)?,
        stage: super::parse_enum(8, &stage)?,
        deleted: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

fn fetch_user(conn: &rusqlite::Connection, id: i64) -> rusqlite::Result<Option<User>> {
    let mut stmt = conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"))?;
    match stmt.query_row(params![id], row_to_user) {
        Ok(user) => Ok(Some(user)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Look up a user by identity namespace and external id. Soft-deleted
/// users are returned too; callers check the `deleted` flag.
pub async fn find_user(
    db: &Database,
    kind: ChannelKind,
    external_id: &str,
) -> Result<Option<User>, ParloError> {
    let kind = kind.to_string();
    let external_id = external_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {USER_COLUMNS} FROM users WHERE kind = ?1 AND external_id = ?2"
            ))?;
            match stmt.query_row(params![kind, external_id], row_to_user) {
                Ok(user) => Ok(Some(user)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Get a user by row id.
pub async fn get_user(db: &Database, id: i64) -> Result<User, ParloError> {
    db.connection()
        .call(move |conn| fetch_user(conn, id))
        .await
        .map_err(crate::database::map_tr_err)?
        .ok_or(ParloError::NotFound("user"))
}

/// Create a new user, minting its public id.
pub async fn create_user(db: &Database, new: &NewUser) -> Result<User, ParloError> {
    let new = new.clone();
    let public_id = parlo_core::new_public_id();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO users (public_id, kind, external_id, display_name, username, language, stage)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    public_id,
                    new.kind.to_string(),
                    new.external_id,
                    new.display_name,
                    new.username,
                    new.language,
                    new.stage.to_string(),
                ],
            )?;
            let id = conn.last_insert_rowid();
            fetch_user(conn, id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

async fn set_user_column(
    db: &Database,
    sql: &'static str,
    value: String,
    id: i64,
) -> Result<(), ParloError> {
    let changed = db
        .connection()
        .call(move |conn| {
            let n = conn.execute(sql, params![value, id])?;
            Ok(n)
        })
        .await
        .map_err(crate::database::map_tr_err)?;
    if changed == 0 {
        return Err(ParloError::NotFound("user"));
    }
    Ok(())
}

pub async fn set_user_stage(db: &Database, id: i64, stage: UserStage) -> Result<(), ParloError> {
    set_user_column(
        db,
        "UPDATE users SET stage = ?1, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE id = ?2",
        stage.to_string(),
        id,
    )
    .await
}

pub async fn set_user_phone(db: &Database, id: i64, phone: &str) -> Result<(), ParloError> {
    set_user_column(
        db,
        "UPDATE users SET phone = ?1, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE id = ?2",
        phone.to_string(),
        id,
    )
    .await
}

pub async fn set_user_name(db: &Database, id: i64, name: &str) -> Result<(), ParloError> {
    set_user_column(
        db,
        "UPDATE users SET display_name = ?1, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE id = ?2",
        name.to_string(),
        id,
    )
    .await
}

pub async fn set_user_language(db: &Database, id: i64, language: &str) -> Result<(), ParloError> {
    set_user_column(
        db,
        "UPDATE users SET language = ?1, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE id = ?2",
        language.to_string(),
        id,
    )
    .await
}

/// Soft-delete or restore a user (membership changes).
pub async fn set_user_deleted(db: &Database, id: i64, deleted: bool) -> Result<(), ParloError> {
    let changed = db
        .connection()
        .call(move |conn| {
            let n = conn.execute(
                "UPDATE users SET deleted = ?1, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE id = ?2",
                params![deleted, id],
            )?;
            Ok(n)
        })
        .await
        .map_err(crate::database::map_tr_err)?;
    if changed == 0 {
        return Err(ParloError::NotFound("user"));
    }
    Ok(())
}
