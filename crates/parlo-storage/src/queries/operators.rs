// SPDX-FileCopyrightText: 2026 Parlo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Operator provisioning and lookup.
//!
//! Operators are declared in configuration and synced here at startup:
//! `upsert_operator` for every declared entry, then
//! `deactivate_operators_except` to retire the rest. Tokens are unique and
//! double as bearer credentials.

use std::collections::HashSet;

use parlo_core::types::{NewOperator, Operator};
use parlo_core::ParloError;
use rusqlite::params;

use crate::database::Database;

const OPERATOR_COLUMNS: &str = "id, public_id, name, languages, capacity, token, active, created_at";

fn row_to_operator(row: &rusqlite::Row<'_>) -> rusqlite::Result<Operator> {
    let languages_raw: String = row.get(3)?;
    let languages: Vec<String> = serde_json::from_str(&languages_raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Operator {
        id: row.get(0)?,
        public_id: row.get(1)?,
        name: row.get(2)?,
        languages,
        capacity: row.get(4)?,
        active: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn fetch_operator(conn: &rusqlite::Connection, id: i64) -> rusqlite::Result<Option<Operator>> {
    let mut stmt = conn.prepare(&format!("SELECT {OPERATOR_COLUMNS} FROM operators WHERE id = ?1"))?;
    match stmt.query_row(params![id], row_to_operator) {
        Ok(op) => Ok(Some(op)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Create or update an operator by name. Updates sync languages, capacity,
/// and token, and reactivate a previously retired operator.
pub async fn upsert_operator(db: &Database, new: &NewOperator) -> Result<Operator, ParloError> {
    let new = new.clone();
    let public_id = parlo_core::new_public_id();
    let languages = serde_json::to_string(&new.languages)
        .map_err(|e| ParloError::Internal(format!("serializing operator languages: {e}")))?;
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let existing: Option<i64> = {
                let mut stmt = tx.prepare("SELECT id FROM operators WHERE name = ?1")?;
                match stmt.query_row(params![new.name], |row| row.get(0)) {
                    Ok(id) => Some(id),
                    Err(rusqlite::Error::QueryReturnedNoRows) => None,
                    Err(e) => return Err(e),
                }
            };
            let id = match existing {
                Some(id) => {
                    tx.execute(
                        "UPDATE operators SET languages = ?1, capacity = ?2, token = ?3, active = 1
                         WHERE id = ?4",
                        params![languages, new.capacity, new.token, id],
                    )?;
                    id
                }
                None => {
                    tx.execute(
                        "INSERT INTO operators (public_id, name, languages, capacity, token)
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                        params![public_id, new.name, languages, new.capacity, new.token],
                    )?;
                    tx.last_insert_rowid()
                }
            };
            let op = fetch_operator(&tx, id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)?;
            tx.commit()?;
            Ok(op)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn get_operator(db: &Database, id: i64) -> Result<Operator, ParloError> {
    db.connection()
        .call(move |conn| fetch_operator(conn, id))
        .await
        .map_err(crate::database::map_tr_err)?
        .ok_or(ParloError::NotFound("operator"))
}

/// Active operators in stable ascending id order.
pub async fn list_active_operators(db: &Database) -> Result<Vec<Operator>, ParloError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {OPERATOR_COLUMNS} FROM operators WHERE active = 1 ORDER BY id ASC"
            ))?;
            let ops = stmt
                .query_map([], row_to_operator)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ops)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Resolve a bearer token to its active operator.
pub async fn find_operator_by_token(
    db: &Database,
    token: &str,
) -> Result<Option<Operator>, ParloError> {
    let token = token.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {OPERATOR_COLUMNS} FROM operators WHERE token = ?1 AND active = 1"
            ))?;
            match stmt.query_row(params![token], row_to_operator) {
                Ok(op) => Ok(Some(op)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Deactivate every active operator whose name is not in `keep`.
/// Returns the number deactivated.
pub async fn deactivate_operators_except(
    db: &Database,
    keep: &[String],
) -> Result<u64, ParloError> {
    let keep: HashSet<String> = keep.iter().cloned().collect();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let active: Vec<(i64, String)> = {
                let mut stmt = tx.prepare("SELECT id, name FROM operators WHERE active = 1")?;
                stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                    .collect::<Result<Vec<_>, _>>()?
            };
            let mut deactivated = 0u64;
            for (id, name) in active {
                if !keep.contains(&name) {
                    tx.execute("UPDATE operators SET active = 0 WHERE id = ?1", params![id])?;
                    deactivated += 1;
                }
            }
            tx.commit()?;
            Ok(deactivated)
        })
        .await
        .map_err(crate::database::map_tr_err)
}
