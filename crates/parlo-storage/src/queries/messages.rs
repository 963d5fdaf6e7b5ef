// SPDX-FileCopyrightText: 2026 Parlo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message persistence and read tracking.
//!
//! Content is stored decomposed: a `kind` discriminant, a `body` column for
//! the human-readable part (text or caption), and a `payload` column for
//! structured extras as JSON. That keeps the body greppable with plain SQL
//! while round-tripping every content shape losslessly.

use parlo_core::error::ConflictKind;
use parlo_core::types::{
    BacklogEntry, MediaKind, MessageContent, NewMessage, ParticipantRole, SenderKind,
    StoredMessage,
};
use parlo_core::ParloError;
use rusqlite::params;
use serde_json::json;

use crate::database::Database;

const MESSAGE_COLUMNS: &str =
    "id, public_id, conversation_id, sender, kind, body, payload, is_read, origin_id, created_at";

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Split content into (kind, body, payload) columns.
fn encode_content(content: &MessageContent) -> (&'static str, Option<String>, Option<String>) {
    match content {
        MessageContent::Text { text } => (content.kind_str(), Some(text.clone()), None),
        MessageContent::Media {
            reference, caption, ..
        } => (
            content.kind_str(),
            caption.clone(),
            Some(json!({ "reference": reference }).to_string()),
        ),
        MessageContent::Location {
            latitude,
            longitude,
        } => (
            content.kind_str(),
            None,
            Some(json!({ "latitude": latitude, "longitude": longitude }).to_string()),
        ),
        MessageContent::Contact { phone, name } => (
            content.kind_str(),
            None,
            Some(json!({ "phone": phone, "name": name }).to_string()),
        ),
        MessageContent::Dice { emoji, value } => (
            content.kind_str(),
            None,
            Some(json!({ "emoji": emoji, "value": value }).to_string()),
        ),
    }
}

fn decode_content(
    kind: &str,
    body: Option<String>,
    payload: Option<String>,
) -> Result<MessageContent, BoxError> {
    let parsed: Option<serde_json::Value> = match payload {
        Some(raw) => Some(serde_json::from_str(&raw)?),
        None => None,
    };
    match kind {
        "text" => Ok(MessageContent::Text {
            text: body.unwrap_or_default(),
        }),
        "photo" | "document" | "voice" | "video" => {
            let media: MediaKind = kind.parse()?;
            let payload = parsed.ok_or("media payload missing")?;
            let reference = payload
                .get("reference")
                .and_then(|v| v.as_str())
                .ok_or("media payload missing reference")?
                .to_string();
            Ok(MessageContent::Media {
                media,
                reference,
                caption: body,
            })
        }
        "location" => {
            let payload = parsed.ok_or("location payload missing")?;
            Ok(MessageContent::Location {
                latitude: payload
                    .get("latitude")
                    .and_then(|v| v.as_f64())
                    .ok_or("location payload missing latitude")?,
                longitude: payload
                    .get("longitude")
                    .and_then(|v| v.as_f64())
                    .ok_or("location payload missing longitude")?,
            })
        }
        "contact" => {
            let payload = parsed.ok_or("contact payload missing")?;
            Ok(MessageContent::Contact {
                phone: payload
                    .get("phone")
                    .and_then(|v| v.as_str())
                    .ok_or("contact payload missing phone")?
                    .to_string(),
                name: payload
                    .get("name")
                    .and_then(|v| v.as_str())
                    .map(str::to_string),
            })
        }
        "dice" => {
            let payload = parsed.ok_or("dice payload missing")?;
            Ok(MessageContent::Dice {
                emoji: payload
                    .get("emoji")
                    .and_then(|v| v.as_str())
                    .ok_or("dice payload missing emoji")?
                    .to_string(),
                value: payload
                    .get("value")
                    .and_then(|v| v.as_i64())
                    .ok_or("dice payload missing value")? as i32,
            })
        }
        other => Err(format!("unknown message kind {other:?}").into()),
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredMessage> {
    let sender: String = row.get(3)?;
    let kind: String = row.get(4)?;
    let body: Option<String> = row.get(5)?;
    let payload: Option<String> = row.get(6)?;
    let content = decode_content(&kind, body, payload).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, e)
    })?;
    Ok(StoredMessage {
        id: row.get(0)?,
        public_id: row.get(1)?,
        conversation_id: row.get(2)?,
        sender: super::parse_enum(3, &sender)?,
        content,
        is_read: row.get(7)?,
        origin_id: row.get(8)?,
        created_at: row.get(9)?,
    })
}

fn fetch_message(
    conn: &rusqlite::Connection,
    id: i64,
) -> rusqlite::Result<Option<StoredMessage>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1 AND deleted = 0"
    ))?;
    match stmt.query_row(params![id], row_to_message) {
        Ok(m) => Ok(Some(m)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

pub async fn insert_message(db: &Database, new: &NewMessage) -> Result<StoredMessage, ParloError> {
    let public_id = parlo_core::new_public_id();
    let conversation_id = new.conversation_id;
    let sender = new.sender;
    let origin_id = new.origin_id.clone();
    let (kind, body, payload) = encode_content(&new.content);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO messages (public_id, conversation_id, sender, kind, body, payload, origin_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    public_id,
                    conversation_id,
                    sender.to_string(),
                    kind,
                    body,
                    payload,
                    origin_id
                ],
            )?;
            fetch_message(conn, conn.last_insert_rowid())?
                .ok_or(rusqlite::Error::QueryReturnedNoRows)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Messages in insertion order, newest last. `limit <= 0` means no cap.
pub async fn list_messages(
    db: &Database,
    conversation_id: i64,
    limit: i64,
) -> Result<Vec<StoredMessage>, ParloError> {
    let limit = if limit <= 0 { -1 } else { limit };
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE conversation_id = ?1 AND deleted = 0
                 ORDER BY id ASC LIMIT ?2"
            ))?;
            let rows = stmt
                .query_map(params![conversation_id, limit], row_to_message)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Unread client messages in the conversation.
pub async fn count_unread(db: &Database, conversation_id: i64) -> Result<i64, ParloError> {
    db.connection()
        .call(move |conn| {
            let n = conn.query_row(
                "SELECT COUNT(*) FROM messages
                 WHERE conversation_id = ?1 AND is_read = 0 AND sender = 'client' AND deleted = 0",
                params![conversation_id],
                |row| row.get(0),
            )?;
            Ok(n)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Flip the counterparty's messages to read, up to and including row id
/// `until` (all of them when `None`). Returns the number flipped.
pub async fn mark_read(
    db: &Database,
    conversation_id: i64,
    reader: ParticipantRole,
    until: Option<i64>,
) -> Result<u64, ParloError> {
    // A support reader consumes client messages and vice versa.
    let sender = match reader {
        ParticipantRole::Support => "client",
        ParticipantRole::Client => "support",
    };
    db.connection()
        .call(move |conn| {
            let flipped = match until {
                Some(until) => conn.execute(
                    "UPDATE messages SET is_read = 1
                     WHERE conversation_id = ?1 AND sender = ?2 AND is_read = 0 AND id <= ?3",
                    params![conversation_id, sender, until],
                )?,
                None => conn.execute(
                    "UPDATE messages SET is_read = 1
                     WHERE conversation_id = ?1 AND sender = ?2 AND is_read = 0",
                    params![conversation_id, sender],
                )?,
            };
            Ok(flipped as u64)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Every unread client message in an open conversation, in insertion order,
/// joined with the routing context needed to re-queue it on startup.
pub async fn unread_backlog(db: &Database) -> Result<Vec<BacklogEntry>, ParloError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {}, c.channel_id, c.language
                 FROM messages m
                 JOIN conversations c ON c.id = m.conversation_id
                 WHERE m.is_read = 0 AND m.sender = 'client' AND m.deleted = 0
                   AND c.status != 'closed' AND c.deleted = 0
                 ORDER BY m.conversation_id ASC, m.id ASC",
                MESSAGE_COLUMNS
                    .split(", ")
                    .map(|c| format!("m.{c}"))
                    .collect::<Vec<_>>()
                    .join(", ")
            ))?;
            let rows = stmt
                .query_map([], |row| {
                    let message = row_to_message(row)?;
                    Ok(BacklogEntry {
                        conversation_id: message.conversation_id,
                        channel_id: row.get(10)?,
                        language: row.get(11)?,
                        message,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn find_by_public_id(
    db: &Database,
    public_id: &str,
) -> Result<Option<StoredMessage>, ParloError> {
    let public_id = public_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages WHERE public_id = ?1 AND deleted = 0"
            ))?;
            match stmt.query_row(params![public_id], row_to_message) {
                Ok(m) => Ok(Some(m)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Apply a channel-side edit to the stored copy, matched by origin id. When
/// several rows share the origin id the newest wins. Returns `None` when no
/// stored message matches.
pub async fn update_message_by_origin(
    db: &Database,
    conversation_id: i64,
    origin_id: &str,
    new_text: Option<&str>,
    new_caption: Option<&str>,
) -> Result<Option<StoredMessage>, ParloError> {
    let origin_id = origin_id.to_string();
    let body = new_text.or(new_caption).map(str::to_string);
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let id: Option<i64> = {
                let mut stmt = tx.prepare(
                    "SELECT id FROM messages
                     WHERE conversation_id = ?1 AND origin_id = ?2 AND deleted = 0
                     ORDER BY id DESC LIMIT 1",
                )?;
                match stmt.query_row(params![conversation_id, origin_id], |row| row.get(0)) {
                    Ok(id) => Some(id),
                    Err(rusqlite::Error::QueryReturnedNoRows) => None,
                    Err(e) => return Err(e),
                }
            };
            let updated = match id {
                None => None,
                Some(id) => {
                    if let Some(body) = &body {
                        tx.execute(
                            "UPDATE messages SET body = ?1 WHERE id = ?2",
                            params![body, id],
                        )?;
                    }
                    fetch_message(&tx, id)?
                }
            };
            tx.commit()?;
            Ok(updated)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Resolve a pending close request: flips its sender from `ask_close` to
/// accepted/denied. Write-once.
pub async fn resolve_close_request(
    db: &Database,
    message_id: i64,
    accept: bool,
) -> Result<StoredMessage, ParloError> {
    let resolved = if accept {
        SenderKind::AskCloseAccepted
    } else {
        SenderKind::AskCloseDenied
    };
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let result = match fetch_message(&tx, message_id)? {
                None => Err(ParloError::NotFound("close request")),
                Some(m)
                    if matches!(
                        m.sender,
                        SenderKind::AskCloseAccepted | SenderKind::AskCloseDenied
                    ) =>
                {
                    Err(ParloError::Conflict(ConflictKind::CloseRequestResolved))
                }
                Some(m) if m.sender != SenderKind::AskClose => Err(ParloError::InvalidInput(
                    "message is not a close request".into(),
                )),
                Some(_) => {
                    tx.execute(
                        "UPDATE messages SET sender = ?1 WHERE id = ?2",
                        params![resolved.to_string(), message_id],
                    )?;
                    match fetch_message(&tx, message_id)? {
                        Some(m) => Ok(m),
                        None => Err(ParloError::Internal(
                            "close request row missing after update".into(),
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::{channels, conversations, users};
    use parlo_core::types::{ChannelKind, NewChannel, NewUser, UserStage};
    use tempfile::tempdir;

    async fn setup() -> (Database, tempfile::TempDir, i64) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap(), true).await.unwrap();
        let user = users::create_user(
            &db,
            &NewUser {
                kind: ChannelKind::Telegram,
                external_id: "1".to_string(),
                display_name: None,
                username: None,
                language: None,
                stage: UserStage::Active,
            },
        )
        .await
        .unwrap();
        let channel = channels::create_channel(
            &db,
            &NewChannel {
                kind: ChannelKind::Telegram,
                token: "111:aa".to_string(),
                username: None,
            },
        )
        .await
        .unwrap();
        let conversation = conversations::create_conversation(&db, user.id, channel.id, "en")
            .await
            .unwrap();
        (db, dir, conversation.id)
    }

    fn client_text(conversation_id: i64, text: &str) -> NewMessage {
        NewMessage {
            conversation_id,
            sender: SenderKind::Client,
            content: MessageContent::Text {
                text: text.to_string(),
            },
            origin_id: None,
        }
    }

    #[tokio::test]
    async fn every_content_shape_round_trips() {
        let (db, _dir, conversation) = setup().await;
        let contents = vec![
            MessageContent::Text {
                text: "hello".to_string(),
            },
            MessageContent::Media {
                media: MediaKind::Photo,
                reference: "file-abc".to_string(),
                caption: Some("receipt".to_string()),
            },
            MessageContent::Media {
                media: MediaKind::Voice,
                reference: "file-def".to_string(),
                caption: None,
            },
            MessageContent::Location {
                latitude: 52.52,
                longitude: 13.405,
            },
            MessageContent::Contact {
                phone: "+4915112345678".to_string(),
                name: Some("Ada".to_string()),
            },
            MessageContent::Dice {
                emoji: "\u{1F3B2}".to_string(),
                value: 4,
            },
        ];

        for content in contents {
            let stored = insert_message(
                &db,
                &NewMessage {
                    conversation_id: conversation,
                    sender: SenderKind::Client,
                    content: content.clone(),
                    origin_id: Some("42".to_string()),
                },
            )
            .await
            .unwrap();
            assert_eq!(stored.content, content);
            assert!(!stored.is_read);
        }

        let listed = list_messages(&db, conversation, 0).await.unwrap();
        assert_eq!(listed.len(), 6);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn mark_read_honors_watermark_and_side() {
        let (db, _dir, conversation) = setup().await;
        let m1 = insert_message(&db, &client_text(conversation, "one")).await.unwrap();
        let m2 = insert_message(&db, &client_text(conversation, "two")).await.unwrap();
        let _m3 = insert_message(&db, &client_text(conversation, "three")).await.unwrap();
        insert_message(
            &db,
            &NewMessage {
                conversation_id: conversation,
                sender: SenderKind::Support,
                content: MessageContent::Text {
                    text: "reply".to_string(),
                },
                origin_id: None,
            },
        )
        .await
        .unwrap();

        assert_eq!(count_unread(&db, conversation).await.unwrap(), 3);

        let flipped = mark_read(&db, conversation, ParticipantRole::Support, Some(m2.id))
            .await
            .unwrap();
        assert_eq!(flipped, 2);
        assert_eq!(count_unread(&db, conversation).await.unwrap(), 1);

        // The client reading flips the support reply, not client rows.
        let flipped = mark_read(&db, conversation, ParticipantRole::Client, None)
            .await
            .unwrap();
        assert_eq!(flipped, 1);
        assert_eq!(count_unread(&db, conversation).await.unwrap(), 1);

        let listed = list_messages(&db, conversation, 0).await.unwrap();
        assert!(listed.iter().find(|m| m.id == m1.id).unwrap().is_read);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn backlog_skips_read_support_and_closed() {
        let (db, _dir, conversation) = setup().await;
        insert_message(&db, &client_text(conversation, "seen")).await.unwrap();
        mark_read(&db, conversation, ParticipantRole::Support, None).await.unwrap();
        assert_eq!(count_unread(&db, conversation).await.unwrap(), 0);
        insert_message(&db, &client_text(conversation, "pending")).await.unwrap();
        insert_message(
            &db,
            &NewMessage {
                conversation_id: conversation,
                sender: SenderKind::Support,
                content: MessageContent::Text {
                    text: "ours".to_string(),
                },
                origin_id: None,
            },
        )
        .await
        .unwrap();

        let backlog = unread_backlog(&db).await.unwrap();
        assert_eq!(backlog.len(), 1);
        assert_eq!(backlog[0].language, "en");
        assert_eq!(backlog[0].conversation_id, conversation);

        conversations::close_conversation(&db, conversation).await.unwrap();
        assert!(unread_backlog(&db).await.unwrap().is_empty());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn edit_by_origin_updates_newest_match() {
        let (db, _dir, conversation) = setup().await;
        insert_message(
            &db,
            &NewMessage {
                conversation_id: conversation,
                sender: SenderKind::Client,
                content: MessageContent::Text {
                    text: "orginal".to_string(),
                },
                origin_id: Some("777".to_string()),
            },
        )
        .await
        .unwrap();

        let updated = update_message_by_origin(&db, conversation, "777", Some("original"), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            updated.content,
            MessageContent::Text {
                text: "original".to_string()
            }
        );

        let missing = update_message_by_origin(&db, conversation, "999", Some("x"), None)
            .await
            .unwrap();
        assert!(missing.is_none());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn close_request_resolves_exactly_once() {
        let (db, _dir, conversation) = setup().await;
        let ask = insert_message(
            &db,
            &NewMessage {
                conversation_id: conversation,
                sender: SenderKind::AskClose,
                content: MessageContent::Text {
                    text: "May I close this chat?".to_string(),
                },
                origin_id: None,
            },
        )
        .await
        .unwrap();

        let resolved = resolve_close_request(&db, ask.id, true).await.unwrap();
        assert_eq!(resolved.sender, SenderKind::AskCloseAccepted);

        assert!(matches!(
            resolve_close_request(&db, ask.id, false).await,
            Err(ParloError::Conflict(ConflictKind::CloseRequestResolved))
        ));

        let plain = insert_message(&db, &client_text(conversation, "hi")).await.unwrap();
        assert!(matches!(
            resolve_close_request(&db, plain.id, true).await,
            Err(ParloError::InvalidInput(_))
        ));
        db.close().await.unwrap();
    }
}
