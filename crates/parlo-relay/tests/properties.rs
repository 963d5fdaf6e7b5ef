// SPDX-FileCopyrightText: 2026 Parlo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end relay behavior over a real SQLite store and mock channels.
//!
//! Each test drives [`Relay::route_inbound`] and the operator-side
//! operations the way the running service would, then asserts on the
//! store, the captured channel traffic, and the event sink.

use std::sync::Arc;

use parlo_config::model::{NotifyConfig, RelayConfig, StorageConfig};
use parlo_core::error::{ConflictKind, ParloError};
use parlo_core::traits::store::ConversationStore;
use parlo_core::types::{
    CallbackAction, Channel, ChannelKind, Conversation, ConversationStatus, NewChannel,
    NewOperator, Operator, ParticipantRole, SenderKind, User, UserStage,
};
use parlo_relay::{ChannelRegistry, DispatchQueue, Notifier, Relay};
use parlo_storage::SqliteStore;
use parlo_test_utils::events;
use parlo_test_utils::{CaptureSink, MockChannel};

struct Env {
    relay: Arc<Relay>,
    store: Arc<dyn ConversationStore>,
    registry: Arc<ChannelRegistry>,
    sink: Arc<CaptureSink>,
    channel: Channel,
    mock: MockChannel,
    _dir: tempfile::TempDir,
}

async fn env() -> Env {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::new(StorageConfig {
        database_path: dir.path().join("parlo.db").to_string_lossy().into_owned(),
        wal_mode: false,
    });
    store.initialize().await.unwrap();
    let store: Arc<dyn ConversationStore> = Arc::new(store);

    let (registry, _inbox) = ChannelRegistry::new(32);
    let registry = Arc::new(registry);

    let channel = store
        .create_channel(&NewChannel {
            kind: ChannelKind::Telegram,
            token: "tg-token".to_string(),
            username: Some("support_bot".to_string()),
        })
        .await
        .unwrap();
    let mock = MockChannel::with_username("support_bot");
    let handle = mock.clone();
    registry
        .register(channel.clone(), Box::new(mock))
        .await
        .unwrap();

    let sink = Arc::new(CaptureSink::new());
    let notifier = Arc::new(Notifier::new(
        Arc::clone(&registry),
        sink.clone(),
        NotifyConfig {
            timeout_ms: 200,
            retry_delay_ms: 5,
        },
    ));
    let relay = Arc::new(Relay::new(
        Arc::clone(&store),
        Arc::clone(&registry),
        Arc::new(DispatchQueue::new()),
        notifier,
        RelayConfig {
            languages: vec!["en".to_string(), "ru".to_string()],
            ..RelayConfig::default()
        },
    ));
    Env {
        relay,
        store,
        registry,
        sink,
        channel,
        mock: handle,
        _dir: dir,
    }
}

async fn add_channel(env: &Env, token: &str, username: &str) -> (Channel, MockChannel) {
    let record = env
        .store
        .create_channel(&NewChannel {
            kind: ChannelKind::Telegram,
            token: token.to_string(),
            username: Some(username.to_string()),
        })
        .await
        .unwrap();
    let mock = MockChannel::with_username(username);
    let handle = mock.clone();
    env.registry
        .register(record.clone(), Box::new(mock))
        .await
        .unwrap();
    (record, handle)
}

async fn route(env: &Env, event: parlo_core::types::InboundEvent) {
    env.relay.route_inbound(event).await.unwrap();
}

/// Walk a fresh telegram user through onboarding up to an open WAITING
/// conversation holding their first question.
async fn onboard(env: &Env, external_id: &str, question: &str) -> (User, Conversation) {
    let ch = env.channel.id;
    route(env, events::text_event(ch, external_id, "hello")).await;
    route(env, events::own_contact_event(ch, external_id, "+15550100")).await;
    route(env, events::text_event(ch, external_id, "Alice Doe")).await;
    route(
        env,
        events::callback_event(
            ch,
            external_id,
            CallbackAction::SetLanguage {
                language: "en".to_string(),
            },
        ),
    )
    .await;
    route(env, events::text_event(ch, external_id, "/operator")).await;
    route(env, events::text_event(ch, external_id, question)).await;

    let user = env
        .store
        .find_user(ChannelKind::Telegram, external_id)
        .await
        .unwrap()
        .expect("user exists after onboarding");
    let conversation = env
        .store
        .find_open_by_user(user.id)
        .await
        .unwrap()
        .expect("conversation open after onboarding");
    assert_eq!(conversation.status, ConversationStatus::Waiting);
    (user, conversation)
}

async fn operator(env: &Env, name: &str) -> Operator {
    env.store
        .upsert_operator(&NewOperator {
            name: name.to_string(),
            languages: vec!["en".to_string()],
            capacity: 5,
            token: format!("token-{name}"),
        })
        .await
        .unwrap()
}

#[tokio::test]
async fn a_user_has_at_most_one_open_conversation() {
    let env = env().await;
    let (user, conversation) = onboard(&env, "100", "printer is on fire").await;

    route(&env, events::text_event(env.channel.id, "100", "still burning")).await;

    let open = env
        .store
        .find_open_by_user(user.id)
        .await
        .unwrap()
        .expect("conversation still open");
    assert_eq!(open.id, conversation.id);

    let messages = env.store.list_messages(conversation.id, 50).await.unwrap();
    assert_eq!(messages.len(), 2);
    assert!(messages.iter().all(|m| m.sender == SenderKind::Client));

    let err = env
        .store
        .create_conversation(user.id, env.channel.id, "en")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ParloError::Conflict(ConflictKind::ChatIsOpen)
    ));
}

#[tokio::test]
async fn concurrent_binds_elect_exactly_one_operator() {
    let env = env().await;
    let (_, conversation) = onboard(&env, "200", "help").await;

    let mut operators = Vec::new();
    for i in 0..8 {
        operators.push(operator(&env, &format!("op-{i}")).await);
    }

    let mut handles = Vec::new();
    for op in operators {
        let relay = Arc::clone(&env.relay);
        let conversation = conversation.clone();
        handles.push(tokio::spawn(async move {
            relay.complete_bind(&conversation, &op).await
        }));
    }

    let mut won = 0;
    let mut lost = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => won += 1,
            Err(ParloError::Conflict(ConflictKind::SessionAlreadyBusy)) => lost += 1,
            Err(e) => panic!("unexpected bind error: {e}"),
        }
    }
    assert_eq!(won, 1);
    assert_eq!(lost, 7);

    let bound = env.store.get_conversation(conversation.id).await.unwrap();
    assert_eq!(bound.status, ConversationStatus::Busy);
    assert!(bound.operator_id.is_some());
}

#[tokio::test]
async fn a_closed_conversation_never_reopens() {
    let env = env().await;
    let (user, conversation) = onboard(&env, "300", "question").await;

    env.relay
        .close_conversation(&conversation.public_id, None, ParticipantRole::Client)
        .await
        .unwrap();

    let op = operator(&env, "zed").await;
    let err = env
        .store
        .bind_operator(conversation.id, op.id)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ParloError::Conflict(ConflictKind::SessionAlreadyBusy)
    ));

    let err = env
        .relay
        .close_conversation(&conversation.public_id, None, ParticipantRole::Client)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ParloError::Conflict(ConflictKind::SessionClosed)
    ));

    // The user starts over from the menu; a fresh conversation appears.
    route(&env, events::text_event(env.channel.id, "300", "/operator")).await;
    route(&env, events::text_event(env.channel.id, "300", "new question")).await;
    let fresh = env
        .store
        .find_open_by_user(user.id)
        .await
        .unwrap()
        .expect("second conversation open");
    assert_ne!(fresh.id, conversation.id);

    let old = env.store.get_conversation(conversation.id).await.unwrap();
    assert_eq!(old.status, ConversationStatus::Closed);
}

#[tokio::test]
async fn rating_requires_closure_and_sets_once() {
    let env = env().await;
    let (_, conversation) = onboard(&env, "400", "rate me later").await;

    let err = env.store.set_rating(conversation.id, 3).await.unwrap_err();
    assert!(matches!(
        err,
        ParloError::Conflict(ConflictKind::SessionNotClosed)
    ));

    env.relay
        .close_conversation(&conversation.public_id, Some(4), ParticipantRole::Support)
        .await
        .unwrap();
    let closed = env.store.get_conversation(conversation.id).await.unwrap();
    assert_eq!(closed.rating, Some(4));

    let err = env.store.set_rating(conversation.id, 5).await.unwrap_err();
    assert!(matches!(
        err,
        ParloError::Conflict(ConflictKind::RatingAlreadySet)
    ));

    // A stale rate button press is swallowed, not surfaced to the user.
    route(
        &env,
        events::callback_event(
            env.channel.id,
            "400",
            CallbackAction::Rate {
                score: 2,
                conversation: conversation.public_id.clone(),
            },
        ),
    )
    .await;
    let still = env.store.get_conversation(conversation.id).await.unwrap();
    assert_eq!(still.rating, Some(4));
}

#[tokio::test]
async fn backlog_hands_over_in_arrival_order() {
    let env = env().await;
    let (_, conversation) = onboard(&env, "500", "first").await;
    route(&env, events::text_event(env.channel.id, "500", "second")).await;
    route(&env, events::text_event(env.channel.id, "500", "third")).await;

    let op = operator(&env, "greta").await;
    env.relay
        .bind_to_self(&op, &conversation.public_id)
        .await
        .unwrap();

    let op_events = env.sink.on_topic(&format!("op:{}", op.public_id)).await;
    let bound = op_events
        .iter()
        .find(|e| e["event"] == "bound")
        .expect("bound event published");
    let backlog = bound["backlog"].as_array().unwrap();
    let texts: Vec<&str> = backlog
        .iter()
        .map(|m| m["content"]["text"].as_str().unwrap())
        .collect();
    assert_eq!(texts, ["first", "second", "third"]);
}

#[tokio::test]
async fn full_session_round_trip() {
    let env = env().await;
    let (user, conversation) = onboard(&env, "600", "my order is missing").await;
    let op = operator(&env, "henry").await;

    // Sending to a WAITING conversation claims it.
    env.relay
        .operator_send(&op, &conversation.public_id, "Checking your order now")
        .await
        .unwrap();
    let bound = env.store.get_conversation(conversation.id).await.unwrap();
    assert_eq!(bound.status, ConversationStatus::Busy);
    assert_eq!(bound.operator_id, Some(op.id));
    let talking = env.store.get_user(user.id).await.unwrap();
    assert_eq!(talking.stage, UserStage::Talking);
    assert_eq!(
        env.mock.sent_texts().await.last().map(String::as_str),
        Some("Checking your order now")
    );

    route(&env, events::text_event(env.channel.id, "600", "order 1234")).await;

    let flipped = env
        .relay
        .mark_read(&conversation.public_id, ParticipantRole::Support, None)
        .await
        .unwrap();
    assert_eq!(flipped, 2);
    assert_eq!(env.store.count_unread(conversation.id).await.unwrap(), 0);

    let closed = env
        .relay
        .close_conversation(&conversation.public_id, Some(5), ParticipantRole::Support)
        .await
        .unwrap();
    assert_eq!(closed.status, ConversationStatus::Closed);
    let record = env.store.get_conversation(conversation.id).await.unwrap();
    assert_eq!(record.rating, Some(5));
    assert_eq!(record.operator_id, Some(op.id));

    let back = env.store.get_user(user.id).await.unwrap();
    assert_eq!(back.stage, UserStage::Active);
}

#[tokio::test]
async fn busy_conversations_reject_other_channels() {
    let env = env().await;
    let (user, conversation) = onboard(&env, "700", "question from a").await;
    let (channel_b, mock_b) = add_channel(&env, "tg-token-b", "second_bot").await;

    // While WAITING, another channel appends to the same conversation.
    route(&env, events::text_event(channel_b.id, "700", "also from b")).await;
    let messages = env.store.list_messages(conversation.id, 50).await.unwrap();
    assert_eq!(messages.len(), 2);

    let op = operator(&env, "irene").await;
    env.relay
        .bind_to_self(&op, &conversation.public_id)
        .await
        .unwrap();

    // Once BUSY, the other channel is turned away and nothing is stored.
    route(&env, events::text_event(channel_b.id, "700", "b again")).await;
    let messages = env.store.list_messages(conversation.id, 50).await.unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(mock_b.sent_count().await, 1);

    let open = env.store.find_open_by_user(user.id).await.unwrap().unwrap();
    assert_eq!(open.id, conversation.id);
}

#[tokio::test]
async fn onboarding_reprompts_without_state_change() {
    let env = env().await;
    route(&env, events::text_event(env.channel.id, "800", "hi")).await;

    let user = env
        .store
        .find_user(ChannelKind::Telegram, "800")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(user.stage, UserStage::AwaitingPhone);

    // Typing a phone number instead of sharing the contact re-prompts.
    route(&env, events::text_event(env.channel.id, "800", "+1 555 0100")).await;
    let user = env.store.get_user(user.id).await.unwrap();
    assert_eq!(user.stage, UserStage::AwaitingPhone);
    assert!(env.store.find_open_by_user(user.id).await.unwrap().is_none());
    assert_eq!(env.mock.sent_count().await, 2);

    // A foreign contact card is also rejected.
    route(
        &env,
        events::foreign_contact_event(env.channel.id, "800", "+15550111"),
    )
    .await;
    let user = env.store.get_user(user.id).await.unwrap();
    assert_eq!(user.stage, UserStage::AwaitingPhone);
}

#[tokio::test]
async fn membership_block_soft_deletes_and_inbound_restores() {
    let env = env().await;
    let (user, _) = onboard(&env, "900", "hello there").await;

    route(
        &env,
        events::membership_event(
            env.channel.id,
            "900",
            parlo_core::types::MembershipStatus::Blocked,
        ),
    )
    .await;
    let gone = env.store.get_user(user.id).await.unwrap();
    assert!(gone.deleted);

    route(&env, events::text_event(env.channel.id, "900", "i am back")).await;
    let back = env.store.get_user(user.id).await.unwrap();
    assert!(!back.deleted);
}

#[tokio::test]
async fn edits_rewrite_the_stored_message() {
    let env = env().await;
    let (_, conversation) = onboard(&env, "950", "originl").await;
    let messages = env.store.list_messages(conversation.id, 10).await.unwrap();
    let origin = messages[0].origin_id.clone().expect("channel origin id");

    route(
        &env,
        events::edit_event(env.channel.id, "950", &origin, "original"),
    )
    .await;

    let messages = env.store.list_messages(conversation.id, 10).await.unwrap();
    assert_eq!(messages.len(), 1);
    match &messages[0].content {
        parlo_core::types::MessageContent::Text { text } => assert_eq!(text, "original"),
        other => panic!("expected text content, got {other:?}"),
    }
    let chat_events = env
        .sink
        .on_topic(&format!("chat:{}", conversation.public_id))
        .await;
    assert!(chat_events.iter().any(|e| e["event"] == "edit"));
}

mod queue_order {
    use parlo_core::types::{MessageContent, SenderKind, StoredMessage};
    use parlo_relay::DispatchQueue;
    use proptest::prelude::*;

    fn stored(id: i64, conversation_id: i64, payload: u32) -> StoredMessage {
        StoredMessage {
            id,
            public_id: format!("m-{id}"),
            conversation_id,
            sender: SenderKind::Client,
            content: MessageContent::Text {
                text: payload.to_string(),
            },
            is_read: false,
            origin_id: None,
            created_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        /// Whatever the interleaving across conversations, each
        /// conversation drains its own messages in arrival order.
        #[test]
        fn drain_preserves_per_conversation_order(
            entries in proptest::collection::vec((0..4i64, any::<u32>()), 0..40)
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            rt.block_on(async {
                let queue = DispatchQueue::new();
                for (i, (conversation, payload)) in entries.iter().enumerate() {
                    queue
                        .enqueue(*conversation, 1, "en", stored(i as i64, *conversation, *payload))
                        .await;
                }
                for conversation in 0..4i64 {
                    let expected: Vec<u32> = entries
                        .iter()
                        .filter(|(c, _)| *c == conversation)
                        .map(|(_, p)| *p)
                        .collect();
                    let drained: Vec<u32> = queue
                        .drain(conversation)
                        .await
                        .into_iter()
                        .map(|m| match m.content {
                            MessageContent::Text { text } => text.parse().unwrap(),
                            other => panic!("unexpected content {other:?}"),
                        })
                        .collect();
                    assert_eq!(drained, expected);
                }
            });
        }
    }
}
