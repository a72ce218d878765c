use chatroom_sync::client::{ChatroomClient, ChatroomConfig};
use chatroom_sync::send::NewMessage;
use chatroom_sync::store::memory::{MemoryApi, MemoryStore, MemoryUploader};
use chatroom_sync::store::traits::LiveBatch;
use chatroom_sync::types::chatroom::Chatroom;
use chatroom_sync::types::message::{
    Conversation, ConversationState, ConversationStatus, Member, date_key, now_epoch_ms,
};
use std::sync::Arc;
use std::time::Duration;

const ROOM: &str = "bot-room";

fn test_member(uuid: &str) -> Member {
    Member {
        uuid: uuid.to_owned(),
        name: uuid.to_owned(),
        image_url: None,
    }
}

fn bot_chatroom() -> Chatroom {
    let created = now_epoch_ms() - 86_400_000;
    Chatroom {
        id: ROOM.to_owned(),
        community_id: Some("community-1".to_owned()),
        title: "assistant".to_owned(),
        member: Some(test_member("bot")),
        date: date_key(created),
        date_epoch: created,
        follow_status: true,
        is_conversation_stored: true,
        is_ai_chatbot: true,
        ..Default::default()
    }
}

async fn shimmer_count(client: &ChatroomClient) -> usize {
    client
        .snapshot()
        .await
        .sections
        .iter()
        .flat_map(|s| &s.messages)
        .filter(|m| m.state == ConversationState::BubbleShimmer)
        .count()
}

async fn wait_for<F>(mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}

#[tokio::test]
async fn bot_reply_purges_the_shimmer_placeholder() {
    let _ = env_logger::builder().is_test(true).try_init();
    let store = Arc::new(MemoryStore::new());
    store.seed_chatroom(bot_chatroom());
    let api = Arc::new(MemoryApi::new());
    let client = ChatroomClient::new(
        ROOM,
        store.clone(),
        api.clone(),
        Arc::new(MemoryUploader::new()),
        ChatroomConfig {
            member: test_member("me"),
            live_settle_delay: Duration::from_millis(20),
            ..Default::default()
        },
    );
    client.initial_load(None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;

    client
        .post_message(NewMessage {
            text: "what's the weather?".to_owned(),
            ..Default::default()
        })
        .await
        .unwrap();

    // The post triggers the bot; a shimmer row holds its place.
    let posted = api.clone();
    assert!(wait_for(move || !posted.posted().is_empty()).await);
    for _ in 0..200 {
        if shimmer_count(&client).await == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(shimmer_count(&client).await, 1);
    assert!(api.posted()[0].text == "what's the weather?");

    // The bot's reply arrives over the live feed and replaces the shimmer.
    let reply = Conversation {
        id: Some("bot-1".to_owned()),
        chatroom_id: ROOM.to_owned(),
        text: "sunny".to_owned(),
        member: Some(test_member("bot")),
        created_epoch: now_epoch_ms() + 2_000,
        date: date_key(now_epoch_ms() + 2_000),
        status: ConversationStatus::Sent,
        ..Default::default()
    };
    store.push_live(ROOM, LiveBatch::New(vec![reply])).await;

    for _ in 0..200 {
        if shimmer_count(&client).await == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(shimmer_count(&client).await, 0, "shimmer purged by the reply");
    let texts: Vec<_> = client
        .snapshot()
        .await
        .sections
        .into_iter()
        .flat_map(|s| s.messages)
        .map(|m| m.text)
        .collect();
    assert!(texts.contains(&"sunny".to_owned()));
    assert!(texts.contains(&"what's the weather?".to_owned()));
}
