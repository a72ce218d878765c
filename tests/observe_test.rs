use chatroom_sync::client::{ChatroomClient, ChatroomConfig};
use chatroom_sync::store::memory::{MemoryApi, MemoryStore, MemoryUploader};
use chatroom_sync::store::traits::LiveBatch;
use chatroom_sync::types::chatroom::Chatroom;
use chatroom_sync::types::message::{
    Attachment, Conversation, ConversationStatus, Member, date_key, now_epoch_ms,
};
use std::sync::Arc;
use std::time::Duration;

const ROOM: &str = "room-1";
const MINUTE_MS: i64 = 60_000;

fn test_member(uuid: &str) -> Member {
    Member {
        uuid: uuid.to_owned(),
        name: uuid.to_owned(),
        image_url: None,
    }
}

fn test_chatroom() -> Chatroom {
    let created = now_epoch_ms() - 24 * 60 * MINUTE_MS;
    Chatroom {
        id: ROOM.to_owned(),
        community_id: Some("community-1".to_owned()),
        title: "general".to_owned(),
        member: Some(test_member("owner")),
        date: date_key(created),
        date_epoch: created,
        follow_status: true,
        is_conversation_stored: true,
        ..Default::default()
    }
}

fn server_message(id: &str, epoch_ms: i64, text: &str) -> Conversation {
    Conversation {
        id: Some(id.to_owned()),
        chatroom_id: ROOM.to_owned(),
        text: text.to_owned(),
        member: Some(test_member("peer")),
        created_epoch: epoch_ms,
        date: date_key(epoch_ms),
        status: ConversationStatus::Sent,
        ..Default::default()
    }
}

struct Harness {
    store: Arc<MemoryStore>,
    api: Arc<MemoryApi>,
    client: Arc<ChatroomClient>,
}

fn harness(settle: Duration) -> Harness {
    let _ = env_logger::builder().is_test(true).try_init();
    let store = Arc::new(MemoryStore::new());
    store.seed_chatroom(test_chatroom());
    let api = Arc::new(MemoryApi::new());
    let client = ChatroomClient::new(
        ROOM,
        store.clone(),
        api.clone(),
        Arc::new(MemoryUploader::new()),
        ChatroomConfig {
            member: test_member("me"),
            live_settle_delay: settle,
            ..Default::default()
        },
    );
    Harness { store, api, client }
}

async fn count_with_text(client: &ChatroomClient, text: &str) -> usize {
    client
        .snapshot()
        .await
        .sections
        .iter()
        .flat_map(|s| &s.messages)
        .filter(|m| m.text == text)
        .count()
}

async fn wait_for_count(client: &ChatroomClient, text: &str, expected: usize) -> bool {
    for _ in 0..200 {
        if count_with_text(client, text).await == expected {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}

#[tokio::test]
async fn live_batches_during_settle_window_are_dropped() {
    let h = harness(Duration::from_millis(200));
    h.client.initial_load(None).await.unwrap();

    // Pushed while the initial window settles: dropped entirely.
    h.store
        .push_live(
            ROOM,
            LiveBatch::New(vec![server_message("n1", now_epoch_ms(), "early")]),
        )
        .await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(count_with_text(&h.client, "early").await, 0);

    // After the window clears, pushes apply.
    tokio::time::sleep(Duration::from_millis(250)).await;
    h.store
        .push_live(
            ROOM,
            LiveBatch::New(vec![server_message("n2", now_epoch_ms(), "late")]),
        )
        .await;
    assert!(wait_for_count(&h.client, "late", 1).await);
    assert_eq!(count_with_text(&h.client, "early").await, 0);
}

#[tokio::test]
async fn duplicate_live_delivery_does_not_duplicate_rows() {
    let h = harness(Duration::from_millis(20));
    h.client.initial_load(None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;

    let message = server_message("n1", now_epoch_ms(), "hello");
    h.store
        .push_live(ROOM, LiveBatch::New(vec![message.clone()]))
        .await;
    assert!(wait_for_count(&h.client, "hello", 1).await);
    h.store
        .push_live(ROOM, LiveBatch::Posted(vec![message]))
        .await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(count_with_text(&h.client, "hello").await, 1);
}

#[tokio::test]
async fn new_rows_with_pending_attachments_are_held_back() {
    let h = harness(Duration::from_millis(20));
    h.client.initial_load(None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;

    let mut pending = server_message("n1", now_epoch_ms(), "photo");
    pending.attachments = vec![Attachment {
        kind: "image".to_owned(),
        ..Default::default()
    }];
    pending.attachment_uploaded = false;
    h.store
        .push_live(ROOM, LiveBatch::New(vec![pending.clone()]))
        .await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(count_with_text(&h.client, "photo").await, 0);

    // The resolved upload arrives as a change and applies normally.
    pending.attachment_uploaded = true;
    h.store
        .push_live(ROOM, LiveBatch::Changed(vec![pending]))
        .await;
    assert!(wait_for_count(&h.client, "photo", 1).await);
}

#[tokio::test]
async fn changed_batches_update_in_place_and_mark_read() {
    let h = harness(Duration::from_millis(20));
    let epoch = now_epoch_ms() - 5 * MINUTE_MS;
    h.store
        .seed_conversations(vec![server_message("m1", epoch, "original")]);
    h.client.initial_load(None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;

    h.client
        .post_edited_message("m1", "edited", None)
        .await
        .unwrap();
    assert_eq!(h.api.edit_log(), vec![("m1".to_owned(), "edited".to_owned())]);

    // The edit comes back over the live feed as a change.
    let mut edited = server_message("m1", epoch, "edited");
    edited.is_edited = true;
    h.store
        .push_live(ROOM, LiveBatch::Changed(vec![edited]))
        .await;
    assert!(wait_for_count(&h.client, "edited", 1).await);
    assert_eq!(count_with_text(&h.client, "original").await, 0);
    assert!(h.api.mark_read_count() >= 1);
}
