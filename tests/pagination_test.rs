use chatroom_sync::client::{ChatroomClient, ChatroomConfig};
use chatroom_sync::store::memory::{MemoryApi, MemoryStore, MemoryUploader};
use chatroom_sync::types::chatroom::Chatroom;
use chatroom_sync::types::events::ScrollDirection;
use chatroom_sync::types::message::{
    Conversation, ConversationState, ConversationStatus, Member, date_key, now_epoch_ms,
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
    let created = now_epoch_ms() - 30 * 24 * 60 * MINUTE_MS;
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

fn server_message(id: &str, epoch_ms: i64) -> Conversation {
    Conversation {
        id: Some(id.to_owned()),
        chatroom_id: ROOM.to_owned(),
        text: format!("message {id}"),
        member: Some(test_member("peer")),
        created_epoch: epoch_ms,
        date: date_key(epoch_ms),
        status: ConversationStatus::Sent,
        ..Default::default()
    }
}

fn seeded(count: usize) -> (Arc<MemoryStore>, Vec<String>) {
    let store = Arc::new(MemoryStore::new());
    store.seed_chatroom(test_chatroom());
    let base = now_epoch_ms() - (count as i64) * MINUTE_MS;
    let mut ids = Vec::with_capacity(count);
    let messages = (0..count)
        .map(|i| {
            let id = format!("m{i:04}");
            ids.push(id.clone());
            server_message(&id, base + i as i64 * MINUTE_MS)
        })
        .collect();
    store.seed_conversations(messages);
    (store, ids)
}

fn build_client(store: &Arc<MemoryStore>) -> Arc<ChatroomClient> {
    let _ = env_logger::builder().is_test(true).try_init();
    ChatroomClient::new(
        ROOM,
        store.clone(),
        Arc::new(MemoryApi::new()),
        Arc::new(MemoryUploader::new()),
        ChatroomConfig {
            member: test_member("me"),
            live_settle_delay: Duration::from_millis(50),
            ..Default::default()
        },
    )
}

async fn message_count(client: &ChatroomClient) -> usize {
    client
        .snapshot()
        .await
        .sections
        .iter()
        .map(|s| s.messages.len())
        .sum()
}

async fn header_count(client: &ChatroomClient) -> usize {
    client
        .snapshot()
        .await
        .sections
        .iter()
        .flat_map(|s| &s.messages)
        .filter(|m| m.state == ConversationState::ChatroomHeader)
        .count()
}

#[tokio::test]
async fn full_bottom_page_leaves_boundary_unreached() {
    let (store, _) = seeded(120);
    let client = build_client(&store);
    client.initial_load(None).await.unwrap();

    assert!(!client.has_latest_page());
    assert_eq!(message_count(&client).await, 100);
    assert_eq!(header_count(&client).await, 0, "no header mid-history");
}

#[tokio::test]
async fn short_bottom_page_marks_boundary_and_synthesizes_header() {
    let (store, _) = seeded(37);
    let client = build_client(&store);
    client.initial_load(None).await.unwrap();

    assert!(client.has_latest_page());
    // 37 messages plus the chatroom header row.
    assert_eq!(message_count(&client).await, 38);
    assert_eq!(header_count(&client).await, 1);

    // Re-fetching must not duplicate the header: it reconciles by id.
    client.fetch_bottom(true).await.unwrap();
    assert_eq!(header_count(&client).await, 1);
}

#[tokio::test]
async fn empty_below_page_marks_boundary() {
    let (store, ids) = seeded(120);
    let client = build_client(&store);
    client.initial_load(None).await.unwrap();
    assert!(!client.has_latest_page());

    let newest = ids.last().unwrap();
    client
        .fetch_more(newest, ScrollDirection::Down)
        .await
        .unwrap();
    assert!(client.has_latest_page(), "empty page is a boundary, not an error");
}

#[tokio::test]
async fn scrolling_up_backfills_older_pages_and_header_at_top() {
    let (store, ids) = seeded(150);
    let client = build_client(&store);
    client.initial_load(None).await.unwrap();
    assert_eq!(message_count(&client).await, 100);

    // The oldest loaded message anchors the upward fetch.
    let oldest_loaded = &ids[50];
    client
        .fetch_more(oldest_loaded, ScrollDirection::Up)
        .await
        .unwrap();

    // 150 messages plus the header synthesized at the reached top boundary.
    assert_eq!(message_count(&client).await, 151);
    assert_eq!(header_count(&client).await, 1);

    let snapshot = client.snapshot().await;
    let first = &snapshot.sections[0].messages[0];
    assert_eq!(first.state, ConversationState::ChatroomHeader);
}

#[tokio::test]
async fn anchored_load_opens_window_around_target_and_scrolls_to_it() {
    let (store, ids) = seeded(150);
    let client = build_client(&store);
    let mut scrolls = client.event_bus().scroll_to_message.subscribe();

    let target = ids[75].clone();
    client.initial_load(Some(&target)).await.unwrap();

    let event = scrolls.try_recv().expect("anchored load must emit a scroll target");
    let snapshot = client.snapshot().await;
    let located = &snapshot.sections[event.section].messages[event.row];
    assert_eq!(located.message_id, target);

    // 75 older rows (short page), the median, 74 newer, plus the header.
    assert_eq!(message_count(&client).await, 151);
    assert_eq!(header_count(&client).await, 1);
}

#[tokio::test]
async fn deep_link_to_chatroom_itself_opens_from_top() {
    let (store, _) = seeded(30);
    let client = build_client(&store);
    client.initial_load(Some(ROOM)).await.unwrap();

    let snapshot = client.snapshot().await;
    let first = &snapshot.sections[0].messages[0];
    assert_eq!(first.state, ConversationState::ChatroomHeader);
    assert_eq!(message_count(&client).await, 31);
    assert!(client.has_latest_page());
}

#[tokio::test]
async fn missing_chatroom_triggers_first_time_sync() {
    let store = Arc::new(MemoryStore::new());
    let api = Arc::new(MemoryApi::new());
    let client = ChatroomClient::new(
        ROOM,
        store.clone(),
        api.clone(),
        Arc::new(MemoryUploader::new()),
        ChatroomConfig {
            member: test_member("me"),
            ..Default::default()
        },
    );
    let result = client.initial_load(None).await;
    assert!(result.is_err(), "chatroom still absent after sync");
    let log = api.sync_log();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].0, ROOM);
}
