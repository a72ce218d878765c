use crate::error::{ChatError, Result};
use crate::poll::PollOverlay;
use crate::section::SectionIndex;
use crate::store::error::StoreError;
use crate::store::traits::{AttachmentUploader, ConversationApi, ConversationStore, SyncLoadKind};
use crate::types::chatroom::{Chatroom, ChatroomType};
use crate::types::events::{
    ChatroomUpdated, EventBus, ListReloaded, ScrollDirection, ScrollToBottom, ScrollToMessage,
    Toast,
};
use crate::types::message::{Conversation, ConversationState, ConversationStatus, Member};
use dashmap::DashMap;
use log::{debug, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

pub const DEFAULT_FETCH_LIMIT: usize = 100;

/// Per-chatroom client configuration. Injected at construction; nothing in
/// the core reaches for ambient/global state.
#[derive(Debug, Clone)]
pub struct ChatroomConfig {
    /// Page size for history fetches. Fetches returning fewer rows mark the
    /// corresponding pagination boundary as reached.
    pub fetch_limit: usize,
    /// How long live-observation batches stay suppressed after an initial
    /// bottom/anchored fetch, while that page settles into the list.
    pub live_settle_delay: Duration,
    /// The logged-in member, used for reaction ownership and tombstones.
    pub member: Member,
    pub community_id: Option<String>,
}

impl Default for ChatroomConfig {
    fn default() -> Self {
        Self {
            fetch_limit: DEFAULT_FETCH_LIMIT,
            live_settle_delay: Duration::from_secs(1),
            member: Member::default(),
            community_id: None,
        }
    }
}

#[derive(Default)]
pub(crate) struct ListState {
    /// Flat message cache, mirrored by the section index.
    pub(crate) messages: Vec<Conversation>,
    pub(crate) index: SectionIndex,
}

/// The message-list synchronization engine for one chatroom.
///
/// Owns the flat message cache and the section index exclusively; every
/// mutation path (initial load, pagination, live observation, optimistic
/// send, retry, poll vote, reaction, delete) funnels through
/// [`ChatroomClient::upsert`] under a single lock. The embedding UI only
/// ever sees immutable snapshots and event-bus signals.
pub struct ChatroomClient {
    pub(crate) chatroom_id: String,
    pub(crate) config: ChatroomConfig,
    pub(crate) store: Arc<dyn ConversationStore>,
    pub(crate) api: Arc<dyn ConversationApi>,
    pub(crate) uploader: Arc<dyn AttachmentUploader>,
    pub(crate) event_bus: Arc<EventBus>,
    pub(crate) state: Mutex<ListState>,
    pub(crate) chatroom: RwLock<Option<Chatroom>>,
    /// Suppresses live-observation batches while an initial page settles.
    pub(crate) fetching_initial_bottom_data: AtomicBool,
    /// Whether the newest-known conversation is present locally; when false
    /// a send must first re-fetch the bottom page.
    pub(crate) track_last_conversation_exist: AtomicBool,
    pub(crate) mark_read_in_flight: AtomicBool,
    /// Client-only poll vote composition state, keyed by conversation id.
    pub(crate) poll_overlays: DashMap<String, PollOverlay>,
    pub(crate) observe_task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl ChatroomClient {
    pub fn new(
        chatroom_id: impl Into<String>,
        store: Arc<dyn ConversationStore>,
        api: Arc<dyn ConversationApi>,
        uploader: Arc<dyn AttachmentUploader>,
        config: ChatroomConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            chatroom_id: chatroom_id.into(),
            config,
            store,
            api,
            uploader,
            event_bus: Arc::new(EventBus::new()),
            state: Mutex::new(ListState::default()),
            chatroom: RwLock::new(None),
            fetching_initial_bottom_data: AtomicBool::new(false),
            track_last_conversation_exist: AtomicBool::new(true),
            mark_read_in_flight: AtomicBool::new(false),
            poll_overlays: DashMap::new(),
            observe_task: std::sync::Mutex::new(None),
        })
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.event_bus)
    }

    pub fn chatroom_id(&self) -> &str {
        &self.chatroom_id
    }

    /// Whether the newest page has been fetched to its boundary. False
    /// means newer conversations exist below the loaded window; a send
    /// re-fetches the bottom page first.
    pub fn has_latest_page(&self) -> bool {
        self.track_last_conversation_exist.load(Ordering::Relaxed)
    }

    /// Load the chatroom and its initial page, then start live observation.
    ///
    /// `target_conversation_id` anchors the window around a searched or
    /// deep-linked message instead of the bottom of the timeline. A chatroom
    /// whose history was never synced is synced first; completion is awaited
    /// rather than signaled out-of-band.
    pub async fn initial_load(
        self: &Arc<Self>,
        target_conversation_id: Option<&str>,
    ) -> Result<()> {
        let mut chatroom = self.store.get_chatroom(&self.chatroom_id).await?;
        if chatroom
            .as_ref()
            .map(|c| !c.is_conversation_stored)
            .unwrap_or(true)
        {
            let kind = if chatroom.is_some() {
                SyncLoadKind::Reopen
            } else {
                SyncLoadKind::FirstTime
            };
            debug!("chatroom {} not stored locally, syncing", self.chatroom_id);
            self.api
                .sync_conversations(&self.chatroom_id, kind)
                .await
                .map_err(ChatError::Network)?;
            chatroom = self.store.get_chatroom(&self.chatroom_id).await?;
        }
        let chatroom =
            chatroom.ok_or_else(|| StoreError::NotFound(self.chatroom_id.clone()))?;
        if chatroom.is_deleted() {
            return Err(ChatError::ChatroomDeleted);
        }
        *self.chatroom.write().await = Some(chatroom);

        match target_conversation_id {
            Some(conversation_id) => self.fetch_intermediate(conversation_id).await?,
            None => self.fetch_bottom(false).await?,
        }
        self.start_observing();
        self.spawn_mark_read();
        Ok(())
    }

    pub async fn chatroom_snapshot(&self) -> Option<Chatroom> {
        self.chatroom.read().await.clone()
    }

    pub(crate) async fn is_ai_chatbot(&self) -> bool {
        self.chatroom
            .read()
            .await
            .as_ref()
            .map(|c| c.is_ai_chatbot)
            .unwrap_or(false)
    }

    pub(crate) async fn community_id(&self) -> Option<String> {
        if let Some(id) = &self.config.community_id {
            return Some(id.clone());
        }
        self.chatroom
            .read()
            .await
            .as_ref()
            .and_then(|c| c.community_id.clone())
    }

    /// Synthesize the chatroom itself as a pseudo-conversation rendered
    /// inline at the top of the list. Direct-message chatrooms have no
    /// header row.
    pub(crate) async fn header_conversation(&self) -> Option<Conversation> {
        let chatroom = self.chatroom.read().await;
        let chatroom = chatroom.as_ref()?;
        chatroom_to_conversation(chatroom)
    }

    /// Re-read the chatroom after an action that mutated chatroom-level
    /// state and refresh the synthesized header row.
    pub async fn refresh_chatroom(&self) -> Result<()> {
        let Some(chatroom) = self.store.get_chatroom(&self.chatroom_id).await? else {
            warn!("chatroom {} disappeared on refresh", self.chatroom_id);
            return Ok(());
        };
        let header = chatroom_to_conversation(&chatroom);
        *self.chatroom.write().await = Some(chatroom);
        if let Some(header) = header {
            self.upsert(header).await;
        }
        let _ = self.event_bus.chatroom_updated.send(Arc::new(ChatroomUpdated));
        Ok(())
    }

    pub async fn follow_chatroom(&self, value: bool) -> Result<()> {
        self.api
            .follow_chatroom(&self.chatroom_id, value)
            .await
            .map_err(ChatError::Network)?;
        self.toast(if value { "Chatroom followed" } else { "Chatroom unfollowed" });
        self.refresh_chatroom().await
    }

    pub async fn mute_chatroom(&self, value: bool) -> Result<()> {
        self.api
            .mute_chatroom(&self.chatroom_id, value)
            .await
            .map_err(ChatError::Network)?;
        self.toast(if value { "Chatroom muted" } else { "Chatroom unmuted" });
        self.refresh_chatroom().await
    }

    pub async fn leave_chatroom(&self) -> Result<()> {
        self.api
            .leave_chatroom(&self.chatroom_id)
            .await
            .map_err(ChatError::Network)
    }

    /// Follow the chatroom implicitly after participating (send, reaction),
    /// if not already following.
    pub(crate) async fn follow_if_needed(&self) {
        let following = self
            .chatroom
            .read()
            .await
            .as_ref()
            .map(|c| c.follow_status)
            .unwrap_or(true);
        if following {
            return;
        }
        if let Err(e) = self.api.follow_chatroom(&self.chatroom_id, true).await {
            warn!("implicit follow failed for {}: {e:#}", self.chatroom_id);
            return;
        }
        if let Err(e) = self.refresh_chatroom().await {
            warn!("chatroom refresh after follow failed: {e}");
        }
    }

    /// Edit a posted conversation's text. The edited row comes back through
    /// the live-observation feed; nothing is mutated locally here.
    pub async fn post_edited_message(
        &self,
        conversation_id: &str,
        text: &str,
        share_link: Option<&str>,
    ) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        self.api
            .edit_conversation(conversation_id, text, share_link)
            .await
            .map_err(ChatError::Network)
    }

    /// Tombstone conversations after a successful server delete. Deleted
    /// rows keep rendering, marked as deleted.
    pub async fn delete_conversations(&self, conversation_ids: &[String]) -> Result<()> {
        self.api
            .delete_conversations(conversation_ids)
            .await
            .map_err(ChatError::Network)?;
        let member = self.config.member.clone();
        let mut state = self.state.lock().await;
        for conversation_id in conversation_ids {
            let Some(found) = state
                .messages
                .iter()
                .find(|m| m.id.as_deref() == Some(conversation_id.as_str()))
                .cloned()
            else {
                continue;
            };
            let mut tombstone = found;
            tombstone.deleted_by = Some(member.uuid.clone());
            tombstone.deleted_by_member = Some(member.clone());
            self.upsert_locked(&mut state, tombstone, false);
        }
        drop(state);
        self.emit_reloaded(None);
        Ok(())
    }

    /// Remove a failed optimistic conversation outright (it never reached
    /// the server, so there is nothing to tombstone).
    pub async fn delete_temp_conversation(&self, conversation_key: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.messages.retain(|m| m.key() != conversation_key);
        state.index.remove(conversation_key);
        drop(state);
        self.store
            .delete_temporary_conversation(conversation_key)
            .await?;
        self.emit_reloaded(None);
        Ok(())
    }

    /// Mark the chatroom read, coalescing concurrent calls into one.
    pub(crate) async fn mark_chatroom_read(&self) {
        if self.mark_read_in_flight.swap(true, Ordering::Relaxed) {
            return;
        }
        if let Err(e) = self.api.mark_read(&self.chatroom_id).await {
            warn!("mark read failed for {}: {e:#}", self.chatroom_id);
        }
        self.mark_read_in_flight.store(false, Ordering::Relaxed);
    }

    pub(crate) fn spawn_mark_read(self: &Arc<Self>) {
        let client = Arc::clone(self);
        tokio::spawn(async move {
            client.mark_chatroom_read().await;
        });
    }

    pub(crate) fn toast(&self, message: impl Into<String>) {
        let _ = self.event_bus.toast.send(Arc::new(Toast {
            message: message.into(),
        }));
    }

    pub(crate) fn emit_reloaded(&self, direction: Option<ScrollDirection>) {
        let _ = self
            .event_bus
            .list_reloaded
            .send(Arc::new(ListReloaded { direction }));
    }

    pub(crate) fn emit_scroll_to_bottom(&self, force: bool) {
        let _ = self
            .event_bus
            .scroll_to_bottom
            .send(Arc::new(ScrollToBottom { force }));
    }

    pub(crate) fn emit_scroll_to_message(&self, section: usize, row: usize, existing_index: bool) {
        let _ = self.event_bus.scroll_to_message.send(Arc::new(ScrollToMessage {
            section,
            row,
            existing_index,
        }));
    }

    /// Stop the live-observation task, if any.
    pub fn shutdown(&self) {
        if let Some(task) = self.observe_task.lock().unwrap().take() {
            task.abort();
        }
    }
}

impl Drop for ChatroomClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}

pub(crate) fn chatroom_to_conversation(chatroom: &Chatroom) -> Option<Conversation> {
    if chatroom.kind == ChatroomType::DirectMessage {
        return None;
    }
    Some(Conversation {
        id: Some(chatroom.id.clone()),
        chatroom_id: chatroom.id.clone(),
        community_id: chatroom.community_id.clone(),
        text: chatroom.title.clone(),
        member: chatroom.member.clone(),
        created_epoch: chatroom.date_epoch,
        date: chatroom.date.clone(),
        status: ConversationStatus::Sent,
        state: ConversationState::ChatroomHeader,
        reactions: chatroom.reactions.clone(),
        ..Default::default()
    })
}
