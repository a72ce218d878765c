//! In-memory collaborators used by the integration tests and as a reference
//! for what the store/API contracts expect of a real backend.

use crate::store::error::{Result, StoreError};
use crate::store::traits::*;
use crate::types::chatroom::Chatroom;
use crate::types::message::{
    Attachment, Conversation, ConversationState, ConversationStatus, date_key, now_epoch_ms,
};
use crate::types::poll::{PollInfo, PollOption};
use anyhow::bail;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::mpsc;

const OBSERVER_CHANNEL_CAPACITY: usize = 16;

#[derive(Default)]
pub struct MemoryStore {
    conversations: Mutex<Vec<Conversation>>,
    chatrooms: Mutex<HashMap<String, Chatroom>>,
    observers: Mutex<Vec<(String, mpsc::Sender<LiveBatch>)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_chatroom(&self, chatroom: Chatroom) {
        self.chatrooms
            .lock()
            .unwrap()
            .insert(chatroom.id.clone(), chatroom);
    }

    pub fn seed_conversations(&self, conversations: Vec<Conversation>) {
        let mut all = self.conversations.lock().unwrap();
        all.extend(conversations);
        all.sort_by(|a, b| {
            a.created_epoch
                .cmp(&b.created_epoch)
                .then_with(|| a.key().cmp(b.key()))
        });
    }

    /// Deliver a live batch to every observer of the chatroom, as the real
    /// backend does after a sync or a remote post.
    pub async fn push_live(&self, chatroom_id: &str, batch: LiveBatch) {
        let senders: Vec<_> = self
            .observers
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id == chatroom_id)
            .map(|(_, tx)| tx.clone())
            .collect();
        for tx in senders {
            let _ = tx.send(batch.clone()).await;
        }
    }

    pub fn stored_conversation(&self, key: &str) -> Option<Conversation> {
        self.conversations
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.key() == key || c.temporary_id.as_deref() == Some(key))
            .cloned()
    }

    fn sorted_for(&self, chatroom_id: &str) -> Vec<Conversation> {
        let mut list: Vec<Conversation> = self
            .conversations
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.chatroom_id == chatroom_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| {
            a.created_epoch
                .cmp(&b.created_epoch)
                .then_with(|| a.key().cmp(b.key()))
        });
        list
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn fetch_conversations(&self, request: FetchRequest) -> Result<Vec<Conversation>> {
        let list = self.sorted_for(&request.chatroom_id);
        let page = match request.direction {
            FetchDirection::Bottom => {
                let skip = list.len().saturating_sub(request.limit);
                list.into_iter().skip(skip).collect()
            }
            FetchDirection::Top => list.into_iter().take(request.limit).collect(),
            FetchDirection::Above => {
                let anchor = request
                    .anchor
                    .ok_or_else(|| StoreError::NotFound("fetch anchor".into()))?;
                let older: Vec<_> = list
                    .into_iter()
                    .filter(|c| c.created_epoch < anchor.created_epoch)
                    .collect();
                let skip = older.len().saturating_sub(request.limit);
                older.into_iter().skip(skip).collect()
            }
            FetchDirection::Below => {
                let anchor = request
                    .anchor
                    .ok_or_else(|| StoreError::NotFound("fetch anchor".into()))?;
                list.into_iter()
                    .filter(|c| c.created_epoch > anchor.created_epoch)
                    .take(request.limit)
                    .collect()
            }
        };
        Ok(page)
    }

    async fn get_conversation(&self, conversation_id: &str) -> Result<Option<Conversation>> {
        Ok(self.stored_conversation(conversation_id))
    }

    async fn get_chatroom(&self, chatroom_id: &str) -> Result<Option<Chatroom>> {
        Ok(self.chatrooms.lock().unwrap().get(chatroom_id).cloned())
    }

    async fn save_temporary_conversation(&self, conversation: &Conversation) -> Result<()> {
        let mut all = self.conversations.lock().unwrap();
        match all.iter_mut().find(|c| c.matches(conversation)) {
            Some(slot) => *slot = conversation.clone(),
            None => all.push(conversation.clone()),
        }
        Ok(())
    }

    async fn save_posted_conversation(&self, conversation: &Conversation) -> Result<()> {
        self.save_temporary_conversation(conversation).await
    }

    async fn update_conversation_status(
        &self,
        conversation_key: &str,
        status: ConversationStatus,
    ) -> Result<()> {
        let mut all = self.conversations.lock().unwrap();
        let slot = all
            .iter_mut()
            .find(|c| c.key() == conversation_key || c.temporary_id.as_deref() == Some(conversation_key))
            .ok_or_else(|| StoreError::NotFound(conversation_key.to_owned()))?;
        slot.status = status;
        Ok(())
    }

    async fn delete_temporary_conversation(&self, conversation_id: &str) -> Result<()> {
        self.conversations
            .lock()
            .unwrap()
            .retain(|c| c.key() != conversation_id);
        Ok(())
    }

    fn observe_conversations(&self, chatroom_id: &str) -> mpsc::Receiver<LiveBatch> {
        let (tx, rx) = mpsc::channel(OBSERVER_CHANNEL_CAPACITY);
        self.observers
            .lock()
            .unwrap()
            .push((chatroom_id.to_owned(), tx));
        rx
    }
}

/// Server API stub: assigns monotonically increasing ids and records calls.
/// Failure injection flags simulate network errors per operation family.
#[derive(Default)]
pub struct MemoryApi {
    next_id: AtomicU64,
    pub fail_posts: AtomicBool,
    pub fail_submissions: AtomicBool,
    posted: Mutex<Vec<Conversation>>,
    submitted: Mutex<Vec<(String, Vec<PollOption>)>>,
    reactions: Mutex<Vec<(ReactionTarget, String, String)>>,
    deleted: Mutex<Vec<String>>,
    edits: Mutex<Vec<(String, String)>>,
    follows: Mutex<Vec<(String, bool)>>,
    synced: Mutex<Vec<(String, SyncLoadKind)>>,
    mark_read_calls: AtomicU64,
}

impl MemoryApi {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1_000),
            ..Default::default()
        }
    }

    fn assign_id(&self) -> String {
        self.next_id.fetch_add(1, Ordering::Relaxed).to_string()
    }

    pub fn posted(&self) -> Vec<Conversation> {
        self.posted.lock().unwrap().clone()
    }

    pub fn submitted_polls(&self) -> Vec<(String, Vec<PollOption>)> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn reaction_log(&self) -> Vec<(ReactionTarget, String, String)> {
        self.reactions.lock().unwrap().clone()
    }

    pub fn deleted_ids(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn edit_log(&self) -> Vec<(String, String)> {
        self.edits.lock().unwrap().clone()
    }

    pub fn follow_log(&self) -> Vec<(String, bool)> {
        self.follows.lock().unwrap().clone()
    }

    pub fn sync_log(&self) -> Vec<(String, SyncLoadKind)> {
        self.synced.lock().unwrap().clone()
    }

    pub fn mark_read_count(&self) -> u64 {
        self.mark_read_calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ConversationApi for MemoryApi {
    async fn post_conversation(
        &self,
        request: PostConversationRequest,
    ) -> anyhow::Result<Conversation> {
        if self.fail_posts.load(Ordering::Relaxed) {
            bail!("post rejected by server");
        }
        let now = now_epoch_ms();
        let conversation = Conversation {
            id: Some(self.assign_id()),
            temporary_id: Some(request.temporary_id),
            chatroom_id: request.chatroom_id,
            text: request.text,
            created_epoch: now,
            date: date_key(now),
            status: ConversationStatus::Sent,
            reply_conversation_id: request.reply_conversation_id,
            attachment_uploaded: !request.attachments.is_empty(),
            attachments: request.attachments,
            og_tags: request.og_tags,
            metadata: request.metadata,
            ..Default::default()
        };
        self.posted.lock().unwrap().push(conversation.clone());
        Ok(conversation)
    }

    async fn post_poll_conversation(
        &self,
        request: PostPollRequest,
    ) -> anyhow::Result<Conversation> {
        if self.fail_posts.load(Ordering::Relaxed) {
            bail!("post rejected by server");
        }
        let now = now_epoch_ms();
        let id = self.assign_id();
        let options = request
            .options
            .iter()
            .enumerate()
            .map(|(i, text)| PollOption {
                id: format!("{id}-{i}"),
                text: text.clone(),
                ..Default::default()
            })
            .collect();
        let conversation = Conversation {
            id: Some(id),
            temporary_id: Some(request.temporary_id),
            chatroom_id: request.chatroom_id,
            text: request.question,
            created_epoch: now,
            date: date_key(now),
            status: ConversationStatus::Sent,
            state: ConversationState::MicroPoll,
            poll: Some(PollInfo {
                options,
                expiry_epoch: request.expiry_epoch,
                multiple_select_num: request.multiple_select_num,
                multiple_select_state: request.multiple_select_state,
                poll_type: request.poll_type,
                is_anonymous: request.is_anonymous,
                allow_add_option: request.allow_add_option,
                to_show_results: false,
            }),
            ..Default::default()
        };
        self.posted.lock().unwrap().push(conversation.clone());
        Ok(conversation)
    }

    async fn submit_poll(
        &self,
        _chatroom_id: &str,
        conversation_id: &str,
        options: Vec<PollOption>,
    ) -> anyhow::Result<()> {
        if self.fail_submissions.load(Ordering::Relaxed) {
            bail!("poll submission rejected");
        }
        self.submitted
            .lock()
            .unwrap()
            .push((conversation_id.to_owned(), options));
        Ok(())
    }

    async fn edit_conversation(
        &self,
        conversation_id: &str,
        text: &str,
        _share_link: Option<&str>,
    ) -> anyhow::Result<()> {
        self.edits
            .lock()
            .unwrap()
            .push((conversation_id.to_owned(), text.to_owned()));
        Ok(())
    }

    async fn add_poll_option(&self, conversation_id: &str, text: &str) -> anyhow::Result<()> {
        if self.fail_submissions.load(Ordering::Relaxed) {
            bail!("add option rejected");
        }
        self.submitted.lock().unwrap().push((
            conversation_id.to_owned(),
            vec![PollOption {
                text: text.to_owned(),
                ..Default::default()
            }],
        ));
        Ok(())
    }

    async fn put_reaction(
        &self,
        target: ReactionTarget,
        target_id: &str,
        emoji: &str,
    ) -> anyhow::Result<()> {
        self.reactions
            .lock()
            .unwrap()
            .push((target, target_id.to_owned(), emoji.to_owned()));
        Ok(())
    }

    async fn delete_reaction(&self, target: ReactionTarget, target_id: &str) -> anyhow::Result<()> {
        self.reactions
            .lock()
            .unwrap()
            .push((target, target_id.to_owned(), String::new()));
        Ok(())
    }

    async fn delete_conversations(&self, conversation_ids: &[String]) -> anyhow::Result<()> {
        self.deleted
            .lock()
            .unwrap()
            .extend(conversation_ids.iter().cloned());
        Ok(())
    }

    async fn mark_read(&self, _chatroom_id: &str) -> anyhow::Result<()> {
        self.mark_read_calls.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn follow_chatroom(&self, chatroom_id: &str, value: bool) -> anyhow::Result<()> {
        self.follows
            .lock()
            .unwrap()
            .push((chatroom_id.to_owned(), value));
        Ok(())
    }

    async fn mute_chatroom(&self, _chatroom_id: &str, _value: bool) -> anyhow::Result<()> {
        Ok(())
    }

    async fn leave_chatroom(&self, _chatroom_id: &str) -> anyhow::Result<()> {
        Ok(())
    }

    async fn sync_conversations(
        &self,
        chatroom_id: &str,
        kind: SyncLoadKind,
    ) -> anyhow::Result<()> {
        self.synced
            .lock()
            .unwrap()
            .push((chatroom_id.to_owned(), kind));
        Ok(())
    }
}

/// Upload transport stub: resolves each attachment to a deterministic URL.
#[derive(Default)]
pub struct MemoryUploader {
    pub fail: AtomicBool,
    uploads: AtomicU64,
}

impl MemoryUploader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upload_count(&self) -> u64 {
        self.uploads.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl AttachmentUploader for MemoryUploader {
    async fn upload(
        &self,
        chatroom_id: &str,
        attachments: Vec<Attachment>,
    ) -> anyhow::Result<Vec<Attachment>> {
        if self.fail.load(Ordering::Relaxed) {
            bail!("upload transport failure");
        }
        self.uploads.fetch_add(1, Ordering::Relaxed);
        Ok(attachments
            .into_iter()
            .enumerate()
            .map(|(i, mut attachment)| {
                let name = attachment.name.clone().unwrap_or_else(|| i.to_string());
                attachment.url = Some(format!("https://cdn.example/{chatroom_id}/{name}"));
                attachment
            })
            .collect())
    }
}
