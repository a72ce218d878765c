//! Contracts for the external collaborators the sync core is built against:
//! the durable conversation store (fetch, lookup, live observation, local
//! persistence), the server API, and the attachment upload transport.
//!
//! Store methods return typed [`StoreError`]s; the server API and uploader
//! return opaque `anyhow` errors which the core converts into its own
//! taxonomy at the boundary.

use crate::store::error::Result;
use crate::types::chatroom::Chatroom;
use crate::types::message::{Attachment, Conversation, ConversationStatus, OgTags};
use crate::types::poll::{PollOption, PollSelectState, PollType};
use async_trait::async_trait;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchDirection {
    /// Older than the anchor.
    Above,
    /// Newer than the anchor.
    Below,
    /// Oldest page of the chatroom.
    Top,
    /// Newest page of the chatroom.
    Bottom,
}

#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub chatroom_id: String,
    pub limit: usize,
    pub anchor: Option<Conversation>,
    pub direction: FetchDirection,
}

impl FetchRequest {
    pub fn bottom(chatroom_id: &str, limit: usize) -> Self {
        Self {
            chatroom_id: chatroom_id.to_owned(),
            limit,
            anchor: None,
            direction: FetchDirection::Bottom,
        }
    }

    pub fn top(chatroom_id: &str, limit: usize) -> Self {
        Self {
            chatroom_id: chatroom_id.to_owned(),
            limit,
            anchor: None,
            direction: FetchDirection::Top,
        }
    }

    pub fn anchored(
        chatroom_id: &str,
        limit: usize,
        anchor: Conversation,
        direction: FetchDirection,
    ) -> Self {
        Self {
            chatroom_id: chatroom_id.to_owned(),
            limit,
            anchor: Some(anchor),
            direction,
        }
    }
}

/// One delivery from the live-observation subscription. Batches arrive at
/// unpredictable times relative to pagination fetches.
#[derive(Debug, Clone)]
pub enum LiveBatch {
    /// Conversations this client posted, now durably stored.
    Posted(Vec<Conversation>),
    /// Existing conversations whose content changed (edit, reaction, delete).
    Changed(Vec<Conversation>),
    /// Conversations newly arrived from other members.
    New(Vec<Conversation>),
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn fetch_conversations(&self, request: FetchRequest) -> Result<Vec<Conversation>>;

    async fn get_conversation(&self, conversation_id: &str) -> Result<Option<Conversation>>;

    async fn get_chatroom(&self, chatroom_id: &str) -> Result<Option<Chatroom>>;

    /// Persist an optimistic local conversation so it survives restarts.
    async fn save_temporary_conversation(&self, conversation: &Conversation) -> Result<()>;

    /// Persist the server-confirmed replacement of a temporary conversation.
    async fn save_posted_conversation(&self, conversation: &Conversation) -> Result<()>;

    async fn update_conversation_status(
        &self,
        conversation_key: &str,
        status: ConversationStatus,
    ) -> Result<()>;

    async fn delete_temporary_conversation(&self, conversation_id: &str) -> Result<()>;

    /// Subscribe to live conversation batches for a chatroom. Dropping the
    /// receiver ends the subscription.
    fn observe_conversations(&self, chatroom_id: &str) -> mpsc::Receiver<LiveBatch>;
}

#[derive(Debug, Clone, Default)]
pub struct PostConversationRequest {
    pub chatroom_id: String,
    pub text: String,
    pub temporary_id: String,
    pub reply_conversation_id: Option<String>,
    pub attachments: Vec<Attachment>,
    pub share_link: Option<String>,
    pub og_tags: Option<OgTags>,
    pub metadata: Option<serde_json::Value>,
    pub trigger_bot: bool,
}

#[derive(Debug, Clone)]
pub struct PostPollRequest {
    pub chatroom_id: String,
    pub question: String,
    pub temporary_id: String,
    pub options: Vec<String>,
    pub poll_type: PollType,
    pub expiry_epoch: i64,
    pub is_anonymous: bool,
    pub allow_add_option: bool,
    pub multiple_select_num: Option<usize>,
    pub multiple_select_state: Option<PollSelectState>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionTarget {
    Conversation,
    Chatroom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncLoadKind {
    /// Chatroom opened for the first time: full history backfill.
    FirstTime,
    /// Chatroom reopened: catch up from the stored watermark.
    Reopen,
}

#[async_trait]
pub trait ConversationApi: Send + Sync {
    async fn post_conversation(
        &self,
        request: PostConversationRequest,
    ) -> anyhow::Result<Conversation>;

    async fn post_poll_conversation(&self, request: PostPollRequest)
    -> anyhow::Result<Conversation>;

    async fn submit_poll(
        &self,
        chatroom_id: &str,
        conversation_id: &str,
        options: Vec<PollOption>,
    ) -> anyhow::Result<()>;

    async fn add_poll_option(&self, conversation_id: &str, text: &str) -> anyhow::Result<()>;

    /// Edit a posted conversation's text. The updated conversation flows
    /// back through the live-observation feed as a `Changed` batch.
    async fn edit_conversation(
        &self,
        conversation_id: &str,
        text: &str,
        share_link: Option<&str>,
    ) -> anyhow::Result<()>;

    async fn put_reaction(
        &self,
        target: ReactionTarget,
        target_id: &str,
        emoji: &str,
    ) -> anyhow::Result<()>;

    async fn delete_reaction(&self, target: ReactionTarget, target_id: &str) -> anyhow::Result<()>;

    async fn delete_conversations(&self, conversation_ids: &[String]) -> anyhow::Result<()>;

    async fn mark_read(&self, chatroom_id: &str) -> anyhow::Result<()>;

    async fn follow_chatroom(&self, chatroom_id: &str, value: bool) -> anyhow::Result<()>;

    async fn mute_chatroom(&self, chatroom_id: &str, value: bool) -> anyhow::Result<()>;

    async fn leave_chatroom(&self, chatroom_id: &str) -> anyhow::Result<()>;

    /// Run a history sync for the chatroom, resolving once the local store
    /// is caught up. Explicit completion, no broadcast side-channel.
    async fn sync_conversations(&self, chatroom_id: &str, kind: SyncLoadKind)
    -> anyhow::Result<()>;
}

#[async_trait]
pub trait AttachmentUploader: Send + Sync {
    /// Upload local files and return the same attachments with their remote
    /// URLs resolved. Errors abort the enclosing send.
    async fn upload(
        &self,
        chatroom_id: &str,
        attachments: Vec<Attachment>,
    ) -> anyhow::Result<Vec<Attachment>>;
}
