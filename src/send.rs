//! Optimistic send: a message becomes visible (and durable) immediately
//! under a client-minted temporary id, then a background task uploads its
//! attachments and posts it. The server ack reconciles back over the
//! optimistic row by temporary-id identity.

use crate::client::ChatroomClient;
use crate::error::{ChatError, Result};
use crate::store::traits::{PostConversationRequest, PostPollRequest};
use crate::types::message::{
    Attachment, Conversation, ConversationState, ConversationStatus, OgTags, date_key,
    now_epoch_ms,
};
use crate::types::poll::{PollInfo, PollOption, PollSelectState, PollType};
use log::{error, warn};
use rand::Rng;
use std::sync::Arc;
use std::sync::atomic::Ordering;

#[derive(Debug, Clone, Default)]
pub struct NewMessage {
    pub text: String,
    /// Attachments with local paths set; uploaded before the post.
    pub attachments: Vec<Attachment>,
    pub reply_conversation_id: Option<String>,
    pub share_link: Option<String>,
    pub og_tags: Option<OgTags>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct NewPollMessage {
    pub question: String,
    pub options: Vec<String>,
    pub poll_type: PollType,
    pub expiry_epoch: i64,
    pub is_anonymous: bool,
    pub allow_add_option: bool,
    pub multiple_select_num: Option<usize>,
    pub multiple_select_state: Option<PollSelectState>,
}

/// Everything the background pipeline needs to finish one send.
#[derive(Debug, Clone)]
pub(crate) struct SendJob {
    pub(crate) temporary_id: String,
    pub(crate) text: String,
    pub(crate) reply_conversation_id: Option<String>,
    pub(crate) share_link: Option<String>,
    pub(crate) og_tags: Option<OgTags>,
    pub(crate) metadata: Option<serde_json::Value>,
    pub(crate) attachments: Vec<Attachment>,
}

impl ChatroomClient {
    /// Post a message. Returns the temporary id the optimistic row was
    /// minted under; the eventual server ack replaces that row in place.
    pub async fn post_message(self: &Arc<Self>, new_message: NewMessage) -> Result<String> {
        let Some(_community_id) = self.community_id().await else {
            warn!(
                "post aborted: no community id for chatroom {}",
                self.chatroom_id
            );
            return Err(ChatError::MissingIdentifier("community id"));
        };
        if !self.track_last_conversation_exist.load(Ordering::Relaxed) {
            self.fetch_bottom(false).await?;
        }

        let temporary_id = generate_temporary_id();
        let mut temp = self.temporary_conversation(&temporary_id, &new_message).await;
        if temp.reply_conversation.is_none() {
            if let Some(reply_id) = temp.reply_conversation_id.clone() {
                if let Ok(Some(reply)) = self.store.get_conversation(&reply_id).await {
                    temp.reply_conversation = Some(Box::new(reply));
                }
            }
        }
        self.store.save_temporary_conversation(&temp).await?;
        self.upsert(temp).await;
        self.emit_scroll_to_bottom(true);

        let job = SendJob {
            temporary_id: temporary_id.clone(),
            text: new_message.text,
            reply_conversation_id: new_message.reply_conversation_id,
            share_link: new_message.share_link,
            og_tags: new_message.og_tags,
            metadata: new_message.metadata,
            attachments: new_message.attachments,
        };
        let client = Arc::clone(self);
        tokio::spawn(async move {
            client.run_send_pipeline(job).await;
        });
        Ok(temporary_id)
    }

    /// Post a poll message. Same optimistic path as `post_message`, minus
    /// attachments.
    pub async fn post_poll_message(self: &Arc<Self>, new_poll: NewPollMessage) -> Result<String> {
        let Some(_community_id) = self.community_id().await else {
            warn!(
                "poll post aborted: no community id for chatroom {}",
                self.chatroom_id
            );
            return Err(ChatError::MissingIdentifier("community id"));
        };
        if !self.track_last_conversation_exist.load(Ordering::Relaxed) {
            self.fetch_bottom(false).await?;
        }

        let temporary_id = generate_temporary_id();
        let now = now_epoch_ms();
        let temp = Conversation {
            temporary_id: Some(temporary_id.clone()),
            chatroom_id: self.chatroom_id.clone(),
            community_id: self.community_id().await,
            text: new_poll.question.clone(),
            member: Some(self.config.member.clone()),
            created_epoch: now,
            date: date_key(now),
            status: ConversationStatus::Sending,
            state: ConversationState::MicroPoll,
            poll: Some(PollInfo {
                options: new_poll
                    .options
                    .iter()
                    .enumerate()
                    .map(|(i, text)| PollOption {
                        id: format!("{temporary_id}-{i}"),
                        text: text.clone(),
                        added_by: Some(self.config.member.clone()),
                        ..Default::default()
                    })
                    .collect(),
                expiry_epoch: new_poll.expiry_epoch,
                multiple_select_num: new_poll.multiple_select_num,
                multiple_select_state: new_poll.multiple_select_state,
                poll_type: new_poll.poll_type,
                is_anonymous: new_poll.is_anonymous,
                allow_add_option: new_poll.allow_add_option,
                to_show_results: false,
            }),
            ..Default::default()
        };
        self.store.save_temporary_conversation(&temp).await?;
        self.upsert(temp).await;
        self.emit_scroll_to_bottom(true);

        let request = PostPollRequest {
            chatroom_id: self.chatroom_id.clone(),
            question: new_poll.question,
            temporary_id: temporary_id.clone(),
            options: new_poll.options,
            poll_type: new_poll.poll_type,
            expiry_epoch: new_poll.expiry_epoch,
            is_anonymous: new_poll.is_anonymous,
            allow_add_option: new_poll.allow_add_option,
            multiple_select_num: new_poll.multiple_select_num,
            multiple_select_state: new_poll.multiple_select_state,
        };
        let client = Arc::clone(self);
        let temp_id = temporary_id.clone();
        tokio::spawn(async move {
            match client.api.post_poll_conversation(request).await {
                Ok(mut conversation) => {
                    conversation.status = ConversationStatus::Sent;
                    client.on_conversation_posted(conversation, false).await;
                }
                Err(e) => {
                    warn!("poll post failed for {temp_id}: {e:#}");
                    client.toast("Failed to create poll");
                    client.mark_send_failed(&temp_id).await;
                }
            }
        });
        Ok(temporary_id)
    }

    /// Upload-then-post, strictly ordered within this one message. Other
    /// sends run their own pipelines concurrently; display order is always
    /// re-derived from timestamps, so completion races are harmless.
    pub(crate) async fn run_send_pipeline(self: Arc<Self>, mut job: SendJob) {
        if !job.attachments.is_empty() {
            match self
                .uploader
                .upload(&self.chatroom_id, job.attachments.clone())
                .await
            {
                Ok(resolved) => job.attachments = resolved,
                Err(e) => {
                    error!("attachment upload failed for {}: {e:#}", job.temporary_id);
                    self.toast("Failed to upload attachments");
                    self.mark_send_failed(&job.temporary_id).await;
                    return;
                }
            }
        }

        let request = PostConversationRequest {
            chatroom_id: self.chatroom_id.clone(),
            text: job.text,
            temporary_id: job.temporary_id.clone(),
            reply_conversation_id: job.reply_conversation_id,
            attachments: job.attachments,
            share_link: job.share_link,
            og_tags: job.og_tags,
            metadata: job.metadata,
            trigger_bot: self.is_ai_chatbot().await,
        };
        match self.api.post_conversation(request).await {
            Ok(mut conversation) => {
                conversation.status = ConversationStatus::Sent;
                self.on_conversation_posted(conversation, false).await;
            }
            Err(e) => {
                warn!("post failed for {}: {e:#}", job.temporary_id);
                self.toast("Failed to send message");
                self.mark_send_failed(&job.temporary_id).await;
            }
        }
    }

    /// The server confirmed a post: persist it and reconcile it over the
    /// optimistic row. For chatbot chatrooms a shimmer placeholder is shown
    /// until the bot's reply arrives.
    pub(crate) async fn on_conversation_posted(&self, conversation: Conversation, is_retry: bool) {
        if conversation.id.is_none() {
            warn!("posted conversation missing server id, dropping");
            return;
        }
        if !is_retry {
            if let Err(e) = self.store.save_posted_conversation(&conversation).await {
                warn!("persisting posted conversation failed: {e}");
            }
            self.follow_if_needed().await;
        }
        self.upsert(conversation).await;
        self.emit_reloaded(None);
        if self.is_ai_chatbot().await {
            self.insert_shimmer().await;
        }
    }

    pub(crate) async fn mark_send_failed(&self, conversation_key: &str) {
        if let Err(e) = self
            .store
            .update_conversation_status(conversation_key, ConversationStatus::Failed)
            .await
        {
            warn!("persisting failed status for {conversation_key}: {e}");
        }
        let mut state = self.state.lock().await;
        let found = state
            .messages
            .iter()
            .find(|m| m.key() == conversation_key)
            .cloned();
        if let Some(mut failed) = found {
            failed.status = ConversationStatus::Failed;
            self.upsert_locked(&mut state, failed, false);
        }
        drop(state);
        self.emit_reloaded(None);
    }

    /// Skeleton row shown while the chatbot reply is pending; purged when
    /// the reply reconciles in.
    pub(crate) async fn insert_shimmer(&self) {
        let epoch = now_epoch_ms() + 1_000;
        let shimmer = Conversation {
            temporary_id: Some(format!("shimmer-{epoch}")),
            chatroom_id: self.chatroom_id.clone(),
            created_epoch: epoch,
            date: date_key(epoch),
            status: ConversationStatus::Sent,
            state: ConversationState::BubbleShimmer,
            ..Default::default()
        };
        let mut state = self.state.lock().await;
        self.upsert_locked(&mut state, shimmer, false);
        drop(state);
        self.emit_scroll_to_bottom(true);
    }

    async fn temporary_conversation(
        &self,
        temporary_id: &str,
        new_message: &NewMessage,
    ) -> Conversation {
        let now = now_epoch_ms();
        let mut attachments = new_message.attachments.clone();
        for (i, attachment) in attachments.iter_mut().enumerate() {
            if attachment.index.is_none() {
                attachment.index = Some(i as i32 + 1);
            }
        }
        Conversation {
            temporary_id: Some(temporary_id.to_owned()),
            chatroom_id: self.chatroom_id.clone(),
            community_id: self.community_id().await,
            text: new_message.text.clone(),
            member: Some(self.config.member.clone()),
            created_epoch: now,
            date: date_key(now),
            status: ConversationStatus::Sending,
            reply_conversation_id: new_message.reply_conversation_id.clone(),
            attachments,
            og_tags: new_message.og_tags.clone(),
            metadata: new_message.metadata.clone(),
            ..Default::default()
        }
    }
}

pub(crate) fn generate_temporary_id() -> String {
    format!("{}-{}", now_epoch_ms(), rand::rng().random::<u32>())
}
