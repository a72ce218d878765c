//! Immutable render snapshots handed to the embedding UI.
//!
//! The poll overlay (temp selections, edit mode) is merged here, at render
//! time, so the conversations inside the engine stay untouched by
//! composition state.

use crate::client::ChatroomClient;
use crate::poll::PollOverlay;
use crate::reaction::{ReactionGroup, group_reactions};
use crate::types::message::{
    Attachment, Conversation, ConversationState, ConversationStatus, OgTags, now_epoch_ms,
};
use crate::types::poll::{PollInfo, PollSelectState, PollType};

#[derive(Debug, Clone)]
pub struct MessageListSnapshot {
    pub sections: Vec<RenderSection>,
}

#[derive(Debug, Clone)]
pub struct RenderSection {
    pub key: String,
    pub timestamp: i64,
    pub messages: Vec<RenderMessage>,
}

#[derive(Debug, Clone)]
pub struct RenderMessage {
    /// Server id when confirmed, temporary id before.
    pub message_id: String,
    pub temporary_id: Option<String>,
    pub text: String,
    pub created_by: Option<String>,
    pub created_by_uuid: Option<String>,
    pub created_epoch: i64,
    pub status: ConversationStatus,
    pub state: ConversationState,
    pub is_incoming: bool,
    pub is_deleted: bool,
    pub is_edited: bool,
    pub attachments: Vec<Attachment>,
    pub reactions: Vec<ReactionGroup>,
    pub reply: Option<Box<RenderMessage>>,
    pub og_tags: Option<OgTags>,
    pub poll: Option<RenderPoll>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct RenderPoll {
    pub question: String,
    pub options: Vec<RenderPollOption>,
    pub expiry_epoch: i64,
    pub is_anonymous: bool,
    pub is_instant: bool,
    pub allow_add_option: bool,
    pub multiple_select_num: Option<usize>,
    pub multiple_select_state: Option<PollSelectState>,
    pub show_submit_button: bool,
    pub show_edit_vote: bool,
    pub submit_enabled: bool,
    pub editing: bool,
    pub temp_selected: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RenderPollOption {
    pub id: String,
    pub text: String,
    pub vote_count: u32,
    pub percentage: f64,
    pub is_selected: bool,
    pub added_by: Option<String>,
    pub show_tick: bool,
    pub show_vote_count: bool,
    pub show_progress: bool,
}

impl ChatroomClient {
    /// A render-ready copy of the whole list: date-bucketed, sorted, with
    /// reactions aggregated, replies resolved and poll overlays merged.
    pub async fn snapshot(&self) -> MessageListSnapshot {
        let now = now_epoch_ms();
        let member_uuid = self.config.member.uuid.clone();
        let sections: Vec<_> = {
            let state = self.state.lock().await;
            state.index.sections().to_vec()
        };

        let mut rendered = Vec::with_capacity(sections.len());
        for section in sections {
            let mut messages = Vec::with_capacity(section.messages.len());
            for mut conversation in section.messages {
                // Replies are resolved lazily, outside the state lock.
                if conversation.reply_conversation.is_none() {
                    if let Some(reply_id) = conversation.reply_conversation_id.clone() {
                        if let Ok(Some(reply)) = self.store.get_conversation(&reply_id).await {
                            conversation.reply_conversation = Some(Box::new(reply));
                        }
                    }
                }
                let overlay = conversation
                    .id
                    .as_ref()
                    .and_then(|id| self.poll_overlays.get(id).map(|o| o.value().clone()));
                messages.push(render_message(&conversation, overlay, now, &member_uuid));
            }
            rendered.push(RenderSection {
                key: section.key,
                timestamp: section.timestamp,
                messages,
            });
        }
        MessageListSnapshot { sections: rendered }
    }
}

fn render_message(
    conversation: &Conversation,
    overlay: Option<PollOverlay>,
    now: i64,
    member_uuid: &str,
) -> RenderMessage {
    let mut attachments = conversation.attachments.clone();
    attachments.sort_by_key(|a| a.index.unwrap_or(0));
    let created_by_uuid = conversation.member.as_ref().map(|m| m.uuid.clone());
    RenderMessage {
        message_id: conversation.key().to_owned(),
        temporary_id: conversation.temporary_id.clone(),
        text: conversation.text.clone(),
        created_by: conversation.member.as_ref().map(|m| m.name.clone()),
        is_incoming: created_by_uuid.as_deref() != Some(member_uuid),
        created_by_uuid,
        created_epoch: conversation.created_epoch,
        status: conversation.status,
        state: conversation.state,
        is_deleted: conversation.is_deleted(),
        is_edited: conversation.is_edited,
        attachments,
        reactions: group_reactions(&conversation.reactions),
        reply: conversation
            .reply_conversation
            .as_ref()
            .map(|reply| Box::new(render_message(reply, None, now, member_uuid))),
        og_tags: conversation.og_tags.clone(),
        poll: conversation
            .poll
            .as_ref()
            .map(|poll| render_poll(conversation, poll, overlay, now)),
        metadata: conversation.metadata.clone(),
    }
}

fn render_poll(
    conversation: &Conversation,
    poll: &PollInfo,
    overlay: Option<PollOverlay>,
    now: i64,
) -> RenderPoll {
    let overlay = overlay.unwrap_or_default();
    let expired = poll.is_expired(now);
    let voted = poll.has_voted();
    let composing = overlay.editing || !overlay.temp_selected.is_empty();
    let show_results = poll.to_show_results && !overlay.editing;

    // Wire options may repeat; render one row per option id, ordered by id.
    let mut options: Vec<_> = Vec::with_capacity(poll.options.len());
    for option in &poll.options {
        if options
            .iter()
            .all(|o: &crate::types::poll::PollOption| o.id != option.id)
        {
            options.push(option.clone());
        }
    }
    options.sort_by(|a, b| a.id.cmp(&b.id));

    RenderPoll {
        question: conversation.text.clone(),
        options: options
            .into_iter()
            .map(|option| RenderPollOption {
                show_tick: if composing {
                    overlay.temp_selected.contains(&option.id)
                } else {
                    option.is_selected
                },
                show_vote_count: show_results,
                show_progress: show_results,
                added_by: option.added_by.as_ref().map(|m| m.name.clone()),
                id: option.id,
                text: option.text,
                vote_count: option.vote_count,
                percentage: option.percentage,
                is_selected: option.is_selected,
            })
            .collect(),
        expiry_epoch: poll.expiry_epoch,
        is_anonymous: poll.is_anonymous,
        is_instant: poll.poll_type == PollType::Instant,
        allow_add_option: if overlay.editing {
            poll.allow_add_option
        } else {
            !expired && !voted && poll.allow_add_option
        },
        multiple_select_num: poll.multiple_select_num,
        multiple_select_state: poll.multiple_select_state,
        show_submit_button: overlay.editing
            || (!expired && !voted && poll.is_multi_select()),
        show_edit_vote: !expired
            && voted
            && poll.poll_type == PollType::Deferred
            && poll.is_multi_select()
            && !overlay.editing,
        submit_enabled: overlay.submit_enabled,
        editing: overlay.editing,
        temp_selected: overlay.temp_selected,
    }
}
