//! Reaction recording and aggregation.
//!
//! A member holds at most one reaction per target; that is enforced when a
//! reaction is recorded (the member's prior reaction is removed before the
//! new one is appended), not at aggregation time.

use crate::client::{ChatroomClient, chatroom_to_conversation};
use crate::error::Result;
use crate::store::traits::ReactionTarget;
use crate::types::message::{Member, Reaction};
use log::warn;

#[derive(Debug, Clone, PartialEq)]
pub struct ReactionGroup {
    pub emoji: String,
    pub member_uuids: Vec<String>,
    pub count: usize,
}

/// Collapse a flat reaction list into one entry per distinct emoji, with
/// the full member list and count. Entries are ordered by the order emojis
/// are first encountered scanning most-recent-first.
pub fn group_reactions(reactions: &[Reaction]) -> Vec<ReactionGroup> {
    let mut groups: Vec<ReactionGroup> = Vec::new();
    for reaction in reactions.iter().rev() {
        match groups.iter_mut().find(|g| g.emoji == reaction.emoji) {
            Some(group) => {
                group.member_uuids.push(reaction.member.uuid.clone());
                group.count += 1;
            }
            None => groups.push(ReactionGroup {
                emoji: reaction.emoji.clone(),
                member_uuids: vec![reaction.member.uuid.clone()],
                count: 1,
            }),
        }
    }
    groups
}

/// Replace `member`'s reaction in place: any prior entry of theirs goes
/// away before the new emoji is appended.
pub(crate) fn record_member_reaction(reactions: &mut Vec<Reaction>, member: &Member, emoji: &str) {
    reactions.retain(|r| r.member.uuid != member.uuid);
    reactions.push(Reaction {
        emoji: emoji.to_owned(),
        member: member.clone(),
    });
}

impl ChatroomClient {
    /// React to a conversation: optimistic local update first, then the
    /// server call. Server rejection leaves the optimistic state (the next
    /// live `Changed` delivery reconciles the truth back in).
    pub async fn put_conversation_reaction(&self, conversation_id: &str, emoji: &str) -> Result<()> {
        let member = self.config.member.clone();
        let updated = {
            let mut state = self.state.lock().await;
            let found = state
                .messages
                .iter()
                .find(|m| m.id.as_deref() == Some(conversation_id))
                .cloned();
            match found {
                Some(mut conversation) => {
                    record_member_reaction(&mut conversation.reactions, &member, emoji);
                    self.upsert_locked(&mut state, conversation, false);
                    true
                }
                None => false,
            }
        };
        if !updated {
            warn!("reaction on unknown conversation {conversation_id}");
            return Ok(());
        }
        self.emit_reloaded(None);

        if let Err(e) = self
            .api
            .put_reaction(ReactionTarget::Conversation, conversation_id, emoji)
            .await
        {
            warn!("put reaction failed for {conversation_id}: {e:#}");
            return Ok(());
        }
        self.follow_if_needed().await;
        Ok(())
    }

    /// React to the chatroom itself; the synthesized header row carries the
    /// updated reactions.
    pub async fn put_chatroom_reaction(&self, emoji: &str) -> Result<()> {
        let member = self.config.member.clone();
        let header = {
            let mut chatroom = self.chatroom.write().await;
            let Some(chatroom) = chatroom.as_mut() else {
                return Ok(());
            };
            record_member_reaction(&mut chatroom.reactions, &member, emoji);
            chatroom.has_reactions = !chatroom.reactions.is_empty();
            chatroom_to_conversation(chatroom)
        };
        if let Some(header) = header {
            self.upsert(header).await;
        }
        self.emit_reloaded(None);

        if let Err(e) = self
            .api
            .put_reaction(ReactionTarget::Chatroom, &self.chatroom_id, emoji)
            .await
        {
            warn!("put chatroom reaction failed: {e:#}");
        }
        Ok(())
    }

    /// Remove the logged-in member's reaction from a conversation or, when
    /// no conversation id is given, from the chatroom header.
    pub async fn delete_reaction(&self, conversation_id: Option<&str>) -> Result<()> {
        let member_uuid = self.config.member.uuid.clone();
        match conversation_id {
            Some(conversation_id) => {
                let found = {
                    let mut state = self.state.lock().await;
                    let found = state
                        .messages
                        .iter()
                        .find(|m| m.id.as_deref() == Some(conversation_id))
                        .cloned();
                    match found {
                        Some(mut conversation) => {
                            conversation
                                .reactions
                                .retain(|r| r.member.uuid != member_uuid);
                            self.upsert_locked(&mut state, conversation, false);
                            true
                        }
                        None => false,
                    }
                };
                if !found {
                    return Ok(());
                }
                self.emit_reloaded(None);
                if let Err(e) = self
                    .api
                    .delete_reaction(ReactionTarget::Conversation, conversation_id)
                    .await
                {
                    warn!("delete reaction failed for {conversation_id}: {e:#}");
                }
            }
            None => {
                let header = {
                    let mut chatroom = self.chatroom.write().await;
                    let Some(chatroom) = chatroom.as_mut() else {
                        return Ok(());
                    };
                    chatroom.reactions.retain(|r| r.member.uuid != member_uuid);
                    chatroom.has_reactions = !chatroom.reactions.is_empty();
                    chatroom_to_conversation(chatroom)
                };
                if let Some(header) = header {
                    self.upsert(header).await;
                }
                self.emit_reloaded(None);
                if let Err(e) = self
                    .api
                    .delete_reaction(ReactionTarget::Chatroom, &self.chatroom_id)
                    .await
                {
                    warn!("delete chatroom reaction failed: {e:#}");
                }
            }
        }
        Ok(())
    }
}
