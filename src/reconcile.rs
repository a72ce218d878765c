//! The reconciliation engine: every code path that mutates the message list
//! funnels through [`ChatroomClient::upsert`], which decides whether an
//! incoming conversation is a new entry, an update to an existing
//! (possibly optimistic) entry, or a duplicate.

use crate::client::{ChatroomClient, ListState};
use crate::types::message::{Conversation, ConversationState};
use log::{debug, warn};

impl ChatroomClient {
    /// Merge one conversation into the cache and section index by identity.
    pub async fn upsert(&self, conversation: Conversation) {
        let purge_shimmer = self.is_ai_chatbot().await;
        let mut state = self.state.lock().await;
        self.upsert_locked(&mut state, conversation, purge_shimmer);
    }

    /// Identity resolution: an entry matches on server id, or on the
    /// temporary id when the incoming conversation is the server ack of an
    /// optimistic send. Matches replace in place; misses append.
    pub(crate) fn upsert_locked(
        &self,
        state: &mut ListState,
        conversation: Conversation,
        purge_shimmer_on_insert: bool,
    ) {
        if let Some(slot) = state.messages.iter_mut().find(|m| m.matches(&conversation)) {
            *slot = conversation.clone();
            if !state.index.update(&conversation) {
                // The cache matched but the index row is missing or moved
                // buckets. Insert rather than drop the update.
                warn!(
                    "stale reconciliation for {}: no row in bucket {:?}, inserting",
                    conversation.key(),
                    conversation.date
                );
                state.index.insert(conversation);
            }
        } else {
            if purge_shimmer_on_insert && conversation.state != ConversationState::BubbleShimmer {
                let before = state.messages.len();
                state
                    .messages
                    .retain(|m| m.state != ConversationState::BubbleShimmer);
                let purged = before - state.messages.len();
                state.index.purge_shimmer();
                if purged > 0 {
                    debug!("purged {purged} shimmer row(s) before inserting {}", conversation.key());
                }
            }
            state.messages.push(conversation.clone());
            state.index.insert(conversation);
        }
    }
}
