//! Poll voting.
//!
//! Single-select polls submit on first tap. Multi-select polls compose a
//! temporary selection in a client-only overlay keyed by conversation id,
//! validated against the poll's select-mode, and submit explicitly.
//! Submitted option counts are incremented optimistically before the
//! network call.

use crate::client::ChatroomClient;
use crate::error::Result;
use crate::types::message::{Conversation, now_epoch_ms};
use crate::types::poll::{PollInfo, PollOption, PollType};
use log::{debug, warn};

pub(crate) const POLL_ENDED_MESSAGE: &str = "Poll ended. Vote cannot be submitted now.";
const POLL_SUBMITTED_MESSAGE: &str = "Your vote has been submitted";

/// Client-only vote composition state for one poll conversation. Lives
/// outside the conversation itself so render models stay immutable.
#[derive(Debug, Clone, Default)]
pub struct PollOverlay {
    pub temp_selected: Vec<String>,
    /// Deferred polls can re-open a submitted vote for editing.
    pub editing: bool,
    pub submit_enabled: bool,
}

impl ChatroomClient {
    /// Handle a tap on a poll option.
    pub async fn poll_option_selected(&self, conversation_id: &str, option_id: &str) -> Result<()> {
        let Some((conversation, poll)) = self.poll_conversation(conversation_id).await else {
            debug!("poll tap on unknown conversation {conversation_id}");
            return Ok(());
        };
        let now = now_epoch_ms();
        if poll.is_expired(now) {
            self.toast(POLL_ENDED_MESSAGE);
            return Ok(());
        }
        if poll.poll_type == PollType::Instant && poll.has_voted() {
            return Ok(());
        }
        let editing = self
            .poll_overlays
            .get(conversation_id)
            .map(|o| o.editing)
            .unwrap_or(false);
        if poll.poll_type == PollType::Deferred
            && (poll.multiple_select_num.unwrap_or(0) > 1 || poll.is_multi_select())
            && poll.has_voted()
            && !editing
        {
            return Ok(());
        }

        let Some(select_state) = poll.multiple_select_state else {
            // Single select: the first tap is the vote.
            let Some(option) = poll.options.iter().find(|o| o.id == option_id) else {
                return Ok(());
            };
            let mut chosen = option.clone();
            chosen.is_selected = true;
            chosen.vote_count += 1;
            self.apply_option_votes(&conversation, std::slice::from_ref(&chosen))
                .await;
            return self.submit_options(conversation_id, vec![chosen]).await;
        };

        let allowed = poll.multiple_select_num.unwrap_or(0);
        {
            let mut overlay = self
                .poll_overlays
                .entry(conversation_id.to_owned())
                .or_default();
            let already_selected = overlay.temp_selected.iter().any(|id| id == option_id);
            if !already_selected
                && !select_state.can_select(overlay.temp_selected.len() + 1, allowed)
            {
                drop(overlay);
                self.toast(select_state.hint(allowed));
                return Ok(());
            }
            if already_selected {
                overlay.temp_selected.retain(|id| id != option_id);
            } else {
                overlay.temp_selected.push(option_id.to_owned());
            }
            overlay.submit_enabled =
                select_state.is_submittable(overlay.temp_selected.len(), allowed);
        }

        if let Some((section, row)) = self.locate_message(conversation_id).await {
            let _ = self.event_bus.message_reloaded.send(std::sync::Arc::new(
                crate::types::events::MessageReloaded { section, row },
            ));
        }
        Ok(())
    }

    /// Submit a composed multi-select vote.
    pub async fn poll_submit(&self, conversation_id: &str) -> Result<()> {
        let Some((conversation, poll)) = self.poll_conversation(conversation_id).await else {
            return Ok(());
        };
        let Some(select_state) = poll.multiple_select_state else {
            return Ok(());
        };
        let allowed = poll.multiple_select_num.unwrap_or(0);
        let temp_selected = self
            .poll_overlays
            .get(conversation_id)
            .map(|o| o.temp_selected.clone())
            .unwrap_or_default();
        if !select_state.is_submittable(temp_selected.len(), allowed) {
            self.toast(select_state.hint(allowed));
            return Ok(());
        }

        // Optimistic: counts go up before the network call and are not
        // rolled back on failure.
        let chosen: Vec<PollOption> = temp_selected
            .iter()
            .filter_map(|option_id| poll.options.iter().find(|o| &o.id == option_id))
            .map(|option| {
                let mut chosen = option.clone();
                chosen.is_selected = true;
                chosen.vote_count += 1;
                chosen
            })
            .collect();
        self.apply_option_votes(&conversation, &chosen).await;
        self.poll_overlays.remove(conversation_id);
        self.submit_options(conversation_id, chosen).await
    }

    /// Re-open a submitted deferred vote for editing: clears every tick and
    /// the temp selection, re-enabling composition.
    pub async fn edit_vote(&self, conversation_id: &str) -> Result<()> {
        let Some((_, poll)) = self.poll_conversation(conversation_id).await else {
            return Ok(());
        };
        let now = now_epoch_ms();
        let editable = poll.poll_type == PollType::Deferred
            && poll.is_multi_select()
            && poll.has_voted()
            && !poll.is_expired(now);
        if !editable {
            return Ok(());
        }
        self.poll_overlays.insert(
            conversation_id.to_owned(),
            PollOverlay {
                editing: true,
                ..Default::default()
            },
        );
        if let Some((section, row)) = self.locate_message(conversation_id).await {
            let _ = self.event_bus.message_reloaded.send(std::sync::Arc::new(
                crate::types::events::MessageReloaded { section, row },
            ));
        }
        Ok(())
    }

    /// Add a write-in option, when the poll allows it and is still open.
    pub async fn add_poll_option(&self, conversation_id: &str, text: &str) -> Result<()> {
        let Some((_, poll)) = self.poll_conversation(conversation_id).await else {
            return Ok(());
        };
        let now = now_epoch_ms();
        if poll.is_expired(now) || poll.has_voted() || !poll.allow_add_option {
            return Ok(());
        }
        if let Err(e) = self.api.add_poll_option(conversation_id, text).await {
            warn!("add poll option failed for {conversation_id}: {e:#}");
            self.toast("Failed to add poll option");
        }
        Ok(())
    }

    async fn submit_options(&self, conversation_id: &str, options: Vec<PollOption>) -> Result<()> {
        match self
            .api
            .submit_poll(&self.chatroom_id, conversation_id, options)
            .await
        {
            Ok(()) => {
                self.toast(POLL_SUBMITTED_MESSAGE);
                Ok(())
            }
            Err(e) => {
                warn!("poll submission failed for {conversation_id}: {e:#}");
                self.toast("Failed to submit vote");
                Ok(())
            }
        }
    }

    /// Write updated options back into the poll conversation and reconcile.
    async fn apply_option_votes(&self, conversation: &Conversation, chosen: &[PollOption]) {
        let mut updated = conversation.clone();
        if let Some(poll) = updated.poll.as_mut() {
            for option in poll.options.iter_mut() {
                if let Some(vote) = chosen.iter().find(|c| c.id == option.id) {
                    *option = vote.clone();
                }
            }
        }
        self.upsert(updated).await;
        self.emit_reloaded(None);
    }

    async fn poll_conversation(&self, conversation_id: &str) -> Option<(Conversation, PollInfo)> {
        let state = self.state.lock().await;
        let conversation = state
            .messages
            .iter()
            .find(|m| m.id.as_deref() == Some(conversation_id))
            .cloned()?;
        let poll = conversation.poll.clone()?;
        Some((conversation, poll))
    }

    pub(crate) async fn locate_message(&self, conversation_key: &str) -> Option<(usize, usize)> {
        let state = self.state.lock().await;
        state.index.locate(conversation_key)
    }
}
