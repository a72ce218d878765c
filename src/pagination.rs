//! Paginated history loading around the bottom, top, or an anchored
//! conversation, with boundary tracking and the live-push settle window.

use crate::client::ChatroomClient;
use crate::error::Result;
use crate::store::traits::{FetchDirection, FetchRequest};
use crate::types::events::ScrollDirection;
use std::sync::Arc;
use std::sync::atomic::Ordering;

impl ChatroomClient {
    /// Load the newest page and rebuild the list from it. When the page is
    /// short the oldest boundary is already visible, so the chatroom header
    /// row is synthesized in.
    pub async fn fetch_bottom(self: &Arc<Self>, on_button_clicked: bool) -> Result<()> {
        let limit = self.config.fetch_limit;
        let conversations = self
            .store
            .fetch_conversations(FetchRequest::bottom(&self.chatroom_id, limit))
            .await?;
        let reached_boundary = conversations.len() < limit;
        let header = if reached_boundary {
            self.header_conversation().await
        } else {
            None
        };
        let purge_shimmer = self.is_ai_chatbot().await;

        let mut state = self.state.lock().await;
        state.messages = conversations.clone();
        state.index.bulk_replace(conversations);
        if let Some(header) = header {
            self.upsert_locked(&mut state, header, purge_shimmer);
        }
        drop(state);

        self.begin_live_settle(!on_button_clicked);
        self.emit_scroll_to_bottom(true);
        self.track_last_conversation_exist
            .store(reached_boundary, Ordering::Relaxed);
        Ok(())
    }

    /// Load the oldest page (deep link to the chatroom itself).
    pub async fn fetch_top(self: &Arc<Self>) -> Result<()> {
        let limit = self.config.fetch_limit;
        let conversations = self
            .store
            .fetch_conversations(FetchRequest::top(&self.chatroom_id, limit))
            .await?;
        let reached_bottom = conversations.len() < limit;
        let header = self.header_conversation().await;
        let purge_shimmer = self.is_ai_chatbot().await;

        let mut state = self.state.lock().await;
        state.messages = conversations.clone();
        state.index.bulk_replace(conversations);
        if let Some(header) = header {
            self.upsert_locked(&mut state, header, purge_shimmer);
        }
        drop(state);

        self.track_last_conversation_exist
            .store(reached_bottom, Ordering::Relaxed);
        self.emit_scroll_to_message(0, 0, false);
        Ok(())
    }

    /// Scroll-driven pagination from the UI.
    pub async fn fetch_more(
        self: &Arc<Self>,
        conversation_id: &str,
        direction: ScrollDirection,
    ) -> Result<()> {
        let fetch_direction = match direction {
            ScrollDirection::Up => FetchDirection::Above,
            ScrollDirection::Down => FetchDirection::Below,
        };
        self.fetch_on_scroll(conversation_id, fetch_direction).await
    }

    async fn fetch_on_scroll(
        self: &Arc<Self>,
        conversation_id: &str,
        direction: FetchDirection,
    ) -> Result<()> {
        let anchor = {
            let state = self.state.lock().await;
            state
                .messages
                .iter()
                .find(|m| m.id.as_deref() == Some(conversation_id))
                .cloned()
        };
        let anchor = match anchor {
            Some(anchor) => anchor,
            None => match self.store.get_conversation(conversation_id).await? {
                Some(anchor) => anchor,
                None => return Ok(()),
            },
        };

        let limit = self.config.fetch_limit;
        let mut conversations = self
            .store
            .fetch_conversations(FetchRequest::anchored(
                &self.chatroom_id,
                limit,
                anchor,
                direction,
            ))
            .await?;
        if conversations.is_empty() {
            // Empty page means boundary, not error.
            if direction == FetchDirection::Below {
                self.track_last_conversation_exist
                    .store(true, Ordering::Relaxed);
            }
            return Ok(());
        }
        if direction == FetchDirection::Below && conversations.len() < limit {
            self.track_last_conversation_exist
                .store(true, Ordering::Relaxed);
        }
        if direction == FetchDirection::Above && conversations.len() < limit {
            if let Some(header) = self.header_conversation().await {
                conversations.insert(0, header);
            }
        }

        let purge_shimmer = self.is_ai_chatbot().await;
        let mut state = self.state.lock().await;
        for conversation in conversations {
            self.upsert_locked(&mut state, conversation, purge_shimmer);
        }
        state.index.sort();
        drop(state);

        self.emit_reloaded(Some(match direction {
            FetchDirection::Above => ScrollDirection::Up,
            _ => ScrollDirection::Down,
        }));
        Ok(())
    }

    /// Open the window around a searched/deep-linked conversation: one page
    /// above, the anchor itself, one page below.
    pub async fn fetch_intermediate(self: &Arc<Self>, conversation_id: &str) -> Result<()> {
        let Some(median) = self.store.get_conversation(conversation_id).await? else {
            if conversation_id == self.chatroom_id {
                return self.fetch_top().await;
            }
            return Ok(());
        };
        let limit = self.config.fetch_limit;
        let above = self
            .store
            .fetch_conversations(FetchRequest::anchored(
                &self.chatroom_id,
                limit,
                median.clone(),
                FetchDirection::Above,
            ))
            .await?;
        let below = self
            .store
            .fetch_conversations(FetchRequest::anchored(
                &self.chatroom_id,
                limit,
                median.clone(),
                FetchDirection::Below,
            ))
            .await?;

        let mut all = above;
        let reached_top = all.len() < limit;
        all.push(median.clone());
        all.extend(below);
        if reached_top {
            if let Some(header) = self.header_conversation().await {
                all.insert(0, header);
            }
        }
        let total = all.len();

        let mut state = self.state.lock().await;
        state.messages = all.clone();
        state.index.bulk_replace(all);
        let located = state.index.locate(median.key());
        drop(state);

        if let Some((section, row)) = located {
            self.emit_scroll_to_message(section, row, false);
        }
        self.begin_live_settle(true);
        self.track_last_conversation_exist
            .store(total < limit, Ordering::Relaxed);
        Ok(())
    }

    /// Open (or close) the settle window during which live-observation
    /// batches are dropped. Timer-based: cleared on a fixed delay after the
    /// initiating fetch rather than on a completion signal.
    pub(crate) fn begin_live_settle(self: &Arc<Self>, enable: bool) {
        if !enable {
            self.fetching_initial_bottom_data
                .store(false, Ordering::Relaxed);
            return;
        }
        self.fetching_initial_bottom_data
            .store(true, Ordering::Relaxed);
        let client = Arc::clone(self);
        let delay = self.config.live_settle_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            client
                .fetching_initial_bottom_data
                .store(false, Ordering::Relaxed);
        });
    }
}
