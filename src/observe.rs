//! Live-observation handling: a background task drains the store's
//! subscription channel and reconciles each batch into the list.

use crate::client::ChatroomClient;
use crate::store::traits::LiveBatch;
use log::debug;
use std::sync::Arc;
use std::sync::atomic::Ordering;

impl ChatroomClient {
    /// Subscribe to the chatroom's live conversation feed. Replaces any
    /// previous subscription task.
    pub(crate) fn start_observing(self: &Arc<Self>) {
        let mut rx = self.store.observe_conversations(&self.chatroom_id);
        let client = Arc::clone(self);
        let task = tokio::spawn(async move {
            while let Some(batch) = rx.recv().await {
                client.apply_live_batch(batch).await;
            }
            debug!("live observation ended for chatroom {}", client.chatroom_id);
        });
        if let Some(previous) = self.observe_task.lock().unwrap().replace(task) {
            previous.abort();
        }
    }

    pub(crate) async fn apply_live_batch(&self, batch: LiveBatch) {
        // While the initial page is still settling, applying pushes would
        // double-insert rows the fetch is about to render.
        if self.fetching_initial_bottom_data.load(Ordering::Relaxed) {
            debug!(
                "dropping live batch for chatroom {} while initial window settles",
                self.chatroom_id
            );
            return;
        }
        match batch {
            LiveBatch::Posted(conversations) | LiveBatch::Changed(conversations) => {
                if conversations.is_empty() {
                    return;
                }
                for conversation in conversations {
                    self.upsert(conversation).await;
                }
                self.emit_reloaded(None);
                self.mark_chatroom_read().await;
            }
            LiveBatch::New(conversations) => {
                if conversations.is_empty() {
                    return;
                }
                for conversation in conversations {
                    // Hold back rows whose attachments are still uploading;
                    // a later Changed delivery carries the resolved upload.
                    if conversation.has_attachments() && !conversation.attachment_uploaded {
                        continue;
                    }
                    self.upsert(conversation).await;
                }
                self.emit_scroll_to_bottom(false);
                self.mark_chatroom_read().await;
            }
        }
    }
}
