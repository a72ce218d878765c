//! Retry for failed sends. A retry replays the original post with the
//! original temporary id, so the eventual server ack still replaces the
//! optimistic row instead of duplicating it.

use crate::client::ChatroomClient;
use crate::error::Result;
use crate::send::SendJob;
use crate::store::error::StoreError;
use crate::types::message::{Conversation, ConversationStatus};
use log::warn;
use std::sync::Arc;

impl ChatroomClient {
    /// Retry a failed message by its id or temporary id.
    ///
    /// Two shapes of failure exist: the post itself never succeeded (the
    /// stored row has only a temporary id) and the post succeeded but the
    /// attachment upload did not (server id present, `attachment_uploaded`
    /// false). Both re-resolve attachments from their local paths.
    pub async fn retry_send(self: &Arc<Self>, conversation_key: &str) -> Result<()> {
        let conversation = self
            .store
            .get_conversation(conversation_key)
            .await?
            .ok_or_else(|| StoreError::NotFound(conversation_key.to_owned()))?;

        if conversation.id.is_some() {
            if conversation.has_attachments() && !conversation.attachment_uploaded {
                self.set_status_sending(&conversation).await;
                let client = Arc::clone(self);
                tokio::spawn(async move {
                    client.run_reupload(conversation).await;
                });
            }
            return Ok(());
        }

        self.set_status_sending(&conversation).await;
        let job = SendJob {
            temporary_id: conversation.temporary_id.clone().unwrap_or_default(),
            text: conversation.text.clone(),
            reply_conversation_id: conversation.reply_conversation_id.clone(),
            share_link: conversation.og_tags.as_ref().and_then(|t| t.url.clone()),
            og_tags: conversation.og_tags.clone(),
            metadata: conversation.metadata.clone(),
            attachments: conversation.attachments,
        };
        let client = Arc::clone(self);
        tokio::spawn(async move {
            client.run_send_pipeline(job).await;
        });
        Ok(())
    }

    async fn set_status_sending(&self, conversation: &Conversation) {
        if let Err(e) = self
            .store
            .update_conversation_status(conversation.key(), ConversationStatus::Sending)
            .await
        {
            warn!("persisting sending status for {}: {e}", conversation.key());
        }
        let mut retrying = conversation.clone();
        retrying.status = ConversationStatus::Sending;
        self.upsert(retrying).await;
        self.emit_reloaded(None);
    }

    async fn run_reupload(self: Arc<Self>, mut conversation: Conversation) {
        match self
            .uploader
            .upload(&self.chatroom_id, conversation.attachments.clone())
            .await
        {
            Ok(resolved) => {
                conversation.attachments = resolved;
                conversation.attachment_uploaded = true;
                conversation.status = ConversationStatus::Sent;
                if let Err(e) = self.store.save_posted_conversation(&conversation).await {
                    warn!("persisting re-uploaded conversation failed: {e}");
                }
                self.on_conversation_posted(conversation, true).await;
            }
            Err(e) => {
                warn!("re-upload failed for {}: {e:#}", conversation.key());
                self.toast("Failed to upload attachments");
                self.mark_send_failed(conversation.key()).await;
            }
        }
    }
}
