use crate::types::poll::PollInfo;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Post/upload lifecycle of a message. Server-confirmed conversations are
/// always `Sent`; only locally-created ones pass through `Sending`/`Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConversationStatus {
    #[default]
    Sending,
    Sent,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConversationState {
    #[default]
    Normal,
    /// Synthesized row carrying the chatroom title/description inline at the
    /// top of the timeline.
    ChatroomHeader,
    MicroPoll,
    /// Transient skeleton row shown while awaiting an asynchronous chatbot
    /// reply. Purged as soon as the real reply reconciles in.
    BubbleShimmer,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub uuid: String,
    pub name: String,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reaction {
    pub emoji: String,
    pub member: Member,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttachmentMeta {
    pub size: Option<i64>,
    pub number_of_pages: Option<i32>,
    pub duration: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    /// Explicit display order within the message.
    pub index: Option<i32>,
    /// Remote URL once the upload has resolved.
    pub url: Option<String>,
    pub thumbnail_url: Option<String>,
    /// "image" | "video" | "audio" | "pdf" | "gif"
    pub kind: String,
    pub name: Option<String>,
    /// On-device path, kept so a failed send can be replayed.
    pub local_path: Option<String>,
    pub meta: AttachmentMeta,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OgTags {
    pub url: Option<String>,
    pub image: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
}

/// A single message in a chatroom.
///
/// Identity is the server-assigned `id` OR the client-assigned
/// `temporary_id` minted before server acknowledgment; at least one is
/// always present. `created_epoch` (milliseconds) is authoritative for
/// ordering; `date` is the calendar-day bucket key derived from it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Option<String>,
    pub temporary_id: Option<String>,
    pub chatroom_id: String,
    pub community_id: Option<String>,
    pub text: String,
    pub member: Option<Member>,
    pub created_epoch: i64,
    pub date: String,
    pub status: ConversationStatus,
    pub state: ConversationState,
    pub reply_conversation_id: Option<String>,
    #[serde(skip)]
    pub reply_conversation: Option<Box<Conversation>>,
    pub attachments: Vec<Attachment>,
    pub attachment_uploaded: bool,
    pub reactions: Vec<Reaction>,
    /// Non-null means tombstoned: the row still renders, as "deleted".
    pub deleted_by: Option<String>,
    pub deleted_by_member: Option<Member>,
    pub is_edited: bool,
    pub og_tags: Option<OgTags>,
    pub poll: Option<PollInfo>,
    /// Opaque widget payload forwarded to the embedding UI.
    pub metadata: Option<serde_json::Value>,
}

impl Conversation {
    /// Identity-resolution predicate used by the reconciliation engine:
    /// a server ack carrying the original `temporary_id` must replace the
    /// optimistic local entry rather than duplicate it.
    pub fn matches(&self, incoming: &Conversation) -> bool {
        (self.id.is_some() && self.id == incoming.id)
            || (self.id.is_some() && self.id == incoming.temporary_id)
            || (self.temporary_id.is_some() && self.temporary_id == incoming.temporary_id)
    }

    /// The display identity: server id when confirmed, temporary id before.
    pub fn key(&self) -> &str {
        self.id
            .as_deref()
            .or(self.temporary_id.as_deref())
            .unwrap_or_default()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_by.is_some()
    }

    pub fn has_attachments(&self) -> bool {
        !self.attachments.is_empty()
    }
}

pub fn now_epoch_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Calendar-day bucket key for an epoch, e.g. "2 Aug 2026". UTC throughout,
/// so bucket membership is stable across client timezones.
pub fn date_key(epoch_ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(epoch_ms)
        .map(|dt| dt.format("%-d %b %Y").to_string())
        .unwrap_or_default()
}

/// Sortable timestamp (seconds) for a bucket key. Unparseable keys sort
/// first rather than erroring, matching how synthesized rows behave.
pub fn date_key_epoch(key: &str) -> i64 {
    NaiveDate::parse_from_str(key, "%d %b %Y")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_key_round_trips_through_bucket_epoch() {
        let epoch_ms = 1_754_265_600_000; // 4 Aug 2025 00:00:00 UTC
        let key = date_key(epoch_ms);
        assert_eq!(key, "4 Aug 2025");
        assert_eq!(date_key_epoch(&key) * 1000, epoch_ms);
    }

    #[test]
    fn unparseable_date_key_sorts_first() {
        assert_eq!(date_key_epoch(""), 0);
        assert_eq!(date_key_epoch("not a date"), 0);
    }

    #[test]
    fn temporary_identity_matches_server_ack() {
        let local = Conversation {
            temporary_id: Some("t1".into()),
            ..Default::default()
        };
        let ack = Conversation {
            id: Some("s1".into()),
            temporary_id: Some("t1".into()),
            ..Default::default()
        };
        assert!(local.matches(&ack));

        let other = Conversation {
            id: Some("s2".into()),
            ..Default::default()
        };
        assert!(!local.matches(&other));
    }
}
