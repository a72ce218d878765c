use crate::types::message::{Member, Reaction};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChatroomType {
    #[default]
    Group,
    DirectMessage,
}

/// Community/group container a message list belongs to. Fetched once per
/// session and refreshed after actions that mutate chatroom-level state
/// (follow, mute, reactions).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Chatroom {
    pub id: String,
    pub community_id: Option<String>,
    pub title: String,
    pub kind: ChatroomType,
    pub member: Option<Member>,
    pub date: String,
    pub date_epoch: i64,
    pub reactions: Vec<Reaction>,
    pub has_reactions: bool,
    pub follow_status: bool,
    pub mute_status: bool,
    /// Whether the local cache already holds this chatroom's history. When
    /// false the first open must run a full sync before fetching.
    pub is_conversation_stored: bool,
    pub deleted_by: Option<String>,
    pub topic_id: Option<String>,
    /// The peer is an AI chatbot: posts trigger the bot and a shimmer
    /// placeholder row is shown until its reply arrives.
    pub is_ai_chatbot: bool,
}

impl Chatroom {
    pub fn is_deleted(&self) -> bool {
        self.deleted_by.is_some()
    }
}
