//! Date-bucketed, timestamp-sorted index over the message cache.
//!
//! Invariants after every mutation: within a bucket, messages are
//! non-decreasing in `created_epoch`; buckets are globally ordered by the
//! timestamp derived from their calendar-day key.

use crate::types::message::{Conversation, ConversationState, date_key_epoch};

#[derive(Debug, Clone, Default)]
pub struct Section {
    /// Calendar-day display key, e.g. "2 Aug 2026".
    pub key: String,
    /// Derived sortable timestamp for bucket ordering (seconds).
    pub timestamp: i64,
    pub messages: Vec<Conversation>,
}

#[derive(Debug, Default)]
pub struct SectionIndex {
    sections: Vec<Section>,
}

impl SectionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn message_count(&self) -> usize {
        self.sections.iter().map(|s| s.messages.len()).sum()
    }

    pub fn clear(&mut self) {
        self.sections.clear();
    }

    /// Locate or create the bucket for the message's date, append and
    /// re-sort the bucket. O(bucket size), bounded by per-day volume.
    pub fn insert(&mut self, conversation: Conversation) {
        match self
            .sections
            .iter_mut()
            .find(|s| s.key == conversation.date)
        {
            Some(section) => {
                section.messages.push(conversation);
                section.messages.sort_by_key(|m| m.created_epoch);
            }
            None => {
                let key = conversation.date.clone();
                self.sections.push(Section {
                    timestamp: date_key_epoch(&key),
                    key,
                    messages: vec![conversation],
                });
                self.sort();
            }
        }
    }

    /// Replace the bucket entry matching the conversation's identity, then
    /// re-sort the bucket (an edit may move its timestamp). Returns false
    /// when no entry matched, leaving the index untouched.
    pub fn update(&mut self, conversation: &Conversation) -> bool {
        let Some(section) = self
            .sections
            .iter_mut()
            .find(|s| s.key == conversation.date)
        else {
            return false;
        };
        let Some(slot) = section
            .messages
            .iter_mut()
            .find(|m| m.matches(conversation))
        else {
            return false;
        };
        *slot = conversation.clone();
        section.messages.sort_by_key(|m| m.created_epoch);
        true
    }

    /// Rebuild the whole index from a flat list in one grouping pass.
    pub fn bulk_replace(&mut self, conversations: Vec<Conversation>) {
        let mut sections: Vec<Section> = Vec::new();
        for conversation in conversations {
            match sections.iter_mut().find(|s| s.key == conversation.date) {
                Some(section) => section.messages.push(conversation),
                None => {
                    let key = conversation.date.clone();
                    sections.push(Section {
                        timestamp: date_key_epoch(&key),
                        key,
                        messages: vec![conversation],
                    });
                }
            }
        }
        for section in &mut sections {
            section.messages.sort_by_key(|m| m.created_epoch);
        }
        self.sections = sections;
        self.sort();
    }

    /// Drop the entry with the given identity key; empty buckets are
    /// removed with it.
    pub fn remove(&mut self, conversation_key: &str) -> bool {
        let mut removed = false;
        for section in &mut self.sections {
            let before = section.messages.len();
            section.messages.retain(|m| m.key() != conversation_key);
            removed |= section.messages.len() != before;
        }
        self.sections.retain(|s| !s.messages.is_empty());
        removed
    }

    /// Remove all shimmer placeholder rows, returning how many were purged.
    pub fn purge_shimmer(&mut self) -> usize {
        let mut purged = 0;
        for section in &mut self.sections {
            let before = section.messages.len();
            section
                .messages
                .retain(|m| m.state != ConversationState::BubbleShimmer);
            purged += before - section.messages.len();
        }
        self.sections.retain(|s| !s.messages.is_empty());
        purged
    }

    /// (section, row) of the entry with the given identity key.
    pub fn locate(&self, conversation_key: &str) -> Option<(usize, usize)> {
        self.sections.iter().enumerate().find_map(|(si, section)| {
            section
                .messages
                .iter()
                .position(|m| m.key() == conversation_key)
                .map(|ri| (si, ri))
        })
    }

    pub fn sort(&mut self) {
        self.sections.sort_by_key(|s| s.timestamp);
    }
}
