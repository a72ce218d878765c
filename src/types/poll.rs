use crate::types::message::Member;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PollType {
    /// Results are final after the first vote.
    #[default]
    Instant,
    /// Voters may re-open their vote and resubmit until expiry.
    Deferred,
}

/// Select-mode governing how many options a voter may choose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PollSelectState {
    Exactly,
    AtMost,
    AtLeast,
}

impl PollSelectState {
    /// Whether a selection can grow to `next_count`. `AtLeast` never caps
    /// growth; the minimum is enforced at submit time instead.
    pub fn can_select(&self, next_count: usize, allowed: usize) -> bool {
        match self {
            PollSelectState::Exactly | PollSelectState::AtMost => next_count <= allowed,
            PollSelectState::AtLeast => true,
        }
    }

    /// Whether `count` selections satisfy the mode and may be submitted.
    pub fn is_submittable(&self, count: usize, allowed: usize) -> bool {
        match self {
            PollSelectState::Exactly => count == allowed,
            PollSelectState::AtMost => count >= 1 && count <= allowed,
            PollSelectState::AtLeast => count >= allowed,
        }
    }

    /// User-facing rejection reason for an invalid selection.
    pub fn hint(&self, allowed: usize) -> String {
        let noun = if allowed == 1 { "option" } else { "options" };
        match self {
            PollSelectState::Exactly => format!("Select exactly {allowed} {noun}"),
            PollSelectState::AtMost => format!("Select at most {allowed} {noun}"),
            PollSelectState::AtLeast => format!("Select at least {allowed} {noun}"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PollOption {
    pub id: String,
    pub text: String,
    pub vote_count: u32,
    pub percentage: f64,
    pub is_selected: bool,
    pub added_by: Option<Member>,
}

/// Poll payload attached to a `MicroPoll` conversation. The question itself
/// is the conversation text.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PollInfo {
    pub options: Vec<PollOption>,
    pub expiry_epoch: i64,
    pub multiple_select_num: Option<usize>,
    /// `None` means single-select: the first tap submits directly.
    pub multiple_select_state: Option<PollSelectState>,
    pub poll_type: PollType,
    pub is_anonymous: bool,
    pub allow_add_option: bool,
    pub to_show_results: bool,
}

impl PollInfo {
    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.expiry_epoch < now_ms
    }

    pub fn has_voted(&self) -> bool {
        self.options.iter().any(|o| o.is_selected)
    }

    pub fn is_multi_select(&self) -> bool {
        self.multiple_select_state.is_some()
    }
}
