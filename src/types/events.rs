use std::sync::Arc;
use tokio::sync::broadcast;

// The size of the broadcast channel buffer.
const CHANNEL_CAPACITY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDirection {
    Up,
    Down,
}

#[derive(Debug, Clone)]
pub struct ListReloaded {
    pub direction: Option<ScrollDirection>,
}

#[derive(Debug, Clone)]
pub struct ScrollToBottom {
    pub force: bool,
}

/// Scroll to a specific message after an anchored (search/deep-link) load.
#[derive(Debug, Clone)]
pub struct ScrollToMessage {
    pub section: usize,
    pub row: usize,
    pub existing_index: bool,
}

#[derive(Debug, Clone)]
pub struct MessageReloaded {
    pub section: usize,
    pub row: usize,
}

#[derive(Debug, Clone)]
pub struct Toast {
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct ChatroomUpdated;

// Macro to generate EventBus fields and constructor
macro_rules! define_event_bus {
    ($(($field:ident, $type:ty)),* $(,)?) => {
        /// Typed event bus giving the embedding UI a separate broadcast
        /// channel per signal, replacing a delegate-protocol boundary.
        /// Sends are fire-and-forget: a channel with no subscribers drops
        /// the event.
        #[derive(Debug)]
        pub struct EventBus {
            $(
                pub $field: broadcast::Sender<$type>,
            )*
        }

        impl EventBus {
            pub fn new() -> Self {
                Self {
                    $(
                        $field: broadcast::channel(CHANNEL_CAPACITY).0,
                    )*
                }
            }
        }
    };
}

define_event_bus! {
    (list_reloaded, Arc<ListReloaded>),
    (scroll_to_bottom, Arc<ScrollToBottom>),
    (scroll_to_message, Arc<ScrollToMessage>),
    (message_reloaded, Arc<MessageReloaded>),
    (toast, Arc<Toast>),
    (chatroom_updated, Arc<ChatroomUpdated>),
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
