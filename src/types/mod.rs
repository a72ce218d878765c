pub mod chatroom;
pub mod events;
pub mod message;
pub mod poll;
