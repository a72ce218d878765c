use crate::store::error::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("network failure: {0}")]
    Network(#[source] anyhow::Error),

    #[error("attachment upload failed: {0}")]
    Upload(#[source] anyhow::Error),

    #[error("{0}")]
    Validation(String),

    #[error("chatroom was deleted")]
    ChatroomDeleted,

    #[error("missing required identifier: {0}")]
    MissingIdentifier(&'static str),
}

pub type Result<T> = std::result::Result<T, ChatError>;
