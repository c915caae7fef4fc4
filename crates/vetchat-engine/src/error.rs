use std::time::Duration;

use thiserror::Error;

use vetchat_shared::ChatError;
use vetchat_store::StoreError;

/// Failures of one sync operation.
///
/// Inside a poller every variant ends the current cycle and is retried on
/// the next tick. Only direct calls (`open`, `send`, `refresh`) hand them
/// back to the caller.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Caller bug: rejected before any I/O.
    #[error("Invalid participants: {0}")]
    InvalidParticipants(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(ChatError),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    #[error("Store did not answer within {0:?}")]
    Timeout(Duration),

    /// No conversation is open on this screen.
    #[error("No conversation open")]
    NotOpen,
}

impl From<ChatError> for SyncError {
    fn from(e: ChatError) -> Self {
        match e {
            ChatError::InvalidParticipants(reason) => Self::InvalidParticipants(reason),
            other => Self::InvalidMessage(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
