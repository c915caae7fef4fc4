use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    /// Empty ids, or a participant paired with themself.
    #[error("Invalid participants: {0}")]
    InvalidParticipants(String),

    /// A stored record that cannot be read as a message.
    #[error("Malformed record {record}: {reason}")]
    MalformedRecord { record: String, reason: String },

    #[error("Message text is empty")]
    EmptyMessage,

    #[error("Message text too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },
}
