//! # vetchat-shared
//!
//! Data model shared by every vetchat crate: participant identifiers and
//! roles, conversation keys, message records as they live in the
//! conversation store, and the seen-flag patches written back to it.
//!
//! Nothing in here performs I/O.

pub mod constants;
pub mod conversation;
pub mod error;
pub mod protocol;
pub mod types;

pub use conversation::resolve;
pub use error::ChatError;
pub use protocol::{AppendReceipt, Message, ParticipantProfile, RawBag, RecordPatch};
pub use types::{ConversationKey, ParticipantId, RecordId, Role};
