//! Conversation identity.
//!
//! A conversation between an owner and a vet is addressed by the two ids
//! sorted and joined with [`KEY_SEPARATOR`], so either side computes the same
//! key without coordination.

use crate::constants::KEY_SEPARATOR;
use crate::error::ChatError;
use crate::types::{ConversationKey, ParticipantId};

/// Map two participants to their conversation key.
///
/// `resolve(a, b) == resolve(b, a)` for every valid pair. Ids are opaque:
/// only empty and identical ids are rejected, and every key built here is
/// accepted by [`ConversationKey::parse`].
pub fn resolve(a: &ParticipantId, b: &ParticipantId) -> Result<ConversationKey, ChatError> {
    if a.is_empty() || b.is_empty() {
        return Err(ChatError::InvalidParticipants(
            "participant id must not be empty".to_string(),
        ));
    }
    if a == b {
        return Err(ChatError::InvalidParticipants(format!(
            "{a} cannot converse with themself"
        )));
    }
    let (first, second) = if a < b { (a, b) } else { (b, a) };
    Ok(ConversationKey(format!(
        "{}{}{}",
        first.as_str(),
        KEY_SEPARATOR,
        second.as_str()
    )))
}

/// Whether `key` is the conversation between `a` and `b`.
pub fn is_pair(key: &ConversationKey, a: &ParticipantId, b: &ParticipantId) -> bool {
    resolve(a, b).map(|k| &k == key).unwrap_or(false)
}
