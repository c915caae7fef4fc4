//! Turning an unordered bag of stored records into the sequence a screen
//! shows.
//!
//! Order is `timestamp` ascending, then confirmed before pending, then record
//! id. Two messages with the same `(senderId, timestamp)` are the same
//! message; the first in that order wins. Because the record id breaks every
//! remaining tie, the same bag always yields the same sequence regardless of
//! how the store happened to enumerate it.

use std::cmp::Ordering;
use std::collections::HashSet;

use tracing::warn;

use vetchat_shared::conversation::is_pair;
use vetchat_shared::{ConversationKey, Message, RawBag};

/// Parse, order and deduplicate a bag. Malformed records are skipped.
pub fn normalize(bag: &RawBag) -> Vec<Message> {
    order(parse_bag(bag))
}

/// Like [`normalize`], and also drops records whose sender and receiver are
/// not the two participants `key` belongs to.
pub fn normalize_conversation(key: &ConversationKey, bag: &RawBag) -> Vec<Message> {
    let messages = parse_bag(bag)
        .into_iter()
        .filter(|m| {
            let belongs = is_pair(key, &m.sender_id, &m.receiver_id);
            if !belongs {
                warn!(
                    key = %key,
                    record = ?m.id,
                    sender = %m.sender_id,
                    receiver = %m.receiver_id,
                    "skipping record addressed outside its conversation"
                );
            }
            belongs
        })
        .collect();
    order(messages)
}

/// Sort and deduplicate already-parsed messages.
pub fn order(mut messages: Vec<Message>) -> Vec<Message> {
    messages.sort_by(compare);

    let mut seen = HashSet::new();
    messages.retain(|m| seen.insert((m.sender_id.clone(), m.timestamp)));
    messages
}

/// Combine confirmed records with optimistic local copies.
///
/// A pending message whose `(senderId, timestamp)` now appears among the
/// confirmed records has been superseded by its stored copy and is dropped.
/// Returns the displayed sequence and the pending messages still waiting.
pub fn merge_pending(confirmed: &[Message], pending: &[Message]) -> (Vec<Message>, Vec<Message>) {
    let stored: HashSet<_> = confirmed.iter().map(Message::dedup_key).collect();
    let still_pending: Vec<Message> = pending
        .iter()
        .filter(|m| !stored.contains(&m.dedup_key()))
        .cloned()
        .collect();

    let display = order(confirmed.iter().chain(&still_pending).cloned().collect());
    (display, still_pending)
}

fn compare(a: &Message, b: &Message) -> Ordering {
    a.timestamp
        .cmp(&b.timestamp)
        .then_with(|| a.is_pending().cmp(&b.is_pending()))
        .then_with(|| a.id.cmp(&b.id))
}

fn parse_bag(bag: &RawBag) -> Vec<Message> {
    bag.iter()
        .filter_map(|(id, value)| match Message::from_record(id, value) {
            Ok(message) => Some(message),
            Err(e) => {
                warn!(error = %e, "skipping malformed record");
                None
            }
        })
        .collect()
}
