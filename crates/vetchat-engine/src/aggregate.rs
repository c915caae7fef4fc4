//! Reducing every conversation of one participant to list rows and a single
//! "has unseen" flag.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use vetchat_shared::{ConversationKey, Message, ParticipantId, ParticipantProfile, RawBag, Role};

use crate::ordering::normalize_conversation;

/// One conversation's records as fetched.
#[derive(Debug, Clone)]
pub struct ConversationBag {
    pub key: ConversationKey,
    pub records: RawBag,
}

impl ConversationBag {
    pub fn from_tree(tree: BTreeMap<ConversationKey, RawBag>) -> Vec<Self> {
        tree.into_iter()
            .map(|(key, records)| Self { key, records })
            .collect()
    }
}

/// A conversation the viewer takes part in, normalized.
#[derive(Debug, Clone)]
pub struct Conversation {
    pub key: ConversationKey,
    pub other: ParticipantId,
    /// Never empty.
    pub messages: Vec<Message>,
}

/// A row of a chat-list screen. Derived on every poll, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub conversation_key: ConversationKey,
    pub other_participant: ParticipantId,
    pub other_profile: Option<ParticipantProfile>,
    pub last_message: Message,
    pub last_message_timestamp: i64,
    pub unread_for_viewer: bool,
    pub unread_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Aggregate {
    pub summaries: Vec<ConversationSummary>,
    pub global_unseen: bool,
}

/// Normalize every bag and keep the non-empty conversations `viewer` is part
/// of.
pub fn conversations_of(bags: &[ConversationBag], viewer: &ParticipantId) -> Vec<Conversation> {
    bags.iter()
        .filter_map(|bag| {
            let messages = normalize_conversation(&bag.key, &bag.records);
            // Every surviving message is between the key's two participants,
            // so the first one tells us who they are.
            let first = messages.first()?;
            let other = if &first.sender_id == viewer {
                first.receiver_id.clone()
            } else if &first.receiver_id == viewer {
                first.sender_id.clone()
            } else {
                return None;
            };
            Some(Conversation {
                key: bag.key.clone(),
                other,
                messages,
            })
        })
        .collect()
}

/// Build list rows from the viewer's conversations.
///
/// `profiles` holds the directory entries of the other participants as of
/// this cycle. Blocked participants are left out entirely; participants with
/// no entry are shown undecorated.
pub fn summarize(
    conversations: Vec<Conversation>,
    viewer: &ParticipantId,
    role: Role,
    profiles: &HashMap<ParticipantId, ParticipantProfile>,
) -> Aggregate {
    let mut summaries: Vec<ConversationSummary> = conversations
        .into_iter()
        .filter_map(|conversation| {
            let profile = profiles.get(&conversation.other).cloned();
            if profile.as_ref().is_some_and(|p| p.block) {
                return None;
            }

            let unread_count = conversation
                .messages
                .iter()
                .filter(|m| m.is_unseen_by(viewer, role))
                .count();
            let last_message = conversation.messages.last()?.clone();

            Some(ConversationSummary {
                conversation_key: conversation.key,
                other_participant: conversation.other,
                other_profile: profile,
                last_message_timestamp: last_message.timestamp,
                last_message,
                unread_for_viewer: unread_count > 0,
                unread_count,
            })
        })
        .collect();

    summaries.sort_by(|a, b| {
        b.last_message_timestamp
            .cmp(&a.last_message_timestamp)
            .then_with(|| a.conversation_key.cmp(&b.conversation_key))
    });

    let global_unseen = summaries.iter().any(|s| s.unread_for_viewer);
    Aggregate {
        summaries,
        global_unseen,
    }
}

pub fn aggregate(
    bags: &[ConversationBag],
    viewer: &ParticipantId,
    role: Role,
    profiles: &HashMap<ParticipantId, ParticipantProfile>,
) -> Aggregate {
    summarize(conversations_of(bags, viewer), viewer, role, profiles)
}
