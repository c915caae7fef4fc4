use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::constants::MAX_MESSAGE_SIZE;
use crate::conversation::resolve;
use crate::error::ChatError;
use crate::types::{ParticipantId, RecordId, Role};

/// Records of one conversation exactly as the store returns them: keyed by
/// record id, values not yet validated.
pub type RawBag = BTreeMap<RecordId, serde_json::Value>;

/// A direct message between an owner and a vet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Store-assigned record key. `None` while the message is an optimistic
    /// local copy that has not been read back from the store.
    #[serde(skip)]
    pub id: Option<RecordId>,
    pub text: String,
    pub sender_id: ParticipantId,
    pub receiver_id: ParticipantId,
    /// Sender-assigned, milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// Seen by the pet owner. Absent in the store means unseen.
    #[serde(default)]
    pub seen_by_user: bool,
    /// Seen by the vet. Absent in the store means unseen.
    #[serde(default)]
    pub seen_by_vet: bool,
}

impl Message {
    /// Build a new outgoing message. The sender has implicitly seen it; the
    /// recipient has not.
    pub fn compose(
        sender_role: Role,
        sender: &ParticipantId,
        receiver: &ParticipantId,
        text: &str,
        timestamp: i64,
    ) -> Result<Self, ChatError> {
        resolve(sender, receiver)?;
        if text.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if text.len() > MAX_MESSAGE_SIZE {
            return Err(ChatError::MessageTooLarge {
                size: text.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }

        let mut message = Self {
            id: None,
            text: text.to_string(),
            sender_id: sender.clone(),
            receiver_id: receiver.clone(),
            timestamp,
            seen_by_user: false,
            seen_by_vet: false,
        };
        message.mark_seen(sender_role);
        Ok(message)
    }

    /// Read one stored record.
    pub fn from_record(id: &RecordId, value: &serde_json::Value) -> Result<Self, ChatError> {
        let malformed = |reason: String| ChatError::MalformedRecord {
            record: id.to_string(),
            reason,
        };

        let mut message: Self =
            serde_json::from_value(value.clone()).map_err(|e| malformed(e.to_string()))?;
        resolve(&message.sender_id, &message.receiver_id).map_err(|e| malformed(e.to_string()))?;
        message.id = Some(id.clone());
        Ok(message)
    }

    pub fn seen_by(&self, role: Role) -> bool {
        match role {
            Role::Owner => self.seen_by_user,
            Role::Vet => self.seen_by_vet,
        }
    }

    /// Set `role`'s seen flag. Flags only ever move from unseen to seen.
    pub fn mark_seen(&mut self, role: Role) {
        match role {
            Role::Owner => self.seen_by_user = true,
            Role::Vet => self.seen_by_vet = true,
        }
    }

    /// OR the other copy's seen flags into this one.
    pub fn absorb_seen(&mut self, other: &Self) {
        self.seen_by_user |= other.seen_by_user;
        self.seen_by_vet |= other.seen_by_vet;
    }

    /// Identity used for deduplication: `(senderId, timestamp)`.
    pub fn dedup_key(&self) -> (&ParticipantId, i64) {
        (&self.sender_id, self.timestamp)
    }

    pub fn is_pending(&self) -> bool {
        self.id.is_none()
    }

    /// Whether this message is addressed to `viewer` and still unseen by the
    /// viewer's role.
    pub fn is_unseen_by(&self, viewer: &ParticipantId, role: Role) -> bool {
        &self.receiver_id == viewer && !self.seen_by(role)
    }
}

/// Partial update of one record's seen flags.
///
/// A field set to `true` means "mark seen"; `false` means "leave as is".
/// There is no way to express a flag going back to unseen.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RecordPatch {
    #[serde(default, skip_serializing_if = "is_false")]
    pub seen_by_user: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub seen_by_vet: bool,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl RecordPatch {
    pub fn seen(role: Role) -> Self {
        let mut patch = Self::default();
        match role {
            Role::Owner => patch.seen_by_user = true,
            Role::Vet => patch.seen_by_vet = true,
        }
        patch
    }

    pub fn is_empty(&self) -> bool {
        !self.seen_by_user && !self.seen_by_vet
    }

    pub fn merge(&mut self, other: &Self) {
        self.seen_by_user |= other.seen_by_user;
        self.seen_by_vet |= other.seen_by_vet;
    }

    /// Write the flags this patch sets into a raw stored record. Returns
    /// whether the record changed. Non-object records are left alone.
    pub fn apply_to(&self, record: &mut serde_json::Value) -> bool {
        let Some(fields) = record.as_object_mut() else {
            return false;
        };

        let mut changed = false;
        for (set, role) in [(self.seen_by_user, Role::Owner), (self.seen_by_vet, Role::Vet)] {
            if !set {
                continue;
            }
            let field = role.seen_field();
            if fields.get(field) != Some(&serde_json::Value::Bool(true)) {
                fields.insert(field.to_string(), serde_json::Value::Bool(true));
                changed = true;
            }
        }
        changed
    }
}

/// Body returned by the store after an append: the generated record id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppendReceipt {
    pub name: RecordId,
}

/// Directory entry for an owner or a vet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantProfile {
    pub username: String,
    #[serde(default)]
    pub profile_image: Option<String>,
    /// Set by an administrator. Blocked participants disappear from the
    /// other side's conversation lists.
    #[serde(default)]
    pub block: bool,
}
