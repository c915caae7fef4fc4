use serde::{Deserialize, Serialize};

use crate::constants::{
    FIELD_SEEN_BY_USER, FIELD_SEEN_BY_VET, KEY_SEPARATOR, OWNER_COLLECTION, VET_COLLECTION,
};

// Pet owners and vets share one identifier space
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ParticipantId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Which population a participant belongs to. Each role owns exactly one
/// seen flag on every message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Vet,
}

impl Role {
    pub fn counterpart(self) -> Self {
        match self {
            Self::Owner => Self::Vet,
            Self::Vet => Self::Owner,
        }
    }

    /// Name of this role's seen flag on a stored message.
    pub fn seen_field(self) -> &'static str {
        match self {
            Self::Owner => FIELD_SEEN_BY_USER,
            Self::Vet => FIELD_SEEN_BY_VET,
        }
    }

    /// Directory collection this role's profiles live in.
    pub fn collection(self) -> &'static str {
        match self {
            Self::Owner => OWNER_COLLECTION,
            Self::Vet => VET_COLLECTION,
        }
    }

    pub fn from_collection(s: &str) -> Option<Self> {
        match s {
            OWNER_COLLECTION => Some(Self::Owner),
            VET_COLLECTION => Some(Self::Vet),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Owner => f.write_str("owner"),
            Self::Vet => f.write_str("vet"),
        }
    }
}

/// Deterministic key of an owner/vet pairing. Only [`crate::resolve`] builds
/// new keys; [`ConversationKey::parse`] accepts keys coming back from a store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct ConversationKey(pub(crate) String);

impl ConversationKey {
    /// Accept an existing key read from a store path or listing.
    ///
    /// Participant ids are opaque, so the only requirement is the shape
    /// [`crate::resolve`] always produces: non-blank and joined by the
    /// separator. Path safety is the transport's job (segments are
    /// percent-encoded).
    pub fn parse(s: &str) -> Option<Self> {
        let valid = !s.trim().is_empty() && s.contains(KEY_SEPARATOR);
        valid.then(|| Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Store-assigned key of one message record within a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
