//! Interfaces the engine consumes.

use std::collections::BTreeMap;

use async_trait::async_trait;

use vetchat_shared::{
    ConversationKey, Message, ParticipantId, ParticipantProfile, RawBag, RecordId, RecordPatch,
    Role,
};

use crate::error::Result;

/// An addressable tree of conversations, each an unordered bag of message
/// records.
///
/// Implementations give no ordering guarantee and no transactions across
/// calls. Callers must be correct under any interleaving of these
/// operations from other clients.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Every record under `key`. An unknown key is an empty bag.
    async fn fetch(&self, key: &ConversationKey) -> Result<RawBag>;

    /// Every conversation in the store.
    async fn fetch_all(&self) -> Result<BTreeMap<ConversationKey, RawBag>>;

    /// Append one record and return the id the store assigned to it.
    async fn append(&self, key: &ConversationKey, message: &Message) -> Result<RecordId>;

    /// Merge partial fields into many records of one conversation in a
    /// single call. Ids not present in the conversation are skipped.
    async fn patch(
        &self,
        key: &ConversationKey,
        patches: &BTreeMap<RecordId, RecordPatch>,
    ) -> Result<()>;
}

/// Read-only lookup of owner and vet profiles. Owners and vets live in
/// separate collections, so the role is part of the address.
#[async_trait]
pub trait ParticipantDirectory: Send + Sync {
    async fn lookup(&self, role: Role, id: &ParticipantId) -> Result<Option<ParticipantProfile>>;
}
