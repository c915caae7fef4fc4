//! Read-state reconciliation.
//!
//! After a fetch, every stored message addressed to the viewer that the
//! viewer's role has not seen yet gets its role flag set. Only that flag:
//! a vet opening a chat never touches `seenByUser`, an owner never touches
//! `seenByVet`.
//!
//! Patches only ever set flags to `true`, so applying one twice, or
//! applying two overlapping patches in either order, lands on the same
//! store state. That is what lets a list screen and an open chat reconcile
//! the same conversation concurrently without any locking.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use vetchat_shared::{ConversationKey, Message, ParticipantId, RecordId, RecordPatch, Role};
use vetchat_store::{ConversationStore, StoreError};

/// The records one viewer has just seen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadPatch {
    role: Role,
    records: BTreeSet<RecordId>,
}

impl ReadPatch {
    pub fn empty(role: Role) -> Self {
        Self {
            role,
            records: BTreeSet::new(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn records(&self) -> &BTreeSet<RecordId> {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Body of the batched store write.
    pub fn to_store_patch(&self) -> BTreeMap<RecordId, RecordPatch> {
        let patch = RecordPatch::seen(self.role);
        self.records.iter().map(|id| (id.clone(), patch)).collect()
    }

    /// Mirror the patch onto an in-memory sequence.
    pub fn apply_local(&self, messages: &mut [Message]) {
        for message in messages.iter_mut() {
            if let Some(id) = &message.id {
                if self.records.contains(id) {
                    message.mark_seen(self.role);
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub patch: ReadPatch,
    /// Messages that were delivered to the viewer but unseen until now.
    pub newly_unseen: usize,
}

/// Compute which of `messages` the viewer is seeing for the first time.
///
/// Pending (not yet stored) messages are never included; they have no
/// record to patch and are always the viewer's own.
pub fn reconcile(messages: &[Message], viewer: &ParticipantId, role: Role) -> Reconciliation {
    let records: BTreeSet<RecordId> = messages
        .iter()
        .filter(|m| m.is_unseen_by(viewer, role))
        .filter_map(|m| m.id.clone())
        .collect();

    let newly_unseen = records.len();
    Reconciliation {
        patch: ReadPatch { role, records },
        newly_unseen,
    }
}

/// Write `patch` to the store in one call. An empty patch performs no I/O.
///
/// Returns whether a write was issued.
pub async fn apply_patch(
    store: &dyn ConversationStore,
    key: &ConversationKey,
    patch: &ReadPatch,
) -> Result<bool, StoreError> {
    if patch.is_empty() {
        return Ok(false);
    }

    store.patch(key, &patch.to_store_patch()).await?;
    debug!(key = %key, role = %patch.role, records = patch.len(), "marked messages seen");
    Ok(true)
}
