//! In-process store and directory.
//!
//! Both keep everything in a `tokio::sync::RwLock`-guarded map. They behave
//! like the remote store as far as the engine can tell (random record ids,
//! no ordering, patches skip unknown ids), which makes them the backend of
//! choice for engine tests and for embedding without a server.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use vetchat_shared::{
    ConversationKey, Message, ParticipantId, ParticipantProfile, RawBag, RecordId, RecordPatch,
    Role,
};

use crate::error::Result;
use crate::store::{ConversationStore, ParticipantDirectory};

#[derive(Debug, Default)]
pub struct MemoryStore {
    tree: RwLock<BTreeMap<ConversationKey, RawBag>>,
    patch_calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record verbatim, bypassing validation. Lets tests plant
    /// corrupt history or records with chosen ids.
    pub async fn insert_raw(&self, key: &ConversationKey, id: RecordId, value: serde_json::Value) {
        self.tree
            .write()
            .await
            .entry(key.clone())
            .or_default()
            .insert(id, value);
    }

    /// Number of `patch` calls served so far.
    pub fn patch_calls(&self) -> usize {
        self.patch_calls.load(Ordering::SeqCst)
    }

    /// Snapshot of one conversation.
    pub async fn snapshot(&self, key: &ConversationKey) -> RawBag {
        self.tree.read().await.get(key).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn fetch(&self, key: &ConversationKey) -> Result<RawBag> {
        Ok(self.snapshot(key).await)
    }

    async fn fetch_all(&self) -> Result<BTreeMap<ConversationKey, RawBag>> {
        Ok(self.tree.read().await.clone())
    }

    async fn append(&self, key: &ConversationKey, message: &Message) -> Result<RecordId> {
        let id = RecordId::new(Uuid::new_v4().simple().to_string());
        let value = serde_json::to_value(message)?;
        self.insert_raw(key, id.clone(), value).await;
        debug!(key = %key, record = %id, "appended record");
        Ok(id)
    }

    async fn patch(
        &self,
        key: &ConversationKey,
        patches: &BTreeMap<RecordId, RecordPatch>,
    ) -> Result<()> {
        self.patch_calls.fetch_add(1, Ordering::SeqCst);

        let mut tree = self.tree.write().await;
        let Some(bag) = tree.get_mut(key) else {
            return Ok(());
        };
        for (id, patch) in patches {
            if let Some(record) = bag.get_mut(id) {
                patch.apply_to(record);
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryDirectory {
    profiles: RwLock<HashMap<(Role, ParticipantId), ParticipantProfile>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert(&self, role: Role, id: ParticipantId, profile: ParticipantProfile) {
        self.profiles.write().await.insert((role, id), profile);
    }

    /// Set or clear the administrative block. Returns `false` if the
    /// participant has no profile.
    pub async fn set_blocked(&self, role: Role, id: &ParticipantId, blocked: bool) -> bool {
        let mut profiles = self.profiles.write().await;
        match profiles.get_mut(&(role, id.clone())) {
            Some(profile) => {
                profile.block = blocked;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl ParticipantDirectory for MemoryDirectory {
    async fn lookup(&self, role: Role, id: &ParticipantId) -> Result<Option<ParticipantProfile>> {
        Ok(self.profiles.read().await.get(&(role, id.clone())).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vetchat_shared::resolve;

    fn pid(s: &str) -> ParticipantId {
        ParticipantId::from(s)
    }

    #[tokio::test]
    async fn test_append_and_fetch() {
        let store = MemoryStore::new();
        let key = resolve(&pid("U1"), &pid("V1")).unwrap();
        let msg = Message::compose(Role::Owner, &pid("U1"), &pid("V1"), "hi", 100).unwrap();

        let id = store.append(&key, &msg).await.unwrap();
        let bag = store.fetch(&key).await.unwrap();
        assert_eq!(bag.len(), 1);
        assert_eq!(Message::from_record(&id, &bag[&id]).unwrap().text, "hi");

        let unknown = resolve(&pid("U2"), &pid("V1")).unwrap();
        assert!(store.fetch(&unknown).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_patch_skips_unknown_records() {
        let store = MemoryStore::new();
        let key = resolve(&pid("U1"), &pid("V1")).unwrap();
        let msg = Message::compose(Role::Owner, &pid("U1"), &pid("V1"), "hi", 100).unwrap();
        let id = store.append(&key, &msg).await.unwrap();

        let mut patches = BTreeMap::new();
        patches.insert(id.clone(), RecordPatch::seen(Role::Vet));
        patches.insert(RecordId::from("missing"), RecordPatch::seen(Role::Vet));
        store.patch(&key, &patches).await.unwrap();

        let bag = store.snapshot(&key).await;
        assert_eq!(bag.len(), 1);
        assert!(Message::from_record(&id, &bag[&id]).unwrap().seen_by_vet);
        assert_eq!(store.patch_calls(), 1);
    }

    #[tokio::test]
    async fn test_directory_block() {
        let dir = MemoryDirectory::new();
        let profile = ParticipantProfile {
            username: "dr-vet".into(),
            profile_image: None,
            block: false,
        };
        dir.upsert(Role::Vet, pid("V1"), profile).await;

        assert!(dir.set_blocked(Role::Vet, &pid("V1"), true).await);
        assert!(!dir.set_blocked(Role::Owner, &pid("V1"), true).await);

        let found = dir.lookup(Role::Vet, &pid("V1")).await.unwrap().unwrap();
        assert!(found.block);
        assert!(dir.lookup(Role::Owner, &pid("V1")).await.unwrap().is_none());
    }
}
