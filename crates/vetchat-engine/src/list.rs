//! Conversation-list session: the owner's chat history, the vet's inbox and
//! the dashboard badge all run one of these.
//!
//! Every cycle re-reads all conversations and re-checks the directory, so a
//! participant blocked since the last poll disappears on the next one.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::watch;
use tokio::time;
use tracing::{debug, info};

use vetchat_shared::{ConversationKey, ParticipantId, Role};
use vetchat_store::{ConversationStore, ParticipantDirectory};

use crate::aggregate::{conversations_of, summarize, Aggregate, ConversationBag};
use crate::badge::UnreadBadge;
use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::ordering::normalize_conversation;
use crate::poller::{Poller, SyncCycle};
use crate::reconcile::{apply_patch, reconcile};

/// Fetch everything and reduce it for `viewer`.
pub async fn load_aggregate(
    store: &dyn ConversationStore,
    directory: &dyn ParticipantDirectory,
    viewer: &ParticipantId,
    role: Role,
) -> Result<Aggregate> {
    let tree = store.fetch_all().await?;
    let conversations = conversations_of(&ConversationBag::from_tree(tree), viewer);

    let others: BTreeSet<ParticipantId> =
        conversations.iter().map(|c| c.other.clone()).collect();
    let lookups = others.into_iter().map(|id| async move {
        let profile = directory.lookup(role.counterpart(), &id).await;
        (id, profile)
    });

    let mut profiles = HashMap::new();
    for (id, profile) in join_all(lookups).await {
        if let Some(profile) = profile? {
            profiles.insert(id, profile);
        }
    }

    let aggregate = summarize(conversations, viewer, role, &profiles);
    debug!(
        viewer = %viewer,
        conversations = aggregate.summaries.len(),
        global_unseen = aggregate.global_unseen,
        "aggregated conversations"
    );
    Ok(aggregate)
}

struct ListCycle {
    store: Arc<dyn ConversationStore>,
    directory: Arc<dyn ParticipantDirectory>,
    viewer: ParticipantId,
    role: Role,
    view: Arc<watch::Sender<Aggregate>>,
    badge: UnreadBadge,
}

#[async_trait]
impl SyncCycle for ListCycle {
    type Output = Aggregate;

    async fn fetch(&mut self) -> Result<Aggregate> {
        load_aggregate(
            self.store.as_ref(),
            self.directory.as_ref(),
            &self.viewer,
            self.role,
        )
        .await
    }

    fn apply(&mut self, output: Aggregate) {
        self.badge.publish(output.global_unseen);
        self.view.send_replace(output);
    }
}

pub struct ChatListScreen {
    store: Arc<dyn ConversationStore>,
    directory: Arc<dyn ParticipantDirectory>,
    viewer: ParticipantId,
    role: Role,
    config: SyncConfig,
    badge: UnreadBadge,
    view: Arc<watch::Sender<Aggregate>>,
    poller: Option<Poller>,
}

impl ChatListScreen {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        directory: Arc<dyn ParticipantDirectory>,
        viewer: ParticipantId,
        role: Role,
        config: SyncConfig,
        badge: UnreadBadge,
    ) -> Self {
        let (view, _rx) = watch::channel(Aggregate::default());
        Self {
            store,
            directory,
            viewer,
            role,
            config,
            badge,
            view: Arc::new(view),
            poller: None,
        }
    }

    /// Start polling. Restarts the loop if it was already running.
    pub async fn start(&mut self) {
        self.stop().await;

        let cycle = ListCycle {
            store: self.store.clone(),
            directory: self.directory.clone(),
            viewer: self.viewer.clone(),
            role: self.role,
            view: self.view.clone(),
            badge: self.badge.clone(),
        };
        self.poller = Some(Poller::spawn(
            "chat-list",
            self.config.list_interval,
            self.config.fetch_timeout,
            cycle,
        ));
        info!(viewer = %self.viewer, role = %self.role, "chat list polling started");
    }

    pub async fn stop(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.shutdown().await;
        }
    }

    pub fn is_polling(&self) -> bool {
        self.poller.as_ref().is_some_and(Poller::is_running)
    }

    pub fn subscribe(&self) -> watch::Receiver<Aggregate> {
        self.view.subscribe()
    }

    pub fn aggregate(&self) -> Aggregate {
        self.view.borrow().clone()
    }

    pub fn badge(&self) -> &UnreadBadge {
        &self.badge
    }

    /// Run one cycle now and publish it.
    pub async fn refresh(&self) -> Result<Aggregate> {
        let aggregate = time::timeout(
            self.config.fetch_timeout,
            load_aggregate(
                self.store.as_ref(),
                self.directory.as_ref(),
                &self.viewer,
                self.role,
            ),
        )
        .await
        .map_err(|_| SyncError::Timeout(self.config.fetch_timeout))??;

        self.badge.publish(aggregate.global_unseen);
        self.view.send_replace(aggregate.clone());
        Ok(aggregate)
    }

    /// Mark everything addressed to the viewer in `key` as seen, e.g. when a
    /// row is tapped. Returns how many messages were newly seen.
    pub async fn mark_conversation_seen(&self, key: &ConversationKey) -> Result<usize> {
        let store = self.store.as_ref();
        let mark = async {
            let bag = store.fetch(key).await?;
            let messages = normalize_conversation(key, &bag);
            let reconciliation = reconcile(&messages, &self.viewer, self.role);
            apply_patch(store, key, &reconciliation.patch).await?;
            Ok::<_, SyncError>(reconciliation.newly_unseen)
        };

        time::timeout(self.config.fetch_timeout, mark)
            .await
            .map_err(|_| SyncError::Timeout(self.config.fetch_timeout))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::time::Duration;

    use vetchat_shared::{resolve, Message, ParticipantProfile, RawBag, RecordId, RecordPatch};
    use vetchat_store::{Database, MemoryDirectory, MemoryStore, SqliteStore};

    fn pid(s: &str) -> ParticipantId {
        ParticipantId::from(s)
    }

    fn config() -> SyncConfig {
        SyncConfig {
            list_interval: Duration::from_secs(2),
            chat_interval: Duration::from_secs(1),
            fetch_timeout: Duration::from_secs(5),
        }
    }

    /// Never answers a fetch.
    struct StalledStore;

    #[async_trait]
    impl ConversationStore for StalledStore {
        async fn fetch(&self, _key: &ConversationKey) -> vetchat_store::Result<RawBag> {
            std::future::pending().await
        }

        async fn fetch_all(&self) -> vetchat_store::Result<BTreeMap<ConversationKey, RawBag>> {
            std::future::pending().await
        }

        async fn append(
            &self,
            _key: &ConversationKey,
            _message: &Message,
        ) -> vetchat_store::Result<RecordId> {
            std::future::pending().await
        }

        async fn patch(
            &self,
            _key: &ConversationKey,
            _patches: &BTreeMap<RecordId, RecordPatch>,
        ) -> vetchat_store::Result<()> {
            std::future::pending().await
        }
    }

    async fn send(store: &MemoryStore, role: Role, from: &str, to: &str, ts: i64) {
        let key = resolve(&pid(from), &pid(to)).unwrap();
        let m = Message::compose(role, &pid(from), &pid(to), "hello", ts).unwrap();
        store.append(&key, &m).await.unwrap();
    }

    #[tokio::test]
    async fn test_refresh_publishes_view_and_badge() {
        let store = Arc::new(MemoryStore::new());
        let directory = Arc::new(MemoryDirectory::new());
        directory
            .upsert(
                Role::Vet,
                pid("V1"),
                ParticipantProfile {
                    username: "dr-one".into(),
                    profile_image: None,
                    block: false,
                },
            )
            .await;
        send(&store, Role::Vet, "V1", "U1", 100).await;

        let badge = UnreadBadge::new();
        let screen = ChatListScreen::new(
            store.clone(),
            directory.clone(),
            pid("U1"),
            Role::Owner,
            config(),
            badge.clone(),
        );

        let aggregate = screen.refresh().await.unwrap();
        assert!(aggregate.global_unseen);
        assert!(badge.has_unseen());
        assert_eq!(screen.aggregate(), aggregate);
        assert_eq!(
            aggregate.summaries[0]
                .other_profile
                .as_ref()
                .map(|p| p.username.as_str()),
            Some("dr-one")
        );
    }

    #[tokio::test]
    async fn test_ids_with_spaces_and_dots_reach_the_list() {
        let store = SqliteStore::new(Database::open_in_memory().unwrap());
        let directory = MemoryDirectory::new();
        for vet in ["dr who", "dr..no"] {
            let key = resolve(&pid("U1"), &pid(vet)).unwrap();
            let m = Message::compose(Role::Vet, &pid(vet), &pid("U1"), "hi", 100).unwrap();
            store.append(&key, &m).await.unwrap();
        }

        let aggregate = load_aggregate(&store, &directory, &pid("U1"), Role::Owner)
            .await
            .unwrap();
        assert_eq!(aggregate.summaries.len(), 2);
        assert!(aggregate.summaries.iter().all(|s| s.unread_for_viewer));
        assert!(aggregate.global_unseen);
    }

    #[tokio::test]
    async fn test_mark_conversation_seen() {
        let store = Arc::new(MemoryStore::new());
        send(&store, Role::Owner, "U1", "V1", 100).await;
        send(&store, Role::Owner, "U1", "V1", 200).await;
        let key = resolve(&pid("U1"), &pid("V1")).unwrap();

        let screen = ChatListScreen::new(
            store.clone(),
            Arc::new(MemoryDirectory::new()),
            pid("V1"),
            Role::Vet,
            config(),
            UnreadBadge::new(),
        );

        assert_eq!(screen.mark_conversation_seen(&key).await.unwrap(), 2);
        assert_eq!(screen.mark_conversation_seen(&key).await.unwrap(), 0);
        assert_eq!(store.patch_calls(), 1);
        assert!(!screen.refresh().await.unwrap().global_unseen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mark_conversation_seen_times_out() {
        let key = resolve(&pid("U1"), &pid("V1")).unwrap();
        let screen = ChatListScreen::new(
            Arc::new(StalledStore),
            Arc::new(MemoryDirectory::new()),
            pid("V1"),
            Role::Vet,
            config(),
            UnreadBadge::new(),
        );

        let result = screen.mark_conversation_seen(&key).await;
        assert!(matches!(result, Err(SyncError::Timeout(d)) if d == Duration::from_secs(5)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_lifecycle() {
        let store = Arc::new(MemoryStore::new());
        send(&store, Role::Vet, "V1", "U1", 100).await;

        let mut screen = ChatListScreen::new(
            store.clone(),
            Arc::new(MemoryDirectory::new()),
            pid("U1"),
            Role::Owner,
            config(),
            UnreadBadge::new(),
        );
        let mut rx = screen.subscribe();

        screen.start().await;
        assert!(screen.is_polling());
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().summaries.len(), 1);

        screen.stop().await;
        assert!(!screen.is_polling());

        send(&store, Role::Vet, "V2", "U1", 300).await;
        time::sleep(Duration::from_secs(10)).await;
        assert_eq!(screen.aggregate().summaries.len(), 1);
    }
}
