//! Focused 1:1 chat session.
//!
//! A [`ChatScreen`] shows one conversation at a time. Opening a
//! conversation starts a poller that fetches, marks incoming messages seen
//! for the viewer's role and publishes the ordered sequence on a `watch`
//! channel. Opening another conversation, closing, or dropping the screen
//! stops that poller first.
//!
//! Fetched sequences are merged into the view rather than replacing it:
//! records are unioned by id and seen flags OR-ed. The store is append-only
//! and flags only move to seen, so the merge is monotonic and a slow fetch
//! landing after a newer one cannot drop messages or un-see them.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::watch;
use tokio::time;
use tracing::{debug, info, warn};

use vetchat_shared::{resolve, ConversationKey, Message, ParticipantId, RecordId, Role};
use vetchat_store::ConversationStore;

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::ordering::{merge_pending, normalize_conversation, order};
use crate::poller::{Poller, SyncCycle};
use crate::reconcile::{apply_patch, reconcile};

/// What an open chat displays.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatView {
    pub key: Option<ConversationKey>,
    pub other: Option<ParticipantId>,
    /// Ascending; stored records first at equal timestamps, then pending sends.
    pub messages: Vec<Message>,
}

/// Fetch one conversation, mark what the viewer is now seeing, and return
/// the normalized sequence with those flags already set.
pub async fn sync_conversation(
    store: &dyn ConversationStore,
    key: &ConversationKey,
    viewer: &ParticipantId,
    role: Role,
) -> Result<Vec<Message>> {
    let bag = store.fetch(key).await?;
    let mut messages = normalize_conversation(key, &bag);

    let reconciliation = reconcile(&messages, viewer, role);
    if apply_patch(store, key, &reconciliation.patch).await? {
        reconciliation.patch.apply_local(&mut messages);
        debug!(
            key = %key,
            viewer = %viewer,
            newly_seen = reconciliation.newly_unseen,
            "reconciled read state"
        );
    }
    Ok(messages)
}

#[derive(Debug, Clone)]
struct OpenChat {
    key: ConversationKey,
    other: ParticipantId,
}

#[derive(Debug, Default)]
struct ChatState {
    /// Bumped on every open/close; results tagged with an older value are
    /// stale.
    generation: u64,
    open: Option<OpenChat>,
    confirmed: BTreeMap<RecordId, Message>,
    pending: Vec<Message>,
    last_sent_at: i64,
}

impl ChatState {
    fn reset(&mut self, open: Option<OpenChat>) -> u64 {
        self.generation += 1;
        self.open = open;
        self.confirmed.clear();
        self.pending.clear();
        self.generation
    }

    fn merge(&mut self, fetched: Vec<Message>) {
        for message in fetched {
            let Some(id) = message.id.clone() else {
                continue;
            };
            self.confirmed
                .entry(id)
                .and_modify(|existing| existing.absorb_seen(&message))
                .or_insert(message);
        }
    }

    fn view(&mut self) -> ChatView {
        let confirmed = order(self.confirmed.values().cloned().collect());
        let (messages, still_pending) = merge_pending(&confirmed, &self.pending);
        self.pending = still_pending;

        ChatView {
            key: self.open.as_ref().map(|o| o.key.clone()),
            other: self.open.as_ref().map(|o| o.other.clone()),
            messages,
        }
    }

    /// Sender-assigned timestamp, strictly increasing per screen so two sends
    /// never share a dedup key.
    fn next_timestamp(&mut self) -> i64 {
        let now = Utc::now().timestamp_millis();
        self.last_sent_at = now.max(self.last_sent_at + 1);
        self.last_sent_at
    }
}

/// State shared between a screen and the cycle its poller runs.
struct ChatShared {
    state: Mutex<ChatState>,
    view: watch::Sender<ChatView>,
}

impl ChatShared {
    fn lock(&self) -> MutexGuard<'_, ChatState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &mut ChatState) {
        self.view.send_replace(state.view());
    }

    fn reset(&self, open: Option<OpenChat>) -> u64 {
        let mut state = self.lock();
        let generation = state.reset(open);
        self.publish(&mut state);
        generation
    }

    /// Merge a fetch result unless it belongs to a conversation that is no
    /// longer open.
    fn apply(&self, generation: u64, fetched: Vec<Message>) -> bool {
        let mut state = self.lock();
        if state.generation != generation {
            debug!(
                stale = generation,
                current = state.generation,
                "discarding fetch for a closed conversation"
            );
            return false;
        }
        state.merge(fetched);
        self.publish(&mut state);
        true
    }

    fn current(&self) -> Option<(OpenChat, u64)> {
        let state = self.lock();
        state.open.clone().map(|open| (open, state.generation))
    }
}

struct FocusedChatCycle {
    store: Arc<dyn ConversationStore>,
    shared: Arc<ChatShared>,
    key: ConversationKey,
    viewer: ParticipantId,
    role: Role,
    generation: u64,
}

#[async_trait]
impl SyncCycle for FocusedChatCycle {
    type Output = Vec<Message>;

    async fn fetch(&mut self) -> Result<Vec<Message>> {
        sync_conversation(self.store.as_ref(), &self.key, &self.viewer, self.role).await
    }

    fn apply(&mut self, output: Vec<Message>) {
        self.shared.apply(self.generation, output);
    }
}

pub struct ChatScreen {
    store: Arc<dyn ConversationStore>,
    viewer: ParticipantId,
    role: Role,
    config: SyncConfig,
    shared: Arc<ChatShared>,
    poller: Option<Poller>,
}

impl ChatScreen {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        viewer: ParticipantId,
        role: Role,
        config: SyncConfig,
    ) -> Self {
        let (view, _rx) = watch::channel(ChatView::default());
        Self {
            store,
            viewer,
            role,
            config,
            shared: Arc::new(ChatShared {
                state: Mutex::new(ChatState::default()),
                view,
            }),
            poller: None,
        }
    }

    /// Show the conversation with `other`, replacing whatever was open.
    ///
    /// The previous poller is fully stopped before the new one starts, so at
    /// most one focused loop ever runs per screen.
    pub async fn open(&mut self, other: ParticipantId) -> Result<ConversationKey> {
        let key = resolve(&self.viewer, &other)?;

        if let Some(previous) = self.poller.take() {
            previous.shutdown().await;
        }

        let generation = self.shared.reset(Some(OpenChat {
            key: key.clone(),
            other: other.clone(),
        }));

        let cycle = FocusedChatCycle {
            store: self.store.clone(),
            shared: self.shared.clone(),
            key: key.clone(),
            viewer: self.viewer.clone(),
            role: self.role,
            generation,
        };
        self.poller = Some(Poller::spawn(
            "focused-chat",
            self.config.chat_interval,
            self.config.fetch_timeout,
            cycle,
        ));

        info!(key = %key, viewer = %self.viewer, "chat opened");
        Ok(key)
    }

    /// Stop polling and clear the view.
    pub async fn close(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.shutdown().await;
        }
        self.shared.reset(None);
    }

    pub fn is_polling(&self) -> bool {
        self.poller.as_ref().is_some_and(Poller::is_running)
    }

    pub fn subscribe(&self) -> watch::Receiver<ChatView> {
        self.shared.view.subscribe()
    }

    pub fn view(&self) -> ChatView {
        self.shared.view.borrow().clone()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.shared.view.borrow().messages.clone()
    }

    /// Send `text` to the open conversation.
    ///
    /// The message shows up immediately as pending, is appended to the
    /// store, and one fetch runs right away instead of waiting for the next
    /// tick. If the append fails the pending copy is withdrawn and the error
    /// returned; a failing follow-up fetch is only logged.
    pub async fn send(&self, text: &str) -> Result<Message> {
        let (open, generation, mut message) = {
            let mut state = self.shared.lock();
            let open = state.open.clone().ok_or(SyncError::NotOpen)?;
            let timestamp = state.next_timestamp();
            let message =
                Message::compose(self.role, &self.viewer, &open.other, text, timestamp)?;
            state.pending.push(message.clone());
            self.shared.publish(&mut state);
            (open, state.generation, message)
        };

        let appended = time::timeout(
            self.config.fetch_timeout,
            self.store.append(&open.key, &message),
        )
        .await
        .map_err(|_| SyncError::Timeout(self.config.fetch_timeout))
        .and_then(|r| r.map_err(SyncError::from));

        match appended {
            Ok(id) => message.id = Some(id),
            Err(e) => {
                let mut state = self.shared.lock();
                state.pending.retain(|m| m.dedup_key() != message.dedup_key());
                self.shared.publish(&mut state);
                return Err(e);
            }
        }

        if let Err(e) = self.sync_once(&open.key, generation).await {
            warn!(key = %open.key, error = %e, "post-send fetch failed");
        }
        Ok(message)
    }

    /// Run one fetch-reconcile-apply pass now.
    pub async fn refresh(&self) -> Result<()> {
        let (open, generation) = self.shared.current().ok_or(SyncError::NotOpen)?;
        self.sync_once(&open.key, generation).await
    }

    async fn sync_once(&self, key: &ConversationKey, generation: u64) -> Result<()> {
        let messages = time::timeout(
            self.config.fetch_timeout,
            sync_conversation(self.store.as_ref(), key, &self.viewer, self.role),
        )
        .await
        .map_err(|_| SyncError::Timeout(self.config.fetch_timeout))??;

        self.shared.apply(generation, messages);
        Ok(())
    }
}
