//! Client-side sync engine for owner/vet conversations.
//!
//! Screens poll the conversation store on a timer: a [`ChatListScreen`]
//! keeps the conversation list and the global unread badge fresh, and a
//! [`ChatScreen`] follows one open conversation, marks incoming messages as
//! seen and sends new ones.

pub mod aggregate;
pub mod badge;
pub mod chat;
pub mod config;
pub mod error;
pub mod list;
pub mod ordering;
pub mod poller;
pub mod reconcile;

pub use aggregate::{Aggregate, ConversationSummary};
pub use badge::UnreadBadge;
pub use chat::{ChatScreen, ChatView};
pub use config::SyncConfig;
pub use error::{Result, SyncError};
pub use list::ChatListScreen;
pub use poller::{LoopState, Poller, SyncCycle};
pub use reconcile::{reconcile, ReadPatch};

use tracing_subscriber::{fmt, EnvFilter};

/// Install a `fmt` subscriber honouring `RUST_LOG`. Does nothing if the
/// host already installed one.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("vetchat_engine=debug,vetchat_store=info,warn"));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}
