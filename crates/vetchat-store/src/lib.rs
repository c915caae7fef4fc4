//! # vetchat-store
//!
//! The conversation store and participant directory the chat engine talks
//! to, expressed as two async traits, plus the backends that implement them:
//!
//! - [`MemoryStore`] / [`MemoryDirectory`] for tests and single-process use,
//! - [`SqliteStore`] for local persistence (what the reference server runs on),
//! - [`HttpStore`] for a remote REST-over-JSON tree store.
//!
//! None of the backends promise ordering or transactions to callers; the
//! engine never relies on either.

pub mod database;
pub mod memory;
pub mod migrations;
pub mod participants;
pub mod records;
pub mod remote;
pub mod store;

mod error;

pub use database::{Database, SqliteStore};
pub use error::{Result, StoreError};
pub use memory::{MemoryDirectory, MemoryStore};
pub use remote::{HttpStore, RemoteConfig};
pub use store::{ConversationStore, ParticipantDirectory};
