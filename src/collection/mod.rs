//! Local mod state.
//!
//! This module provides:
//! - Identifiers and remote metadata types
//! - The per-mod state machine ([`ModCollectionEntry`])
//! - Per-user subscription sets and their diff
//! - The [`ModCollection`] aggregate with retry-priority ordering
//! - The mod management event log
//! - Persistence of the collection

pub mod entry;
pub mod event_log;
pub mod mod_collection;
pub mod persistence;
pub mod state;
pub mod subscriptions;
pub mod types;

pub use entry::{EntrySnapshot, ModCollectionEntry};
pub use event_log::{EventKind, ModEvent, ModEventLog};
pub use mod_collection::{ModCollection, Reconciled};
pub use persistence::{EntryRecord, JsonFileStore, MemoryStore, StateStore};
pub use state::ModState;
pub use subscriptions::{ChangeType, UserSubscriptionList};
pub use types::{FileInfo, GameInfo, ModId, ModMetadata, UserId};
