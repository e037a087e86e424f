//! modsync - client-side engine for tracking, installing and reconciling mods
//!
//! This library keeps a local collection of mods in step with what users are
//! subscribed to on a remote mod service.
//!
//! # Features
//!
//! - Per-mod state machine with transactional rollback and a session retry budget
//! - Reference-counted subscriptions shared between local users
//! - Resumable operations for metadata fetches, downloads and offset file IO
//! - Response caching for mod and game metadata
//! - Download verification against the remote MD5 hash
//! - Crash-tolerant persistence of the collection
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use modsync::{Config, ModId, ModInstaller, UserId};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load(Path::new("config.toml"))?;
//!     let installer = ModInstaller::from_config(config)?;
//!
//!     let state = installer.ensure_installed(UserId(1), ModId(2107)).await?;
//!     println!("mod is {}", state);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod cli;
pub mod collection;
pub mod config;
pub mod error;
pub mod fs;
pub mod install;
pub mod ops;
pub mod output;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenience
pub use collection::{
    ModCollection, ModCollectionEntry, ModId, ModMetadata, ModState, UserId,
    UserSubscriptionList,
};
pub use config::Config;
pub use error::{Error, ErrorCode, OpResult, Result};
pub use install::{ModInstaller, WorkReport};
pub use ops::{drive, CancellationToken, Operation};
