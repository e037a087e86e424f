//! Installing, updating and uninstalling mods on disk.

pub mod installer;
pub mod verify;

pub use installer::{ModInstaller, SharedCollection, SubscriptionSync, WorkReport};
pub use verify::verify_download;
