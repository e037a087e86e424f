//! Configuration module for modsync.
//!
//! This module handles:
//! - Loading configuration from TOML files
//! - Derived storage paths and runtime settings
//! - Configuration validation

pub mod loader;
pub mod validation;

pub use loader::{ApiConfig, CacheConfig, Config, IoConfig, ModManagementConfig, StorageConfig};
pub use validation::{validate_api_config, validate_config};
