//! Command-line argument definitions using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Config;

/// Mod collection manager CLI.
#[derive(Parser, Debug)]
#[command(
    name = "modsync",
    version,
    about = "Track, install and reconcile downloadable mods",
    long_about = "A CLI tool to inspect and drive a local mod collection.\n\n\
                  Subscriptions are reconciled against remote metadata, downloads are \
                  verified before install, and state survives interrupted sessions."
)]
pub struct Args {
    /// Path to configuration file.
    #[arg(short, long, default_value = "config.toml", global = true)]
    pub config: PathBuf,

    /// Directory holding state, installed mods and staging files.
    #[arg(short = 'r', long = "root", global = true)]
    pub root_directory: Option<PathBuf>,

    /// API key used for metadata requests.
    #[arg(short = 'k', long = "api-key", env = "MODSYNC_API_KEY", global = true)]
    pub api_key: Option<String>,

    /// Game whose mods are managed.
    #[arg(short, long = "game-id", env = "MODSYNC_GAME_ID", global = true)]
    pub game_id: Option<u64>,

    /// API base URL.
    #[arg(long = "base-url", global = true)]
    pub base_url: Option<String>,

    /// Retry budget per mod for this session.
    #[arg(long, global = true)]
    pub retries: Option<u8>,

    /// Enable debug logging.
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// What to do with the collection.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Write the effective configuration to the config file.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
    /// Show every mod in the local collection.
    Status,
    /// Show mods in the order they would be attempted.
    Queue,
    /// Subscribe a user to a mod and install it.
    Install {
        /// Local user id.
        #[arg(short, long)]
        user: u64,
        /// Mod id.
        #[arg(value_name = "MOD")]
        mod_id: u64,
    },
    /// Drop a user's subscription to a mod.
    Unsubscribe {
        /// Local user id.
        #[arg(short, long)]
        user: u64,
        /// Mod id.
        #[arg(value_name = "MOD")]
        mod_id: u64,
    },
    /// Delete mods nobody is subscribed to anymore.
    Uninstall,
    /// Refresh remote metadata, then work through every pending install,
    /// update and uninstall.
    Sync,
}

impl Command {
    /// Whether the command talks to the remote API.
    pub fn needs_network(&self) -> bool {
        matches!(self, Command::Install { .. } | Command::Sync)
    }
}

impl Args {
    /// Merge CLI arguments into an existing config, overriding where specified.
    pub fn merge_into_config(&self, config: &mut Config) {
        if let Some(root) = &self.root_directory {
            config.storage.root_directory = Some(root.clone());
        }

        if let Some(key) = &self.api_key {
            config.api.api_key = key.clone();
        }

        if let Some(game_id) = self.game_id {
            config.api.game_id = game_id;
        }

        if let Some(base_url) = &self.base_url {
            config.api.base_url = base_url.clone();
        }

        if let Some(retries) = self.retries {
            config.mod_management.default_retries = retries;
        }
    }
}
