//! Installation state of a mod.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-mod installation state.
///
/// An entry never advances on its own; whoever drives installs moves it between
/// states. `Downloading` and `Extracting` are transitional and guarded by a
/// transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ModState {
    #[default]
    InstallationPending,
    Downloading,
    Extracting,
    Installed,
    UpdatePending,
    UninstallPending,
}

impl ModState {
    /// Whether the state is one a transaction guards.
    pub fn is_transitional(self) -> bool {
        matches!(self, ModState::Downloading | ModState::Extracting)
    }

    /// Whether an install or update is outstanding for this state.
    pub fn wants_install(self) -> bool {
        matches!(self, ModState::InstallationPending | ModState::UpdatePending)
    }
}

impl fmt::Display for ModState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModState::InstallationPending => write!(f, "installation pending"),
            ModState::Downloading => write!(f, "downloading"),
            ModState::Extracting => write!(f, "extracting"),
            ModState::Installed => write!(f, "installed"),
            ModState::UpdatePending => write!(f, "update pending"),
            ModState::UninstallPending => write!(f, "uninstall pending"),
        }
    }
}
