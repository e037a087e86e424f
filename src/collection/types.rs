//! Identifiers and remote metadata.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identifier of a mod; the primary key of every collection.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ModId(pub u64);

impl fmt::Display for ModId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ModId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        s.trim().parse().map(ModId)
    }
}

/// Identifier of a local user session.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Remote description of the downloadable file of a mod.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FileInfo {
    /// Version identifier of the file; changes whenever a new file is published.
    #[serde(default)]
    pub metadata_id: u64,

    #[serde(default)]
    pub filename: String,

    #[serde(default)]
    pub filesize: u64,

    /// Hex encoded MD5 of the file, when the server provides one.
    #[serde(default)]
    pub filehash_md5: Option<String>,

    #[serde(default)]
    pub download_url: String,
}

/// Latest known remote metadata for a mod.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ModMetadata {
    pub id: ModId,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub summary: String,

    #[serde(default)]
    pub file_info: Option<FileInfo>,

    /// Unix timestamp of the last remote update.
    #[serde(default)]
    pub date_updated: i64,
}

impl ModMetadata {
    /// Version identifier of the current file, if any.
    pub fn file_version(&self) -> Option<u64> {
        self.file_info.as_ref().map(|info| info.metadata_id)
    }
}

/// Metadata for the game the mods belong to.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GameInfo {
    pub id: u64,

    #[serde(default)]
    pub name: String,

    /// Display name the game uses for user generated content.
    #[serde(default)]
    pub ugc_name: String,
}
