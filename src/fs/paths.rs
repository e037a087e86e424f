//! Install and staging path management.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::collection::{ModId, ModMetadata};
use crate::config::Config;
use crate::error::Result;
use crate::fs::naming::{installed_file_name, staging_file_name};

/// Directory a mod is installed into.
pub fn mod_install_path(config: &Config, id: ModId) -> PathBuf {
    config.mods_directory().join(id.to_string())
}

/// Fresh staging file for a download of `id`.
pub fn staging_path(config: &Config, id: ModId) -> PathBuf {
    config.temp_directory().join(staging_file_name(id))
}

/// Final location of the downloaded file inside `install_dir`.
pub fn installed_file_path(install_dir: &Path, metadata: &ModMetadata) -> Result<PathBuf> {
    Ok(install_dir.join(installed_file_name(metadata)?))
}

/// Ensure a directory exists, creating it if necessary.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)?;
    }
    Ok(())
}

/// Total size of the files under `path`.
pub fn dir_size(path: &Path) -> io::Result<u64> {
    let metadata = fs::symlink_metadata(path)?;
    if !metadata.is_dir() {
        return Ok(metadata.len());
    }

    let mut total = 0;
    for entry in fs::read_dir(path)? {
        total += dir_size(&entry?.path())?;
    }
    Ok(total)
}
