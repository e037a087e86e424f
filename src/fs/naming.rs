//! Filename generation for downloaded mod files.

use uuid::Uuid;

use crate::collection::{ModId, ModMetadata};
use crate::error::{Error, Result};

/// Validate and sanitize a remote filename by removing or replacing invalid characters.
///
/// Returns an error if the filename contains path traversal patterns.
pub fn sanitize_filename(name: &str) -> Result<String> {
    if name.contains("..") {
        return Err(Error::InvalidFilename(format!(
            "Path traversal detected: '{}'",
            name
        )));
    }

    if name.contains('/') || name.contains('\\') {
        return Err(Error::InvalidFilename(format!(
            "Path separators not allowed in filename: '{}'",
            name
        )));
    }

    if name.contains('\0') {
        return Err(Error::InvalidFilename(format!(
            "Null bytes not allowed in filename: '{}'",
            name
        )));
    }

    let sanitized: String = name
        .chars()
        .map(|c| match c {
            ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if sanitized.trim().is_empty() {
        return Err(Error::InvalidFilename(
            "Filename cannot be empty or whitespace-only".to_string(),
        ));
    }

    Ok(sanitized)
}

/// Name the installed file of a mod takes inside its install directory.
///
/// Mods without a usable remote filename fall back to `<id>.bin`.
pub fn installed_file_name(metadata: &ModMetadata) -> Result<String> {
    match metadata.file_info.as_ref().map(|info| info.filename.as_str()) {
        Some(name) if !name.trim().is_empty() => sanitize_filename(name),
        _ => Ok(format!("{}.bin", metadata.id)),
    }
}

/// Unique name for a partial download of `id`.
pub fn staging_file_name(id: ModId) -> String {
    format!("{}_{}.download", id, Uuid::new_v4().simple())
}
