//! Persisted form of the mod collection and where it is stored.
//!
//! Loading is lenient: a missing or malformed field falls back to its default
//! instead of rejecting the whole document, so state written by older or newer
//! versions still loads.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::collection::state::ModState;
use crate::collection::types::{ModId, ModMetadata, UserId};
use crate::error::{Error, Result};

/// Key of the entry list in the persisted document.
pub const COLLECTION_KEY: &str = "mod_collection";

/// One persisted collection entry.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EntryRecord {
    pub id: ModId,
    pub profile: ModMetadata,
    pub subscribers: BTreeSet<UserId>,
    pub state: ModState,
    pub size_on_disk: Option<u64>,
    pub path_on_disk: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub never_retry_code: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub never_retry_category: Option<u64>,
}

impl EntryRecord {
    /// Read a record field by field, defaulting anything missing or malformed.
    pub fn from_value(value: &Value) -> Self {
        Self {
            id: parse_safe(value, "id"),
            profile: parse_safe(value, "profile"),
            subscribers: parse_safe(value, "subscribers"),
            state: parse_safe(value, "state"),
            size_on_disk: parse_safe(value, "size_on_disk"),
            path_on_disk: parse_safe(value, "path_on_disk"),
            never_retry_code: parse_safe(value, "never_retry_code"),
            never_retry_category: parse_safe(value, "never_retry_category"),
        }
    }
}

#[derive(Serialize)]
struct CollectionDocument<'a> {
    mod_collection: &'a [EntryRecord],
}

fn parse_safe<T: DeserializeOwned + Default>(value: &Value, key: &str) -> T {
    match value.get(key) {
        None | Some(Value::Null) => T::default(),
        Some(field) => serde_json::from_value(field.clone()).unwrap_or_else(|e| {
            debug!("Ignoring malformed field '{}': {}", key, e);
            T::default()
        }),
    }
}

/// Serialize entry records into the persisted document.
pub fn encode_records(records: &[EntryRecord]) -> Result<Vec<u8>> {
    let document = CollectionDocument {
        mod_collection: records,
    };
    Ok(serde_json::to_vec_pretty(&document)?)
}

/// Parse the persisted document back into entry records.
///
/// Only a document that is not JSON at all is an error. Every other field
/// falls back to its default, except the identifier: a record whose `id` is
/// missing or not a number is skipped, since it cannot be keyed without
/// colliding with other such records. An explicit id of 0 is kept.
pub fn decode_records(bytes: &[u8]) -> Result<Vec<EntryRecord>> {
    let document: Value = serde_json::from_slice(bytes)?;
    let Some(entries) = document.get(COLLECTION_KEY).and_then(Value::as_array) else {
        warn!("Persisted state has no '{}' list, starting empty", COLLECTION_KEY);
        return Ok(Vec::new());
    };

    let mut records = Vec::with_capacity(entries.len());
    for value in entries {
        let has_id = value
            .get("id")
            .is_some_and(|id| serde_json::from_value::<ModId>(id.clone()).is_ok());
        if !has_id {
            warn!("Skipping persisted entry without a mod id");
            continue;
        }
        records.push(EntryRecord::from_value(value));
    }
    Ok(records)
}

/// Source and sink for serialized collection state.
pub trait StateStore: Send + Sync {
    /// Read the last written state, or `None` if nothing was ever written.
    fn read(&self) -> Result<Option<Vec<u8>>>;

    /// Replace the stored state.
    fn write(&self, bytes: &[u8]) -> Result<()>;
}

/// State kept in a JSON file, replaced atomically on every write.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStore for JsonFileStore {
    fn read(&self) -> Result<Option<Vec<u8>>> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Io(e)),
        }
    }

    fn write(&self, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write beside the target, flush, then rename over it.
        let temp_path = self
            .path
            .with_extension(format!("json.{}.tmp", std::process::id()));
        {
            let mut file = File::create(&temp_path)?;
            file.write_all(bytes)?;
            file.sync_all()?;
        }

        if let Err(e) = fs::rename(&temp_path, &self.path) {
            let _ = fs::remove_file(&temp_path);
            return Err(Error::Io(e));
        }

        debug!("Wrote {} bytes of state to {}", bytes.len(), self.path.display());
        Ok(())
    }
}

/// State kept in memory, for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: Mutex<Option<Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStore {
    fn read(&self) -> Result<Option<Vec<u8>>> {
        Ok(self.data.lock().clone())
    }

    fn write(&self, bytes: &[u8]) -> Result<()> {
        *self.data.lock() = Some(bytes.to_vec());
        Ok(())
    }
}
