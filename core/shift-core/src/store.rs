//! File-backed key-value persistence.
//!
//! # File Format
//!
//! ```json
//! {
//!   "version": 1,
//!   "entries": {
//!     "vg_volunteer_checkin_times": "{\"42\":\"2025-03-10T23:50:00Z\"}"
//!   }
//! }
//! ```
//!
//! # Defensive Loading
//!
//! The file may be hand-edited or left half-written by a crash, so:
//! - Empty files load as an empty store
//! - Corrupt JSON loads as an empty store (logged)
//! - Unknown versions load as an empty store (logged)
//!
//! # Atomic Writes
//!
//! Every mutation rewrites the whole file through a temp file + rename.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use fs_err as fs;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::{Result, ServiceError, ShiftError};
use crate::services::KeyValueStore;

const STORE_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    #[serde(default)]
    entries: BTreeMap<String, String>,
}

pub struct FileStore {
    entries: Mutex<BTreeMap<String, String>>,
    file_path: PathBuf,
}

impl FileStore {
    pub fn load(file_path: &Path) -> Result<Self> {
        let empty = || FileStore {
            entries: Mutex::new(BTreeMap::new()),
            file_path: file_path.to_path_buf(),
        };

        if !file_path.exists() {
            return Ok(empty());
        }

        let content = fs::read_to_string(file_path).map_err(|source| ShiftError::Io {
            context: "reading store file".to_string(),
            source,
        })?;

        if content.trim().is_empty() {
            tracing::warn!(path = %file_path.display(), "Empty store file, starting empty");
            return Ok(empty());
        }

        match serde_json::from_str::<StoreFile>(&content) {
            Ok(file) if file.version == STORE_VERSION => Ok(FileStore {
                entries: Mutex::new(file.entries),
                file_path: file_path.to_path_buf(),
            }),
            Ok(file) => {
                tracing::warn!(
                    version = file.version,
                    expected = STORE_VERSION,
                    "Unsupported store file version, starting empty"
                );
                Ok(empty())
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to parse store file, starting empty");
                Ok(empty())
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    fn save(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        let store_file = StoreFile {
            version: STORE_VERSION,
            entries: entries.clone(),
        };
        let content =
            serde_json::to_string_pretty(&store_file).map_err(|source| ShiftError::Json {
                context: "serializing store".to_string(),
                source,
            })?;

        let parent_dir = self.file_path.parent().ok_or_else(|| ShiftError::Io {
            context: "store file path has no parent directory".to_string(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        })?;
        fs::create_dir_all(parent_dir).map_err(|source| ShiftError::Io {
            context: "creating store directory".to_string(),
            source,
        })?;

        let io_err = |context: &str| {
            let context = context.to_string();
            move |source: std::io::Error| ShiftError::Io { context, source }
        };
        let mut temp_file =
            NamedTempFile::new_in(parent_dir).map_err(io_err("creating temp store file"))?;
        temp_file
            .write_all(content.as_bytes())
            .map_err(io_err("writing temp store file"))?;
        temp_file.flush().map_err(io_err("flushing temp store file"))?;
        temp_file
            .persist(&self.file_path)
            .map_err(|e| ShiftError::Io {
                context: "persisting store file".to_string(),
                source: e.error,
            })?;

        Ok(())
    }

    /// Applies `change` and persists. The in-memory map is only updated when
    /// the write succeeds.
    fn mutate(&self, change: impl FnOnce(&mut BTreeMap<String, String>)) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let mut next = entries.clone();
        change(&mut next);
        self.save(&next)?;
        *entries = next;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> std::result::Result<Option<String>, ServiceError> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned())
    }

    async fn set(&self, key: &str, value: String) -> std::result::Result<(), ServiceError> {
        self.mutate(|entries| {
            entries.insert(key.to_string(), value);
        })
        .map_err(ServiceError::from)
    }

    async fn remove(&self, key: &str) -> std::result::Result<(), ServiceError> {
        self.mutate(|entries| {
            entries.remove(key);
        })
        .map_err(ServiceError::from)
    }

    async fn keys(&self) -> std::result::Result<Vec<String>, ServiceError> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect())
    }
}
