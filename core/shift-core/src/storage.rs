//! Storage configuration and path management.
//!
//! `StorageConfig` is the single place that decides where shift tracking data
//! lives on disk. Production code uses [`StorageConfig::from_home`], which
//! points to `~/.shift-tracker/`. Tests use [`StorageConfig::with_root`] with a
//! temp directory.

use std::path::{Path, PathBuf};

use fs_err as fs;

use crate::error::{Result, ShiftError};

const ROOT_DIR_NAME: &str = ".shift-tracker";

#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Root directory for all data (default: ~/.shift-tracker)
    root: PathBuf,
}

impl StorageConfig {
    /// Resolves the default root under the user's home directory.
    pub fn from_home() -> Result<Self> {
        let home = dirs::home_dir().ok_or(ShiftError::HomeDirNotFound)?;
        Ok(Self {
            root: home.join(ROOT_DIR_NAME),
        })
    }

    /// Creates a StorageConfig with a custom root directory.
    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Files
    // ─────────────────────────────────────────────────────────────────────────────

    /// Path to config.json (tunables, see [`crate::ShiftConfig`]).
    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.json")
    }

    /// Path to store.json (key-value persistence, holds the check-in cache).
    pub fn store_file(&self) -> PathBuf {
        self.root.join("store.json")
    }

    /// Path to backend.json (offline snapshot of attendance records).
    pub fn backend_file(&self) -> PathBuf {
        self.root.join("backend.json")
    }

    /// Path to directory.json (identity records used by code verification).
    pub fn directory_file(&self) -> PathBuf {
        self.root.join("directory.json")
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Directories
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Creates the root and logs directories if missing.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [self.root.clone(), self.logs_dir()] {
            fs::create_dir_all(&dir).map_err(|source| ShiftError::Io {
                context: format!("creating {}", dir.display()),
                source,
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_with_root_uses_custom_path() {
        let config = StorageConfig::with_root(PathBuf::from("/tmp/shifts"));
        assert_eq!(config.root(), Path::new("/tmp/shifts"));
    }

    #[test]
    fn test_file_paths() {
        let config = StorageConfig::with_root(PathBuf::from("/tmp/shifts"));
        assert_eq!(config.config_file(), PathBuf::from("/tmp/shifts/config.json"));
        assert_eq!(config.store_file(), PathBuf::from("/tmp/shifts/store.json"));
        assert_eq!(config.backend_file(), PathBuf::from("/tmp/shifts/backend.json"));
        assert_eq!(
            config.directory_file(),
            PathBuf::from("/tmp/shifts/directory.json")
        );
        assert_eq!(config.logs_dir(), PathBuf::from("/tmp/shifts/logs"));
    }

    #[test]
    fn test_from_home_ends_with_root_dir_name() {
        if let Ok(config) = StorageConfig::from_home() {
            assert!(config.root().ends_with(ROOT_DIR_NAME));
        }
    }

    #[test]
    fn test_ensure_dirs_creates_structure() {
        let temp = TempDir::new().unwrap();
        let config = StorageConfig::with_root(temp.path().join("nested"));

        config.ensure_dirs().unwrap();

        assert!(config.root().exists());
        assert!(config.logs_dir().exists());
    }
}
