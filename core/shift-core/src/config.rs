//! Configuration loading and saving.
//!
//! Every field has a default, so a missing or partially written
//! `config.json` still yields a usable [`ShiftConfig`].

use std::time::Duration;

use chrono::FixedOffset;
use fs_err as fs;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ShiftError};
use crate::identity::DigestScheme;
use crate::storage::StorageConfig;

/// Tunables for resolution, anomaly detection, identity and diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShiftConfig {
    /// Offset of the backend's deployment zone, in minutes east of UTC.
    pub fixed_offset_minutes: i32,
    /// Open shifts longer than this are reported as excessive.
    pub max_shift_hours: i64,
    /// Closed shifts at or above this are flagged as overtime.
    pub overtime_hours: i64,
    pub digest_scheme: DigestScheme,
    /// Regex matched against persisted keys to spot duplicate attendance caches.
    pub cache_key_pattern: String,
    pub clock_tolerance_secs: u64,
}

impl Default for ShiftConfig {
    fn default() -> Self {
        Self {
            fixed_offset_minutes: 480,
            max_shift_hours: 24,
            overtime_hours: 12,
            digest_scheme: DigestScheme::default(),
            cache_key_pattern: "(?i)checkin".to_string(),
            clock_tolerance_secs: 5,
        }
    }
}

impl ShiftConfig {
    pub fn fixed_offset(&self) -> Result<FixedOffset> {
        FixedOffset::east_opt(self.fixed_offset_minutes * 60).ok_or_else(|| {
            ShiftError::InvalidConfig {
                field: "fixed_offset_minutes".to_string(),
                details: format!("{} is not a valid UTC offset", self.fixed_offset_minutes),
            }
        })
    }

    pub fn max_shift(&self) -> chrono::Duration {
        chrono::Duration::hours(self.max_shift_hours)
    }

    pub fn overtime(&self) -> chrono::Duration {
        chrono::Duration::hours(self.overtime_hours)
    }

    pub fn clock_tolerance(&self) -> Duration {
        Duration::from_secs(self.clock_tolerance_secs)
    }

    pub fn cache_key_regex(&self) -> Result<Regex> {
        Regex::new(&self.cache_key_pattern).map_err(|e| ShiftError::InvalidConfig {
            field: "cache_key_pattern".to_string(),
            details: e.to_string(),
        })
    }

    /// Checks values that serde cannot: offsets, regexes, ceilings.
    pub fn validate(&self) -> Result<()> {
        self.fixed_offset()?;
        self.cache_key_regex()?;
        if self.max_shift_hours <= 0 {
            return Err(ShiftError::InvalidConfig {
                field: "max_shift_hours".to_string(),
                details: "must be positive".to_string(),
            });
        }
        if self.overtime_hours <= 0 {
            return Err(ShiftError::InvalidConfig {
                field: "overtime_hours".to_string(),
                details: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}

/// Loads the configuration, returning defaults if the file is missing,
/// malformed, or holds invalid values.
pub fn load_config(storage: &StorageConfig) -> ShiftConfig {
    let path = storage.config_file();
    let loaded = fs::read_to_string(&path)
        .ok()
        .and_then(|content| match serde_json::from_str::<ShiftConfig>(&content) {
            Ok(config) => Some(config),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring malformed config");
                None
            }
        });

    match loaded {
        Some(config) => match config.validate() {
            Ok(()) => config,
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring invalid config, using defaults");
                ShiftConfig::default()
            }
        },
        None => ShiftConfig::default(),
    }
}

pub fn save_config(storage: &StorageConfig, config: &ShiftConfig) -> Result<()> {
    config.validate()?;
    let path = storage.config_file();
    let content = serde_json::to_string_pretty(config).map_err(|source| ShiftError::Json {
        context: "serializing config".to_string(),
        source,
    })?;
    storage.ensure_dirs()?;
    fs::write(&path, content).map_err(|source| ShiftError::Io {
        context: format!("writing {}", path.display()),
        source,
    })
}
