//! Persisted user settings (`settings.json`).

use crate::scheduler::DEFAULT_TARGET_PERCENT;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// File name used next to the executable.
pub const SETTINGS_FILE_NAME: &str = "settings.json";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to access settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize settings: {0}")]
    Json(#[from] serde_json::Error),
}

/// Values the scheduler is started with. Stored unclamped; the scheduler clamps on use.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserSettings {
    /// Aggregate CPU load target in percent
    pub target_total_percent: f64,
    /// Whether per-cycle jitter is enabled
    pub eco_mode: bool,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            target_total_percent: DEFAULT_TARGET_PERCENT,
            eco_mode: false,
        }
    }
}

impl UserSettings {
    /// Default settings location: `settings.json` in the executable's directory.
    ///
    /// Falls back to the working directory if the executable path is unknown.
    pub fn default_path() -> PathBuf {
        std::env::current_exe()
            .map(|mut p| {
                p.set_file_name(SETTINGS_FILE_NAME);
                p
            })
            .unwrap_or_else(|_| SETTINGS_FILE_NAME.into())
    }

    /// Loads settings from `path`.
    ///
    /// Never fails: a missing file gives defaults, and an unreadable or corrupt one
    /// gives defaults plus a warning.
    pub fn load(path: &Path) -> Self {
        let data = match std::fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no settings file, using defaults");
                return Self::default();
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read settings, using defaults");
                return Self::default();
            }
        };

        serde_json::from_str(&data).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "settings file is corrupt, using defaults");
            Self::default()
        })
    }

    /// Writes settings to `path` as pretty-printed JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        let json = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| SettingsError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(path, json).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = UserSettings::load(&dir.path().join("absent.json"));
        assert_eq!(settings, UserSettings::default());
        assert_eq!(settings.target_total_percent, 3.0);
        assert!(!settings.eco_mode);
    }

    #[test]
    fn corrupt_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE_NAME);
        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(UserSettings::load(&path), UserSettings::default());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE_NAME);
        std::fs::write(&path, r#"{ "eco_mode": true }"#).unwrap();

        let settings = UserSettings::load(&path);
        assert!(settings.eco_mode);
        assert_eq!(settings.target_total_percent, DEFAULT_TARGET_PERCENT);
    }

    #[test]
    fn saved_settings_load_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(SETTINGS_FILE_NAME);
        let settings = UserSettings {
            target_total_percent: 7.5,
            eco_mode: true,
        };

        settings.save(&path).unwrap();
        assert_eq!(UserSettings::load(&path), settings);
    }

    #[test]
    fn out_of_range_values_are_kept_as_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE_NAME);
        std::fs::write(&path, r#"{ "target_total_percent": 42.0, "eco_mode": false }"#).unwrap();
        assert_eq!(UserSettings::load(&path).target_total_percent, 42.0);
    }

    #[test]
    fn default_path_uses_settings_file_name() {
        let path = UserSettings::default_path();
        assert_eq!(path.file_name().unwrap(), SETTINGS_FILE_NAME);
    }
}
