//! Room Settings
//!
//! Werden aus Umgebungsvariablen geladen; ungültige Werte fallen
//! mit Warnung auf die Defaults zurück.

use crate::media::CaptureConstraints;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Site-ID der Standard-Installation
pub const DEFAULT_SITE_ID: &str = "00000000-0000-0000-0000-000000000000";

/// Obergrenze, falls keine Dauer konfiguriert ist (30 Minuten)
pub const DEFAULT_DURATION_SECONDS: u32 = 30 * 60;

pub const ENV_SITE_ID: &str = "CALL_ROOM_SITE_ID";
pub const ENV_DEFAULT_SECONDS: &str = "CALL_ROOM_DEFAULT_SECONDS";
pub const ENV_DATABASE: &str = "CALL_ROOM_DATABASE";

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Could not determine app data directory")]
    NoDataDirectory,
}

// ============================================================================
// SETTINGS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSettings {
    pub site_id: String,
    pub default_duration_seconds: u32,
    #[serde(default)]
    pub capture: CaptureConstraints,
    /// `None` = In-Memory Konfiguration
    pub database_path: Option<PathBuf>,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            site_id: DEFAULT_SITE_ID.to_string(),
            default_duration_seconds: DEFAULT_DURATION_SECONDS,
            capture: CaptureConstraints::default(),
            database_path: None,
        }
    }
}

impl RoomSettings {
    /// Lädt die Settings aus der Umgebung
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut settings = Self::default();

        if let Some(site_id) = lookup(ENV_SITE_ID).filter(|s| !s.trim().is_empty()) {
            settings.site_id = site_id.trim().to_string();
        }

        if let Some(raw) = lookup(ENV_DEFAULT_SECONDS) {
            match raw.trim().parse::<u32>() {
                Ok(seconds) if seconds > 0 => settings.default_duration_seconds = seconds,
                _ => tracing::warn!(
                    "Ignoring invalid {}={:?}, using {}s",
                    ENV_DEFAULT_SECONDS,
                    raw,
                    DEFAULT_DURATION_SECONDS
                ),
            }
        }

        settings.database_path = match lookup(ENV_DATABASE) {
            Some(path) if path == ":memory:" => None,
            Some(path) if !path.trim().is_empty() => Some(PathBuf::from(path)),
            _ => match Self::default_database_path() {
                Ok(path) => Some(path),
                Err(e) => {
                    tracing::warn!("{}, keeping config in memory", e);
                    None
                }
            },
        };

        settings
    }

    /// Ermittelt den Pfad zur Datenbank-Datei
    pub fn default_database_path() -> Result<PathBuf, SettingsError> {
        let proj_dirs = directories::ProjectDirs::from("com", "callroom", "call-room")
            .ok_or(SettingsError::NoDataDirectory)?;

        let mut path = proj_dirs.data_dir().to_path_buf();
        path.push("call_config.db");
        Ok(path)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings_from(vars: &[(&str, &str)]) -> RoomSettings {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        RoomSettings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_without_env() {
        let settings = settings_from(&[(ENV_DATABASE, ":memory:")]);
        assert_eq!(settings.site_id, DEFAULT_SITE_ID);
        assert_eq!(settings.default_duration_seconds, 1800);
        assert_eq!(settings.database_path, None);
        assert_eq!(settings.capture.video_width, 640);
        assert_eq!(settings.capture.video_height, 360);
    }

    #[test]
    fn test_env_overrides() {
        let settings = settings_from(&[
            (ENV_SITE_ID, "salon-7"),
            (ENV_DEFAULT_SECONDS, "900"),
            (ENV_DATABASE, "/tmp/room.db"),
        ]);
        assert_eq!(settings.site_id, "salon-7");
        assert_eq!(settings.default_duration_seconds, 900);
        assert_eq!(settings.database_path, Some(PathBuf::from("/tmp/room.db")));
    }

    #[test]
    fn test_invalid_default_seconds_falls_back() {
        for raw in ["0", "-3", "abc", ""] {
            let settings = settings_from(&[(ENV_DEFAULT_SECONDS, raw), (ENV_DATABASE, ":memory:")]);
            assert_eq!(settings.default_duration_seconds, DEFAULT_DURATION_SECONDS);
        }
    }
}
