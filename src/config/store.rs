//! Media-Konfiguration pro Site
//!
//! Liefert `{video_url, audio_url, duration_seconds}` für eine Site-ID.
//! Der Call-Kern liest nur; Schreiben erfolgt über die Operator-Seite.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Failed to create database directory: {0}")]
    DirectoryCreation(#[from] std::io::Error),

    #[error("Lookup failed: {0}")]
    Unavailable(String),

    #[error("Invalid duration: {0}")]
    InvalidDuration(i64),
}

// ============================================================================
// REMOTE MEDIA CONFIG
// ============================================================================

/// Konfiguration der Remote-Medien einer Site
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteMediaConfig {
    pub video_url: Option<String>,
    pub audio_url: Option<String>,
    pub duration_seconds: Option<u32>,
}

/// Lesender Zugriff auf die Konfiguration
#[async_trait]
pub trait MediaConfigStore: Send + Sync {
    /// `Ok(None)` wenn für die Site nichts hinterlegt ist
    async fn lookup(&self, site_id: &str) -> Result<Option<RemoteMediaConfig>, ConfigError>;
}

// ============================================================================
// SQLITE STORE
// ============================================================================

/// SQLite-Tabelle `call_config` (Thread-safe durch Mutex)
pub struct SqliteConfigStore {
    conn: Mutex<Connection>,
}

impl SqliteConfigStore {
    /// Öffnet oder erstellt die Datenbank
    pub fn open(path: &Path) -> Result<Self, ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        tracing::info!("Opening config database at {:?}", path);

        let store = Self {
            conn: Mutex::new(Connection::open(path)?),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// In-Memory Datenbank (Tests, Kiosk ohne Datenverzeichnis)
    pub fn open_in_memory() -> Result<Self, ConfigError> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), ConfigError> {
        let conn = self.conn.lock();
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS call_config (
                id TEXT PRIMARY KEY,
                video_url TEXT,
                audio_url TEXT,
                duration_seconds INTEGER,
                updated_at TEXT NOT NULL
            )
            "#,
            [],
        )?;
        Ok(())
    }

    /// Liest die Zeile einer Site
    pub fn get(&self, site_id: &str) -> Result<Option<RemoteMediaConfig>, ConfigError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT video_url, audio_url, duration_seconds FROM call_config WHERE id = ?1",
                params![site_id],
                |row| {
                    Ok((
                        row.get::<_, Option<String>>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<i64>>(2)?,
                    ))
                },
            )
            .optional()?;

        Ok(row.map(|(video_url, audio_url, duration)| RemoteMediaConfig {
            video_url: video_url.filter(|u| !u.trim().is_empty()),
            audio_url: audio_url.filter(|u| !u.trim().is_empty()),
            // Nicht-positive Werte zählen als "kein Wert"
            duration_seconds: duration
                .filter(|d| *d > 0)
                .and_then(|d| u32::try_from(d).ok()),
        }))
    }

    /// Speichert die Medien-URLs einer Site; `None` lässt den Wert unverändert
    pub fn save_media(
        &self,
        site_id: &str,
        video_url: Option<&str>,
        audio_url: Option<&str>,
    ) -> Result<(), ConfigError> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn.lock();
        conn.execute(
            r#"
            INSERT INTO call_config (id, video_url, audio_url, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO UPDATE SET
                video_url = COALESCE(excluded.video_url, call_config.video_url),
                audio_url = COALESCE(excluded.audio_url, call_config.audio_url),
                updated_at = excluded.updated_at
            "#,
            params![site_id, video_url, audio_url, now],
        )?;

        tracing::info!("Saved media config for site {}", site_id);
        Ok(())
    }

    /// Setzt die Standard-Gesprächsdauer einer Site
    pub fn set_duration(&self, site_id: &str, seconds: Option<u32>) -> Result<(), ConfigError> {
        if seconds == Some(0) {
            return Err(ConfigError::InvalidDuration(0));
        }

        let now = Utc::now().to_rfc3339();
        let conn = self.conn.lock();
        conn.execute(
            r#"
            INSERT INTO call_config (id, duration_seconds, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(id) DO UPDATE SET
                duration_seconds = excluded.duration_seconds,
                updated_at = excluded.updated_at
            "#,
            params![site_id, seconds.map(i64::from), now],
        )?;
        Ok(())
    }
}

#[async_trait]
impl MediaConfigStore for SqliteConfigStore {
    async fn lookup(&self, site_id: &str) -> Result<Option<RemoteMediaConfig>, ConfigError> {
        self.get(site_id)
    }
}

impl std::fmt::Debug for SqliteConfigStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteConfigStore").finish_non_exhaustive()
    }
}

// ============================================================================
// MEMORY STORE
// ============================================================================

/// In-Memory Store mit optionaler Latenz und Fehlerinjektion
#[derive(Debug, Default, Clone)]
pub struct MemoryConfigStore {
    entries: Arc<Mutex<HashMap<String, RemoteMediaConfig>>>,
    latency: Duration,
    unreachable: bool,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(self, site_id: impl Into<String>, config: RemoteMediaConfig) -> Self {
        self.entries.lock().insert(site_id.into(), config);
        self
    }

    /// Jede Abfrage dauert `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Jede Abfrage scheitert
    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }
}

#[async_trait]
impl MediaConfigStore for MemoryConfigStore {
    async fn lookup(&self, site_id: &str) -> Result<Option<RemoteMediaConfig>, ConfigError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.unreachable {
            return Err(ConfigError::Unavailable("store unreachable".to_string()));
        }
        Ok(self.entries.lock().get(site_id).cloned())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const SITE: &str = "00000000-0000-0000-0000-000000000000";

    #[test]
    fn test_missing_site_returns_none() {
        let store = SqliteConfigStore::open_in_memory().unwrap();
        assert_eq!(store.get(SITE).unwrap(), None);
    }

    #[test]
    fn test_save_media_keeps_unset_values() {
        let store = SqliteConfigStore::open_in_memory().unwrap();
        store
            .save_media(SITE, Some("https://cdn.example/loop.mp4"), Some("https://cdn.example/voice.mp3"))
            .unwrap();
        store
            .save_media(SITE, Some("https://cdn.example/loop-2.mp4"), None)
            .unwrap();

        let config = store.get(SITE).unwrap().unwrap();
        assert_eq!(config.video_url.as_deref(), Some("https://cdn.example/loop-2.mp4"));
        assert_eq!(config.audio_url.as_deref(), Some("https://cdn.example/voice.mp3"));
        assert_eq!(config.duration_seconds, None);
    }

    #[test]
    fn test_duration_roundtrip_and_zero_rejected() {
        let store = SqliteConfigStore::open_in_memory().unwrap();
        store.set_duration(SITE, Some(180)).unwrap();
        assert_eq!(store.get(SITE).unwrap().unwrap().duration_seconds, Some(180));

        assert!(matches!(
            store.set_duration(SITE, Some(0)),
            Err(ConfigError::InvalidDuration(0))
        ));
    }

    #[test]
    fn test_non_positive_stored_duration_is_ignored() {
        let store = SqliteConfigStore::open_in_memory().unwrap();
        store
            .conn
            .lock()
            .execute(
                "INSERT INTO call_config (id, duration_seconds, updated_at) VALUES (?1, -5, 'x')",
                params![SITE],
            )
            .unwrap();

        assert_eq!(store.get(SITE).unwrap().unwrap().duration_seconds, None);
    }

    #[test]
    fn test_file_backed_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("call_config.db");

        {
            let store = SqliteConfigStore::open(&path).unwrap();
            store.set_duration(SITE, Some(600)).unwrap();
        }

        let store = SqliteConfigStore::open(&path).unwrap();
        assert_eq!(store.get(SITE).unwrap().unwrap().duration_seconds, Some(600));
    }

    #[tokio::test]
    async fn test_unreachable_memory_store_errors() {
        let store = MemoryConfigStore::new().unreachable();
        assert!(store.lookup(SITE).await.is_err());
    }
}
