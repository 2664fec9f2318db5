//! Config Module - Settings und Media-Konfiguration
//!
//! Dieses Modul verwaltet:
//! - Room Settings aus der Umgebung
//! - Den Media-Konfigurations-Store (SQLite, In-Memory)

mod settings;
mod store;

pub use settings::{
    RoomSettings, SettingsError, DEFAULT_DURATION_SECONDS, DEFAULT_SITE_ID, ENV_DATABASE,
    ENV_DEFAULT_SECONDS, ENV_SITE_ID,
};
pub use store::{
    ConfigError, MediaConfigStore, MemoryConfigStore, RemoteMediaConfig, SqliteConfigStore,
};
