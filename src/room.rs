//! Call Room - Host einer Session
//!
//! Verbindet Session, Konfigurations-Store und Remote-Wiedergabe.
//! Die UI-Schicht ruft nur `mount()` und `unmount()` an den
//! Grenzen ihres Lebenszyklus auf.

use crate::call_session::{CallSession, DurationResolver, SessionOptions, StartOutcome};
use crate::config::{ConfigError, MediaConfigStore, RoomSettings, SqliteConfigStore};
use crate::media::{default_devices, MediaDevices, NullPreview, PreviewSurface};
use crate::playback::RemotePlayback;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::task::{JoinError, JoinHandle};

// ============================================================================
// CALL ROOM
// ============================================================================

pub struct CallRoom {
    session: CallSession,
    store: Arc<dyn MediaConfigStore>,
    site_id: String,
    playback: Arc<RwLock<RemotePlayback>>,
}

/// Laufende Initialisierung nach `mount()`
#[derive(Debug)]
pub struct Mounted {
    lookup: JoinHandle<()>,
    acquisition: JoinHandle<StartOutcome>,
}

impl Mounted {
    /// Wartet auf Konfigurations-Abfrage und Geräte-Anforderung
    pub async fn settled(self) -> Result<StartOutcome, JoinError> {
        let (lookup, acquisition) = futures::future::join(self.lookup, self.acquisition).await;
        lookup?;
        acquisition
    }
}

impl CallRoom {
    /// Erstellt den Raum; `query` ist die URL oder der Query-String der Seite
    pub fn new(
        settings: &RoomSettings,
        query: &str,
        devices: Arc<dyn MediaDevices>,
        preview: Arc<dyn PreviewSurface>,
        store: Arc<dyn MediaConfigStore>,
    ) -> Self {
        // Query zuerst und synchron, vor jeder Abfrage
        let resolver = DurationResolver::new(settings.default_duration_seconds).with_query(query);
        let options = SessionOptions {
            constraints: settings.capture,
            ..Default::default()
        };

        Self {
            session: CallSession::new(devices, preview, resolver, options),
            store,
            site_id: settings.site_id.clone(),
            playback: Arc::new(RwLock::new(RemotePlayback::builtin())),
        }
    }

    /// Öffnet den Raum mit SQLite-Store und den Standard-Geräten
    pub fn open(settings: &RoomSettings, query: &str) -> Result<Self, ConfigError> {
        let store = match &settings.database_path {
            Some(path) => SqliteConfigStore::open(path)?,
            None => SqliteConfigStore::open_in_memory()?,
        };

        Ok(Self::new(
            settings,
            query,
            default_devices(),
            Arc::new(NullPreview),
            Arc::new(store),
        ))
    }

    pub fn session(&self) -> &CallSession {
        &self.session
    }

    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn playback(&self) -> RemotePlayback {
        self.playback.read().clone()
    }

    /// Startet Konfigurations-Abfrage und Geräte-Anforderung parallel
    pub fn mount(&self) -> Mounted {
        tracing::info!("Mounting call room for site {}", self.site_id);

        let lookup = {
            let session = self.session.clone();
            let store = Arc::clone(&self.store);
            let site_id = self.site_id.clone();
            let playback = Arc::clone(&self.playback);

            tokio::spawn(async move {
                let config = match store.lookup(&site_id).await {
                    Ok(config) => config,
                    Err(e) => {
                        tracing::warn!("Config lookup for {} failed: {}", site_id, e);
                        None
                    }
                };

                *playback.write() = RemotePlayback::from_config(config.as_ref());
                session.apply_config_duration(config.and_then(|c| c.duration_seconds));
            })
        };

        let acquisition = {
            let session = self.session.clone();
            tokio::spawn(async move { session.start_call().await })
        };

        Mounted {
            lookup,
            acquisition,
        }
    }

    /// Erneuter Versuch nach Fehler oder neues Gespräch
    pub async fn start_call(&self) -> StartOutcome {
        self.session.start_call().await
    }

    pub fn hangup(&self) {
        self.session.hangup();
    }

    pub fn unmount(&self) {
        tracing::info!("Unmounting call room for site {}", self.site_id);
        self.session.unmount();
    }
}

impl Drop for CallRoom {
    fn drop(&mut self) {
        self.session.unmount();
    }
}

impl std::fmt::Debug for CallRoom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallRoom")
            .field("site_id", &self.site_id)
            .field("session", &self.session)
            .finish()
    }
}
