//! Call Room - private 1:1 Video-Call Simulation
//!
//! Ein Operator zeigt einem Besucher ein vorab aufgenommenes Video,
//! während Kamera und Mikrofon des Besuchers lokal laufen:
//! - Geräte-Anforderung mit garantierter Freigabe
//! - Zeitlimit aus Query, Site-Konfiguration oder Default
//! - SQLite für die Media-Konfiguration pro Site
//! - Optionales Tauri-Plugin als UI-Grenze (Feature `desktop`)

pub mod call_session;
pub mod config;
pub mod media;
pub mod playback;
pub mod room;

#[cfg(feature = "desktop")]
pub mod commands;

pub use call_session::{CallEvent, CallSession, CallSnapshot, CallStatus, EndReason, StartOutcome};
pub use config::{RemoteMediaConfig, RoomSettings};
pub use room::{CallRoom, Mounted};

use once_cell::sync::OnceCell;

// ============================================================================
// LOGGING
// ============================================================================

static TRACING: OnceCell<()> = OnceCell::new();

/// Initialisiert das Logging; weitere Aufrufe sind wirkungslos
pub fn init_tracing() {
    TRACING.get_or_init(|| {
        let mut filter = tracing_subscriber::EnvFilter::from_default_env();
        for directive in ["call_room_lib=debug", "rusqlite=warn"] {
            if let Ok(directive) = directive.parse::<tracing_subscriber::filter::Directive>() {
                filter = filter.add_directive(directive);
            }
        }

        if tracing_subscriber::fmt()
            .with_env_filter(filter)
            .try_init()
            .is_err()
        {
            tracing::debug!("Global tracing subscriber already set");
        }

        tracing::info!("Initializing Call Room...");
    });
}
