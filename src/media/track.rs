//! Capture Tracks und MediaHandle
//!
//! Ein MediaHandle bündelt genau einen Audio- und einen Video-Track
//! einer laufenden Aufnahme. Tracks lassen sich aktivieren/deaktivieren
//! ohne die Aufnahme neu aufzubauen.

use super::devices::PreviewSurface;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

// ============================================================================
// TRACK TYPES
// ============================================================================

/// Art eines Tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

/// Ein einzelner Capture-Track (Mikrofon oder Kamera)
///
/// `stop()` muss idempotent sein: ein bereits gestoppter Track
/// ignoriert weitere Aufrufe stillschweigend.
pub trait CaptureTrack: Send + Sync {
    fn kind(&self) -> TrackKind;

    /// Geräte-Label für Logs
    fn label(&self) -> String;

    fn set_enabled(&self, enabled: bool);

    fn is_enabled(&self) -> bool;

    /// Gibt das Gerät frei
    fn stop(&self);

    fn is_live(&self) -> bool;

    /// Verbindet die lokale Vorschau mit den Frames dieses Tracks.
    /// Nur Video-Tracks liefern Frames.
    fn connect_preview(&self, _preview: Option<Arc<dyn PreviewSurface>>) {}
}

// ============================================================================
// MEDIA HANDLE
// ============================================================================

/// Live Audio+Video Capture eines Besuchers
pub struct MediaHandle {
    id: Uuid,
    tracks: Vec<Box<dyn CaptureTrack>>,
}

impl MediaHandle {
    pub fn new(tracks: Vec<Box<dyn CaptureTrack>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tracks,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn tracks(&self) -> impl Iterator<Item = &dyn CaptureTrack> {
        self.tracks.iter().map(|t| t.as_ref())
    }

    pub fn tracks_of(&self, kind: TrackKind) -> impl Iterator<Item = &dyn CaptureTrack> {
        self.tracks().filter(move |t| t.kind() == kind)
    }

    /// Setzt `enabled` auf allen Tracks einer Art
    pub fn set_kind_enabled(&self, kind: TrackKind, enabled: bool) {
        for track in self.tracks_of(kind) {
            track.set_enabled(enabled);
        }
    }

    /// Leitet die Kamerabilder an die Vorschau
    pub fn connect_preview(&self, preview: Option<Arc<dyn PreviewSurface>>) {
        for track in self.tracks_of(TrackKind::Video) {
            track.connect_preview(preview.clone());
        }
    }

    /// Stoppt alle Tracks (idempotent)
    pub fn stop(&self) {
        for track in &self.tracks {
            if track.is_live() {
                tracing::debug!("Stopping {:?} track '{}'", track.kind(), track.label());
                track.stop();
            }
        }
    }

    pub fn is_live(&self) -> bool {
        self.tracks.iter().any(|t| t.is_live())
    }
}

impl Drop for MediaHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for MediaHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaHandle")
            .field("id", &self.id)
            .field("tracks", &self.tracks.len())
            .field("is_live", &self.is_live())
            .finish()
    }
}
