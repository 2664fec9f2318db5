//! Virtuelle Capture-Geräte
//!
//! Liefert In-Process Tracks ohne Hardware (Headless/Kiosk-Betrieb).
//! Ergebnisse und Verzögerung der Berechtigungsabfrage sind steuerbar.

use super::devices::{CaptureConstraints, DeviceError, MediaDevices, PreviewSurface};
use super::frames::PreviewFrame;
use super::track::{CaptureTrack, MediaHandle, TrackKind};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// VIRTUAL TRACK
// ============================================================================

struct TrackState {
    kind: TrackKind,
    label: String,
    enabled: AtomicBool,
    live: AtomicBool,
    preview: Mutex<Option<Arc<dyn PreviewSurface>>>,
}

impl std::fmt::Debug for TrackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackState")
            .field("kind", &self.kind)
            .field("label", &self.label)
            .field("enabled", &self.enabled)
            .field("live", &self.live)
            .field("preview", &self.preview.lock().is_some())
            .finish()
    }
}

/// Virtueller Track; Klone teilen denselben Zustand
#[derive(Debug, Clone)]
pub struct VirtualTrack {
    state: Arc<TrackState>,
}

impl VirtualTrack {
    pub fn new(kind: TrackKind, label: impl Into<String>) -> Self {
        Self {
            state: Arc::new(TrackState {
                kind,
                label: label.into(),
                enabled: AtomicBool::new(true),
                live: AtomicBool::new(true),
                preview: Mutex::new(None),
            }),
        }
    }

    /// Speist ein Frame ein; `true` wenn es die Vorschau erreicht hat.
    /// Gestoppte oder deaktivierte Tracks verwerfen Frames.
    pub fn push_frame(&self, frame: PreviewFrame) -> bool {
        if self.state.kind != TrackKind::Video || !self.is_live() || !self.is_enabled() {
            return false;
        }
        let preview = self.state.preview.lock().clone();
        match preview {
            Some(preview) => {
                preview.present(frame);
                true
            }
            None => false,
        }
    }
}

impl CaptureTrack for VirtualTrack {
    fn kind(&self) -> TrackKind {
        self.state.kind
    }

    fn label(&self) -> String {
        self.state.label.clone()
    }

    fn set_enabled(&self, enabled: bool) {
        self.state.enabled.store(enabled, Ordering::SeqCst);
    }

    fn is_enabled(&self) -> bool {
        self.state.enabled.load(Ordering::SeqCst)
    }

    fn stop(&self) {
        self.state.live.store(false, Ordering::SeqCst);
        self.state.preview.lock().take();
    }

    fn is_live(&self) -> bool {
        self.state.live.load(Ordering::SeqCst)
    }

    fn connect_preview(&self, preview: Option<Arc<dyn PreviewSurface>>) {
        if self.state.kind == TrackKind::Video {
            *self.state.preview.lock() = preview;
        }
    }
}

// ============================================================================
// VIRTUAL DEVICES
// ============================================================================

/// Virtuelle Kamera + Mikrofon
#[derive(Debug, Default)]
pub struct VirtualDevices {
    /// Vorgegebene Ergebnisse; leer = Erfolg
    outcomes: Mutex<VecDeque<Result<(), DeviceError>>>,
    permission_delay: Mutex<Duration>,
    issued: Mutex<Vec<VirtualTrack>>,
    attempts: AtomicUsize,
}

impl VirtualDevices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simuliert eine Berechtigungsabfrage, die `delay` dauert
    pub fn with_permission_delay(self, delay: Duration) -> Self {
        *self.permission_delay.lock() = delay;
        self
    }

    /// Die nächste Anfrage scheitert mit `error`
    pub fn fail_next(&self, error: DeviceError) {
        self.outcomes.lock().push_back(Err(error));
    }

    /// Anzahl aller Anfragen (erfolgreich oder nicht)
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Alle bisher ausgegebenen Tracks
    pub fn issued_tracks(&self) -> Vec<VirtualTrack> {
        self.issued.lock().clone()
    }

    /// Anzahl noch laufender Tracks
    pub fn live_tracks(&self) -> usize {
        self.issued.lock().iter().filter(|t| t.is_live()).count()
    }
}

#[async_trait]
impl MediaDevices for VirtualDevices {
    async fn acquire(&self, constraints: CaptureConstraints) -> Result<MediaHandle, DeviceError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let delay = *self.permission_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if let Some(Err(e)) = self.outcomes.lock().pop_front() {
            tracing::warn!("Virtual capture refused: {}", e);
            return Err(e);
        }

        let camera = VirtualTrack::new(
            TrackKind::Video,
            format!(
                "virtual-camera {}x{}",
                constraints.video_width, constraints.video_height
            ),
        );
        let mut tracks: Vec<Box<dyn CaptureTrack>> = vec![Box::new(camera.clone())];
        self.issued.lock().push(camera);

        if constraints.audio {
            let mic = VirtualTrack::new(TrackKind::Audio, "virtual-microphone");
            tracks.push(Box::new(mic.clone()));
            self.issued.lock().push(mic);
        }

        Ok(MediaHandle::new(tracks))
    }
}

// ============================================================================
// TESTS
// ============================================================================
