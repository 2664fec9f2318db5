//! Geräte-Zugriff und lokale Vorschau
//!
//! `MediaDevices` abstrahiert die Plattform (virtuell oder nativ),
//! `PreviewSurface` die lokale Vorschau des Besuchers.

use super::frames::PreviewFrame;
use super::track::MediaHandle;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Nominale Kamera-Auflösung
pub const PREFERRED_WIDTH: u32 = 640;
pub const PREFERRED_HEIGHT: u32 = 360;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("No capture device found: {0}")]
    NotFound(String),

    #[error("Platform error: {0}")]
    Platform(String),
}

impl DeviceError {
    /// Meldung für den Besucher
    pub fn user_message(&self) -> String {
        "Unable to access your camera or microphone. Check the device permissions.".to_string()
    }
}

// ============================================================================
// CONSTRAINTS
// ============================================================================

/// Gewünschte Capture-Parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureConstraints {
    pub video_width: u32,
    pub video_height: u32,
    pub audio: bool,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            video_width: PREFERRED_WIDTH,
            video_height: PREFERRED_HEIGHT,
            audio: true,
        }
    }
}

// ============================================================================
// DEVICES
// ============================================================================

/// Zugriff auf Kamera und Mikrofon
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Fordert exklusiven Zugriff auf Kamera + Mikrofon an.
    ///
    /// Kann beliebig lange auf eine Berechtigungs-Entscheidung warten.
    async fn acquire(&self, constraints: CaptureConstraints) -> Result<MediaHandle, DeviceError>;
}

/// Build ohne Capture-Backend: jede Anfrage scheitert mit `NotFound`
#[derive(Debug, Default)]
pub struct NoCaptureDevices;

#[async_trait]
impl MediaDevices for NoCaptureDevices {
    async fn acquire(&self, _constraints: CaptureConstraints) -> Result<MediaHandle, DeviceError> {
        tracing::warn!("No capture backend compiled in (enable feature `native-capture`)");
        Err(DeviceError::NotFound(
            "no capture backend available in this build".to_string(),
        ))
    }
}

// ============================================================================
// PREVIEW
// ============================================================================

/// Bindung eines MediaHandle an die lokale Vorschau
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewBinding {
    pub stream_id: Uuid,
    pub muted: bool,
    pub autoplay: bool,
    /// Die Vorschau ist nur lokal sichtbar
    pub local_only: bool,
}

impl PreviewBinding {
    pub fn for_handle(handle: &MediaHandle) -> Self {
        Self {
            stream_id: handle.id(),
            muted: true,
            autoplay: true,
            local_only: true,
        }
    }
}

/// Lokale Vorschau-Fläche
pub trait PreviewSurface: Send + Sync {
    fn attach(&self, binding: PreviewBinding);

    /// Löst die Bindung; ohne Bindung ein No-op
    fn detach(&self);

    /// Neues Kamerabild der gebundenen Vorschau
    fn present(&self, _frame: PreviewFrame) {}
}

/// Vorschau ohne Ausgabe (Headless)
#[derive(Debug, Default)]
pub struct NullPreview;

impl PreviewSurface for NullPreview {
    fn attach(&self, binding: PreviewBinding) {
        tracing::debug!("Preview attached (headless): {}", binding.stream_id);
    }

    fn detach(&self) {}
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_no_capture_backend_reports_not_found() {
        let result = NoCaptureDevices.acquire(CaptureConstraints::default()).await;
        assert!(matches!(result, Err(DeviceError::NotFound(_))));
    }
}
