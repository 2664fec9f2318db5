//! Media Module - lokale Capture-Geräte
//!
//! Dieses Modul verwaltet:
//! - MediaHandle mit Audio- und Video-Track
//! - Geräte-Backends (nativ, virtuell für Tests und Kiosk)
//! - Kamerabilder für die Vorschau
//! - Die lokale Vorschau des Besuchers

mod devices;
mod frames;
#[cfg(feature = "native-capture")]
mod native;
mod track;
mod virtual_devices;

pub use devices::{
    CaptureConstraints, DeviceError, MediaDevices, NoCaptureDevices, NullPreview, PreviewBinding,
    PreviewSurface, PREFERRED_HEIGHT, PREFERRED_WIDTH,
};
pub use frames::{FrameEncoding, FramePump, FrameSource, PreviewFrame};
#[cfg(feature = "native-capture")]
pub use native::NativeDevices;
pub use track::{CaptureTrack, MediaHandle, TrackKind};
pub use virtual_devices::{VirtualDevices, VirtualTrack};

use std::sync::Arc;

/// Standard-Geräte: nativ mit Feature `native-capture`.
///
/// Ohne natives Backend scheitert jede Anfrage mit `NotFound`;
/// `VirtualDevices` muss explizit übergeben werden.
pub fn default_devices() -> Arc<dyn MediaDevices> {
    #[cfg(feature = "native-capture")]
    {
        Arc::new(NativeDevices::new())
    }

    #[cfg(not(feature = "native-capture"))]
    {
        Arc::new(NoCaptureDevices)
    }
}
