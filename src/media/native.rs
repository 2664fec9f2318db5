//! Native Capture-Geräte
//!
//! Mikrofon über cpal, Kamera über nokhwa. Nur mit Feature
//! `native-capture` verfügbar.

use super::devices::{CaptureConstraints, DeviceError, MediaDevices, PreviewSurface};
use super::frames::{FrameEncoding, FramePump, FrameSource, PreviewFrame};
use super::track::{CaptureTrack, MediaHandle, TrackKind};
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::Stream;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution,
};
use nokhwa::Camera;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Nominale Bildrate der Kamera
const CAMERA_FPS: u32 = 30;

// ============================================================================
// MICROPHONE TRACK
// ============================================================================

/// Mikrofon-Track
///
/// Note: Stream ist nicht Send, daher in Mutex gekapselt
struct MicrophoneTrack {
    label: String,
    stream: Mutex<Option<Stream>>,
    enabled: Arc<AtomicBool>,
    /// Pegel (RMS) des letzten Buffers
    level: Arc<Mutex<f32>>,
}

// Stream ist nicht automatisch Send/Sync; Zugriff nur über den Mutex
unsafe impl Send for MicrophoneTrack {}
unsafe impl Sync for MicrophoneTrack {}

impl MicrophoneTrack {
    fn open() -> Result<Self, DeviceError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| DeviceError::NotFound("microphone".to_string()))?;
        let label = device.name().unwrap_or_else(|_| "microphone".to_string());

        let config = device
            .default_input_config()
            .map_err(|e| DeviceError::Platform(e.to_string()))?;

        tracing::info!(
            "Opening microphone '{}': {} Hz, {} channel(s)",
            label,
            config.sample_rate().0,
            config.channels()
        );

        let enabled = Arc::new(AtomicBool::new(true));
        let level = Arc::new(Mutex::new(0.0f32));
        let enabled_cb = Arc::clone(&enabled);
        let level_cb = Arc::clone(&level);

        let stream = device
            .build_input_stream(
                &config.into(),
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if !enabled_cb.load(Ordering::Relaxed) || data.is_empty() {
                        *level_cb.lock() = 0.0;
                        return;
                    }
                    let rms: f32 =
                        (data.iter().map(|s| s * s).sum::<f32>() / data.len() as f32).sqrt();
                    *level_cb.lock() = rms.min(1.0);
                },
                |err| {
                    tracing::error!("Microphone capture error: {}", err);
                },
                None,
            )
            .map_err(|e| match e {
                cpal::BuildStreamError::DeviceNotAvailable => {
                    DeviceError::PermissionDenied(e.to_string())
                }
                other => DeviceError::Platform(other.to_string()),
            })?;

        stream
            .play()
            .map_err(|e| DeviceError::Platform(e.to_string()))?;

        Ok(Self {
            label,
            stream: Mutex::new(Some(stream)),
            enabled,
            level,
        })
    }
}

impl CaptureTrack for MicrophoneTrack {
    fn kind(&self) -> TrackKind {
        TrackKind::Audio
    }

    fn label(&self) -> String {
        format!("{} (level {:.2})", self.label, *self.level.lock())
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    fn stop(&self) {
        // Drop des Streams gibt das Gerät frei
        self.stream.lock().take();
    }

    fn is_live(&self) -> bool {
        self.stream.lock().is_some()
    }
}

// ============================================================================
// CAMERA TRACK
// ============================================================================

/// nokhwa-Kamera; lebt ausschließlich im Pumpen-Thread
struct CameraSource {
    camera: Camera,
}

impl CameraSource {
    fn open(constraints: CaptureConstraints) -> Result<Self, DeviceError> {
        let format = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(
            CameraFormat::new(
                Resolution::new(constraints.video_width, constraints.video_height),
                FrameFormat::MJPEG,
                CAMERA_FPS,
            ),
        ));

        let mut camera = Camera::new(CameraIndex::Index(0), format)
            .map_err(|e| DeviceError::NotFound(e.to_string()))?;
        camera
            .open_stream()
            .map_err(|e| DeviceError::PermissionDenied(e.to_string()))?;

        tracing::info!(
            "Opened camera '{}' ({:?})",
            camera.info().human_name(),
            camera.camera_format()
        );
        Ok(Self { camera })
    }
}

impl FrameSource for CameraSource {
    fn label(&self) -> String {
        self.camera.info().human_name()
    }

    fn next_frame(&mut self) -> Result<PreviewFrame, String> {
        // Blockiert bis die Kamera das nächste Bild liefert
        let buffer = self.camera.frame().map_err(|e| e.to_string())?;
        let resolution = buffer.resolution();
        let encoding = match buffer.source_frame_format() {
            FrameFormat::MJPEG => FrameEncoding::Mjpeg,
            FrameFormat::YUYV => FrameEncoding::Yuyv,
            FrameFormat::NV12 => FrameEncoding::Nv12,
            FrameFormat::GRAY => FrameEncoding::Gray,
            FrameFormat::RAWRGB => FrameEncoding::Rgb,
            other => return Err(format!("unsupported frame format {:?}", other)),
        };

        Ok(PreviewFrame {
            width: resolution.width(),
            height: resolution.height(),
            encoding,
            data: buffer.buffer().to_vec(),
        })
    }

    fn close(&mut self) {
        if let Err(e) = self.camera.stop_stream() {
            tracing::warn!("Failed to stop camera stream: {}", e);
        }
    }
}

/// Kamera-Track; die Frames laufen über eine `FramePump`
struct CameraTrack {
    pump: FramePump,
}

impl CameraTrack {
    fn open(constraints: CaptureConstraints) -> Result<Self, DeviceError> {
        let pump = FramePump::spawn(move || CameraSource::open(constraints))?;
        Ok(Self { pump })
    }
}

impl CaptureTrack for CameraTrack {
    fn kind(&self) -> TrackKind {
        TrackKind::Video
    }

    fn label(&self) -> String {
        format!("{} ({} frames)", self.pump.label(), self.pump.frames_delivered())
    }

    fn set_enabled(&self, enabled: bool) {
        self.pump.set_enabled(enabled);
    }

    fn is_enabled(&self) -> bool {
        self.pump.is_enabled()
    }

    fn stop(&self) {
        self.pump.stop();
    }

    fn is_live(&self) -> bool {
        self.pump.is_running()
    }

    fn connect_preview(&self, preview: Option<Arc<dyn PreviewSurface>>) {
        self.pump.connect(preview);
    }
}

// ============================================================================
// NATIVE DEVICES
// ============================================================================

/// Kamera + Mikrofon des Systems
#[derive(Debug, Default)]
pub struct NativeDevices;

impl NativeDevices {
    pub fn new() -> Self {
        Self
    }

    fn open_tracks(constraints: CaptureConstraints) -> Result<MediaHandle, DeviceError> {
        let mut tracks: Vec<Box<dyn CaptureTrack>> = Vec::with_capacity(2);
        tracks.push(Box::new(CameraTrack::open(constraints)?));
        if constraints.audio {
            // Scheitert das Mikrofon, gibt Drop die Kamera wieder frei
            tracks.push(Box::new(MicrophoneTrack::open()?));
        }
        Ok(MediaHandle::new(tracks))
    }
}

#[async_trait]
impl MediaDevices for NativeDevices {
    async fn acquire(&self, constraints: CaptureConstraints) -> Result<MediaHandle, DeviceError> {
        tokio::task::spawn_blocking(move || Self::open_tracks(constraints))
            .await
            .map_err(|e| DeviceError::Platform(e.to_string()))?
    }
}
