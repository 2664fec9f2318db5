//! Vorschau-Frames der Kamera
//!
//! Eine `FramePump` besitzt die Bildquelle exklusiv in einem eigenen
//! Thread und liefert jedes Frame an die verbundene Vorschau. Ist der
//! Track deaktiviert, werden Frames weiter abgeholt aber verworfen.

use super::devices::{DeviceError, PreviewSurface};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Pause nach einem fehlgeschlagenen Frame
const FRAME_RETRY_DELAY: Duration = Duration::from_millis(10);

// ============================================================================
// FRAME TYPES
// ============================================================================

/// Kodierung der Rohdaten eines Frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameEncoding {
    Mjpeg,
    Yuyv,
    Nv12,
    Rgb,
    Gray,
}

/// Ein Kamerabild für die lokale Vorschau
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewFrame {
    pub width: u32,
    pub height: u32,
    pub encoding: FrameEncoding,
    pub data: Vec<u8>,
}

/// Bildquelle einer Pumpe; lebt nur im Pumpen-Thread
pub trait FrameSource {
    fn label(&self) -> String;

    /// Blockiert bis zum nächsten Frame
    fn next_frame(&mut self) -> Result<PreviewFrame, String>;

    /// Gibt das Gerät frei
    fn close(&mut self) {}
}

// ============================================================================
// FRAME PUMP
// ============================================================================

struct PumpShared {
    running: AtomicBool,
    enabled: AtomicBool,
    sink: Mutex<Option<Arc<dyn PreviewSurface>>>,
    polled: AtomicU64,
    delivered: AtomicU64,
}

pub struct FramePump {
    label: String,
    shared: Arc<PumpShared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl FramePump {
    /// Öffnet die Quelle im Pumpen-Thread und wartet auf das Ergebnis.
    ///
    /// Blockiert; aus async Code nur über `spawn_blocking` aufrufen.
    pub fn spawn<S, F>(open: F) -> Result<Self, DeviceError>
    where
        S: FrameSource,
        F: FnOnce() -> Result<S, DeviceError> + Send + 'static,
    {
        let shared = Arc::new(PumpShared {
            running: AtomicBool::new(true),
            enabled: AtomicBool::new(true),
            sink: Mutex::new(None),
            polled: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
        });
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<String, DeviceError>>(1);

        let pump = Arc::clone(&shared);
        let thread = std::thread::Builder::new()
            .name("call-room-camera".to_string())
            .spawn(move || {
                let mut source = match open() {
                    Ok(source) => source,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(source.label()));
                run(&mut source, &pump);
                source.close();
            })
            .map_err(|e| DeviceError::Platform(e.to_string()))?;

        let label = match ready_rx.recv() {
            Ok(Ok(label)) => label,
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = thread.join();
                return Err(DeviceError::Platform("capture thread exited".to_string()));
            }
        };

        tracing::info!("Frame pump started for '{}'", label);
        Ok(Self {
            label,
            shared,
            thread: Mutex::new(Some(thread)),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.shared.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.shared.enabled.load(Ordering::SeqCst)
    }

    /// Verbindet die Vorschau; `None` trennt sie
    pub fn connect(&self, sink: Option<Arc<dyn PreviewSurface>>) {
        *self.shared.sink.lock() = sink;
    }

    /// Abgeholte Frames (inkl. verworfener)
    pub fn frames_polled(&self) -> u64 {
        self.shared.polled.load(Ordering::SeqCst)
    }

    /// An die Vorschau gelieferte Frames
    pub fn frames_delivered(&self) -> u64 {
        self.shared.delivered.load(Ordering::SeqCst)
    }

    /// Stoppt den Thread und wartet, bis die Quelle geschlossen ist
    pub fn stop(&self) {
        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.sink.lock().take();

        if let Some(thread) = self.thread.lock().take() {
            if thread.thread().id() == std::thread::current().id() {
                return;
            }
            if thread.join().is_err() {
                tracing::warn!("Frame pump for '{}' panicked", self.label);
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.thread.lock().is_some()
    }
}

impl Drop for FramePump {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run<S: FrameSource>(source: &mut S, pump: &PumpShared) {
    while pump.running.load(Ordering::SeqCst) {
        let frame = match source.next_frame() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!("Failed to capture frame: {}", e);
                std::thread::sleep(FRAME_RETRY_DELAY);
                continue;
            }
        };

        // Deaktiviert: Frame verwerfen
        if pump.enabled.load(Ordering::SeqCst) {
            let sink = pump.sink.lock().clone();
            if let Some(sink) = sink {
                sink.present(frame);
                pump.delivered.fetch_add(1, Ordering::SeqCst);
            }
        }
        pump.polled.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::PreviewBinding;
    use std::time::Instant;

    /// Quelle, die Frames aus einem Channel liest
    struct ChannelSource {
        frames: mpsc::Receiver<PreviewFrame>,
        closed: Arc<AtomicBool>,
    }

    impl FrameSource for ChannelSource {
        fn label(&self) -> String {
            "test-camera".to_string()
        }

        fn next_frame(&mut self) -> Result<PreviewFrame, String> {
            self.frames
                .recv_timeout(Duration::from_millis(5))
                .map_err(|e| e.to_string())
        }

        fn close(&mut self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct CollectingPreview {
        frames: Mutex<Vec<PreviewFrame>>,
    }

    impl PreviewSurface for CollectingPreview {
        fn attach(&self, _binding: PreviewBinding) {}

        fn detach(&self) {}

        fn present(&self, frame: PreviewFrame) {
            self.frames.lock().push(frame);
        }
    }

    fn frame(marker: u8) -> PreviewFrame {
        PreviewFrame {
            width: 2,
            height: 1,
            encoding: FrameEncoding::Gray,
            data: vec![marker, marker],
        }
    }

    fn wait_until(cond: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while !cond() {
            assert!(Instant::now() < deadline, "timed out");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    fn pump_with_channel() -> (FramePump, mpsc::Sender<PreviewFrame>, Arc<AtomicBool>) {
        let (tx, rx) = mpsc::channel();
        let closed = Arc::new(AtomicBool::new(false));
        let closed_src = Arc::clone(&closed);
        let pump = FramePump::spawn(move || {
            Ok(ChannelSource {
                frames: rx,
                closed: closed_src,
            })
        })
        .unwrap();
        (pump, tx, closed)
    }

    #[test]
    fn test_frames_reach_preview_unless_disabled() {
        let (pump, tx, _) = pump_with_channel();
        let preview = Arc::new(CollectingPreview::default());
        pump.connect(Some(preview.clone()));
        assert_eq!(pump.label(), "test-camera");

        tx.send(frame(1)).unwrap();
        wait_until(|| pump.frames_polled() == 1);

        pump.set_enabled(false);
        tx.send(frame(2)).unwrap();
        wait_until(|| pump.frames_polled() == 2);

        pump.set_enabled(true);
        tx.send(frame(3)).unwrap();
        wait_until(|| pump.frames_polled() == 3);

        let markers: Vec<u8> = preview.frames.lock().iter().map(|f| f.data[0]).collect();
        assert_eq!(markers, vec![1, 3]);
        assert_eq!(pump.frames_delivered(), 2);
    }

    #[test]
    fn test_stop_closes_source() {
        let (pump, _tx, closed) = pump_with_channel();
        assert!(pump.is_running());

        pump.stop();
        assert!(!pump.is_running());
        assert!(closed.load(Ordering::SeqCst));

        pump.stop();
    }

    #[test]
    fn test_open_failure_is_reported() {
        let result = FramePump::spawn(|| -> Result<ChannelSource, DeviceError> {
            Err(DeviceError::NotFound("no camera".into()))
        });
        assert!(matches!(result, Err(DeviceError::NotFound(_))));
    }
}
