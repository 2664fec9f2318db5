//! Call Session
//!
//! Verwaltet den Lebenszyklus eines Gesprächs:
//! Idle → Connecting → Active → Ended
//!
//! Die Session besitzt exklusiv das MediaHandle und die Session-Uhr.
//! Jeder Weg aus Active (Auflegen, Timeout, Unmount) gibt beides frei.

use super::clock::{SessionClock, TICK_PERIOD};
use super::duration::{DurationResolver, DurationSource, ResolvedDuration};
use crate::media::{
    CaptureConstraints, DeviceError, MediaDevices, MediaHandle, PreviewBinding, PreviewSurface,
    TrackKind,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::ops::ControlFlow;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::broadcast;

// ============================================================================
// CALL STATE
// ============================================================================

/// Aktueller Status eines Gesprächs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    /// Kein Gespräch
    Idle,
    /// Warten auf Kamera/Mikrofon
    Connecting,
    /// Gespräch läuft
    Active,
    /// Gespräch beendet
    Ended,
}

/// Grund für ein Gesprächsende
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndReason {
    Hangup,
    Timeout,
}

impl EndReason {
    pub fn message(&self) -> &'static str {
        match self {
            EndReason::Hangup => "You ended the call.",
            EndReason::Timeout => "Maximum call time reached.",
        }
    }
}

/// Events die von der CallSession ausgelöst werden
#[derive(Debug, Clone, PartialEq)]
pub enum CallEvent {
    StateChanged(CallStatus),
    Tick {
        elapsed_seconds: u32,
        limit_seconds: u32,
    },
    TracksChanged {
        microphone: bool,
        camera: bool,
    },
    DurationResolved(ResolvedDuration),
    /// `reason` ist beim stillen Unmount `None`
    Ended {
        reason: Option<EndReason>,
        elapsed_seconds: u32,
    },
    Error(String),
}

/// Ergebnis von `start_call`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// Gespräch ist aktiv
    Started,
    /// Gerätezugriff gescheitert; erneuter Versuch möglich
    Failed(DeviceError),
    /// Es läuft bereits ein Gespräch oder eine Anfrage
    AlreadyInProgress,
    /// Während der Anfrage wurde aufgelegt; das Handle wurde freigegeben
    Superseded,
    /// Die Session wurde bereits abgebaut
    Unmounted,
}

/// Serialisierbarer Zustand für die UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallSnapshot {
    pub status: CallStatus,
    pub elapsed_seconds: u32,
    pub limit_seconds: u32,
    pub remaining_seconds: u32,
    pub duration_source: DurationSource,
    pub microphone_enabled: bool,
    pub camera_enabled: bool,
    pub last_error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub display: String,
}

/// Formatiert Sekunden als `mm:ss`
pub fn format_duration(seconds: u32) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

// ============================================================================
// OPTIONS
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    pub constraints: CaptureConstraints,
    pub tick_period: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            constraints: CaptureConstraints::default(),
            tick_period: TICK_PERIOD,
        }
    }
}

// ============================================================================
// SESSION STATE
// ============================================================================

struct SessionState {
    status: CallStatus,
    elapsed_seconds: u32,
    microphone_enabled: bool,
    camera_enabled: bool,
    last_error: Option<String>,
    started_at: Option<DateTime<Utc>>,
    resolver: DurationResolver,
    media: Option<MediaHandle>,
    clock: Option<SessionClock>,
    /// Wird bei jedem Start und Abbau erhöht; veraltete Anfragen erkennen das
    epoch: u64,
    unmounted: bool,
}

struct Shared {
    state: Mutex<SessionState>,
    devices: Arc<dyn MediaDevices>,
    preview: Arc<dyn PreviewSurface>,
    options: SessionOptions,
    event_tx: broadcast::Sender<CallEvent>,
}

// ============================================================================
// CALL SESSION
// ============================================================================

/// Eine Gesprächs-Session pro Raum; Klone teilen denselben Zustand
#[derive(Clone)]
pub struct CallSession {
    shared: Arc<Shared>,
}

impl CallSession {
    pub fn new(
        devices: Arc<dyn MediaDevices>,
        preview: Arc<dyn PreviewSurface>,
        resolver: DurationResolver,
        options: SessionOptions,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(100);

        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(SessionState {
                    status: CallStatus::Idle,
                    elapsed_seconds: 0,
                    microphone_enabled: true,
                    camera_enabled: true,
                    last_error: None,
                    started_at: None,
                    resolver,
                    media: None,
                    clock: None,
                    epoch: 0,
                    unmounted: false,
                }),
                devices,
                preview,
                options,
                event_tx,
            }),
        }
    }

    /// Gibt einen Event-Receiver zurück
    pub fn subscribe(&self) -> broadcast::Receiver<CallEvent> {
        self.shared.event_tx.subscribe()
    }

    pub fn status(&self) -> CallStatus {
        self.shared.state.lock().status
    }

    pub fn elapsed_seconds(&self) -> u32 {
        self.shared.state.lock().elapsed_seconds
    }

    /// Aktuell gültiges Limit (vor dem Latch vorläufig)
    pub fn duration_limit(&self) -> ResolvedDuration {
        self.shared.state.lock().resolver.current()
    }

    pub fn is_duration_latched(&self) -> bool {
        self.shared.state.lock().resolver.is_latched()
    }

    pub fn microphone_enabled(&self) -> bool {
        self.shared.state.lock().microphone_enabled
    }

    pub fn camera_enabled(&self) -> bool {
        self.shared.state.lock().camera_enabled
    }

    pub fn last_error(&self) -> Option<String> {
        self.shared.state.lock().last_error.clone()
    }

    pub fn has_media(&self) -> bool {
        self.shared.state.lock().media.is_some()
    }

    pub fn clock_running(&self) -> bool {
        self.shared
            .state
            .lock()
            .clock
            .as_ref()
            .is_some_and(|c| c.is_running())
    }

    pub fn snapshot(&self) -> CallSnapshot {
        let state = self.shared.state.lock();
        let limit = state.resolver.current();
        CallSnapshot {
            status: state.status,
            elapsed_seconds: state.elapsed_seconds,
            limit_seconds: limit.seconds,
            remaining_seconds: limit.seconds.saturating_sub(state.elapsed_seconds),
            duration_source: limit.source,
            microphone_enabled: state.microphone_enabled,
            camera_enabled: state.camera_enabled,
            last_error: state.last_error.clone(),
            started_at: state.started_at,
            display: format_duration(state.elapsed_seconds),
        }
    }

    /// Startet ein Gespräch: Kamera + Mikrofon anfordern, Vorschau
    /// binden, Uhr starten.
    ///
    /// Gerätefehler werden nicht propagiert, sondern in `last_error`
    /// abgelegt. Ein erneuter Aufruf ist jederzeit möglich.
    pub async fn start_call(&self) -> StartOutcome {
        let epoch = {
            let mut state = self.shared.state.lock();
            if state.unmounted {
                return StartOutcome::Unmounted;
            }
            if matches!(state.status, CallStatus::Connecting | CallStatus::Active) {
                tracing::debug!("start_call ignored, status is {:?}", state.status);
                return StartOutcome::AlreadyInProgress;
            }
            state.status = CallStatus::Connecting;
            state.elapsed_seconds = 0;
            state.last_error = None;
            state.epoch += 1;
            state.epoch
        };
        self.shared.emit(CallEvent::StateChanged(CallStatus::Connecting));

        tracing::info!("Requesting camera and microphone...");
        let result = self
            .shared
            .devices
            .acquire(self.shared.options.constraints)
            .await;

        match result {
            Ok(handle) => self.shared.activate(epoch, handle),
            Err(e) => self.shared.acquisition_failed(epoch, e),
        }
    }

    /// Beendet das Gespräch durch den Benutzer
    pub fn hangup(&self) {
        tracing::info!("Hanging up");
        self.shared.teardown(Some(EndReason::Hangup));
    }

    /// Stiller Abbau beim Verlassen der Seite; danach kein Neustart
    pub fn unmount(&self) {
        self.shared.state.lock().unmounted = true;
        self.shared.teardown(None);
    }

    /// Übernimmt die Dauer aus der Site-Konfiguration (einmalig)
    pub fn apply_config_duration(&self, duration_seconds: Option<u32>) {
        let latched = {
            let mut state = self.shared.state.lock();
            if state.unmounted || !state.resolver.settle_config(duration_seconds) {
                return;
            }
            // Läuft die Uhr bereits, rastet die Dauer jetzt ein
            if state.clock.is_some() {
                state.resolver.latch()
            } else {
                None
            }
        };

        if let Some(resolved) = latched {
            self.shared.emit(CallEvent::DurationResolved(resolved));
        }
    }

    /// Schaltet das Mikrofon um; gibt den neuen Zustand zurück
    pub fn toggle_microphone(&self) -> bool {
        self.toggle(TrackKind::Audio)
    }

    /// Schaltet die Kamera um; gibt den neuen Zustand zurück
    pub fn toggle_camera(&self) -> bool {
        self.toggle(TrackKind::Video)
    }

    fn toggle(&self, kind: TrackKind) -> bool {
        let (next, microphone, camera) = {
            let mut state = self.shared.state.lock();
            let flag = match kind {
                TrackKind::Audio => &mut state.microphone_enabled,
                TrackKind::Video => &mut state.camera_enabled,
            };
            *flag = !*flag;
            let next = *flag;

            if let Some(media) = state.media.as_ref() {
                media.set_kind_enabled(kind, next);
            }
            (next, state.microphone_enabled, state.camera_enabled)
        };

        tracing::debug!("{:?} tracks enabled: {}", kind, next);
        self.shared
            .emit(CallEvent::TracksChanged { microphone, camera });
        next
    }
}

impl std::fmt::Debug for CallSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("CallSession")
            .field("status", &state.status)
            .field("elapsed_seconds", &state.elapsed_seconds)
            .field("limit", &state.resolver.current())
            .field("has_media", &state.media.is_some())
            .finish()
    }
}

// ============================================================================
// PRIVATE
// ============================================================================

impl Shared {
    fn emit(&self, event: CallEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Bindet ein frisch erhaltenes Handle, sofern die Anfrage noch gilt
    fn activate(self: &Arc<Self>, epoch: u64, handle: MediaHandle) -> StartOutcome {
        let mut events = Vec::new();
        {
            let mut state = self.state.lock();
            if state.epoch != epoch || state.status != CallStatus::Connecting {
                drop(state);
                tracing::warn!("Capture arrived after teardown, releasing {}", handle.id());
                handle.stop();
                return StartOutcome::Superseded;
            }

            handle.set_kind_enabled(TrackKind::Audio, state.microphone_enabled);
            handle.set_kind_enabled(TrackKind::Video, state.camera_enabled);
            self.preview.attach(PreviewBinding::for_handle(&handle));
            handle.connect_preview(Some(Arc::clone(&self.preview)));

            tracing::info!("Call active with media {}", handle.id());
            state.media = Some(handle);
            state.status = CallStatus::Active;
            state.elapsed_seconds = 0;
            state.started_at = Some(Utc::now());
            events.push(CallEvent::StateChanged(CallStatus::Active));

            if let Some(resolved) = state.resolver.latch() {
                events.push(CallEvent::DurationResolved(resolved));
            }

            let weak = Arc::downgrade(self);
            state.clock = Some(SessionClock::start(self.options.tick_period, move || {
                Shared::tick(&weak)
            }));
        }

        for event in events {
            self.emit(event);
        }
        StartOutcome::Started
    }

    fn acquisition_failed(&self, epoch: u64, error: DeviceError) -> StartOutcome {
        tracing::warn!("Failed to access camera/microphone: {}", error);
        let message = error.user_message();
        {
            let mut state = self.state.lock();
            if state.epoch != epoch {
                return StartOutcome::Superseded;
            }
            state.status = CallStatus::Idle;
            state.last_error = Some(message.clone());
        }

        self.emit(CallEvent::Error(message));
        self.emit(CallEvent::StateChanged(CallStatus::Idle));
        StartOutcome::Failed(error)
    }

    fn tick(weak: &Weak<Self>) -> ControlFlow<()> {
        let Some(shared) = weak.upgrade() else {
            return ControlFlow::Break(());
        };

        let (elapsed, limit) = {
            let mut state = shared.state.lock();
            if state.status != CallStatus::Active {
                return ControlFlow::Break(());
            }
            let limit = state.resolver.current().seconds;
            if state.elapsed_seconds + 1 >= limit {
                drop(state);
                tracing::info!("Call duration limit of {}s reached", limit);
                shared.teardown(Some(EndReason::Timeout));
                return ControlFlow::Break(());
            }
            state.elapsed_seconds += 1;
            (state.elapsed_seconds, limit)
        };

        tracing::debug!("Call tick {}/{}s", elapsed, limit);
        shared.emit(CallEvent::Tick {
            elapsed_seconds: elapsed,
            limit_seconds: limit,
        });
        ControlFlow::Continue(())
    }

    /// Gibt Uhr, Geräte und Vorschau frei. Idempotent.
    fn teardown(&self, reason: Option<EndReason>) {
        let (previous, elapsed) = {
            let mut state = self.state.lock();
            let previous = state.status;
            if previous == CallStatus::Ended && state.media.is_none() && state.clock.is_none() {
                return;
            }
            let elapsed = std::mem::take(&mut state.elapsed_seconds);

            state.epoch += 1;
            state.status = CallStatus::Ended;

            if let Some(clock) = state.clock.take() {
                clock.cancel();
            }
            if let Some(media) = state.media.take() {
                media.stop();
            }
            self.preview.detach();

            (previous, elapsed)
        };

        if previous == CallStatus::Ended {
            return;
        }

        match reason {
            Some(reason) => tracing::info!("Call ended after {}s: {}", elapsed, reason.message()),
            None => tracing::debug!("Call torn down on unmount"),
        }
        self.emit(CallEvent::StateChanged(CallStatus::Ended));
        self.emit(CallEvent::Ended {
            reason,
            elapsed_seconds: elapsed,
        });
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{CaptureTrack, FrameEncoding, PreviewFrame, VirtualDevices, VirtualTrack};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct RecordingPreview {
        attached: Mutex<Option<PreviewBinding>>,
        detach_calls: AtomicUsize,
        frames: AtomicUsize,
    }

    impl PreviewSurface for RecordingPreview {
        fn attach(&self, binding: PreviewBinding) {
            *self.attached.lock() = Some(binding);
        }

        fn detach(&self) {
            self.detach_calls.fetch_add(1, Ordering::SeqCst);
            self.attached.lock().take();
        }

        fn present(&self, _frame: PreviewFrame) {
            self.frames.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn test_frame() -> PreviewFrame {
        PreviewFrame {
            width: 2,
            height: 2,
            encoding: FrameEncoding::Gray,
            data: vec![0; 4],
        }
    }

    fn issued(devices: &VirtualDevices, kind: TrackKind) -> VirtualTrack {
        devices
            .issued_tracks()
            .into_iter()
            .rev()
            .find(|t| t.kind() == kind)
            .unwrap()
    }

    fn session_with(
        devices: Arc<VirtualDevices>,
        resolver: DurationResolver,
    ) -> (CallSession, Arc<RecordingPreview>) {
        let preview = Arc::new(RecordingPreview::default());
        let session = CallSession::new(
            devices,
            preview.clone(),
            resolver,
            SessionOptions::default(),
        );
        (session, preview)
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "00:00");
        assert_eq!(format_duration(75), "01:15");
        assert_eq!(format_duration(1800), "30:00");
        assert_eq!(format_duration(6000), "100:00");
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_binds_preview_and_runs_clock() {
        let devices = Arc::new(VirtualDevices::new());
        let (session, preview) = session_with(devices.clone(), DurationResolver::new(1800));

        assert_eq!(session.start_call().await, StartOutcome::Started);
        assert_eq!(session.status(), CallStatus::Active);
        assert!(session.clock_running());

        let binding = preview.attached.lock().clone().expect("preview bound");
        assert!(binding.muted && binding.autoplay && binding.local_only);

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(session.elapsed_seconds(), 3);
        assert_eq!(session.snapshot().display, "00:03");
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_start_is_guarded() {
        let devices = Arc::new(VirtualDevices::new());
        let (session, _) = session_with(devices.clone(), DurationResolver::new(1800));

        session.start_call().await;
        assert_eq!(session.start_call().await, StartOutcome::AlreadyInProgress);
        assert_eq!(devices.attempts(), 1);
        assert_eq!(devices.live_tracks(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hangup_twice_is_idempotent() {
        let devices = Arc::new(VirtualDevices::new());
        let (session, preview) = session_with(devices.clone(), DurationResolver::new(1800));
        let mut events = session.subscribe();

        session.start_call().await;
        tokio::time::sleep(Duration::from_millis(2500)).await;
        session.hangup();
        let first = session.snapshot();
        session.hangup();
        let second = session.snapshot();

        assert_eq!(first, second);
        assert_eq!(second.status, CallStatus::Ended);
        assert_eq!(second.elapsed_seconds, 0);
        assert!(!session.has_media());
        assert!(!session.clock_running());
        assert!(preview.attached.lock().is_none());
        assert_eq!(devices.live_tracks(), 0);

        let mut ended = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let CallEvent::Ended { .. } = event {
                ended.push(event);
            }
        }
        assert_eq!(
            ended,
            vec![CallEvent::Ended {
                reason: Some(EndReason::Hangup),
                elapsed_seconds: 2
            }]
        );
    }

    #[tokio::test]
    async fn test_toggle_microphone_twice_restores_state() {
        let devices = Arc::new(VirtualDevices::new());
        let (session, _) = session_with(devices.clone(), DurationResolver::new(1800));
        session.start_call().await;

        let mic = || {
            devices
                .issued_tracks()
                .into_iter()
                .find(|t| t.kind() == TrackKind::Audio)
                .unwrap()
        };

        assert!(!session.toggle_microphone());
        assert!(!mic().is_enabled());
        assert!(mic().is_live());

        assert!(session.toggle_microphone());
        assert!(mic().is_enabled());
        assert!(session.microphone_enabled());
        session.hangup();
    }

    #[tokio::test]
    async fn test_toggle_camera_gates_live_video_track() {
        let devices = Arc::new(VirtualDevices::new());
        let (session, preview) = session_with(devices.clone(), DurationResolver::new(1800));
        session.start_call().await;
        let camera = issued(&devices, TrackKind::Video);

        assert!(camera.push_frame(test_frame()));
        assert_eq!(preview.frames.load(Ordering::SeqCst), 1);

        assert!(!session.toggle_camera());
        assert!(!camera.is_enabled());
        assert!(camera.is_live());
        assert!(session.has_media());
        assert!(!camera.push_frame(test_frame()));

        assert!(session.toggle_camera());
        assert!(camera.is_enabled());
        assert!(camera.push_frame(test_frame()));
        assert_eq!(preview.frames.load(Ordering::SeqCst), 2);

        // Das Mikrofon bleibt unberührt
        assert!(issued(&devices, TrackKind::Audio).is_enabled());
        assert_eq!(devices.live_tracks(), 2);
        session.hangup();
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_teardown_has_single_effect() {
        let devices = Arc::new(VirtualDevices::new());
        let (session, preview) = session_with(devices.clone(), DurationResolver::new(1800));
        let mut events = session.subscribe();

        session.start_call().await;
        let camera = issued(&devices, TrackKind::Video);
        tokio::time::sleep(Duration::from_millis(1500)).await;

        session.hangup();
        let after_hangup = session.snapshot();
        session.unmount();
        session.unmount();
        session.hangup();

        assert_eq!(session.snapshot(), after_hangup);
        assert_eq!(after_hangup.status, CallStatus::Ended);
        assert_eq!(after_hangup.elapsed_seconds, 0);
        assert_eq!(preview.detach_calls.load(Ordering::SeqCst), 1);
        assert_eq!(devices.live_tracks(), 0);
        assert!(!camera.push_frame(test_frame()));
        assert_eq!(session.start_call().await, StartOutcome::Unmounted);

        let mut ended = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let CallEvent::Ended { .. } = event {
                ended.push(event);
            }
        }
        assert_eq!(
            ended,
            vec![CallEvent::Ended {
                reason: Some(EndReason::Hangup),
                elapsed_seconds: 1
            }]
        );
    }

    #[tokio::test]
    async fn test_unmount_twice_is_idempotent() {
        let devices = Arc::new(VirtualDevices::new());
        let (session, preview) = session_with(devices.clone(), DurationResolver::new(1800));
        let mut events = session.subscribe();

        session.start_call().await;
        session.unmount();
        let first = session.snapshot();
        session.unmount();

        assert_eq!(session.snapshot(), first);
        assert_eq!(first.status, CallStatus::Ended);
        assert_eq!(preview.detach_calls.load(Ordering::SeqCst), 1);
        assert_eq!(devices.live_tracks(), 0);

        let ended = std::iter::from_fn(|| events.try_recv().ok())
            .filter(|e| matches!(e, CallEvent::Ended { .. }))
            .count();
        assert_eq!(ended, 1);
    }

    #[tokio::test]
    async fn test_toggle_without_media_only_flips_flag() {
        let devices = Arc::new(VirtualDevices::new());
        let (session, _) = session_with(devices.clone(), DurationResolver::new(1800));

        assert!(!session.toggle_camera());
        assert!(!session.camera_enabled());

        // Der Flag gilt auch für die später erhaltenen Tracks
        session.start_call().await;
        let camera = devices
            .issued_tracks()
            .into_iter()
            .find(|t| t.kind() == TrackKind::Video)
            .unwrap();
        assert!(!camera.is_enabled());
        session.unmount();
    }

    #[tokio::test]
    async fn test_start_after_unmount_is_refused() {
        let devices = Arc::new(VirtualDevices::new());
        let (session, _) = session_with(devices.clone(), DurationResolver::new(1800));

        session.unmount();
        assert_eq!(session.start_call().await, StartOutcome::Unmounted);
        assert_eq!(devices.attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_call_after_hangup_resets_elapsed() {
        let devices = Arc::new(VirtualDevices::new());
        let (session, _) = session_with(devices.clone(), DurationResolver::new(1800));

        session.start_call().await;
        tokio::time::sleep(Duration::from_millis(4500)).await;
        session.hangup();

        assert_eq!(session.start_call().await, StartOutcome::Started);
        assert_eq!(session.elapsed_seconds(), 0);
        assert_eq!(devices.live_tracks(), 2);
    }
}
