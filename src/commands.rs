//! Tauri Plugin - UI-Grenze des Call Rooms
//!
//! Die Seite ruft `call_mount` beim Laden und `call_unmount` beim
//! Verlassen auf. Session-Events gehen als `call:*` an die Webview.

use crate::call_session::{CallEvent, CallSnapshot, StartOutcome};
use crate::config::{MediaConfigStore, RoomSettings, SqliteConfigStore};
use crate::media::{default_devices, PreviewBinding, PreviewFrame, PreviewSurface};
use crate::playback::RemotePlayback;
use crate::room::CallRoom;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use parking_lot::RwLock;
use std::sync::Arc;
use tauri::plugin::{Builder, TauriPlugin};
use tauri::{AppHandle, Emitter, Manager, Runtime, State};
use tokio::sync::broadcast::error::RecvError;

// ============================================================================
// PLUGIN STATE
// ============================================================================

pub struct RoomState {
    settings: RoomSettings,
    /// Schreibender Zugriff für die Operator-Seite
    config: Arc<SqliteConfigStore>,
    store: Arc<dyn MediaConfigStore>,
    room: RwLock<Option<Arc<CallRoom>>>,
}

impl RoomState {
    fn current(&self) -> Result<Arc<CallRoom>, String> {
        self.room
            .read()
            .clone()
            .ok_or_else(|| "No call room mounted".to_string())
    }
}

/// Vorschau in der Webview
struct WebviewPreview<R: Runtime> {
    app: AppHandle<R>,
}

impl<R: Runtime> PreviewSurface for WebviewPreview<R> {
    fn attach(&self, binding: PreviewBinding) {
        let _ = self.app.emit("call:preview_attached", &binding);
    }

    fn detach(&self) {
        let _ = self.app.emit("call:preview_detached", ());
    }

    fn present(&self, frame: PreviewFrame) {
        let _ = self.app.emit(
            "call:preview_frame",
            serde_json::json!({
                "width": frame.width,
                "height": frame.height,
                "encoding": frame.encoding,
                "data": BASE64.encode(&frame.data)
            }),
        );
    }
}

// ============================================================================
// TAURI COMMANDS - LIFECYCLE
// ============================================================================

/// Baut den Raum auf; `query` ist die URL der Seite
#[tauri::command]
async fn call_mount<R: Runtime>(
    query: String,
    app: AppHandle<R>,
    state: State<'_, RoomState>,
) -> Result<CallSnapshot, String> {
    let room = Arc::new(CallRoom::new(
        &state.settings,
        &query,
        default_devices(),
        Arc::new(WebviewPreview { app: app.clone() }),
        Arc::clone(&state.store),
    ));

    // Ein Reload ersetzt den alten Raum
    if let Some(previous) = state.room.write().replace(Arc::clone(&room)) {
        previous.unmount();
    }

    forward_events(&room, app);
    let _ = room.mount();

    Ok(room.session().snapshot())
}

/// Stiller Abbau beim Verlassen der Seite
#[tauri::command]
async fn call_unmount(state: State<'_, RoomState>) -> Result<(), String> {
    if let Some(room) = state.room.write().take() {
        room.unmount();
    }
    Ok(())
}

// ============================================================================
// TAURI COMMANDS - CALL
// ============================================================================

/// Startet (oder wiederholt) die Geräte-Anforderung
#[tauri::command]
async fn call_start(state: State<'_, RoomState>) -> Result<CallSnapshot, String> {
    let room = state.current()?;
    match room.start_call().await {
        StartOutcome::Unmounted => Err("Call room was closed".to_string()),
        outcome => {
            tracing::debug!("call_start: {:?}", outcome);
            Ok(room.session().snapshot())
        }
    }
}

#[tauri::command]
async fn call_hangup(state: State<'_, RoomState>) -> Result<CallSnapshot, String> {
    let room = state.current()?;
    room.hangup();
    Ok(room.session().snapshot())
}

#[tauri::command]
async fn call_toggle_microphone(state: State<'_, RoomState>) -> Result<bool, String> {
    Ok(state.current()?.session().toggle_microphone())
}

#[tauri::command]
async fn call_toggle_camera(state: State<'_, RoomState>) -> Result<bool, String> {
    Ok(state.current()?.session().toggle_camera())
}

#[tauri::command]
async fn call_snapshot(state: State<'_, RoomState>) -> Result<CallSnapshot, String> {
    Ok(state.current()?.session().snapshot())
}

#[tauri::command]
async fn call_playback(state: State<'_, RoomState>) -> Result<RemotePlayback, String> {
    Ok(state.current()?.playback())
}

// ============================================================================
// TAURI COMMANDS - OPERATOR
// ============================================================================

/// Speichert die Medien-URLs der Site; `None` behält den alten Wert
#[tauri::command]
async fn call_save_media(
    video_url: Option<String>,
    audio_url: Option<String>,
    state: State<'_, RoomState>,
) -> Result<(), String> {
    state
        .config
        .save_media(
            &state.settings.site_id,
            video_url.as_deref(),
            audio_url.as_deref(),
        )
        .map_err(|e| e.to_string())
}

/// Setzt die Gesprächsdauer der Site; `None` entfernt sie
#[tauri::command]
async fn call_set_duration(
    seconds: Option<u32>,
    state: State<'_, RoomState>,
) -> Result<(), String> {
    state
        .config
        .set_duration(&state.settings.site_id, seconds)
        .map_err(|e| e.to_string())
}

// ============================================================================
// EVENT FORWARDING
// ============================================================================

/// Leitet Session-Events an das Frontend weiter
fn forward_events<R: Runtime>(room: &CallRoom, app: AppHandle<R>) {
    let mut events = room.session().subscribe();

    tauri::async_runtime::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Event forwarder lagged, skipped {} events", skipped);
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            let _ = match event {
                CallEvent::StateChanged(status) => app.emit("call:state_changed", status),
                CallEvent::Tick {
                    elapsed_seconds,
                    limit_seconds,
                } => app.emit(
                    "call:tick",
                    serde_json::json!({
                        "elapsedSeconds": elapsed_seconds,
                        "limitSeconds": limit_seconds
                    }),
                ),
                CallEvent::TracksChanged { microphone, camera } => app.emit(
                    "call:tracks",
                    serde_json::json!({
                        "microphone": microphone,
                        "camera": camera
                    }),
                ),
                CallEvent::DurationResolved(resolved) => app.emit("call:duration", resolved),
                CallEvent::Ended {
                    reason,
                    elapsed_seconds,
                } => app.emit(
                    "call:ended",
                    serde_json::json!({
                        "reason": reason,
                        "message": reason.map(|r| r.message()),
                        "elapsedSeconds": elapsed_seconds
                    }),
                ),
                CallEvent::Error(message) => {
                    tracing::error!("Call error: {}", message);
                    app.emit("call:error", message)
                }
            };
        }
    });
}

// ============================================================================
// PLUGIN
// ============================================================================

/// Erstellt das Plugin `call-room`
pub fn init<R: Runtime>(settings: RoomSettings) -> TauriPlugin<R> {
    Builder::new("call-room")
        .invoke_handler(tauri::generate_handler![
            // Lifecycle
            call_mount,
            call_unmount,
            // Call
            call_start,
            call_hangup,
            call_toggle_microphone,
            call_toggle_camera,
            call_snapshot,
            call_playback,
            // Operator
            call_save_media,
            call_set_duration,
        ])
        .setup(move |app, _api| {
            crate::init_tracing();

            let config = Arc::new(match &settings.database_path {
                Some(path) => SqliteConfigStore::open(path)?,
                None => SqliteConfigStore::open_in_memory()?,
            });
            let store: Arc<dyn MediaConfigStore> = config.clone();

            app.manage(RoomState {
                settings,
                config,
                store,
                room: RwLock::new(None),
            });
            Ok(())
        })
        .on_drop(|app| {
            if let Some(state) = app.try_state::<RoomState>() {
                if let Some(room) = state.room.write().take() {
                    room.unmount();
                }
            }
        })
        .build()
}
